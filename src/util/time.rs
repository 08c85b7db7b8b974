//! Time utilities for the simulation loop

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Rate configuration. Physics and snapshot rates are independent; the outer
/// loop timer runs finer than both so neither schedule starves the other.
pub const SIMULATION_TPS: u32 = 60;
pub const SNAPSHOT_TPS: u32 = 20;
pub const LOOP_HZ: u32 = 120;

/// Unconsumed real time beyond this is discarded rather than simulated, so a
/// long host stall cannot trigger an unbounded catch-up burst.
const MAX_ACCUMULATED_SECS: f32 = 0.25;

/// Wall-clock accumulator driving a fixed-rate simulation.
///
/// Each call to [`FixedStepClock::advance`] adds the elapsed real time and
/// returns how many whole fixed steps are now due. Simulation speed is thereby
/// independent of host scheduling jitter, and rounding error from variable
/// deltas cannot compound.
#[derive(Debug, Clone)]
pub struct FixedStepClock {
    step: f32,
    accumulator: f32,
}

impl FixedStepClock {
    pub fn new(rate: u32) -> Self {
        Self {
            step: 1.0 / rate as f32,
            accumulator: 0.0,
        }
    }

    /// Fixed step duration in seconds
    pub fn step(&self) -> f32 {
        self.step
    }

    /// Add elapsed wall-clock time, returning the number of fixed steps due
    pub fn advance(&mut self, elapsed: f32) -> u32 {
        if elapsed > 0.0 {
            self.accumulator = (self.accumulator + elapsed).min(MAX_ACCUMULATED_SECS);
        }

        let mut steps = 0;
        while self.accumulator >= self.step {
            self.accumulator -= self.step;
            steps += 1;
        }
        steps
    }
}
