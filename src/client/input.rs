//! Client input sampling
//!
//! Collapses raw device events (key edges, hold buttons, a virtual stick)
//! into the normalized input vector, and decides when that vector needs to
//! go over the wire.

use crate::game::vehicle::InputState;
use crate::ws::protocol::{ClientMsg, InputPatch};

/// A full re-send at this cadence covers a dropped transition message, so a
/// held key can never wedge on an unreliable transport
const RESEND_INTERVAL_MS: u64 = 500;

/// Virtual stick x-offset below this is treated as centered
const STICK_DEADZONE_PX: f32 = 10.0;

/// Logical controls, independent of which key or button produced them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Throttle,
    Brake,
    SteerLeft,
    SteerRight,
    Boost,
}

/// Tracks current control intent and emits wire patches on transitions plus
/// a periodic keepalive. Emission is idempotent: the same vector re-sent is
/// harmless by the protocol's merge semantics.
#[derive(Debug, Default)]
pub struct InputSampler {
    current: InputState,
    last_sent: Option<InputState>,
    last_sent_ms: u64,
}

impl InputSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key or button edge
    pub fn set(&mut self, control: Control, pressed: bool) {
        match control {
            Control::Throttle => self.current.up = pressed,
            Control::Brake => self.current.down = pressed,
            Control::SteerLeft => self.current.left = pressed,
            Control::SteerRight => self.current.right = pressed,
            Control::Boost => self.current.boost = pressed,
        }
    }

    /// Virtual stick x-offset in pixels from its touch origin
    pub fn steer_axis(&mut self, dx: f32) {
        self.current.left = dx < -STICK_DEADZONE_PX;
        self.current.right = dx > STICK_DEADZONE_PX;
    }

    /// Stick released: steering returns to center
    pub fn release_stick(&mut self) {
        self.current.left = false;
        self.current.right = false;
    }

    /// Off-road flag from local surface sampling, forwarded to the server
    /// as advisory data
    pub fn set_off_road(&mut self, off_road: bool) {
        self.current.off_road = off_road;
    }

    /// The vector as currently held, for local prediction
    pub fn current(&self) -> InputState {
        self.current
    }

    /// A patch to send now, if any: every meaningful transition plus a
    /// keepalive every [`RESEND_INTERVAL_MS`]. Always a full vector.
    pub fn poll(&mut self, now_ms: u64) -> Option<InputPatch> {
        let changed = self.last_sent != Some(self.current);
        let keepalive = now_ms.saturating_sub(self.last_sent_ms) >= RESEND_INTERVAL_MS;
        if !changed && !keepalive {
            return None;
        }

        self.last_sent = Some(self.current);
        self.last_sent_ms = now_ms;
        Some(self.current.to_patch())
    }
}

/// Probe cadence
const PING_INTERVAL_MS: u64 = 800;
/// Bounded wait for a reply; on expiry the probe frees itself and the last
/// good RTT stays on display
const PING_TIMEOUT_MS: u64 = 400;

/// Round-trip latency probe. Courtesy diagnostic only; nothing in gameplay
/// depends on it and an unanswered probe never blocks anything.
#[derive(Debug, Default)]
pub struct PingProbe {
    last_probe_ms: u64,
    /// Timestamp of the probe in flight, if any
    pending: Option<u64>,
    rtt_ms: Option<u64>,
}

impl PingProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// A ping to send now, if one is due
    pub fn poll(&mut self, now_ms: u64) -> Option<ClientMsg> {
        if let Some(sent) = self.pending {
            if now_ms.saturating_sub(sent) >= PING_TIMEOUT_MS {
                self.pending = None;
            }
        }

        if self.pending.is_none() && now_ms.saturating_sub(self.last_probe_ms) >= PING_INTERVAL_MS
        {
            self.last_probe_ms = now_ms;
            self.pending = Some(now_ms);
            return Some(ClientMsg::Ping { t: now_ms });
        }
        None
    }

    /// Record a pong; echoes for expired or unknown probes are ignored
    pub fn on_pong(&mut self, t: u64, now_ms: u64) {
        if self.pending == Some(t) {
            self.rtt_ms = Some(now_ms.saturating_sub(t));
            self.pending = None;
        }
    }

    pub fn rtt_ms(&self) -> Option<u64> {
        self.rtt_ms
    }
}
