//! Snapshot scheduling and serialization

use std::collections::HashMap;
use uuid::Uuid;

use crate::game::vehicle::VehicleState;
use crate::ws::protocol::{ServerMsg, VehicleSnapshot};

/// Decides when a snapshot broadcast is due.
///
/// Runs its own elapsed-time accumulator, fed from the same wall clock as the
/// simulation loop but otherwise independent of it: physics can tick many
/// times between snapshots, and a snapshot never blocks or skips a tick.
#[derive(Debug, Clone)]
pub struct SnapshotScheduler {
    interval: f32,
    elapsed: f32,
}

impl SnapshotScheduler {
    pub fn new(rate: u32) -> Self {
        Self {
            interval: 1.0 / rate as f32,
            elapsed: 0.0,
        }
    }

    /// Add elapsed wall-clock time; true when a broadcast is due.
    /// The accumulator resets on emission, so a late outer loop produces one
    /// catch-up snapshot rather than a burst.
    pub fn advance(&mut self, elapsed: f32) -> bool {
        if elapsed > 0.0 {
            self.elapsed += elapsed;
        }
        if self.elapsed >= self.interval {
            self.elapsed = 0.0;
            true
        } else {
            false
        }
    }
}

/// Serialize every registered vehicle into a state snapshot.
/// Reflects the most recently completed tick; never a partially stepped one,
/// because the session loop only calls this between tick drains.
pub fn build_state(vehicles: &HashMap<Uuid, VehicleState>) -> ServerMsg {
    ServerMsg::State {
        players: project(vehicles),
    }
}

/// Full roster message, sent on membership or name changes
pub fn build_roster(vehicles: &HashMap<Uuid, VehicleState>) -> ServerMsg {
    ServerMsg::Roster {
        players: project(vehicles),
    }
}

fn project(vehicles: &HashMap<Uuid, VehicleState>) -> Vec<VehicleSnapshot> {
    vehicles.values().map(VehicleState::snapshot).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twenty_snapshots_per_simulated_second() {
        let mut scheduler = SnapshotScheduler::new(20);
        let mut emitted = 0;
        for _ in 0..120 {
            if scheduler.advance(1.0 / 120.0) {
                emitted += 1;
            }
        }
        assert_eq!(emitted, 20);
    }

    #[test]
    fn late_slices_emit_single_catchup_snapshot() {
        let mut scheduler = SnapshotScheduler::new(20);
        // One big stall worth three intervals still yields one snapshot
        assert!(scheduler.advance(0.15));
        assert!(!scheduler.advance(0.01));
    }

    #[test]
    fn state_projection_excludes_inputs() {
        let mut vehicles = HashMap::new();
        let v = VehicleState::new(
            Uuid::new_v4(),
            "ada".into(),
            10.0,
            20.0,
            0.5,
            "#00ff00".into(),
        );
        vehicles.insert(v.id, v);

        match build_state(&vehicles) {
            ServerMsg::State { players } => {
                assert_eq!(players.len(), 1);
                let json = serde_json::to_string(&players[0]).unwrap();
                assert!(!json.contains("up"));
                assert!(!json.contains("off_road"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
