//! Vehicle model: per-player kinematic state and tuning constants

use rand::Rng;
use uuid::Uuid;

use crate::ws::protocol::{InputPatch, VehicleSnapshot};

/// Motion tuning, in world pixels and seconds. Drag is expressed directly as
/// a deceleration so the stepper never multiplies a per-frame coefficient by
/// a hardcoded frame rate.
pub mod tuning {
    /// Forward acceleration (px/s^2)
    pub const ACCELERATION: f32 = 900.0;
    /// Brake/reverse deceleration (px/s^2)
    pub const BRAKE_RATE: f32 = 1400.0;
    /// Forward speed cap (px/s)
    pub const MAX_SPEED: f32 = 520.0;
    /// Forward speed cap with boost held (px/s)
    pub const BOOST_MAX_SPEED: f32 = 700.0;
    /// Reverse speed cap (px/s)
    pub const REVERSE_MAX_SPEED: f32 = 260.0;
    /// Turn rate at full steer and full speed (rad/s)
    pub const TURN_RATE: f32 = 2.8;
    /// Rolling drag on asphalt (px/s^2)
    pub const ROAD_DRAG: f32 = 84.0;
    /// Rolling drag on grass (px/s^2)
    pub const OFF_ROAD_DRAG: f32 = 150.0;
    /// Steering responsiveness floor: a near-stationary vehicle still turns
    /// at this fraction of the full rate
    pub const MIN_STEER_RATIO: f32 = 0.2;
    /// Half the sprite width, used as the collision radius
    pub const VEHICLE_HALF_WIDTH: f32 = 20.0;
    /// Speed assigned by the obstacle collision pass (px/s)
    pub const COLLISION_REBOUND_SPEED: f32 = -MAX_SPEED / 2.0;
}

/// Current control intent for one vehicle. The server only ever holds the
/// most recently merged vector per player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub boost: bool,
    pub off_road: bool,
}

impl InputState {
    /// Merge a wire patch, per-field last-writer-wins
    pub fn apply(&mut self, patch: &InputPatch) {
        if let Some(v) = patch.up {
            self.up = v;
        }
        if let Some(v) = patch.down {
            self.down = v;
        }
        if let Some(v) = patch.left {
            self.left = v;
        }
        if let Some(v) = patch.right {
            self.right = v;
        }
        if let Some(v) = patch.boost {
            self.boost = v;
        }
        if let Some(v) = patch.off_road {
            self.off_road = v;
        }
    }

    /// Signed steer intent: -1 left, +1 right, opposing keys cancel
    pub fn steer(&self) -> f32 {
        let mut steer = 0.0;
        if self.left {
            steer -= 1.0;
        }
        if self.right {
            steer += 1.0;
        }
        steer
    }

    /// Wire form with every field set, for idempotent full re-sends
    pub fn to_patch(self) -> InputPatch {
        InputPatch {
            up: Some(self.up),
            down: Some(self.down),
            left: Some(self.left),
            right: Some(self.right),
            boost: Some(self.boost),
            off_road: Some(self.off_road),
        }
    }
}

/// Authoritative per-player state
#[derive(Debug, Clone)]
pub struct VehicleState {
    pub id: Uuid,
    pub name: String,
    pub x: f32,
    pub y: f32,
    /// Heading in radians; 0 points along +x
    pub angle: f32,
    /// Scalar speed along the heading; negative while reversing
    pub speed: f32,
    pub color: String,
    pub lap: u32,
    pub finished: bool,
    pub inputs: InputState,
    pub spawn_time: u64,
}

impl VehicleState {
    pub fn new(id: Uuid, name: String, x: f32, y: f32, angle: f32, color: String) -> Self {
        Self {
            id,
            name,
            x,
            y,
            angle,
            speed: 0.0,
            color,
            lap: 0,
            finished: false,
            inputs: InputState::default(),
            spawn_time: crate::util::time::unix_millis(),
        }
    }

    /// Wire projection for roster and state broadcasts
    pub fn snapshot(&self) -> VehicleSnapshot {
        VehicleSnapshot {
            id: self.id,
            name: self.name.clone(),
            x: self.x,
            y: self.y,
            angle: self.angle,
            speed: self.speed,
            color: self.color.clone(),
            lap: self.lap,
            finished: self.finished,
        }
    }
}

/// Stable per-session color in `#rrggbb` form
pub fn random_color<R: Rng>(rng: &mut R) -> String {
    format!("#{:06x}", rng.gen_range(0u32..0x1_000_000))
}

/// Fallback display name derived from the connection id
pub fn default_name(id: &Uuid) -> String {
    format!("Player-{}", &id.to_string()[..4])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_merge_is_per_field() {
        let mut input = InputState {
            up: true,
            boost: true,
            ..Default::default()
        };
        input.apply(&InputPatch {
            down: Some(true),
            boost: Some(false),
            ..Default::default()
        });
        // Fields absent from the patch keep their previous value
        assert!(input.up);
        assert!(input.down);
        assert!(!input.boost);
        assert!(!input.left);
    }

    #[test]
    fn opposing_steer_keys_cancel() {
        let input = InputState {
            left: true,
            right: true,
            ..Default::default()
        };
        assert_eq!(input.steer(), 0.0);
    }

    #[test]
    fn full_patch_round_trips() {
        let input = InputState {
            up: true,
            right: true,
            off_road: true,
            ..Default::default()
        };
        let mut merged = InputState::default();
        merged.apply(&input.to_patch());
        assert_eq!(merged, input);
    }

    #[test]
    fn colors_are_css_hex() {
        let mut rng = rand::thread_rng();
        for _ in 0..32 {
            let c = random_color(&mut rng);
            assert_eq!(c.len(), 7);
            assert!(c.starts_with('#'));
            assert!(u32::from_str_radix(&c[1..], 16).is_ok());
        }
    }
}
