//! Fixed-step vehicle physics
//!
//! The stepper is a pure function of (state, input, dt, world): no wall clock,
//! no RNG, so identical input sequences always reproduce identical states.
//! The same code drives both the server tick and the client-side prediction.

use crate::game::vehicle::{tuning, InputState, VehicleState};
use crate::ws::protocol::{Obstacle, WorldDescriptor};

/// Advance one vehicle by a fixed time delta.
///
/// `dt <= 0` is a no-op: zero means no time passed, and a negative delta is
/// invalid input that gets clamped rather than integrated backwards.
pub fn step(vehicle: &mut VehicleState, input: &InputState, dt: f32, world: &WorldDescriptor) {
    if dt <= 0.0 || !dt.is_finite() {
        return;
    }

    let max_speed = if input.boost {
        tuning::BOOST_MAX_SPEED
    } else {
        tuning::MAX_SPEED
    };

    // Steering authority scales with speed, floored so a stationary vehicle
    // still turns a little
    let speed_ratio = (vehicle.speed / max_speed).clamp(tuning::MIN_STEER_RATIO, 1.0);
    vehicle.angle += input.steer() * tuning::TURN_RATE * dt * speed_ratio;

    // Throttle and brake; holding both cancels to zero net intent
    match (input.up, input.down) {
        (true, false) => vehicle.speed += tuning::ACCELERATION * dt,
        (false, true) => vehicle.speed -= tuning::BRAKE_RATE * dt,
        _ => {}
    }

    // Rolling drag pulls the speed toward zero without ever crossing it
    let drag = if input.off_road {
        tuning::OFF_ROAD_DRAG
    } else {
        tuning::ROAD_DRAG
    };
    vehicle.speed -= vehicle.speed.signum() * (drag * dt).min(vehicle.speed.abs());

    vehicle.speed = vehicle.speed.clamp(-tuning::REVERSE_MAX_SPEED, max_speed);

    vehicle.x += vehicle.angle.cos() * vehicle.speed * dt;
    vehicle.y += vehicle.angle.sin() * vehicle.speed * dt;

    clamp_to_world(vehicle, world);
}

/// Obstacle deflection pass, applied after integration.
///
/// Every obstacle overlapping the vehicle pushes it out along the contact
/// normal to the combined radius and sets the speed to a fixed rebound value.
/// Corrections are position-absolute, so evaluation order across obstacles
/// does not matter for the invariants we care about.
pub fn resolve_obstacles(vehicle: &mut VehicleState, obstacles: &[Obstacle], world: &WorldDescriptor) {
    for obstacle in obstacles {
        let combined = obstacle.radius + tuning::VEHICLE_HALF_WIDTH;
        let dx = vehicle.x - obstacle.x;
        let dy = vehicle.y - obstacle.y;
        let dist_sq = dx * dx + dy * dy;
        if dist_sq >= combined * combined {
            continue;
        }

        let dist = dist_sq.sqrt();
        let (nx, ny) = if dist < 1e-3 {
            // Dead center; eject opposite the heading
            (-vehicle.angle.cos(), -vehicle.angle.sin())
        } else {
            (dx / dist, dy / dist)
        };

        vehicle.x = obstacle.x + nx * combined;
        vehicle.y = obstacle.y + ny * combined;
        vehicle.speed = tuning::COLLISION_REBOUND_SPEED;
    }

    // The push-out can land outside the map near the edges
    clamp_to_world(vehicle, world);
}

fn clamp_to_world(vehicle: &mut VehicleState, world: &WorldDescriptor) {
    vehicle.x = vehicle.x.clamp(0.0, world.width);
    vehicle.y = vehicle.y.clamp(0.0, world.height);
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const DT: f32 = 1.0 / 60.0;

    fn world() -> WorldDescriptor {
        WorldDescriptor::default()
    }

    fn vehicle_at(x: f32, y: f32, angle: f32) -> VehicleState {
        VehicleState::new(Uuid::new_v4(), "test".into(), x, y, angle, "#ff0000".into())
    }

    fn input(up: bool, down: bool, left: bool, right: bool) -> InputState {
        InputState {
            up,
            down,
            left,
            right,
            ..Default::default()
        }
    }

    #[test]
    fn acceleration_from_rest_matches_formula() {
        let w = world();
        let mut v = vehicle_at(500.0, 500.0, 0.0);
        step(&mut v, &input(true, false, false, false), DT, &w);

        // Throttle first (900/60 = 15), then drag (84/60), then integrate
        let expected_speed = tuning::ACCELERATION * DT - tuning::ROAD_DRAG * DT;
        let expected_x = 500.0 + expected_speed * DT;
        assert!((v.speed - expected_speed).abs() < 1e-4, "speed {}", v.speed);
        assert!((v.x - expected_x).abs() < 1e-4, "x {}", v.x);
        assert_eq!(v.y, 500.0);
    }

    #[test]
    fn stepping_is_deterministic() {
        let w = world();
        let mut a = vehicle_at(300.0, 300.0, 1.2);
        let mut b = a.clone();
        let sequence = [
            input(true, false, false, false),
            input(true, false, true, false),
            input(true, false, true, false),
            input(false, true, false, true),
            input(false, false, false, false),
        ];

        for _ in 0..200 {
            for inp in &sequence {
                step(&mut a, inp, DT, &w);
                step(&mut b, inp, DT, &w);
            }
        }

        assert_eq!(a.x.to_bits(), b.x.to_bits());
        assert_eq!(a.y.to_bits(), b.y.to_bits());
        assert_eq!(a.angle.to_bits(), b.angle.to_bits());
        assert_eq!(a.speed.to_bits(), b.speed.to_bits());
    }

    #[test]
    fn position_never_leaves_world_bounds() {
        let w = world();
        let mut v = vehicle_at(5.0, 5.0, std::f32::consts::PI * 1.25);
        let inp = InputState {
            up: true,
            boost: true,
            ..Default::default()
        };
        for _ in 0..2000 {
            step(&mut v, &inp, DT, &w);
            assert!((0.0..=w.width).contains(&v.x), "x escaped: {}", v.x);
            assert!((0.0..=w.height).contains(&v.y), "y escaped: {}", v.y);
        }
    }

    #[test]
    fn zero_input_converges_to_rest_monotonically() {
        let w = world();
        let mut v = vehicle_at(600.0, 400.0, 0.0);
        v.speed = 300.0;
        let idle = InputState::default();

        let mut prev = v.speed.abs();
        for _ in 0..600 {
            step(&mut v, &idle, DT, &w);
            assert!(v.speed.abs() <= prev, "speed magnitude grew");
            prev = v.speed.abs();
        }
        assert_eq!(v.speed, 0.0);
    }

    #[test]
    fn opposing_throttle_inputs_cancel() {
        let w = world();
        let mut both = vehicle_at(400.0, 400.0, 0.0);
        both.speed = 200.0;
        let mut coasting = both.clone();

        step(&mut both, &input(true, true, false, false), DT, &w);
        step(&mut coasting, &input(false, false, false, false), DT, &w);

        assert_eq!(both.speed, coasting.speed);
    }

    #[test]
    fn opposing_steer_inputs_cancel() {
        let w = world();
        let mut v = vehicle_at(400.0, 400.0, 0.7);
        v.speed = 300.0;
        step(&mut v, &input(true, false, true, true), DT, &w);
        assert_eq!(v.angle, 0.7);
    }

    #[test]
    fn zero_and_negative_dt_are_noops() {
        let w = world();
        let mut v = vehicle_at(400.0, 400.0, 0.3);
        v.speed = 150.0;
        let before = v.clone();

        step(&mut v, &input(true, false, true, false), 0.0, &w);
        assert_eq!(v.x, before.x);
        assert_eq!(v.speed, before.speed);
        assert_eq!(v.angle, before.angle);

        step(&mut v, &input(true, false, true, false), -DT, &w);
        assert_eq!(v.x, before.x);
        assert_eq!(v.speed, before.speed);
    }

    #[test]
    fn boost_raises_the_speed_cap() {
        let w = world();
        let mut v = vehicle_at(100.0, 400.0, 0.0);
        let flooring = InputState {
            up: true,
            boost: true,
            ..Default::default()
        };
        for _ in 0..600 {
            step(&mut v, &flooring, DT, &w);
        }
        assert!(v.speed > tuning::MAX_SPEED);
        assert!(v.speed <= tuning::BOOST_MAX_SPEED);
    }

    #[test]
    fn off_road_drag_slows_harder() {
        let w = world();
        let mut on_road = vehicle_at(600.0, 400.0, 0.0);
        on_road.speed = 400.0;
        let mut off_road = on_road.clone();

        step(&mut on_road, &InputState::default(), DT, &w);
        let muddy = InputState {
            off_road: true,
            ..Default::default()
        };
        step(&mut off_road, &muddy, DT, &w);

        assert!(off_road.speed < on_road.speed);
    }

    #[test]
    fn obstacle_pass_pushes_out_and_penalizes_speed() {
        let w = world();
        let mut v = vehicle_at(110.0, 100.0, 0.0);
        v.speed = 350.0;
        let obstacles = [Obstacle {
            x: 100.0,
            y: 100.0,
            radius: 30.0,
        }];

        resolve_obstacles(&mut v, &obstacles, &w);

        let dist = ((v.x - 100.0).powi(2) + (v.y - 100.0).powi(2)).sqrt();
        assert!(dist >= 30.0 + tuning::VEHICLE_HALF_WIDTH - 1e-3, "dist {dist}");
        assert_eq!(v.speed, tuning::COLLISION_REBOUND_SPEED);
    }

    #[test]
    fn obstacle_pass_ignores_clear_vehicles() {
        let w = world();
        let mut v = vehicle_at(500.0, 500.0, 0.0);
        v.speed = 200.0;
        let obstacles = [Obstacle {
            x: 100.0,
            y: 100.0,
            radius: 30.0,
        }];

        resolve_obstacles(&mut v, &obstacles, &w);
        assert_eq!(v.x, 500.0);
        assert_eq!(v.speed, 200.0);
    }
}
