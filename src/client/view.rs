//! Client world state, prediction, and the per-frame view model
//!
//! [`ClientWorld`] consumes authoritative server messages and produces one
//! [`Frame`] per display refresh: a clamped camera rect, the visible track
//! crop, and a pose for every known vehicle. The own vehicle is advanced
//! locally through the same physics stepper the server runs, so steering
//! feels immediate; every snapshot overwrites that prediction wholesale and
//! the old error only survives as a fading visual offset.

use std::collections::HashMap;

use uuid::Uuid;

use crate::game::physics;
use crate::game::vehicle::{InputState, VehicleState};
use crate::util::time::{FixedStepClock, SIMULATION_TPS};
use crate::ws::protocol::{Obstacle, ServerMsg, VehicleSnapshot, WorldDescriptor};

/// How long a reconciliation error stays visible while easing out
const CORRECTION_DURATION: f32 = 0.12;

/// Prediction errors below this snap without smoothing
const CORRECTION_MIN_ERROR: f32 = 0.5;

/// Obstacles this far outside the viewport are still included, matching the
/// largest obstacle radius
const OBSTACLE_CULL_MARGIN: f32 = 50.0;

/// Screen dimensions of the host's drawing surface, in world units
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

/// An axis-aligned world-space rectangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One vehicle, ready to draw
#[derive(Debug, Clone)]
pub struct VehiclePose {
    pub id: Uuid,
    /// Viewport-relative position
    pub screen_x: f32,
    pub screen_y: f32,
    pub angle: f32,
    pub color: String,
    pub name: String,
    /// The local player's vehicle gets the highlight ring
    pub is_local: bool,
}

/// One visible obstacle, viewport-relative
#[derive(Debug, Clone, Copy)]
pub struct ObstacleView {
    pub screen_x: f32,
    pub screen_y: f32,
    pub radius: f32,
}

/// Everything the host needs to draw one frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// World region the viewport currently shows
    pub camera: WorldRect,
    /// Visible part of the track raster (camera intersected with the world)
    pub track_crop: WorldRect,
    pub vehicles: Vec<VehiclePose>,
    pub obstacles: Vec<ObstacleView>,
}

/// Visual-only decay of a reconciliation error. The physics state snaps to
/// the server immediately; only the rendered position eases over.
#[derive(Debug, Clone, Copy)]
struct SmoothCorrection {
    initial: (f32, f32),
    time_remaining: f32,
}

impl SmoothCorrection {
    fn idle() -> Self {
        Self {
            initial: (0.0, 0.0),
            time_remaining: 0.0,
        }
    }

    fn start(error: (f32, f32)) -> Self {
        Self {
            initial: error,
            time_remaining: CORRECTION_DURATION,
        }
    }

    /// Advance the decay, returning the current visual offset
    fn update(&mut self, dt: f32) -> (f32, f32) {
        if self.time_remaining <= 0.0 {
            return (0.0, 0.0);
        }
        self.time_remaining -= dt.max(0.0);
        if self.time_remaining <= 0.0 {
            return (0.0, 0.0);
        }

        let t = 1.0 - (self.time_remaining / CORRECTION_DURATION);
        let ease = 1.0 - (1.0 - t.clamp(0.0, 1.0)).powi(3);
        (self.initial.0 * (1.0 - ease), self.initial.1 * (1.0 - ease))
    }
}

/// Client-side replica of the race, fed by server messages
pub struct ClientWorld {
    my_id: Option<Uuid>,
    world: WorldDescriptor,
    vehicles: HashMap<Uuid, VehicleSnapshot>,
    obstacles: Vec<Obstacle>,
    /// Locally stepped copy of the own vehicle
    predicted: Option<VehicleState>,
    prediction_clock: FixedStepClock,
    correction: SmoothCorrection,
    camera: (f32, f32),
}

impl ClientWorld {
    pub fn new() -> Self {
        Self {
            my_id: None,
            world: WorldDescriptor::default(),
            vehicles: HashMap::new(),
            obstacles: Vec::new(),
            predicted: None,
            prediction_clock: FixedStepClock::new(SIMULATION_TPS),
            correction: SmoothCorrection::idle(),
            camera: (0.0, 0.0),
        }
    }

    pub fn my_id(&self) -> Option<Uuid> {
        self.my_id
    }

    pub fn world(&self) -> WorldDescriptor {
        self.world
    }

    /// The predicted own position, for feeding the local surface classifier
    pub fn my_position(&self) -> Option<(f32, f32)> {
        self.predicted.as_ref().map(|v| (v.x, v.y))
    }

    /// Apply one authoritative server message
    pub fn handle_message(&mut self, msg: ServerMsg) {
        match msg {
            ServerMsg::Joined {
                id,
                world,
                obstacles,
            } => {
                self.my_id = Some(id);
                self.world = world;
                self.obstacles = obstacles;
            }
            ServerMsg::Roster { players } => {
                // Wholesale roster replacement, keyed by id
                self.vehicles = players.into_iter().map(|p| (p.id, p)).collect();
            }
            ServerMsg::State { players } => {
                for snapshot in players {
                    if Some(snapshot.id) == self.my_id {
                        self.reconcile(&snapshot);
                    }
                    self.vehicles.insert(snapshot.id, snapshot);
                }
            }
            ServerMsg::Despawn { id } => {
                self.vehicles.remove(&id);
                if Some(id) == self.my_id {
                    self.predicted = None;
                }
            }
            ServerMsg::Pong { .. } => {}
        }
    }

    /// Snapshot fields replace the predicted state wholesale; the prediction
    /// error becomes a short-lived visual offset so the correction reads as
    /// a glide instead of a pop. The server state is the source of truth
    /// from this frame on.
    fn reconcile(&mut self, snapshot: &VehicleSnapshot) {
        if let Some(predicted) = &self.predicted {
            let error = (predicted.x - snapshot.x, predicted.y - snapshot.y);
            if (error.0 * error.0 + error.1 * error.1).sqrt() > CORRECTION_MIN_ERROR {
                self.correction = SmoothCorrection::start(error);
            }
        }
        self.predicted = Some(vehicle_from_snapshot(snapshot));
    }

    /// Advance prediction and build the draw model for one frame.
    ///
    /// Free-running: `dt` is whatever the display refresh delivered. The own
    /// vehicle still steps at the fixed physics rate behind an accumulator,
    /// so prediction stays deterministic and comparable to the server's.
    pub fn frame(&mut self, dt: f32, input: &InputState, viewport: Viewport) -> Frame {
        if let Some(predicted) = &mut self.predicted {
            let steps = self.prediction_clock.advance(dt);
            for _ in 0..steps {
                physics::step(predicted, input, self.prediction_clock.step(), &self.world);
            }
        }

        let offset = self.correction.update(dt);
        let me = self
            .predicted
            .as_ref()
            .map(|v| (v.x + offset.0, v.y + offset.1, v.angle));

        // Camera centers the local player, clamped so it never shows outside
        // the world; without a local vehicle it stays where it was
        if let Some((mx, my, _)) = me {
            self.camera = (
                (mx - viewport.width / 2.0).clamp(0.0, (self.world.width - viewport.width).max(0.0)),
                (my - viewport.height / 2.0)
                    .clamp(0.0, (self.world.height - viewport.height).max(0.0)),
            );
        }
        let (cam_x, cam_y) = self.camera;

        let camera = WorldRect {
            x: cam_x,
            y: cam_y,
            width: viewport.width,
            height: viewport.height,
        };

        let vehicles = self
            .vehicles
            .values()
            .map(|snapshot| {
                let is_local = Some(snapshot.id) == self.my_id;
                let (x, y, angle) = if is_local {
                    me.unwrap_or((snapshot.x, snapshot.y, snapshot.angle))
                } else {
                    (snapshot.x, snapshot.y, snapshot.angle)
                };
                VehiclePose {
                    id: snapshot.id,
                    screen_x: x - cam_x,
                    screen_y: y - cam_y,
                    angle,
                    color: snapshot.color.clone(),
                    name: snapshot.name.clone(),
                    is_local,
                }
            })
            .collect();

        let obstacles = self
            .obstacles
            .iter()
            .filter(|o| {
                o.x > cam_x - OBSTACLE_CULL_MARGIN
                    && o.x < cam_x + viewport.width + OBSTACLE_CULL_MARGIN
                    && o.y > cam_y - OBSTACLE_CULL_MARGIN
                    && o.y < cam_y + viewport.height + OBSTACLE_CULL_MARGIN
            })
            .map(|o| ObstacleView {
                screen_x: o.x - cam_x,
                screen_y: o.y - cam_y,
                radius: o.radius,
            })
            .collect();

        Frame {
            camera,
            track_crop: intersect_world(camera, self.world),
            vehicles,
            obstacles,
        }
    }
}

impl Default for ClientWorld {
    fn default() -> Self {
        Self::new()
    }
}

fn vehicle_from_snapshot(snapshot: &VehicleSnapshot) -> VehicleState {
    let mut vehicle = VehicleState::new(
        snapshot.id,
        snapshot.name.clone(),
        snapshot.x,
        snapshot.y,
        snapshot.angle,
        snapshot.color.clone(),
    );
    vehicle.speed = snapshot.speed;
    vehicle.lap = snapshot.lap;
    vehicle.finished = snapshot.finished;
    vehicle
}

fn intersect_world(camera: WorldRect, world: WorldDescriptor) -> WorldRect {
    let x = camera.x.max(0.0);
    let y = camera.y.max(0.0);
    let right = (camera.x + camera.width).min(world.width);
    let bottom = (camera.y + camera.height).min(world.height);
    WorldRect {
        x,
        y,
        width: (right - x).max(0.0),
        height: (bottom - y).max(0.0),
    }
}
