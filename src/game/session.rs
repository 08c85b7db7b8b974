//! Session registry and authoritative simulation loop

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::snapshot::{build_roster, build_state, SnapshotScheduler};
use crate::game::surface::TrackRaster;
use crate::game::vehicle::{default_name, random_color, VehicleState};
use crate::game::{physics, SessionCommand};
use crate::util::time::{FixedStepClock, LOOP_HZ, SIMULATION_TPS, SNAPSHOT_TPS};
use crate::ws::protocol::{Obstacle, ServerMsg, WorldDescriptor};

const COMMAND_CHANNEL_CAPACITY: usize = 256;
const EVENT_CHANNEL_CAPACITY: usize = 256;

const OBSTACLE_COUNT: usize = 30;
const OBSTACLE_MARGIN: f32 = 30.0;

/// Display names longer than this are truncated
const NAME_MAX_LEN: usize = 16;

/// Attempts at finding an on-road spawn before giving up
const SPAWN_ATTEMPTS: usize = 8;

/// Handle to a running session, cheap to clone into every connection task
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<SessionCommand>,
    events_tx: broadcast::Sender<ServerMsg>,
    player_count: Arc<AtomicUsize>,
}

impl SessionHandle {
    /// Subscribe to session broadcasts (roster, state, despawn)
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.events_tx.subscribe()
    }

    /// Send a command to the session loop; dropped if the session is gone
    pub async fn send(&self, cmd: SessionCommand) {
        if self.command_tx.send(cmd).await.is_err() {
            debug!("session command channel closed");
        }
    }

    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    /// Explicit lifecycle end; the loop also stops when every handle drops
    pub async fn close(&self) {
        self.send(SessionCommand::Close).await;
    }
}

/// The authoritative race session. Owns all vehicle state; mutated only on
/// its own task, by the input-apply path and the physics tick.
pub struct GameSession {
    world: WorldDescriptor,
    vehicles: HashMap<Uuid, VehicleState>,
    obstacles: Vec<Obstacle>,
    /// When present the server classifies surfaces itself and the client's
    /// off_road flag is ignored
    track: Option<TrackRaster>,
    rng: ChaCha8Rng,
    command_rx: mpsc::Receiver<SessionCommand>,
    events_tx: broadcast::Sender<ServerMsg>,
    clock: FixedStepClock,
    snapshots: SnapshotScheduler,
    player_count: Arc<AtomicUsize>,
}

impl GameSession {
    pub fn new(world: WorldDescriptor, seed: u64) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let player_count = Arc::new(AtomicUsize::new(0));

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let obstacles = generate_obstacles(&mut rng, &world);

        let handle = SessionHandle {
            command_tx,
            events_tx: events_tx.clone(),
            player_count: player_count.clone(),
        };

        let session = Self {
            world,
            vehicles: HashMap::new(),
            obstacles,
            track: None,
            rng,
            command_rx,
            events_tx,
            clock: FixedStepClock::new(SIMULATION_TPS),
            snapshots: SnapshotScheduler::new(SNAPSHOT_TPS),
            player_count,
        };

        (session, handle)
    }

    /// Attach a track raster, making the server authoritative for surface
    /// classification
    pub fn with_track(mut self, track: TrackRaster) -> Self {
        self.track = Some(track);
        self
    }

    /// Run the simulation loop until the session is closed.
    ///
    /// The outer timer fires well above the physics rate; actual tick and
    /// snapshot cadence come from the wall-clock accumulators, so host
    /// scheduling jitter shifts neither.
    pub async fn run(mut self) {
        info!(
            tick_rate = SIMULATION_TPS,
            snapshot_rate = SNAPSHOT_TPS,
            obstacles = self.obstacles.len(),
            "session started"
        );

        let mut ticker = interval(Duration::from_micros(1_000_000 / LOOP_HZ as u64));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last = Instant::now();

        loop {
            ticker.tick().await;
            let now = Instant::now();
            let elapsed = (now - last).as_secs_f32();
            last = now;

            // Commands are drained before stepping, so every vehicle advances
            // with the input state as of tick start
            if !self.drain_commands() {
                break;
            }

            let steps = self.clock.advance(elapsed);
            for _ in 0..steps {
                self.step_world();
            }

            // Broadcast reflects the most recently completed tick. Skipped
            // when nobody is listening.
            if self.snapshots.advance(elapsed) && self.events_tx.receiver_count() > 0 {
                let _ = self.events_tx.send(build_state(&self.vehicles));
            }
        }

        info!("session closed");
    }

    /// Process all pending commands; false once the session should stop
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.command_rx.try_recv() {
                Ok(SessionCommand::Join {
                    conn_id,
                    name,
                    reply,
                }) => {
                    let joined = self.handle_join(conn_id, name);
                    let _ = reply.send(joined);
                }
                Ok(SessionCommand::Inputs { conn_id, patch }) => {
                    // Silently ignored when unregistered: input can race a
                    // disconnect or arrive before join
                    if let Some(vehicle) = self.vehicles.get_mut(&conn_id) {
                        vehicle.inputs.apply(&patch);
                    }
                }
                Ok(SessionCommand::Rename { conn_id, name }) => {
                    self.handle_rename(conn_id, name);
                }
                Ok(SessionCommand::Leave { conn_id }) => {
                    self.handle_leave(conn_id);
                }
                Ok(SessionCommand::Close) => return false,
                Err(mpsc::error::TryRecvError::Empty) => return true,
                Err(mpsc::error::TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn handle_join(&mut self, conn_id: Uuid, name: String) -> ServerMsg {
        if self.vehicles.contains_key(&conn_id) {
            warn!(conn_id = %conn_id, "connection already registered");
        } else {
            let name = sanitize_name(&name).unwrap_or_else(|| default_name(&conn_id));
            let (x, y) = self.spawn_position();
            let color = random_color(&mut self.rng);
            let vehicle =
                VehicleState::new(conn_id, name, x, y, -std::f32::consts::FRAC_PI_2, color);

            info!(conn_id = %conn_id, name = %vehicle.name, x, y, "player joined");
            self.vehicles.insert(conn_id, vehicle);
            self.player_count.store(self.vehicles.len(), Ordering::Relaxed);
            let _ = self.events_tx.send(build_roster(&self.vehicles));
        }

        ServerMsg::Joined {
            id: conn_id,
            world: self.world,
            obstacles: self.obstacles.clone(),
        }
    }

    fn handle_rename(&mut self, conn_id: Uuid, name: String) {
        if let Some(vehicle) = self.vehicles.get_mut(&conn_id) {
            if let Some(name) = sanitize_name(&name) {
                vehicle.name = name;
                let _ = self.events_tx.send(build_roster(&self.vehicles));
            }
        }
    }

    fn handle_leave(&mut self, conn_id: Uuid) {
        // Exactly one despawn notice per registered connection; a second
        // leave for the same id finds nothing and stays silent
        if self.vehicles.remove(&conn_id).is_some() {
            self.player_count.store(self.vehicles.len(), Ordering::Relaxed);
            let _ = self.events_tx.send(ServerMsg::Despawn { id: conn_id });
            info!(conn_id = %conn_id, remaining = self.vehicles.len(), "player left");
        }
    }

    /// Advance every vehicle by one fixed physics step
    fn step_world(&mut self) {
        let dt = self.clock.step();
        for vehicle in self.vehicles.values_mut() {
            if vehicle.finished {
                continue;
            }

            let mut input = vehicle.inputs;
            if let Some(track) = &self.track {
                input.off_road = track.is_off_road(vehicle.x, vehicle.y);
            }

            physics::step(vehicle, &input, dt, &self.world);
            physics::resolve_obstacles(vehicle, &self.obstacles, &self.world);
        }
    }

    /// Random offset within the safe spawn region; with a track raster
    /// attached, resample a few times to avoid spawning on grass
    fn spawn_position(&mut self) -> (f32, f32) {
        let mut candidate = (0.0, 0.0);
        for _ in 0..SPAWN_ATTEMPTS {
            candidate = (
                self.rng.gen_range(200.0..500.0),
                self.rng.gen_range(500.0..700.0),
            );
            match &self.track {
                Some(track) if track.is_off_road(candidate.0, candidate.1) => continue,
                _ => return candidate,
            }
        }
        candidate
    }

    #[cfg(test)]
    fn vehicles(&self) -> &HashMap<Uuid, VehicleState> {
        &self.vehicles
    }

    #[cfg(test)]
    fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }
}

fn sanitize_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(NAME_MAX_LEN).collect())
}

fn generate_obstacles<R: Rng>(rng: &mut R, world: &WorldDescriptor) -> Vec<Obstacle> {
    (0..OBSTACLE_COUNT)
        .map(|_| Obstacle {
            x: rng.gen_range(OBSTACLE_MARGIN..world.width - OBSTACLE_MARGIN),
            y: rng.gen_range(OBSTACLE_MARGIN..world.height - OBSTACLE_MARGIN),
            radius: rng.gen_range(30.0..50.0),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::InputPatch;
    use tokio::sync::oneshot;

    fn join(session: &mut GameSession, id: Uuid, name: &str) -> ServerMsg {
        session.handle_join(id, name.to_string())
    }

    #[test]
    fn join_spawns_in_safe_region_and_replies_with_world() {
        let (mut session, _handle) = GameSession::new(WorldDescriptor::default(), 7);
        let id = Uuid::new_v4();

        match join(&mut session, id, "ada") {
            ServerMsg::Joined {
                id: joined_id,
                world,
                obstacles,
            } => {
                assert_eq!(joined_id, id);
                assert_eq!(world.width, 1365.0);
                assert_eq!(obstacles.len(), OBSTACLE_COUNT);
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        let vehicle = &session.vehicles()[&id];
        assert!((200.0..500.0).contains(&vehicle.x));
        assert!((500.0..700.0).contains(&vehicle.y));
        assert_eq!(vehicle.name, "ada");
        assert_eq!(vehicle.speed, 0.0);
    }

    #[test]
    fn empty_name_gets_a_default_and_long_names_truncate() {
        let (mut session, _handle) = GameSession::new(WorldDescriptor::default(), 7);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        join(&mut session, a, "   ");
        join(&mut session, b, "a-name-far-longer-than-sixteen");

        assert!(session.vehicles()[&a].name.starts_with("Player-"));
        assert_eq!(session.vehicles()[&b].name.chars().count(), NAME_MAX_LEN);
    }

    #[test]
    fn obstacles_are_deterministic_per_seed_and_inside_margins() {
        let world = WorldDescriptor::default();
        let (a, _) = GameSession::new(world, 42);
        let (b, _) = GameSession::new(world, 42);

        for (oa, ob) in a.obstacles().iter().zip(b.obstacles()) {
            assert_eq!(oa.x, ob.x);
            assert_eq!(oa.y, ob.y);
            assert_eq!(oa.radius, ob.radius);
        }
        for o in a.obstacles() {
            assert!((OBSTACLE_MARGIN..=world.width - OBSTACLE_MARGIN).contains(&o.x));
            assert!((OBSTACLE_MARGIN..=world.height - OBSTACLE_MARGIN).contains(&o.y));
        }
    }

    #[test]
    fn input_for_unregistered_connection_is_a_silent_noop() {
        let (mut session, _handle) = GameSession::new(WorldDescriptor::default(), 7);
        // Must not panic or register anything
        let ghost = Uuid::new_v4();
        if let Some(v) = session.vehicles.get_mut(&ghost) {
            v.inputs.apply(&InputPatch::default());
        }
        session.handle_leave(ghost);
        assert!(session.vehicles().is_empty());
    }

    #[test]
    fn hundred_joins_and_leaves_produce_exactly_hundred_despawns() {
        let (mut session, handle) = GameSession::new(WorldDescriptor::default(), 7);
        let mut rx = handle.subscribe();

        let ids: Vec<Uuid> = (0..100).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            join(&mut session, *id, "p");
        }
        for id in &ids {
            session.handle_leave(*id);
            // Double leave must not emit a second notice
            session.handle_leave(*id);
        }

        assert!(session.vehicles().is_empty());
        assert_eq!(handle.player_count(), 0);

        let mut despawned = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let ServerMsg::Despawn { id } = msg {
                despawned.push(id);
            }
        }
        despawned.sort();
        despawned.dedup();
        assert_eq!(despawned.len(), 100);
    }

    #[test]
    fn sixty_ticks_and_twenty_snapshots_per_second_share_one_loop() {
        let (mut session, handle) = GameSession::new(WorldDescriptor::default(), 7);
        let id = Uuid::new_v4();
        join(&mut session, id, "p");
        session.vehicles.get_mut(&id).unwrap().inputs.up = true;
        let _rx = handle.subscribe();

        let mut ticks = 0;
        let mut snapshots = 0;
        // Emulate one second of the outer loop at 120 Hz
        for _ in 0..120 {
            let elapsed = 1.0 / 120.0;
            let steps = session.clock.advance(elapsed);
            for _ in 0..steps {
                session.step_world();
                ticks += 1;
            }
            if session.snapshots.advance(elapsed) && session.events_tx.receiver_count() > 0 {
                let _ = session.events_tx.send(build_state(&session.vehicles));
                snapshots += 1;
            }
        }

        assert_eq!(ticks, 60);
        assert_eq!(snapshots, 20);
        // And the vehicle actually moved under throttle
        assert!(session.vehicles()[&id].speed != 0.0);
    }

    #[test]
    fn no_snapshot_is_broadcast_without_subscribers() {
        let (mut session, _handle) = GameSession::new(WorldDescriptor::default(), 7);
        // No receiver subscribed; the send guard must keep this from erroring
        assert!(session.snapshots.advance(1.0));
        assert_eq!(session.events_tx.receiver_count(), 0);
        let _ = session.drain_commands();
    }

    #[tokio::test]
    async fn close_command_stops_the_loop() {
        let (session, handle) = GameSession::new(WorldDescriptor::default(), 7);
        let task = tokio::spawn(session.run());
        handle.close().await;
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("session loop did not stop")
            .unwrap();
    }

    #[test]
    fn server_side_classifier_overrides_client_flag() {
        use crate::game::surface::TrackRaster;

        // Single off-road (green) pixel covering the whole world
        let raster =
            TrackRaster::from_rgba(1, 1, vec![40, 180, 50, 255], 2000.0).unwrap();
        let (mut session, _handle) = GameSession::new(WorldDescriptor::default(), 7);
        session = session.with_track(raster);

        let id = Uuid::new_v4();
        join(&mut session, id, "p");
        {
            let v = session.vehicles.get_mut(&id).unwrap();
            v.speed = 400.0;
            v.inputs.off_road = false; // client claims asphalt
        }
        let before = session.vehicles()[&id].speed;
        session.step_world();
        let after = session.vehicles()[&id].speed;

        // Off-road drag of 150 px/s^2 for one 60 Hz tick
        assert!((before - after) >= 150.0 / 60.0 - 1e-3);
    }

    #[tokio::test]
    async fn join_reply_arrives_over_oneshot() {
        let (mut session, _handle) = GameSession::new(WorldDescriptor::default(), 7);
        let (tx, rx) = oneshot::channel();
        let id = Uuid::new_v4();

        let reply = session.handle_join(id, "p".into());
        tx.send(reply).unwrap();
        match rx.await.unwrap() {
            ServerMsg::Joined { id: joined, .. } => assert_eq!(joined, id),
            other => panic!("unexpected reply: {other:?}"),
        }
    }
}
