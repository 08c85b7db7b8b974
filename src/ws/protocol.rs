//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Request to join the race under a display name
    Join {
        /// Empty string means "let the server pick one"
        name: String,
    },

    /// Control intent change; omitted fields keep their previous value
    Inputs(InputPatch),

    /// Change display name mid-session
    Rename { name: String },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp, echoed back verbatim
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Reply to a join: connection identity plus the immutable world layout
    Joined {
        id: Uuid,
        world: WorldDescriptor,
        obstacles: Vec<Obstacle>,
    },

    /// Full roster, broadcast whenever membership or a name changes
    Roster { players: Vec<VehicleSnapshot> },

    /// Authoritative state snapshot, broadcast at the snapshot rate
    State { players: Vec<VehicleSnapshot> },

    /// A vehicle left; clients must drop its entry
    Despawn { id: Uuid },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Partial input vector as sent over the wire.
///
/// Merge semantics are per-field last-writer-wins: a `Some` field overwrites
/// the stored value, a `None` field leaves it untouched. Re-sending an
/// identical patch is harmless, which lets the client re-send on a timer to
/// survive a dropped transition message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub up: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub down: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boost: Option<bool>,
    /// Off-road flag from the client's own surface sampling; advisory, the
    /// server overrides it when it has a track raster of its own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub off_road: Option<bool>,
}

/// Fixed world dimensions, broadcast once at join time and immutable for the
/// session's lifetime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorldDescriptor {
    pub width: f32,
    pub height: f32,
}

impl Default for WorldDescriptor {
    fn default() -> Self {
        Self {
            width: 1365.0,
            height: 768.0,
        }
    }
}

/// Static circular obstacle, generated once per session and shared by all
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Obstacle {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

/// Per-vehicle projection sent in roster and state messages.
/// Input vectors are server-internal and never appear here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub id: Uuid,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub speed: f32,
    pub color: String,
    pub lap: u32,
    pub finished: bool,
}
