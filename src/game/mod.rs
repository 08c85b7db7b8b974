//! Game simulation modules

pub mod physics;
pub mod session;
pub mod snapshot;
pub mod surface;
pub mod vehicle;

pub use session::{GameSession, SessionHandle};
pub use vehicle::{InputState, VehicleState};

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::ws::protocol::{InputPatch, ServerMsg};

/// Request sent from a connection task to the session loop.
/// The session task is the single owner of all vehicle state; everything
/// else talks to it through this channel.
#[derive(Debug)]
pub enum SessionCommand {
    /// Register a vehicle for this connection and reply with the join info
    Join {
        conn_id: Uuid,
        name: String,
        reply: oneshot::Sender<ServerMsg>,
    },

    /// Merge a partial input vector; no-op for unregistered connections
    Inputs { conn_id: Uuid, patch: InputPatch },

    /// Change display name
    Rename { conn_id: Uuid, name: String },

    /// Remove the vehicle and notify remaining clients
    Leave { conn_id: Uuid },

    /// End the session loop
    Close,
}
