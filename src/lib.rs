//! Authoritative multiplayer racing: server core and client core.
//!
//! The server side owns all vehicle state in a single session task, steps
//! physics at a fixed rate behind a wall-clock accumulator, and broadcasts
//! snapshots at an independent cadence. The client side consumes those
//! snapshots, predicts its own vehicle with the same stepper, and produces a
//! per-frame draw model. The binary in `main.rs` wires the server side to an
//! axum WebSocket endpoint; the client modules are transport-agnostic and
//! meant to be embedded by a rendering host.

pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
