//! Client-side core: input sampling, prediction, and the per-frame view model
//!
//! These modules are transport-agnostic. A host embeds them next to whatever
//! socket and canvas it has: feed inbound [`crate::ws::protocol::ServerMsg`]
//! values into [`view::ClientWorld`], ship whatever [`input::InputSampler`]
//! and [`input::PingProbe`] emit, and draw the [`view::Frame`] each refresh.

pub mod input;
pub mod view;
