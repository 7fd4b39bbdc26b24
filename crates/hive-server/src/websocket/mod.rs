//! Live viewer WebSocket sessions.
//!
//! - [`connection`]: per-viewer handle held by the registry
//! - [`subscribers`]: device key → viewers map and fan-out
//! - [`frames`]: outbound JSON frames
//! - [`state`]: session lifecycle states and close reasons
//! - [`session`]: the per-connection protocol

pub mod connection;
pub mod frames;
pub mod session;
pub mod state;
pub mod subscribers;
