//! Networking: hub wire codec, the join/validate HTTP gateway, and the
//! realtime connection manager.

pub mod api;
pub mod client;
pub mod protocol;
