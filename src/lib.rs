//! # liveclass
//!
//! Native client for joining a live classroom session as a participant.
//!
//! The crate owns the realtime connection lifecycle, normalizes the
//! loosely-typed event stream the session hub pushes (slide changes, point
//! awards, activities, removal), folds it into one coherent session state,
//! and issues participant commands back to the hub (startup announce,
//! leave, submit response).
//!
//! Module map:
//! - [`events`] — typed server events plus the normalization boundary.
//! - [`net`] — hub wire codec, join/validate HTTP gateway, and the
//!   connection manager.
//! - [`state`] — session reducer, activity sub-model, leveling calculator.
//! - [`store`] — session-scoped join context blob store.
//! - [`logging`] — injectable ring-buffer logging port.

pub mod events;
pub mod logging;
pub mod net;
pub mod state;
pub mod store;
