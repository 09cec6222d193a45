//! Relay services used by the websocket route.
//!
//! Service modules own room state transitions so the route handler stays
//! focused on socket plumbing.

pub mod room;
