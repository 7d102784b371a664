//! WebSocket layer: listener connections.
//!
//! The listen endpoint at `/api/v1/{scene_id}/listen` admits a client,
//! replays the scene's cached objects and then streams every object sent
//! to the scene until either side goes away.

pub mod connection;
pub mod handler;
