//! # scene-relay
//!
//! Real-time relay for collaborative drawing scenes.
//!
//! Senders post drawing objects to a scene over HTTP; every client
//! listening on that scene over WebSocket receives them. The current
//! object set of each scene is kept in an object cache so that late
//! joiners are brought up to date before live objects arrive.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── Listen Handler + Connection loops (ws/)
//!     │
//!     ├── RelayService (service/)
//!     │
//!     ├── Registry actor (domain/)
//!     │
//!     └── SceneStore → ObjectCache (cache/)
//!             ├── in-memory map
//!             └── PostgreSQL key/value table
//! ```

pub mod api;
pub mod app_state;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod ws;
