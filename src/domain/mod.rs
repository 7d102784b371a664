//! Domain layer: identifiers, objects, and the membership registry.
//!
//! This module contains the relay's core model: short scene and client
//! identifiers with their bounded-retry allocator, the object container
//! and the per-scene identifier set stored in the cache, client handles
//! feeding per-connection outbound queues, and the registry actor that
//! serializes membership and fan-out.

pub mod client;
pub mod identifier_set;
pub mod object;
pub mod registry;
pub mod short_id;

pub use client::{ClientHandle, ClientRef, DeliveryError, Frame};
pub use identifier_set::ObjectIdentifierSet;
pub use object::{ObjectContainer, ObjectMethod};
pub use registry::{AdmitOutcome, BroadcastFailure, Registry, RegistryStats};
pub use short_id::{ClientId, SceneId};
