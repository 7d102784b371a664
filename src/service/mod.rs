//! Service layer: relay orchestration.
//!
//! [`RelayService`] coordinates scene registration, object sends, client
//! admission and replay between the [`super::cache::SceneStore`] and the
//! [`super::domain::Registry`].

pub mod relay_service;

pub use relay_service::{RelayLimits, RelayService};
