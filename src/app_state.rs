//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::service::RelayService;
use crate::ws::connection::ConnectionSettings;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Relay service for all business logic.
    pub relay_service: Arc<RelayService>,
    /// Limits applied to every listener connection.
    pub connection_settings: ConnectionSettings,
}
