//! REST endpoint handlers organized by resource.

pub mod scene;
pub mod system;

use axum::Router;
use tower_http::services::ServeDir;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes(static_files: ServeDir) -> Router<AppState> {
    Router::new().merge(scene::routes(static_files))
}
