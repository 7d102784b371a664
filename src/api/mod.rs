//! REST API layer: route handlers and router composition.
//!
//! Scene endpoints are mounted under `/api/v1`; anything unmatched falls
//! back to the static file directory.

pub mod handlers;
pub mod openapi;

use std::path::Path;

use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Builds the API router with every REST and WebSocket endpoint.
/// `static_files` also answers scene paths whose id has the wrong shape.
pub fn build_router(static_files: ServeDir) -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes(static_files))
        .merge(handlers::system::routes())
}

/// Builds the complete application: API routes, documentation, static
/// fallback and middleware.
pub fn build_app(state: AppState, static_dir: &Path) -> Router {
    let static_files = ServeDir::new(static_dir);
    let router = build_router(static_files.clone());

    #[cfg(feature = "swagger-ui")]
    let router = {
        use utoipa::OpenApi;
        router.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        )
    };

    router
        .fallback_service(static_files)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
