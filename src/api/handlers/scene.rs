//! Scene handlers: register a scene, send an object to it.

use axum::body::Bytes;
use axum::extract::{OriginalUri, Path, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::app_state::AppState;
use crate::domain::{ObjectContainer, SceneId};
use crate::error::{ErrorResponse, RelayError};
use crate::ws::handler::listen_handler;

/// `GET /register` — Allocate a new scene.
///
/// # Errors
///
/// Returns [`RelayError`] on cache failure or id exhaustion.
#[utoipa::path(
    get,
    path = "/api/v1/register",
    tag = "Scenes",
    summary = "Register a scene",
    description = "Allocates a fresh six-character scene id, seeds its empty object set and returns the id as plain text.",
    responses(
        (status = 200, description = "Scene id", body = String, content_type = "text/plain"),
        (status = 500, description = "Object cache failure", body = ErrorResponse),
        (status = 503, description = "Scene id allocation exhausted", body = ErrorResponse),
    )
)]
pub async fn register_scene(State(state): State<AppState>) -> Result<impl IntoResponse, RelayError> {
    let scene_id = state.relay_service.register_scene().await?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        scene_id.to_string(),
    ))
}

/// `POST /{scene_id}/send` — Apply an object to a scene and broadcast it.
///
/// The body is read raw so that exactly what the sender posted is what a
/// late joiner replays.
///
/// # Errors
///
/// Returns [`RelayError`] on a malformed body, an absent or unreadable
/// scene set, or a cache write failure.
#[utoipa::path(
    post,
    path = "/api/v1/{scene_id}/send",
    tag = "Scenes",
    summary = "Send an object",
    description = "`set` stores the object and adds its id to the scene, `delete` removes both, `clear` empties the scene. Any other method is only broadcast. Delivery failures to individual listeners are logged, not reported.",
    params(("scene_id" = String, Path, description = "Six-character scene identifier")),
    request_body = ObjectContainer,
    responses(
        (status = 200, description = "Object accepted"),
        (status = 400, description = "Malformed object", body = ErrorResponse),
        (status = 405, description = "Malformed scene id: the path falls through to the static files, which only serve GET"),
        (status = 422, description = "Scene identifier set absent or unreadable", body = ErrorResponse),
        (status = 500, description = "Object cache write failure or corrupt identifier set", body = ErrorResponse),
    )
)]
pub async fn send_object(
    State(state): State<AppState>,
    Path(scene_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, RelayError> {
    let scene_id = SceneId::parse(&scene_id)?;
    state.relay_service.send_object(&scene_id, &body).await?;
    Ok(StatusCode::OK)
}

/// Hands a request whose scene id is not six ASCII alphanumerics to the
/// static files, exactly as if the route had not matched.
async fn scene_id_shape(
    State(static_files): State<ServeDir>,
    Path(scene_id): Path<String>,
    OriginalUri(original): OriginalUri,
    mut request: Request,
    next: Next,
) -> Response {
    if SceneId::parse(&scene_id).is_ok() {
        return next.run(request).await;
    }
    // Nesting strips `/api/v1`; the static lookup needs the full path.
    *request.uri_mut() = original;
    match static_files.oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

/// Scene routes, relative to `/api/v1`. `static_files` receives requests
/// whose scene id segment has the wrong shape.
pub fn routes(static_files: ServeDir) -> Router<AppState> {
    let per_scene = Router::new()
        .route("/{scene_id}/send", post(send_object))
        .route("/{scene_id}/listen", get(listen_handler))
        .route_layer(middleware::from_fn_with_state(static_files, scene_id_shape));
    Router::new()
        .route("/register", get(register_scene))
        .merge(per_scene)
}
