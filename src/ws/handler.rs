//! Axum WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::Response;

use super::connection::run_connection;
use crate::app_state::AppState;
use crate::domain::SceneId;
use crate::error::RelayError;

/// `GET /api/v1/{scene_id}/listen` — Join a scene as a listener.
///
/// The client is admitted before the upgrade completes, so it sees every
/// object broadcast after this handler returns. The scene's cached objects
/// are then replayed over the new connection, or a single clear marker if
/// there are none.
///
/// # Errors
///
/// [`RelayError::ExhaustedRetries`] if no connection id could be allocated.
/// A malformed scene id never reaches this handler; the route guard sends
/// it to the static files.
#[utoipa::path(
    get,
    path = "/api/v1/{scene_id}/listen",
    tag = "Scenes",
    params(("scene_id" = String, Path, description = "Six-character scene identifier")),
    responses(
        (status = 101, description = "Switching to WebSocket"),
        (status = 404, description = "Malformed scene id: the path falls through to the static files"),
        (status = 503, description = "Connection id allocation exhausted", body = crate::error::ErrorResponse),
    )
)]
pub async fn listen_handler(
    ws: WebSocketUpgrade,
    Path(scene_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Response, RelayError> {
    let scene_id = SceneId::parse(&scene_id)?;
    let (client, queue) = state.relay_service.admit_client(scene_id).await?;
    let settings = state.connection_settings;

    let on_failure = {
        let relay = Arc::clone(&state.relay_service);
        let client = client.downgrade();
        move |err: axum::Error| {
            tracing::warn!(client_id = %client.id(), error = %err, "websocket upgrade failed");
            tokio::spawn(async move { relay.release_detached(&client).await });
        }
    };
    let relay = Arc::clone(&state.relay_service);

    Ok(ws
        .max_message_size(settings.max_message_size)
        .max_frame_size(settings.max_message_size)
        .on_failed_upgrade(on_failure)
        .on_upgrade(move |socket| run_connection(socket, client, queue, relay, settings)))
}
