//! OpenAPI document for the REST surface.

use utoipa::OpenApi;

use crate::api::handlers::{scene, system};
use crate::domain::{ObjectContainer, RegistryStats};
use crate::error::{ErrorBody, ErrorResponse};
use crate::ws::handler;

/// Generated OpenAPI document.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "scene-relay", description = "Collaborative drawing relay"),
    paths(
        scene::register_scene,
        scene::send_object,
        handler::listen_handler,
        system::health_handler,
    ),
    components(schemas(
        ObjectContainer,
        RegistryStats,
        system::HealthResponse,
        ErrorResponse,
        ErrorBody,
    )),
    tags(
        (name = "Scenes", description = "Scene registration, sends and listeners"),
        (name = "System", description = "Health"),
    )
)]
pub struct ApiDoc;
