//! OpenAPI specification builder using utoipa.

use utoipa::OpenApi;

use crate::rest::dto::{
    HealthResponse, SessionAck, StatusResponse, StepPageResponse, UpsertProjectResponse,
};
use crate::rest::error::ErrorResponse;

/// OpenAPI documentation for the Waypoint REST API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Waypoint API",
        version = "0.1.0",
        description = "REST API for guided workflows with ephemeral per-user sandbox sessions.",
        license(name = "MIT")
    ),
    paths(
        // Health endpoints
        crate::rest::routes::health::health,
        crate::rest::routes::health::status,
        // Workflow endpoints
        crate::rest::routes::workflow::next,
        // Session endpoints
        crate::rest::routes::sessions::start,
        crate::rest::routes::sessions::stop,
        // Project endpoints
        crate::rest::routes::projects::upsert,
    ),
    components(
        schemas(
            HealthResponse,
            StatusResponse,
            StepPageResponse,
            SessionAck,
            UpsertProjectResponse,
            ErrorResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check and status endpoints"),
        (name = "Workflow", description = "Step advancement for participants"),
        (name = "Sessions", description = "Sandbox server start/stop relays"),
        (name = "Projects", description = "Project registry management"),
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate the OpenAPI specification as a JSON string
    pub fn json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}
