//! Project registry endpoints.

use axum::{extract::State, Json};

use crate::rest::dto::UpsertProjectResponse;
use crate::rest::error::{ApiError, ErrorResponse};
use crate::rest::state::ApiState;

/// Validate a project definition and upsert it into the registry
#[utoipa::path(
    put,
    path = "/api/v1/projects",
    tag = "Projects",
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Project stored, with any warnings", body = UpsertProjectResponse),
        (status = 400, description = "Invalid definition or store failure", body = ErrorResponse)
    )
)]
pub async fn upsert(
    State(state): State<ApiState>,
    Json(definition): Json<serde_json::Value>,
) -> Result<Json<UpsertProjectResponse>, ApiError> {
    let (project, warnings) = state.registry.upsert(&definition).await?;

    Ok(Json(UpsertProjectResponse {
        id: project.id,
        warnings,
    }))
}
