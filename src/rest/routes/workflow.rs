//! Workflow advance endpoint.

use axum::{
    extract::{Query, State},
    Json,
};

use crate::rest::dto::{StepPageResponse, WorkflowQuery};
use crate::rest::error::{ApiError, ErrorResponse};
use crate::rest::state::ApiState;

/// Advance a participant one step and return the page to show
#[utoipa::path(
    get,
    path = "/api/v1/workflow/next",
    tag = "Workflow",
    params(
        ("projectId" = String, Query, description = "Project identifier"),
        ("userId" = String, Query, description = "Participant identifier")
    ),
    responses(
        (status = 200, description = "Next page for the participant", body = StepPageResponse),
        (status = 400, description = "Unknown project or missing identifiers", body = ErrorResponse)
    )
)]
pub async fn next(
    State(state): State<ApiState>,
    Query(query): Query<WorkflowQuery>,
) -> Result<Json<StepPageResponse>, ApiError> {
    // Missing identifiers read the same as an unknown project, so no
    // progress record is ever created for a malformed request.
    let (project_id, user_id) = match (query.project_id, query.user_id) {
        (Some(p), Some(u)) if !p.is_empty() && !u.is_empty() => (p, u),
        _ => return Err(ApiError::BadRequest("Project ID Not Found".to_string())),
    };

    let request = serde_json::json!({
        "projectId": project_id,
        "userId": user_id,
    });
    let page = state
        .workflow
        .next_step(&project_id, &user_id, request)
        .await?;

    Ok(Json(StepPageResponse::new(page)))
}
