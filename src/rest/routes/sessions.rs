//! Session relay endpoints.
//!
//! These publish start/stop events onto the session bus; the dispatcher
//! picks them up and drives provisioning or teardown asynchronously.

use axum::{
    extract::{Query, State},
    Json,
};

use crate::rest::dto::{SessionAck, SessionStartQuery, SessionStopQuery};
use crate::rest::error::{ApiError, ErrorResponse};
use crate::rest::state::ApiState;

/// Request a sandbox server start for a participant
#[utoipa::path(
    post,
    path = "/api/v1/sessions/start",
    tag = "Sessions",
    params(
        ("projectId" = String, Query, description = "Project identifier"),
        ("userId" = String, Query, description = "Participant identifier")
    ),
    responses(
        (status = 200, description = "Start event queued", body = SessionAck),
        (status = 400, description = "Missing identifiers", body = ErrorResponse)
    )
)]
pub async fn start(
    State(state): State<ApiState>,
    Query(query): Query<SessionStartQuery>,
) -> Result<Json<SessionAck>, ApiError> {
    let (project_id, user_id) = match (query.project_id, query.user_id) {
        (Some(p), Some(u)) if !p.is_empty() && !u.is_empty() => (p, u),
        _ => {
            return Err(ApiError::BadRequest(
                "projectId and userId are required".to_string(),
            ))
        }
    };

    state.workflow.relay_start(&project_id, &user_id).await?;

    Ok(Json(SessionAck {
        event: "start".to_string(),
        user_id,
    }))
}

/// Request a sandbox server stop for a participant
#[utoipa::path(
    post,
    path = "/api/v1/sessions/stop",
    tag = "Sessions",
    params(
        ("userId" = String, Query, description = "Participant identifier")
    ),
    responses(
        (status = 200, description = "Stop event queued", body = SessionAck),
        (status = 400, description = "Missing identifier", body = ErrorResponse)
    )
)]
pub async fn stop(
    State(state): State<ApiState>,
    Query(query): Query<SessionStopQuery>,
) -> Result<Json<SessionAck>, ApiError> {
    let user_id = match query.user_id {
        Some(u) if !u.is_empty() => u,
        _ => return Err(ApiError::BadRequest("userId is required".to_string())),
    };

    state.workflow.relay_stop(&user_id).await?;

    Ok(Json(SessionAck {
        event: "stop".to_string(),
        user_id,
    }))
}
