//! Data Transfer Objects for the REST API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// Note: ToSchema is derived on all DTOs for OpenAPI documentation generation

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Service status with registry info
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub project_count: usize,
    pub live_project_count: usize,
    pub bucket: String,
}

/// Query parameters for the workflow advance endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowQuery {
    pub project_id: Option<String>,
    pub user_id: Option<String>,
}

/// Query parameters for relaying a session start
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartQuery {
    pub project_id: Option<String>,
    pub user_id: Option<String>,
}

/// Query parameters for relaying a session stop
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStopQuery {
    pub user_id: Option<String>,
}

/// Page payload returned to the workflow client.
///
/// `css` is always null on the wire; clients treat it as a reserved slot
/// for styling they fetch alongside the page.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StepPageResponse {
    pub page: String,
    pub css: Option<String>,
}

impl StepPageResponse {
    pub fn new(page: String) -> Self {
        Self { page, css: None }
    }
}

/// Acknowledgement for a relayed session event
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionAck {
    pub event: String,
    pub user_id: String,
}

/// Response for a project upsert
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpsertProjectResponse {
    pub id: String,
    pub warnings: Vec<String>,
}
