//! REST API for the Waypoint orchestrator.
//!
//! Serves the participant-facing workflow endpoint, the session start/stop
//! relays, and project registry management. Designed to run as the main
//! server process with the dispatcher alongside.

use std::net::SocketAddr;

use anyhow::Result;
use axum::{
    http::header,
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod dto;
pub mod error;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::ApiState;

/// Build the API router with all routes
pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health endpoints
        .route("/api/v1/health", get(routes::health::health))
        .route("/api/v1/status", get(routes::health::status))
        // Workflow endpoints
        .route("/api/v1/workflow/next", get(routes::workflow::next))
        // Session relay endpoints
        .route("/api/v1/sessions/start", post(routes::sessions::start))
        .route("/api/v1/sessions/stop", post(routes::sessions::stop))
        // Project registry endpoints
        .route("/api/v1/projects", put(routes::projects::upsert))
        // OpenAPI document
        .route("/api/v1/openapi.json", get(openapi_json))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Result<impl IntoResponse, error::ApiError> {
    let spec = ApiDoc::json()?;
    Ok(([(header::CONTENT_TYPE, "application/json")], spec))
}

/// Start the REST API server
pub async fn serve(state: ApiState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!("REST API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
