//! Integration tests for the participant-facing workflow API.
//!
//! These tests verify that:
//! - Project definitions round-trip through the upsert endpoint
//! - Participants advance step by step and their progress persists
//! - Content resolution honors sharded variants and missing documents
//! - The readiness gate holds participants until their session resolves
//!
//! Everything runs against the real router with a filesystem store in a
//! temp dir; no ports are bound.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use waypoint::config::Config;
use waypoint::providers::bus::RecordingBus;
use waypoint::providers::dns::{DnsProvider, SimDns};
use waypoint::providers::storage::{FsStore, ObjectStore};
use waypoint::registry::Registry;
use waypoint::rest::{build_router, ApiState};
use waypoint::workflow::WorkflowService;

// ─── Test Context ─────────────────────────────────────────────────────────────

struct WorkflowTestContext {
    temp_dir: TempDir,
    router: Router,
    store: Arc<FsStore>,
    dns: Arc<SimDns>,
    bucket: String,
}

impl WorkflowTestContext {
    /// Build the full service graph against a temp-dir store with an
    /// initialized, empty project registry.
    async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let mut config = Config::default();
        config.storage.root = temp_dir.path().to_string_lossy().to_string();
        config.session.root_domain = "sandbox.test".to_string();

        let store = Arc::new(FsStore::new(config.storage_root()));
        let registry = Arc::new(Registry::new(store.clone(), &config.storage.bucket));
        registry.init_empty().await.expect("Failed to init registry");

        let dns = Arc::new(SimDns::new());
        let workflow = Arc::new(WorkflowService::new(
            &config,
            registry.clone(),
            store.clone(),
            Arc::new(RecordingBus::new()),
            dns.clone(),
        ));

        let bucket = config.storage.bucket.clone();
        let router = build_router(ApiState::new(workflow, registry, config));

        Self {
            temp_dir,
            router,
            store,
            dns,
            bucket,
        }
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        Self::split(response).await
    }

    async fn put_project(&self, definition: &Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("PUT")
            .uri("/api/v1/projects")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(definition.to_string()))
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        Self::split(response).await
    }

    async fn next_page(&self, project: &str, user: &str) -> (StatusCode, Value) {
        self.get(&format!(
            "/api/v1/workflow/next?projectId={project}&userId={user}"
        ))
        .await
    }

    async fn split(response: axum::response::Response) -> (StatusCode, Value) {
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    async fn seed_document(&self, key: &str, content: &str) {
        self.store
            .put(&self.bucket, key, content.as_bytes())
            .await
            .expect("Failed to seed document");
    }

    /// Read a participant's stored progress record off the filesystem.
    fn progress_record(&self, project: &str, user: &str) -> Option<Value> {
        let path = self
            .temp_dir
            .path()
            .join(&self.bucket)
            .join(project)
            .join("Users")
            .join(user);
        let raw = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&raw).ok()
    }
}

fn maze_project() -> Value {
    json!({
        "id": "maze",
        "name": "Maze Study",
        "live": true,
        "task_template": "maze-server:4",
        "steps": {
            "1": "intro.html",
            "2": "middle.html",
            "final_step": "outro.html"
        },
        "events": {"start_server_step": null, "stop_server_step": null},
        "max_runtime": 30
    })
}

// ─── Project upserts ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_upsert_stores_project_and_reports_null_bindings() {
    let ctx = WorkflowTestContext::new().await;

    let (status, body) = ctx.put_project(&maze_project()).await;
    assert_eq!(status, StatusCode::OK, "upsert should succeed: {body}");
    assert_eq!(body["id"], "maze");
    assert_eq!(
        body["warnings"],
        json!([
            "start_server_step is set to null",
            "stop_server_step is set to null"
        ])
    );

    let (status, body) = ctx.get("/api/v1/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["project_count"], 1);
    assert_eq!(body["live_project_count"], 1);
}

#[tokio::test]
async fn test_upsert_rejects_incomplete_definitions() {
    let ctx = WorkflowTestContext::new().await;

    let mut incomplete = maze_project();
    incomplete.as_object_mut().unwrap().remove("task_template");

    let (status, body) = ctx.put_project(&incomplete).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "missing config value for 'task_template'");

    let (_, body) = ctx.get("/api/v1/status").await;
    assert_eq!(body["project_count"], 0, "rejected project must not persist");
}

#[tokio::test]
async fn test_upsert_replaces_project_by_id() {
    let ctx = WorkflowTestContext::new().await;

    ctx.put_project(&maze_project()).await;
    let mut renamed = maze_project();
    renamed["name"] = json!("Maze Study v2");
    let (status, _) = ctx.put_project(&renamed).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = ctx.get("/api/v1/status").await;
    assert_eq!(body["project_count"], 1, "same id must replace, not append");
}

// ─── Step advancement ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_participant_advances_through_documents_to_final_step() {
    let ctx = WorkflowTestContext::new().await;
    ctx.put_project(&maze_project()).await;
    ctx.seed_document("maze/intro.html", "<p>intro</p>").await;
    ctx.seed_document("maze/middle.html", "<p>middle</p>").await;
    ctx.seed_document("maze/outro.html", "<p>outro</p>").await;

    let expected = ["<p>intro</p>", "<p>middle</p>", "<p>outro</p>", "<p>outro</p>"];
    for (call, want) in expected.iter().enumerate() {
        let (status, body) = ctx.next_page("maze", "4f3a").await;
        assert_eq!(status, StatusCode::OK, "call {call} failed: {body}");
        assert_eq!(body["page"], *want, "wrong page on call {call}");
        assert_eq!(body["css"], Value::Null);
    }

    let record = ctx.progress_record("maze", "4f3a").expect("record exists");
    assert_eq!(record["next_step"], 5, "four advances from step 1");
    assert_eq!(record["requests"].as_array().unwrap().len(), 4);
    assert_eq!(record["requests"][0]["userId"], "4f3a");
}

#[tokio::test]
async fn test_unknown_project_is_rejected_without_a_record() {
    let ctx = WorkflowTestContext::new().await;
    ctx.put_project(&maze_project()).await;

    let (status, body) = ctx.next_page("ghost", "4f3a").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Project ID Not Found");
    assert!(
        ctx.progress_record("ghost", "4f3a").is_none(),
        "rejected request must not create a record"
    );
}

#[tokio::test]
async fn test_offline_project_is_rejected() {
    let ctx = WorkflowTestContext::new().await;
    let mut offline = maze_project();
    offline["live"] = json!(false);
    ctx.put_project(&offline).await;

    let (status, body) = ctx.next_page("maze", "4f3a").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Project ID Not Found");
}

#[tokio::test]
async fn test_missing_identifiers_are_rejected() {
    let ctx = WorkflowTestContext::new().await;
    ctx.put_project(&maze_project()).await;

    let (status, _) = ctx.get("/api/v1/workflow/next?projectId=maze").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = ctx
        .get("/api/v1/workflow/next?projectId=maze&userId=")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_content_serves_the_not_found_page() {
    let ctx = WorkflowTestContext::new().await;
    ctx.put_project(&maze_project()).await;
    // intro.html deliberately not seeded

    let (status, body) = ctx.next_page("maze", "4f3a").await;
    assert_eq!(status, StatusCode::OK, "missing content is not a failure");
    assert_eq!(body["page"], "Content Not Found");

    let record = ctx.progress_record("maze", "4f3a").expect("record exists");
    assert_eq!(record["next_step"], 2, "progress still advances");
}

// ─── Sharded content ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_sharded_documents_split_participants_by_trailing_digit() {
    let ctx = WorkflowTestContext::new().await;
    ctx.put_project(&maze_project()).await;
    ctx.seed_document("maze/intro-0.html", "variant zero").await;
    ctx.seed_document("maze/intro-1.html", "variant one").await;

    // With two variants the shard is the last hex digit mod 2.
    let (_, body) = ctx.next_page("maze", "aaa0").await;
    assert_eq!(body["page"], "variant zero");

    let (_, body) = ctx.next_page("maze", "aaa1").await;
    assert_eq!(body["page"], "variant one");
}

// ─── Readiness gate ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_gate_holds_then_opens_when_the_session_resolves() {
    let ctx = WorkflowTestContext::new().await;
    let mut gated = maze_project();
    gated["steps"] = json!({"1": "game", "final_step": "outro.html"});
    ctx.put_project(&gated).await;

    // No DNS record yet: the participant waits and is rolled back.
    let (status, body) = ctx.next_page("maze", "4f3a").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["page"], "wait");
    let record = ctx.progress_record("maze", "4f3a").unwrap();
    assert_eq!(record["next_step"], 1, "gate must rewind progress");

    // Session comes up.
    ctx.dns
        .create_record("4f3a.sandbox.test", "203.0.113.9", 60)
        .await
        .unwrap();

    let (_, body) = ctx.next_page("maze", "4f3a").await;
    assert_eq!(body["page"], "show_game_page");
    let record = ctx.progress_record("maze", "4f3a").unwrap();
    assert_eq!(record["next_step"], 2, "open gate advances normally");
}

// ─── Service endpoints ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_status_and_openapi_endpoints() {
    let ctx = WorkflowTestContext::new().await;

    let (status, body) = ctx.get("/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = ctx.get("/api/v1/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bucket"], "workflows");

    let (status, body) = ctx.get("/api/v1/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/v1/workflow/next"].is_object());
}
