//! The request-path orchestrator.
//!
//! One call per client poll: advance the user's progress, resolve the
//! step they landed on, publish any lifecycle event bound to it, then
//! produce the step's content. Progress is persisted before the event
//! is published and before content is produced, so a later failure in
//! the same request never rewinds the counter; the readiness gate is
//! the one deliberate exception, rolling back so the client can poll
//! the same step again.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{info, instrument};

use crate::config::Config;
use crate::lifecycle::LifecycleAction;
use crate::progress::{ProgressError, ProgressTracker};
use crate::providers::bus::{BusError, EventBus, SessionEvent};
use crate::providers::dns::{session_host, DnsError, DnsProvider};
use crate::providers::storage::ObjectStore;
use crate::registry::{Registry, RegistryError};
use crate::steps::{StepError, StepResolver};
use crate::types::project::{ProjectError, StepDescriptor};

/// Gate body telling the client its session is reachable
pub const GATE_OPEN: &str = "show_game_page";

/// Gate body telling the client to poll again
pub const GATE_WAIT: &str = "wait";

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Unknown or not-live project. The client-facing message is fixed.
    #[error("Project ID Not Found")]
    ProjectNotFound,

    #[error(transparent)]
    Registry(RegistryError),

    #[error("project definition is unusable")]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Progress(#[from] ProgressError),

    #[error(transparent)]
    Step(#[from] StepError),

    #[error("lifecycle event publish failed")]
    Publish(#[from] BusError),

    #[error("session lookup failed")]
    Dns(#[from] DnsError),
}

pub struct WorkflowService {
    registry: Arc<Registry>,
    tracker: ProgressTracker,
    resolver: StepResolver,
    bus: Arc<dyn EventBus>,
    dns: Arc<dyn DnsProvider>,
    default_bucket: String,
    root_domain: String,
}

impl WorkflowService {
    pub fn new(
        config: &Config,
        registry: Arc<Registry>,
        store: Arc<dyn ObjectStore>,
        bus: Arc<dyn EventBus>,
        dns: Arc<dyn DnsProvider>,
    ) -> Self {
        Self {
            registry,
            tracker: ProgressTracker::new(store.clone()),
            resolver: StepResolver::new(store),
            bus,
            dns,
            default_bucket: config.storage.bucket.clone(),
            root_domain: config.session.root_domain.clone(),
        }
    }

    /// Serve one step request and return the page body.
    #[instrument(skip(self, request))]
    pub async fn next_step(
        &self,
        project_id: &str,
        user_id: &str,
        request: Value,
    ) -> Result<String, WorkflowError> {
        let project = self
            .registry
            .find_live(project_id)
            .await
            .map_err(WorkflowError::Registry)?
            .ok_or(WorkflowError::ProjectNotFound)?;
        let table = project.transitions()?;
        let bucket = project
            .bucket
            .clone()
            .unwrap_or_else(|| self.default_bucket.clone());

        let step = self
            .tracker
            .advance(&bucket, project_id, user_id, request)
            .await?;
        let transition = table.transition(step);

        if let Some(action) = transition.action {
            // progress is already durable; a publish failure fails the
            // request without rewinding the counter
            self.publish_action(action, project_id, user_id).await?;
            info!(step, ?action, "lifecycle event published");
        }

        match transition.descriptor {
            StepDescriptor::Gate => self.gate(&bucket, project_id, user_id).await,
            StepDescriptor::Document(descriptor) => Ok(self
                .resolver
                .fetch_document(&bucket, project_id, user_id, &descriptor)
                .await?),
        }
    }

    /// Forward a start event without touching progress. Used by the
    /// relay endpoint.
    pub async fn relay_start(&self, project_id: &str, user_id: &str) -> Result<(), WorkflowError> {
        Ok(self
            .bus
            .publish(SessionEvent::Start {
                project_id: project_id.to_string(),
                user_id: user_id.to_string(),
            })
            .await?)
    }

    /// Forward a stop event without touching progress.
    pub async fn relay_stop(&self, user_id: &str) -> Result<(), WorkflowError> {
        Ok(self
            .bus
            .publish(SessionEvent::Stop {
                user_id: user_id.to_string(),
            })
            .await?)
    }

    async fn publish_action(
        &self,
        action: LifecycleAction,
        project_id: &str,
        user_id: &str,
    ) -> Result<(), WorkflowError> {
        let event = match action {
            LifecycleAction::StartServer => SessionEvent::Start {
                project_id: project_id.to_string(),
                user_id: user_id.to_string(),
            },
            LifecycleAction::StopServer => SessionEvent::Stop {
                user_id: user_id.to_string(),
            },
        };
        Ok(self.bus.publish(event).await?)
    }

    /// The session is "up" exactly when its name resolves. While it
    /// does not, the step counter is rolled back so the client's next
    /// poll lands on the gate again.
    async fn gate(
        &self,
        bucket: &str,
        project_id: &str,
        user_id: &str,
    ) -> Result<String, WorkflowError> {
        // zone-canonical form, trailing dot included
        let name = format!("{}.", session_host(user_id, &self.root_domain));
        if self.dns.lookup(&name).await?.is_some() {
            return Ok(GATE_OPEN.to_string());
        }
        self.tracker.rollback(bucket, project_id, user_id).await?;
        Ok(GATE_WAIT.to_string())
    }
}
