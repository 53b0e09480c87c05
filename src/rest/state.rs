//! Shared state for the REST API.

use std::sync::Arc;

use crate::config::Config;
use crate::registry::Registry;
use crate::workflow::WorkflowService;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Workflow orchestration service
    pub workflow: Arc<WorkflowService>,
    /// Project registry backed by the object store
    pub registry: Arc<Registry>,
    /// Loaded configuration
    pub config: Arc<Config>,
}

impl ApiState {
    /// Create new API state
    pub fn new(workflow: Arc<WorkflowService>, registry: Arc<Registry>, config: Config) -> Self {
        Self {
            workflow,
            registry,
            config: Arc::new(config),
        }
    }
}
