//! Per-user progress records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One user's position in one project's workflow, persisted under
/// `{project_id}/Users/{user_id}` in the project's bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// When the record was first created
    pub created: DateTime<Utc>,

    /// The step the next request will land on. Starts at 1; advanced
    /// after each served request.
    pub next_step: u32,

    /// Append-only log of served requests, for researcher audit
    #[serde(default)]
    pub requests: Vec<serde_json::Value>,
}

impl ProgressRecord {
    pub fn new() -> Self {
        Self {
            created: Utc::now(),
            next_step: 1,
            requests: Vec::new(),
        }
    }

    /// Storage key for one user's record within one project.
    pub fn storage_key(project_id: &str, user_id: &str) -> String {
        format!("{project_id}/Users/{user_id}")
    }
}

impl Default for ProgressRecord {
    fn default() -> Self {
        Self::new()
    }
}
