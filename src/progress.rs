//! User progress tracking.
//!
//! One record per (project, user), read-modify-written on every request.
//! A record that cannot be read is treated as first contact and replaced
//! by a fresh one; nothing is durable until the write lands, so a write
//! failure fails the request with no partial mutation.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::providers::storage::{ObjectStore, StoreError};
use crate::types::progress::ProgressRecord;

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("progress record '{key}' could not be loaded")]
    Load {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("progress record '{key}' is malformed")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("progress record '{key}' could not be written")]
    Write {
        key: String,
        #[source]
        source: StoreError,
    },
}

pub struct ProgressTracker {
    store: Arc<dyn ObjectStore>,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Record one request and return the step it lands on.
    ///
    /// The stored counter always points at the step the *next* request
    /// will get, so the current value is captured, the counter bumped,
    /// the request payload appended to the audit log, and the whole
    /// record persisted before the step is returned.
    pub async fn advance(
        &self,
        bucket: &str,
        project_id: &str,
        user_id: &str,
        request: Value,
    ) -> Result<u32, ProgressError> {
        let key = ProgressRecord::storage_key(project_id, user_id);
        let mut record = match self.load(bucket, &key).await {
            Ok(record) => record,
            Err(e) => {
                // first contact, or an unreadable record: start over
                debug!(%key, error = %e, "starting fresh progress record");
                ProgressRecord::new()
            }
        };

        let step = record.next_step;
        record.next_step += 1;
        record.requests.push(request);
        self.write(bucket, &key, &record).await?;
        Ok(step)
    }

    /// Move the user back one step (never below 1). The request log is
    /// left untouched. Unlike `advance`, the record must exist.
    pub async fn rollback(
        &self,
        bucket: &str,
        project_id: &str,
        user_id: &str,
    ) -> Result<u32, ProgressError> {
        let key = ProgressRecord::storage_key(project_id, user_id);
        let mut record = self.load(bucket, &key).await?;
        record.next_step = record.next_step.saturating_sub(1).max(1);
        self.write(bucket, &key, &record).await?;
        Ok(record.next_step)
    }

    async fn load(&self, bucket: &str, key: &str) -> Result<ProgressRecord, ProgressError> {
        let body = self
            .store
            .get(bucket, key)
            .await
            .map_err(|source| ProgressError::Load {
                key: key.to_string(),
                source,
            })?;
        serde_json::from_slice(&body).map_err(|source| ProgressError::Malformed {
            key: key.to_string(),
            source,
        })
    }

    async fn write(
        &self,
        bucket: &str,
        key: &str,
        record: &ProgressRecord,
    ) -> Result<(), ProgressError> {
        let body = serde_json::to_vec(record).map_err(|source| ProgressError::Malformed {
            key: key.to_string(),
            source,
        })?;
        self.store
            .put(bucket, key, &body)
            .await
            .map_err(|source| ProgressError::Write {
                key: key.to_string(),
                source,
            })
    }
}
