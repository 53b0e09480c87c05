//! Project registry.
//!
//! All project definitions live in one JSON document, `projects.json`,
//! at the root of the configured bucket. Reads parse the whole document;
//! updates are validated, then replace-or-append the matching entry and
//! rewrite the document. The registry is created explicitly (`project
//! init`); a missing document is an error on every other path.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::providers::storage::{ObjectStore, StoreError};
use crate::types::project::ProjectDefinition;

/// Registry document key within the bucket
pub const REGISTRY_KEY: &str = "projects.json";

/// Definition fields recognized by the registry; anything else in an
/// update payload is dropped.
const KNOWN_FIELDS: [&str; 10] = [
    "id",
    "name",
    "live",
    "researcher",
    "team_members",
    "task_template",
    "steps",
    "events",
    "max_runtime",
    "bucket",
];

/// Fields an update payload must carry with a non-empty value.
const REQUIRED_FIELDS: [&str; 6] = ["id", "name", "task_template", "steps", "events", "max_runtime"];

/// Event binding keys that must be present (possibly null) in `events`.
const BINDING_KEYS: [&str; 2] = ["start_server_step", "stop_server_step"];

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("project registry could not be read")]
    Unreadable(#[source] StoreError),

    #[error("project registry is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("project registry write failed")]
    WriteFailed(#[source] StoreError),

    #[error("project registry already initialized")]
    AlreadyInitialized,

    #[error("{0}")]
    Invalid(String),
}

/// The registry document as stored: `{"projects": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryDocument {
    #[serde(default)]
    pub projects: Vec<ProjectDefinition>,
}

pub struct Registry {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl Registry {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub async fn load(&self) -> Result<RegistryDocument, RegistryError> {
        let body = self
            .store
            .get(&self.bucket, REGISTRY_KEY)
            .await
            .map_err(RegistryError::Unreadable)?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Look a project up for serving: only live projects are visible.
    pub async fn find_live(&self, id: &str) -> Result<Option<ProjectDefinition>, RegistryError> {
        Ok(self
            .load()
            .await?
            .projects
            .into_iter()
            .find(|p| p.id == id && p.live))
    }

    /// Look a project up for provisioning; liveness is not re-checked.
    pub async fn find(&self, id: &str) -> Result<Option<ProjectDefinition>, RegistryError> {
        Ok(self.load().await?.projects.into_iter().find(|p| p.id == id))
    }

    /// Seed an empty registry document. Refuses to overwrite one that
    /// already exists.
    pub async fn init_empty(&self) -> Result<(), RegistryError> {
        match self.store.get(&self.bucket, REGISTRY_KEY).await {
            Ok(_) => return Err(RegistryError::AlreadyInitialized),
            Err(StoreError::NotFound { .. }) => {}
            Err(e) => return Err(RegistryError::Unreadable(e)),
        }
        self.write(&RegistryDocument::default()).await
    }

    /// Validate an update payload and replace-or-append it in the
    /// registry. Returns the accepted definition plus any warnings.
    pub async fn upsert(
        &self,
        raw: &Value,
    ) -> Result<(ProjectDefinition, Vec<String>), RegistryError> {
        let (definition, warnings) = Self::validate(raw)?;

        let mut document = self.load().await?;
        document.projects.retain(|p| p.id != definition.id);
        document.projects.push(definition.clone());
        self.write(&document).await?;

        Ok((definition, warnings))
    }

    /// Check an update payload without touching storage: known fields
    /// only, required fields present, both event binding keys named
    /// (null bindings warn), and a buildable transition table.
    pub fn validate(raw: &Value) -> Result<(ProjectDefinition, Vec<String>), RegistryError> {
        let Some(object) = raw.as_object() else {
            return Err(RegistryError::Invalid(
                "project definition must be a JSON object".to_string(),
            ));
        };

        let mut filtered = serde_json::Map::new();
        for field in KNOWN_FIELDS {
            if let Some(value) = object.get(field) {
                filtered.insert(field.to_string(), value.clone());
            }
        }

        for field in REQUIRED_FIELDS {
            if !present(filtered.get(field)) {
                return Err(RegistryError::Invalid(format!(
                    "missing config value for '{field}'"
                )));
            }
        }

        let Some(events) = filtered.get("events").and_then(Value::as_object) else {
            return Err(RegistryError::Invalid(
                "'events' must be an object".to_string(),
            ));
        };
        let mut warnings = Vec::new();
        for binding in BINDING_KEYS {
            match events.get(binding) {
                None => {
                    return Err(RegistryError::Invalid(format!(
                        "'{binding}' missing in 'events' config"
                    )));
                }
                Some(Value::Null) => warnings.push(format!("{binding} is set to null")),
                Some(_) => {}
            }
        }

        let definition: ProjectDefinition = serde_json::from_value(Value::Object(filtered))
            .map_err(|e| RegistryError::Invalid(format!("invalid project definition: {e}")))?;

        definition
            .transitions()
            .map_err(|e| RegistryError::Invalid(e.to_string()))?;

        Ok((definition, warnings))
    }

    async fn write(&self, document: &RegistryDocument) -> Result<(), RegistryError> {
        let body = serde_json::to_vec_pretty(document)?;
        self.store
            .put(&self.bucket, REGISTRY_KEY, &body)
            .await
            .map_err(RegistryError::WriteFailed)
    }
}

/// Required-field presence: absent, null, false, zero, and empty strings,
/// objects, or arrays all count as missing.
fn present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
    }
}
