//! Project definitions and the step transition table.
//!
//! A project's workflow is a map from step numbers to step descriptors,
//! with a designated fallback descriptor for steps past the end, plus
//! bindings that tie particular steps to sandbox start/stop events. The
//! raw registry document is tolerant (unknown projects may be partially
//! filled in); `transitions()` validates it into an explicit table before
//! any request is served against it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lifecycle::{self, LifecycleAction};

/// Step descriptor marking the session-access gate
pub const GATE_DESCRIPTOR: &str = "game";

/// Step-map key naming the fallback descriptor for out-of-range steps
pub const FINAL_STEP_KEY: &str = "final_step";

/// Session runtime in minutes assumed for projects that do not set one
pub const DEFAULT_MAX_RUNTIME: u64 = 60;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("project '{0}' defines no '{FINAL_STEP_KEY}' descriptor")]
    MissingFinalStep(String),

    #[error("project '{project}' has non-numeric step key '{key}'")]
    BadStepKey { project: String, key: String },

    #[error("project '{0}' defines no steps")]
    EmptySteps(String),
}

/// Which steps, if any, trigger sandbox start/stop events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBindings {
    #[serde(default)]
    pub start_server_step: Option<u32>,
    #[serde(default)]
    pub stop_server_step: Option<u32>,
}

/// One entry of the project registry.
///
/// Most fields default so that a hand-edited registry with gaps still
/// parses; the upsert path enforces required fields before anything is
/// written (see `registry::validate_document`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDefinition {
    /// Unique identifier, also the storage prefix for the project's content
    pub id: String,

    /// Human-readable project name
    #[serde(default)]
    pub name: String,

    /// Only live projects are served to clients
    #[serde(default)]
    pub live: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub researcher: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub team_members: Vec<String>,

    /// Compute task template the sandbox is launched from
    #[serde(default)]
    pub task_template: Option<String>,

    /// Step number (as string key) → step descriptor, plus the
    /// `final_step` fallback entry
    #[serde(default)]
    pub steps: BTreeMap<String, String>,

    #[serde(default)]
    pub events: EventBindings,

    /// Maximum session runtime in minutes; clamped to the global ceiling
    #[serde(default)]
    pub max_runtime: Option<u64>,

    /// Storage bucket override for this project's content and records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
}

impl ProjectDefinition {
    /// Validate the raw step map into an explicit transition table.
    pub fn transitions(&self) -> Result<TransitionTable, ProjectError> {
        TransitionTable::build(self)
    }

    /// Session runtime for this project, clamped to the global ceiling.
    /// Zero counts as unset and falls back to the default.
    pub fn effective_runtime(&self, global_max_minutes: u64) -> u64 {
        match self.max_runtime {
            None | Some(0) => DEFAULT_MAX_RUNTIME,
            Some(minutes) => minutes,
        }
        .min(global_max_minutes)
    }
}

/// What a resolved step asks the workflow to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepDescriptor {
    /// The session-access gate: the client polls here until its sandbox
    /// name resolves
    Gate,
    /// A static document served from the store
    Document(String),
}

impl StepDescriptor {
    fn parse(raw: &str) -> Self {
        if raw == GATE_DESCRIPTOR {
            Self::Gate
        } else {
            Self::Document(raw.to_string())
        }
    }
}

/// What entering a given step means for the request that landed on it
#[derive(Debug, Clone)]
pub struct Transition {
    pub descriptor: StepDescriptor,
    pub action: Option<LifecycleAction>,
}

/// Validated `(step number) → {descriptor, lifecycle action}` table for
/// one project.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    steps: BTreeMap<u32, StepDescriptor>,
    final_step: StepDescriptor,
    bindings: EventBindings,
}

impl TransitionTable {
    fn build(project: &ProjectDefinition) -> Result<Self, ProjectError> {
        if project.steps.is_empty() {
            return Err(ProjectError::EmptySteps(project.id.clone()));
        }

        let mut steps = BTreeMap::new();
        let mut final_step = None;

        for (key, raw) in &project.steps {
            if key == FINAL_STEP_KEY {
                final_step = Some(StepDescriptor::parse(raw));
                continue;
            }
            let number: u32 = key.parse().map_err(|_| ProjectError::BadStepKey {
                project: project.id.clone(),
                key: key.clone(),
            })?;
            steps.insert(number, StepDescriptor::parse(raw));
        }

        let final_step =
            final_step.ok_or_else(|| ProjectError::MissingFinalStep(project.id.clone()))?;

        Ok(Self {
            steps,
            final_step,
            bindings: project.events.clone(),
        })
    }

    /// Resolve one step. Steps outside the map fall back to the final-step
    /// descriptor; the lifecycle action comes from the event bindings.
    pub fn transition(&self, step: u32) -> Transition {
        let descriptor = self.steps.get(&step).unwrap_or(&self.final_step).clone();
        Transition {
            descriptor,
            action: lifecycle::action_for_step(&self.bindings, step),
        }
    }
}
