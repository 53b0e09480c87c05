//! Core data model: project definitions and per-user progress records.

pub mod progress;
pub mod project;

pub use progress::ProgressRecord;
pub use project::{
    EventBindings, ProjectDefinition, ProjectError, StepDescriptor, Transition, TransitionTable,
};
