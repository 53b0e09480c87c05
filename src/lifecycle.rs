//! Step → lifecycle-event decision.
//!
//! A project binds at most one step number to "start the sandbox" and one
//! to "stop the sandbox". Entering a bound step publishes the matching
//! session event; every other step publishes nothing.

use serde::{Deserialize, Serialize};

use crate::types::project::EventBindings;

/// Session lifecycle action bound to a workflow step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    StartServer,
    StopServer,
}

/// Decide which lifecycle action, if any, the just-entered step triggers.
///
/// Pure decision only; publishing is the caller's concern. If both
/// bindings name the same step, start wins.
pub fn action_for_step(bindings: &EventBindings, step: u32) -> Option<LifecycleAction> {
    if bindings.start_server_step == Some(step) {
        Some(LifecycleAction::StartServer)
    } else if bindings.stop_server_step == Some(step) {
        Some(LifecycleAction::StopServer)
    } else {
        None
    }
}
