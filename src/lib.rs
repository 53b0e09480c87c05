//! Waypoint - guided workflows with ephemeral per-user sandbox sessions
//!
//! Participants walk a numbered sequence of pages per project; designated
//! steps start and stop a private sandbox server whose lifecycle is
//! managed here: provisioning, address publication, deadline-based
//! shutdown, and teardown.

pub mod app;
pub mod config;
pub mod dispatch;
pub mod lifecycle;
pub mod logging;
pub mod progress;
pub mod providers;
pub mod provision;
pub mod registry;
pub mod rest;
pub mod steps;
pub mod teardown;
pub mod types;
pub mod workflow;
