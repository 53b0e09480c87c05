//! REST API route handlers.

pub mod health;
pub mod projects;
pub mod sessions;
pub mod workflow;
