//! Taskload Harness Library
//!
//! Staged load generation against a task-management HTTP backend. This
//! module exports the engine for the `taskload` binary, integration tests
//! and external tooling.

pub mod auth;
pub mod backend;
pub mod config;
pub mod runner;
pub mod scenario;
pub mod schedule;
pub mod stats;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types
pub use auth::CredentialCache;
pub use backend::{HttpBackend, TaskBackend};
pub use config::{ConfigurationError, HarnessConfig};
pub use runner::{RunConfig, RunController, RunReport};
pub use scenario::ScenarioDispatcher;
pub use schedule::{StageScheduler, TestType};
pub use stats::MetricsAggregator;
