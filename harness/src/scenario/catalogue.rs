//! Scenario catalogue

use std::str::FromStr;

use crate::config::ConfigurationError;

/// What the update scenario does when the actor has no task to update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateFallback {
    /// Create a task instead, so the iteration still writes
    #[default]
    CreateInstead,
    /// Record a skipped step and end the iteration
    Skip,
}

impl FromStr for UpdateFallback {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "create" | "create_instead" => Ok(UpdateFallback::CreateInstead),
            "skip" => Ok(UpdateFallback::Skip),
            _ => Err(ConfigurationError::InvalidValue {
                key: "UPDATE_FALLBACK",
                value: s.to_string(),
            }),
        }
    }
}

/// A fixed request sequence an actor can run as one iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// GET one of root, health, metrics
    Public,
    /// GET one of root, health, frontend
    Read,
    /// POST a task
    CreateTask,
    /// GET the task list
    ListTasks,
    /// List, then toggle a listed task
    UpdateTask { fallback: UpdateFallback },
    /// Create a task, then mark it complete
    CompleteTask,
    /// Create, complete, delete
    TaskLifecycle,
    /// GET health
    HealthCheck,
    /// Frontend, root, task create/list/update, health
    Smoke,
}

impl Scenario {
    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Public => "public",
            Scenario::Read => "read",
            Scenario::CreateTask => "create",
            Scenario::ListTasks => "list",
            Scenario::UpdateTask { .. } => "update",
            Scenario::CompleteTask => "complete",
            Scenario::TaskLifecycle => "lifecycle",
            Scenario::HealthCheck => "health",
            Scenario::Smoke => "smoke",
        }
    }

    pub fn requires_auth(&self) -> bool {
        !matches!(
            self,
            Scenario::Public | Scenario::Read | Scenario::HealthCheck
        )
    }

    pub fn from_name(name: &str, fallback: UpdateFallback) -> Result<Self, ConfigurationError> {
        let scenario = match name {
            "public" => Scenario::Public,
            "read" => Scenario::Read,
            "create" => Scenario::CreateTask,
            "list" => Scenario::ListTasks,
            "update" => Scenario::UpdateTask { fallback },
            "complete" => Scenario::CompleteTask,
            "lifecycle" => Scenario::TaskLifecycle,
            "health" => Scenario::HealthCheck,
            "smoke" => Scenario::Smoke,
            _ => return Err(ConfigurationError::UnknownScenario(name.to_string())),
        };
        Ok(scenario)
    }
}
