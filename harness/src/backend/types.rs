//! Backend wire types and error definitions

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport-level failures: the backend never produced a status
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request failed: {0}")]
    Other(String),
}

impl TransportError {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Timeout => "timeout",
            TransportError::Connect(_) => "connect",
            TransportError::Other(_) => "other",
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

/// Backend operation, used to tag outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Register,
    Login,
    ListTasks,
    CreateTask,
    UpdateTask,
    CompleteTask,
    DeleteTask,
    Health,
    Metrics,
    Root,
    Frontend,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Register => "register",
            Operation::Login => "login",
            Operation::ListTasks => "list_tasks",
            Operation::CreateTask => "create_task",
            Operation::UpdateTask => "update_task",
            Operation::CompleteTask => "complete_task",
            Operation::DeleteTask => "delete_task",
            Operation::Health => "health",
            Operation::Metrics => "metrics",
            Operation::Root => "root",
            Operation::Frontend => "frontend",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity used for register and login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Body of a successful register or login
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Task as returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

/// Body of `POST /tasks`
#[derive(Debug, Clone, Serialize)]
pub struct NewTask {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Body of `PUT /tasks/{id}`
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

/// One request against the backend contract
#[derive(Debug, Clone)]
pub enum ApiCall {
    Register(Credentials),
    Login(Credentials),
    ListTasks { token: String, limit: Option<u32> },
    CreateTask { token: String, task: NewTask },
    UpdateTask { token: String, id: i64, update: TaskUpdate },
    CompleteTask { token: String, id: i64 },
    DeleteTask { token: String, id: i64 },
    Health,
    Metrics,
    Root,
    Frontend,
}

impl ApiCall {
    pub fn operation(&self) -> Operation {
        match self {
            ApiCall::Register(_) => Operation::Register,
            ApiCall::Login(_) => Operation::Login,
            ApiCall::ListTasks { .. } => Operation::ListTasks,
            ApiCall::CreateTask { .. } => Operation::CreateTask,
            ApiCall::UpdateTask { .. } => Operation::UpdateTask,
            ApiCall::CompleteTask { .. } => Operation::CompleteTask,
            ApiCall::DeleteTask { .. } => Operation::DeleteTask,
            ApiCall::Health => Operation::Health,
            ApiCall::Metrics => Operation::Metrics,
            ApiCall::Root => Operation::Root,
            ApiCall::Frontend => Operation::Frontend,
        }
    }

    /// Bearer token carried by authenticated calls
    pub fn token(&self) -> Option<&str> {
        match self {
            ApiCall::ListTasks { token, .. }
            | ApiCall::CreateTask { token, .. }
            | ApiCall::UpdateTask { token, .. }
            | ApiCall::CompleteTask { token, .. }
            | ApiCall::DeleteTask { token, .. } => Some(token),
            _ => None,
        }
    }
}

/// Raw backend response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}
