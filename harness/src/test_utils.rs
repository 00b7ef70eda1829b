//! Test Utilities Module
//!
//! Provides an in-memory backend and helpers for testing the harness.
//! This module is only compiled when running tests.

#![cfg(test)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::backend::{ApiCall, ApiResponse, Operation, Task, TaskBackend, TransportError};

// ============================================================================
// Mock Backend
// ============================================================================

/// Scripted reply that replaces the normal handling of an operation
#[derive(Debug, Clone)]
pub enum Override {
    /// Reply with this status and a small JSON error body
    Status(u16),
    /// Reply with this status and exactly this body
    Body(u16, String),
    /// Fail without a response
    Transport(TransportError),
}

#[derive(Default)]
struct MockState {
    users: HashMap<String, String>,
    tokens: HashSet<String>,
    tasks: Vec<Task>,
    next_task_id: i64,
    next_user_id: i64,
    calls: HashMap<Operation, usize>,
    overrides: HashMap<Operation, Override>,
    delays: HashMap<Operation, Duration>,
}

/// In-memory implementation of the backend contract.
///
/// Register answers 400 for a known e-mail, login issues a stable token per
/// identity, and task endpoints require a token this backend issued.
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register an identity
    pub fn with_user(self, email: &str, password: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.users.insert(email.to_string(), password.to_string());
        }
        self
    }

    /// Seed `n` open tasks
    pub fn with_tasks(self, n: usize) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for _ in 0..n {
                state.next_task_id += 1;
                let id = state.next_task_id;
                state.tasks.push(Task {
                    id,
                    title: format!("Seeded task {}", id),
                    description: None,
                    completed: false,
                });
            }
        }
        self
    }

    pub fn respond(&self, operation: Operation, reply: Override) {
        self.state.lock().unwrap().overrides.insert(operation, reply);
    }

    pub fn clear(&self, operation: Operation) {
        self.state.lock().unwrap().overrides.remove(&operation);
    }

    /// Delay every reply to `operation` by `latency`
    pub fn delay(&self, operation: Operation, latency: Duration) {
        self.state.lock().unwrap().delays.insert(operation, latency);
    }

    pub fn calls(&self, operation: Operation) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls.values().sum()
    }

    pub fn task_count(&self) -> usize {
        self.state.lock().unwrap().tasks.len()
    }

    pub fn completed_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .tasks
            .iter()
            .filter(|t| t.completed)
            .count()
    }

    fn handle(state: &mut MockState, call: &ApiCall) -> ApiResponse {
        if let Some(token) = call.token() {
            if !state.tokens.contains(token) {
                return error(401, "Could not validate credentials");
            }
        }

        match call {
            ApiCall::Register(credentials) => {
                if state.users.contains_key(&credentials.email) {
                    return error(400, "Email already registered");
                }
                state
                    .users
                    .insert(credentials.email.clone(), credentials.password.clone());
                state.next_user_id += 1;
                let token = format!("register-{}-{}", credentials.email, state.next_user_id);
                state.tokens.insert(token.clone());
                ok(json!({
                    "access_token": token,
                    "token_type": "bearer",
                    "email": credentials.email,
                    "id": state.next_user_id,
                }))
            }
            ApiCall::Login(credentials) => match state.users.get(&credentials.email) {
                Some(password) if *password == credentials.password => {
                    let token = format!("login-{}", credentials.email);
                    state.tokens.insert(token.clone());
                    ok(json!({ "access_token": token, "token_type": "bearer" }))
                }
                _ => error(401, "Incorrect email or password"),
            },
            ApiCall::ListTasks { limit, .. } => {
                let limit = limit.map(|l| l as usize).unwrap_or(usize::MAX);
                let tasks: Vec<&Task> = state.tasks.iter().take(limit).collect();
                ok(json!(tasks))
            }
            ApiCall::CreateTask { task, .. } => {
                state.next_task_id += 1;
                let created = Task {
                    id: state.next_task_id,
                    title: task.title.clone(),
                    description: task.description.clone(),
                    completed: false,
                };
                let body = json!(created);
                state.tasks.push(created);
                ok(body)
            }
            ApiCall::UpdateTask { id, update, .. } => {
                match state.tasks.iter_mut().find(|t| t.id == *id) {
                    Some(task) => {
                        if let Some(title) = &update.title {
                            task.title = title.clone();
                        }
                        if let Some(description) = &update.description {
                            task.description = Some(description.clone());
                        }
                        if let Some(completed) = update.completed {
                            task.completed = completed;
                        }
                        ok(json!(task))
                    }
                    None => error(404, "Task not found"),
                }
            }
            ApiCall::CompleteTask { id, .. } => {
                match state.tasks.iter_mut().find(|t| t.id == *id) {
                    Some(task) => {
                        task.completed = true;
                        ok(json!(task))
                    }
                    None => error(404, "Task not found"),
                }
            }
            ApiCall::DeleteTask { id, .. } => {
                let before = state.tasks.len();
                state.tasks.retain(|t| t.id != *id);
                if state.tasks.len() < before {
                    ok(json!({ "message": "Task deleted" }))
                } else {
                    error(404, "Task not found")
                }
            }
            ApiCall::Health => ok(json!({ "status": "healthy" })),
            ApiCall::Metrics => ApiResponse::new(
                200,
                "# TYPE http_requests_total counter\nhttp_requests_total 1\n",
            ),
            ApiCall::Root => ok(json!({ "message": "Todo API" })),
            ApiCall::Frontend => ApiResponse::new(200, "<!doctype html><html></html>"),
        }
    }
}

fn ok(body: serde_json::Value) -> ApiResponse {
    ApiResponse::new(200, body.to_string())
}

fn error(status: u16, detail: &str) -> ApiResponse {
    ApiResponse::new(status, json!({ "detail": detail }).to_string())
}

#[async_trait]
impl TaskBackend for MockBackend {
    async fn execute(&self, call: &ApiCall) -> Result<ApiResponse, TransportError> {
        let operation = call.operation();
        let delay = {
            let mut state = self.state.lock().unwrap();
            *state.calls.entry(operation).or_insert(0) += 1;
            state.delays.get(&operation).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        match state.overrides.get(&operation).cloned() {
            Some(Override::Status(status)) => Ok(error(status, "scripted failure")),
            Some(Override::Body(status, body)) => Ok(ApiResponse::new(status, body)),
            Some(Override::Transport(err)) => Err(err),
            None => Ok(Self::handle(&mut state, call)),
        }
    }
}

// ============================================================================
// Logging
// ============================================================================

/// Initialize test logging with detailed output
pub fn init_test_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskload=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Credentials, NewTask};

    fn credentials() -> Credentials {
        Credentials {
            email: "vu1@load.example.com".to_string(),
            password: "pw".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_twice_conflicts() {
        let backend = MockBackend::new();
        let first = backend.execute(&ApiCall::Register(credentials())).await.unwrap();
        let second = backend.execute(&ApiCall::Register(credentials())).await.unwrap();
        assert_eq!(first.status, 200);
        assert_eq!(second.status, 400);
        assert_eq!(backend.calls(Operation::Register), 2);
    }

    #[tokio::test]
    async fn test_task_calls_need_issued_token() {
        let backend = MockBackend::new();
        let call = ApiCall::CreateTask {
            token: "forged".to_string(),
            task: NewTask {
                title: "t".to_string(),
                description: None,
            },
        };
        assert_eq!(backend.execute(&call).await.unwrap().status, 401);
        assert_eq!(backend.task_count(), 0);
    }
}
