//! Common Test Utilities for Integration Tests
//!
//! Serves an in-memory task API over real HTTP on an ephemeral port.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use taskload::backend::Credentials;

type Reply = (StatusCode, Json<Value>);

#[derive(Default)]
struct ApiState {
    users: HashMap<String, String>,
    tokens: HashSet<String>,
    tasks: Vec<Value>,
    next_id: i64,
}

/// Shared handle to the running mock API
#[derive(Clone, Default)]
pub struct MockApi {
    state: Arc<Mutex<ApiState>>,
    requests: Arc<AtomicUsize>,
    registrations: Arc<AtomicUsize>,
    logins: Arc<AtomicUsize>,
}

impl MockApi {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn task_count(&self) -> usize {
        self.state.lock().unwrap().tasks.len()
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        self.requests.fetch_add(1, Ordering::SeqCst);
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| self.state.lock().unwrap().tokens.contains(token))
    }
}

fn reply(status: StatusCode, body: Value) -> Reply {
    (status, Json(body))
}

fn unauthorized() -> Reply {
    reply(
        StatusCode::UNAUTHORIZED,
        json!({ "detail": "Could not validate credentials" }),
    )
}

fn not_found() -> Reply {
    reply(StatusCode::NOT_FOUND, json!({ "detail": "Task not found" }))
}

async fn register(State(api): State<MockApi>, Json(credentials): Json<Credentials>) -> Reply {
    api.requests.fetch_add(1, Ordering::SeqCst);
    api.registrations.fetch_add(1, Ordering::SeqCst);
    let mut state = api.state.lock().unwrap();
    if state.users.contains_key(&credentials.email) {
        return reply(
            StatusCode::BAD_REQUEST,
            json!({ "detail": "Email already registered" }),
        );
    }
    state
        .users
        .insert(credentials.email.clone(), credentials.password.clone());
    let token = format!("token-{}", uuid::Uuid::new_v4());
    state.tokens.insert(token.clone());
    reply(
        StatusCode::OK,
        json!({
            "access_token": token,
            "token_type": "bearer",
            "email": credentials.email,
            "id": state.users.len(),
        }),
    )
}

async fn login(State(api): State<MockApi>, Json(credentials): Json<Credentials>) -> Reply {
    api.requests.fetch_add(1, Ordering::SeqCst);
    api.logins.fetch_add(1, Ordering::SeqCst);
    let mut state = api.state.lock().unwrap();
    match state.users.get(&credentials.email) {
        Some(password) if *password == credentials.password => {
            let token = format!("token-{}", uuid::Uuid::new_v4());
            state.tokens.insert(token.clone());
            reply(
                StatusCode::OK,
                json!({ "access_token": token, "token_type": "bearer" }),
            )
        }
        _ => reply(
            StatusCode::UNAUTHORIZED,
            json!({ "detail": "Incorrect email or password" }),
        ),
    }
}

#[derive(Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

async fn list_tasks(
    State(api): State<MockApi>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Reply {
    if !api.authorized(&headers) {
        return unauthorized();
    }
    let state = api.state.lock().unwrap();
    let limit = query.limit.unwrap_or(usize::MAX);
    let tasks: Vec<Value> = state.tasks.iter().take(limit).cloned().collect();
    reply(StatusCode::OK, Value::Array(tasks))
}

async fn create_task(State(api): State<MockApi>, headers: HeaderMap, Json(body): Json<Value>) -> Reply {
    if !api.authorized(&headers) {
        return unauthorized();
    }
    let mut state = api.state.lock().unwrap();
    state.next_id += 1;
    let task = json!({
        "id": state.next_id,
        "title": body["title"],
        "description": body["description"],
        "completed": false,
    });
    state.tasks.push(task.clone());
    reply(StatusCode::OK, task)
}

async fn update_task(
    State(api): State<MockApi>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Reply {
    if !api.authorized(&headers) {
        return unauthorized();
    }
    let mut state = api.state.lock().unwrap();
    let Some(task) = state.tasks.iter_mut().find(|t| t["id"] == id) else {
        return not_found();
    };
    for field in ["title", "description", "completed"] {
        if let Some(value) = body.get(field) {
            task[field] = value.clone();
        }
    }
    reply(StatusCode::OK, task.clone())
}

async fn complete_task(State(api): State<MockApi>, headers: HeaderMap, Path(id): Path<i64>) -> Reply {
    if !api.authorized(&headers) {
        return unauthorized();
    }
    let mut state = api.state.lock().unwrap();
    let Some(task) = state.tasks.iter_mut().find(|t| t["id"] == id) else {
        return not_found();
    };
    task["completed"] = json!(true);
    reply(StatusCode::OK, task.clone())
}

async fn delete_task(State(api): State<MockApi>, headers: HeaderMap, Path(id): Path<i64>) -> Reply {
    if !api.authorized(&headers) {
        return unauthorized();
    }
    let mut state = api.state.lock().unwrap();
    let before = state.tasks.len();
    state.tasks.retain(|t| t["id"] != id);
    if state.tasks.len() == before {
        return not_found();
    }
    reply(StatusCode::OK, json!({ "message": "Task deleted" }))
}

async fn health(State(api): State<MockApi>) -> Reply {
    api.requests.fetch_add(1, Ordering::SeqCst);
    reply(StatusCode::OK, json!({ "status": "healthy" }))
}

async fn metrics(State(api): State<MockApi>) -> String {
    api.requests.fetch_add(1, Ordering::SeqCst);
    "# TYPE http_requests_total counter\nhttp_requests_total 1\n".to_string()
}

async fn root(State(api): State<MockApi>) -> Reply {
    api.requests.fetch_add(1, Ordering::SeqCst);
    reply(StatusCode::OK, json!({ "message": "Todo API" }))
}

/// Create the mock API router
pub fn create_test_app() -> (Router, MockApi) {
    let api = MockApi::default();
    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/:id", put(update_task).delete(delete_task))
        .route("/tasks/:id/complete", patch(complete_task))
        .with_state(api.clone());
    (app, api)
}

/// Serve the mock API on an ephemeral port and return its base URL
pub async fn spawn_test_server() -> (String, MockApi) {
    let (app, api) = create_test_app();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), api)
}
