//! Backend-under-test access
//!
//! This module provides:
//! - `TaskBackend` trait abstracting the task service's HTTP contract
//! - `HttpBackend` talking to a real deployment with reqwest
//! - Wire types for the auth and task endpoints

mod http;
mod service;
mod types;

pub use http::HttpBackend;
pub use service::{Exchange, TaskBackend, exchange};
pub use types::{
    ApiCall, ApiResponse, Credentials, NewTask, Operation, Task, TaskUpdate, TokenResponse,
    TransportError,
};
