//! TaskBackend trait definition

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::types::{ApiCall, ApiResponse, TransportError};

/// Trait for the task service (real HTTP deployment or an in-memory double)
#[async_trait]
pub trait TaskBackend: Send + Sync {
    /// Perform one call. Any HTTP status is `Ok`; only transport failures
    /// are errors.
    async fn execute(&self, call: &ApiCall) -> Result<ApiResponse, TransportError>;
}

/// A call's result together with how long it took
#[derive(Debug)]
pub struct Exchange {
    pub result: Result<ApiResponse, TransportError>,
    pub latency: Duration,
}

/// Execute `call` and time it
pub async fn exchange(backend: &dyn TaskBackend, call: &ApiCall) -> Exchange {
    let start = Instant::now();
    let result = backend.execute(call).await;
    Exchange {
        result,
        latency: start.elapsed(),
    }
}
