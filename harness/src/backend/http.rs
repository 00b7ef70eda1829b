//! HTTP implementation of the backend contract

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use tracing::debug;

use crate::config::{ConfigurationError, TargetProfile};

use super::service::TaskBackend;
use super::types::{ApiCall, ApiResponse, TransportError};

/// Backend reached over HTTP through a shared connection pool
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    target: TargetProfile,
}

impl HttpBackend {
    pub fn new(target: TargetProfile) -> Result<Self, ConfigurationError> {
        let client = Client::builder()
            .pool_max_idle_per_host(200)
            .timeout(target.timeout)
            .build()
            .map_err(|e| ConfigurationError::HttpClient(e.to_string()))?;
        Ok(Self { client, target })
    }

    pub fn target(&self) -> &TargetProfile {
        &self.target
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.target.backend_url, path)
    }

    fn task_url(&self, id: i64, suffix: &str) -> String {
        format!(
            "{}{}/{}{}",
            self.target.backend_url, self.target.endpoints.tasks, id, suffix
        )
    }

    fn build(&self, call: &ApiCall) -> RequestBuilder {
        let endpoints = &self.target.endpoints;
        let request = match call {
            ApiCall::Register(credentials) => self
                .client
                .post(self.url(&format!("{}/register", endpoints.auth)))
                .json(credentials),
            ApiCall::Login(credentials) => self
                .client
                .post(self.url(&format!("{}/login", endpoints.auth)))
                .json(credentials),
            ApiCall::ListTasks { limit, .. } => {
                let request = self.client.get(self.url(&endpoints.tasks));
                match limit {
                    Some(limit) => request.query(&[("limit", limit)]),
                    None => request,
                }
            }
            ApiCall::CreateTask { task, .. } => {
                self.client.post(self.url(&endpoints.tasks)).json(task)
            }
            ApiCall::UpdateTask { id, update, .. } => {
                self.client.put(self.task_url(*id, "")).json(update)
            }
            ApiCall::CompleteTask { id, .. } => self.client.patch(self.task_url(*id, "/complete")),
            ApiCall::DeleteTask { id, .. } => self.client.delete(self.task_url(*id, "")),
            ApiCall::Health => self.client.get(self.url(&endpoints.health)),
            ApiCall::Metrics => self.client.get(self.url(&endpoints.metrics)),
            ApiCall::Root => self.client.get(self.url(&endpoints.root)),
            ApiCall::Frontend => self.client.get(&self.target.frontend_url),
        };

        match call.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl TaskBackend for HttpBackend {
    async fn execute(&self, call: &ApiCall) -> Result<ApiResponse, TransportError> {
        let response = self.build(call).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(operation = %call.operation(), status, "backend call");
        Ok(ApiResponse { status, body })
    }
}
