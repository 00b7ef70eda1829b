//! Per-actor token cache with expiry
//!
//! Acquisition tries to register the actor's synthetic identity first and
//! falls back to login when the backend reports that the identity already
//! exists. Only successful acquisitions are cached.
//!
//! Each actor id is driven by exactly one actor task at a time, so two
//! acquisitions for the same id never race. Different actors touch
//! different `DashMap` entries and never contend on a shared lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::backend::{ApiCall, Credentials, Operation, TaskBackend, TokenResponse, exchange};
use crate::scenario::{ActorId, Expectation, OutcomeTags, RequestOutcome};

/// Statuses the register endpoint uses for "identity already exists"
const CONFLICT_STATUSES: &[u16] = &[400, 409];

/// Register succeeds with a token or reports a conflict; both are normal
const REGISTER_EXPECTATION: Expectation = Expectation::Status(&[200, 400, 409]);

/// Scenario tag for acquisitions made outside any scenario
const SETUP_SCENARIO: &str = "setup";

/// Synthetic identity configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialConfig {
    /// Domain of the generated e-mail addresses
    pub email_domain: String,
    pub password: String,
    /// How long an acquired token is reused
    pub ttl: Duration,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            email_domain: "load.example.com".to_string(),
            password: "Testpassword123!".to_string(),
            ttl: Duration::from_secs(5 * 60),
        }
    }
}

/// Deterministic identity for an actor
pub fn synthetic_credentials(actor_id: ActorId, config: &CredentialConfig) -> Credentials {
    Credentials {
        email: format!("vu{}@{}", actor_id, config.email_domain),
        password: config.password.clone(),
    }
}

/// Cached token of one actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorSession {
    pub actor_id: ActorId,
    pub token: String,
    pub expires_at: Instant,
}

impl ActorSession {
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

enum Attempt {
    Token(String),
    Status(u16),
    Failed,
}

/// Token cache keyed by actor id
pub struct CredentialCache {
    backend: Arc<dyn TaskBackend>,
    sessions: DashMap<ActorId, ActorSession>,
    config: CredentialConfig,
    acquisitions: AtomicU64,
}

impl CredentialCache {
    pub fn new(backend: Arc<dyn TaskBackend>, config: CredentialConfig) -> Self {
        Self {
            backend,
            sessions: DashMap::new(),
            config,
            acquisitions: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CredentialConfig {
        &self.config
    }

    /// Token for `actor_id`, acquiring one if nothing valid is cached.
    /// `None` means "skip authenticated work this iteration".
    pub async fn get_token(&self, actor_id: ActorId) -> Option<String> {
        let mut outcomes = Vec::new();
        self.get_token_recorded(actor_id, SETUP_SCENARIO, &mut outcomes)
            .await
    }

    /// Like [`get_token`](Self::get_token), handing each register/login
    /// call to `outcomes` as it completes
    pub async fn get_token_recorded<E>(
        &self,
        actor_id: ActorId,
        scenario: &'static str,
        outcomes: &mut E,
    ) -> Option<String>
    where
        E: Extend<RequestOutcome> + Send,
    {
        if let Some(token) = self.cached(actor_id) {
            return Some(token);
        }

        let credentials = synthetic_credentials(actor_id, &self.config);
        let Some(token) = self
            .acquire(actor_id, scenario, credentials, outcomes)
            .await
        else {
            warn!(actor_id = %actor_id, scenario, "credential acquisition failed");
            return None;
        };

        self.sessions.insert(
            actor_id,
            ActorSession {
                actor_id,
                token: token.clone(),
                expires_at: Instant::now() + self.config.ttl,
            },
        );
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        debug!(actor_id = %actor_id, ttl_secs = self.config.ttl.as_secs(), "token cached");
        Some(token)
    }

    /// Warm one actor's entry ahead of the iteration loop
    pub async fn prewarm<E>(&self, actor_id: ActorId, outcomes: &mut E) -> bool
    where
        E: Extend<RequestOutcome> + Send,
    {
        self.get_token_recorded(actor_id, SETUP_SCENARIO, outcomes)
            .await
            .is_some()
    }

    /// Drop an actor's token, e.g. after the backend rejected it
    pub fn invalidate(&self, actor_id: ActorId) {
        if self.sessions.remove(&actor_id).is_some() {
            debug!(actor_id = %actor_id, "token invalidated");
        }
    }

    pub fn session(&self, actor_id: ActorId) -> Option<ActorSession> {
        self.sessions.get(&actor_id).map(|s| s.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Network acquisitions that produced a token
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }

    fn cached(&self, actor_id: ActorId) -> Option<String> {
        let session = self.sessions.get(&actor_id)?;
        session
            .is_valid_at(Instant::now())
            .then(|| session.token.clone())
    }

    async fn acquire<E>(
        &self,
        actor_id: ActorId,
        scenario: &'static str,
        credentials: Credentials,
        outcomes: &mut E,
    ) -> Option<String>
    where
        E: Extend<RequestOutcome> + Send,
    {
        let register = self
            .attempt(
                ApiCall::Register(credentials.clone()),
                REGISTER_EXPECTATION,
                OutcomeTags::new(scenario, actor_id, Operation::Register),
                outcomes,
            )
            .await;

        match register {
            Attempt::Token(token) => Some(token),
            Attempt::Status(status) if CONFLICT_STATUSES.contains(&status) => {
                let login = self
                    .attempt(
                        ApiCall::Login(credentials),
                        Expectation::OK,
                        OutcomeTags::new(scenario, actor_id, Operation::Login),
                        outcomes,
                    )
                    .await;
                match login {
                    Attempt::Token(token) => Some(token),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    async fn attempt<E>(
        &self,
        call: ApiCall,
        expectation: Expectation,
        tags: OutcomeTags,
        outcomes: &mut E,
    ) -> Attempt
    where
        E: Extend<RequestOutcome> + Send,
    {
        let exchange = exchange(self.backend.as_ref(), &call).await;
        let outcome = RequestOutcome::from_exchange(&exchange, expectation, tags);

        let response = match exchange.result {
            Ok(response) => response,
            Err(_) => {
                outcomes.extend([outcome]);
                return Attempt::Failed;
            }
        };
        if response.status != 200 {
            outcomes.extend([outcome]);
            return Attempt::Status(response.status);
        }

        match response.json::<TokenResponse>() {
            Ok(body) if !body.access_token.is_empty() => {
                outcomes.extend([outcome]);
                Attempt::Token(body.access_token)
            }
            Ok(_) => {
                outcomes.extend([outcome.into_protocol_violation("empty access_token")]);
                Attempt::Failed
            }
            Err(e) => {
                outcomes.extend([outcome.into_protocol_violation(format!("token body: {}", e))]);
                Attempt::Failed
            }
        }
    }
}
