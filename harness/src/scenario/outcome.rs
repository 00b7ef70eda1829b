//! Per-request outcomes produced by scenarios

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::backend::{Exchange, Operation, TransportError};

/// Logical actor identity, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ActorId(pub u64);

impl ActorId {
    pub const FIRST: ActorId = ActorId(1);
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which statuses count as success for a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// Public endpoints: anything but a 5xx
    NotServerError,
    /// Scenario-specific calls: one of the listed codes
    Status(&'static [u16]),
}

impl Expectation {
    pub const OK: Expectation = Expectation::Status(&[200]);

    pub fn accepts(&self, status: u16) -> bool {
        match self {
            Expectation::NotServerError => status < 500,
            Expectation::Status(codes) => codes.contains(&status),
        }
    }
}

/// Why a step was not sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Register and login both failed for this actor
    NoCredential,
    /// An earlier step this one depends on failed
    MissingPrerequisite,
    /// Update found nothing to update and the fallback policy is `Skip`
    NoExistingTask,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeKind {
    Response { status: u16 },
    /// A structured body was expected but could not be parsed
    ProtocolViolation { status: u16, detail: String },
    Transport(TransportError),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeTags {
    pub scenario: &'static str,
    pub actor_id: ActorId,
    pub operation: Operation,
    /// Sent by the update scenario's fallback path
    pub via_fallback: bool,
}

impl OutcomeTags {
    pub fn new(scenario: &'static str, actor_id: ActorId, operation: Operation) -> Self {
        Self {
            scenario,
            actor_id,
            operation,
            via_fallback: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    pub kind: OutcomeKind,
    pub latency: Duration,
    pub expectation: Expectation,
    pub tags: OutcomeTags,
}

impl RequestOutcome {
    pub fn from_exchange(exchange: &Exchange, expectation: Expectation, tags: OutcomeTags) -> Self {
        let kind = match &exchange.result {
            Ok(response) => OutcomeKind::Response {
                status: response.status,
            },
            Err(err) => OutcomeKind::Transport(err.clone()),
        };
        Self {
            kind,
            latency: exchange.latency,
            expectation,
            tags,
        }
    }

    pub fn skipped(reason: SkipReason, tags: OutcomeTags) -> Self {
        Self {
            kind: OutcomeKind::Skipped(reason),
            latency: Duration::ZERO,
            expectation: Expectation::OK,
            tags,
        }
    }

    /// Re-tag a response whose body did not have the expected structure
    pub fn into_protocol_violation(self, detail: impl Into<String>) -> Self {
        let kind = match self.kind {
            OutcomeKind::Response { status } => OutcomeKind::ProtocolViolation {
                status,
                detail: detail.into(),
            },
            other => other,
        };
        Self { kind, ..self }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.kind, OutcomeKind::Skipped(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self.kind {
            OutcomeKind::Response { status } | OutcomeKind::ProtocolViolation { status, .. } => {
                Some(status)
            }
            _ => None,
        }
    }

    /// Success predicate; skipped steps count as neither
    pub fn succeeded(&self) -> bool {
        match self.kind {
            OutcomeKind::Response { status } => self.expectation.accepts(status),
            _ => false,
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| s >= 500)
    }
}

/// Receives each outcome as soon as its call completes
pub trait OutcomeSink: Send + Sync {
    fn record(&self, outcome: &RequestOutcome);
}
