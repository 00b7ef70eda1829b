//! Concurrent metrics aggregation
//!
//! Actors record outcomes concurrently; each append takes only the lock of
//! the `DashMap` shard holding that series. Every recorded value is also
//! forwarded to the `metrics` facade for live export.

use dashmap::DashMap;
use indexmap::IndexMap;
use tracing::warn;

use crate::backend::Operation;
use crate::scenario::{OutcomeKind, OutcomeSink, RequestOutcome, SkipReason};

use super::series::{MetricKind, MetricSeries, MetricSummary, Rate, Trend};
use super::threshold::{ThresholdReport, ThresholdSpec};

pub const HTTP_REQ_DURATION: &str = "http_req_duration";
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
pub const HTTP_REQS: &str = "http_reqs";
pub const ITERATIONS: &str = "iterations";
pub const SERVER_ERRORS: &str = "server_errors";
pub const TRANSPORT_ERRORS: &str = "transport_errors";
pub const PROTOCOL_VIOLATIONS: &str = "protocol_violations";
pub const SKIPPED_STEPS: &str = "skipped_steps";
pub const TASKS_CREATED: &str = "tasks_created";
pub const TASKS_UPDATED: &str = "tasks_updated";
pub const TASKS_COMPLETED: &str = "tasks_completed";
pub const TASKS_DELETED: &str = "tasks_deleted";
pub const UPDATE_FALLBACKS: &str = "update_fallbacks";
pub const AUTH_ACQUISITIONS: &str = "auth_acquisitions";
pub const AUTH_FAILURES: &str = "auth_failures";

/// Built-in series in report order
pub const CATALOGUE: &[(&str, MetricKind)] = &[
    (HTTP_REQ_DURATION, MetricKind::Trend),
    (HTTP_REQ_FAILED, MetricKind::Rate),
    (HTTP_REQS, MetricKind::Counter),
    (ITERATIONS, MetricKind::Counter),
    (SERVER_ERRORS, MetricKind::Counter),
    (TRANSPORT_ERRORS, MetricKind::Counter),
    (PROTOCOL_VIOLATIONS, MetricKind::Counter),
    (SKIPPED_STEPS, MetricKind::Counter),
    (TASKS_CREATED, MetricKind::Counter),
    (TASKS_UPDATED, MetricKind::Counter),
    (TASKS_COMPLETED, MetricKind::Counter),
    (TASKS_DELETED, MetricKind::Counter),
    (UPDATE_FALLBACKS, MetricKind::Counter),
    (AUTH_ACQUISITIONS, MetricKind::Counter),
    (AUTH_FAILURES, MetricKind::Counter),
];

/// Name of the per-scenario latency sub-series
pub fn scenario_duration(scenario: &str) -> String {
    format!("{}{{scenario:{}}}", HTTP_REQ_DURATION, scenario)
}

/// Kind of a series the aggregator produces itself, `None` for custom names
pub fn builtin_kind(name: &str) -> Option<MetricKind> {
    if name.starts_with(&format!("{}{{scenario:", HTTP_REQ_DURATION)) {
        return Some(MetricKind::Trend);
    }
    CATALOGUE
        .iter()
        .find(|(builtin, _)| *builtin == name)
        .map(|&(_, kind)| kind)
}

#[derive(Debug, Default)]
pub struct MetricsAggregator {
    series: DashMap<String, MetricSeries>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one outcome into every series it contributes to
    pub fn record(&self, outcome: &RequestOutcome) {
        let scenario = outcome.tags.scenario;
        let operation = outcome.tags.operation.as_str();

        if let OutcomeKind::Skipped(reason) = outcome.kind {
            self.increment(SKIPPED_STEPS, 1);
            if reason == SkipReason::NoCredential {
                self.increment(AUTH_FAILURES, 1);
            }
            metrics::counter!("taskload_skipped_steps_total", "scenario" => scenario, "operation" => operation)
                .increment(1);
            return;
        }

        let latency_ms = outcome.latency.as_secs_f64() * 1000.0;
        let failed = !outcome.succeeded();

        self.append_trend(HTTP_REQ_DURATION, latency_ms);
        self.append_trend(&scenario_duration(scenario), latency_ms);
        self.append_rate(HTTP_REQ_FAILED, failed);
        self.increment(HTTP_REQS, 1);

        match &outcome.kind {
            OutcomeKind::Transport(_) => self.increment(TRANSPORT_ERRORS, 1),
            OutcomeKind::ProtocolViolation { .. } => self.increment(PROTOCOL_VIOLATIONS, 1),
            _ => {}
        }
        if outcome.is_server_error() {
            self.increment(SERVER_ERRORS, 1);
        }

        let operation_kind = outcome.tags.operation;
        if operation_kind == Operation::CreateTask && outcome.tags.via_fallback {
            self.increment(UPDATE_FALLBACKS, 1);
        }
        if !failed {
            let counter = match operation_kind {
                Operation::CreateTask => Some(TASKS_CREATED),
                Operation::UpdateTask => Some(TASKS_UPDATED),
                Operation::CompleteTask => Some(TASKS_COMPLETED),
                Operation::DeleteTask => Some(TASKS_DELETED),
                // Register also succeeds on a conflict, which yields no token
                Operation::Register if outcome.status() == Some(200) => Some(AUTH_ACQUISITIONS),
                Operation::Login => Some(AUTH_ACQUISITIONS),
                _ => None,
            };
            if let Some(name) = counter {
                self.increment(name, 1);
            }
        }

        let result = if failed { "failed" } else { "ok" };
        metrics::histogram!("taskload_http_req_duration_ms", "scenario" => scenario, "operation" => operation)
            .record(latency_ms);
        metrics::counter!("taskload_http_reqs_total", "scenario" => scenario, "operation" => operation, "result" => result)
            .increment(1);
    }

    pub fn record_all(&self, outcomes: &[RequestOutcome]) {
        for outcome in outcomes {
            self.record(outcome);
        }
    }

    /// Count one finished iteration
    pub fn record_iteration(&self, scenario: &'static str) {
        self.increment(ITERATIONS, 1);
        metrics::counter!("taskload_iterations_total", "scenario" => scenario).increment(1);
    }

    pub fn append_trend(&self, name: &str, value: f64) {
        let mut entry = self.entry(name, MetricKind::Trend);
        match entry.value_mut() {
            MetricSeries::Trend(trend) => trend.add(value),
            other => kind_mismatch(name, other.kind(), MetricKind::Trend),
        }
    }

    pub fn append_rate(&self, name: &str, hit: bool) {
        let mut entry = self.entry(name, MetricKind::Rate);
        match entry.value_mut() {
            MetricSeries::Rate(rate) => rate.add(hit),
            other => kind_mismatch(name, other.kind(), MetricKind::Rate),
        }
    }

    pub fn increment(&self, name: &str, n: u64) {
        let mut entry = self.entry(name, MetricKind::Counter);
        match entry.value_mut() {
            MetricSeries::Counter(counter) => counter.add(n),
            other => kind_mismatch(name, other.kind(), MetricKind::Counter),
        }
    }

    fn entry(&self, name: &str, kind: MetricKind) -> dashmap::mapref::one::RefMut<'_, String, MetricSeries> {
        // Lookup first so the hot path does not allocate the key
        if let Some(entry) = self.series.get_mut(name) {
            return entry;
        }
        self.series
            .entry(name.to_string())
            .or_insert_with(|| MetricSeries::empty(kind))
    }

    /// Owned copy of every series, built-ins first then the rest by name
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut rest: Vec<(String, MetricSeries)> = self
            .series
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        rest.sort_by(|a, b| a.0.cmp(&b.0));

        let mut series = IndexMap::with_capacity(rest.len());
        for &(builtin, _) in CATALOGUE {
            if let Some(pos) = rest.iter().position(|(n, _)| n == builtin) {
                let (name, value) = rest.remove(pos);
                series.insert(name, value);
            }
        }
        series.extend(rest);

        MetricsSnapshot { series }
    }

    /// Snapshot and evaluate in one step
    pub fn evaluate(&self, thresholds: &[ThresholdSpec]) -> ThresholdReport {
        self.snapshot().evaluate(thresholds)
    }
}

fn kind_mismatch(name: &str, actual: MetricKind, wanted: MetricKind) {
    warn!(
        metric = name,
        actual = actual.as_str(),
        wanted = wanted.as_str(),
        "metric kind mismatch, sample dropped"
    );
}

impl OutcomeSink for MetricsAggregator {
    fn record(&self, outcome: &RequestOutcome) {
        MetricsAggregator::record(self, outcome);
    }
}

/// Read-only final state of every series
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    series: IndexMap<String, MetricSeries>,
}

impl MetricsSnapshot {
    pub fn get(&self, name: &str) -> Option<&MetricSeries> {
        self.series.get(name)
    }

    pub fn trend(&self, name: &str) -> Option<&Trend> {
        match self.series.get(name)? {
            MetricSeries::Trend(trend) => Some(trend),
            _ => None,
        }
    }

    pub fn rate(&self, name: &str) -> Option<&Rate> {
        match self.series.get(name)? {
            MetricSeries::Rate(rate) => Some(rate),
            _ => None,
        }
    }

    /// Counter value, 0 when the counter never fired
    pub fn counter(&self, name: &str) -> u64 {
        match self.series.get(name) {
            Some(MetricSeries::Counter(counter)) => counter.value(),
            _ => 0,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn summaries(&self) -> IndexMap<String, MetricSummary> {
        self.series
            .iter()
            .map(|(name, series)| (name.clone(), series.summary()))
            .collect()
    }

    pub fn evaluate(&self, thresholds: &[ThresholdSpec]) -> ThresholdReport {
        let results = thresholds
            .iter()
            .map(|spec| spec.evaluate(self.series.get(&spec.metric)))
            .collect();
        ThresholdReport::from_results(results)
    }
}
