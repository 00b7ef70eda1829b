//! Metric series, aggregation and thresholds

mod aggregator;
mod series;
mod threshold;

pub use aggregator::{
    AUTH_ACQUISITIONS, AUTH_FAILURES, CATALOGUE, HTTP_REQ_DURATION, HTTP_REQ_FAILED, HTTP_REQS,
    ITERATIONS, MetricsAggregator, MetricsSnapshot, PROTOCOL_VIOLATIONS, SERVER_ERRORS,
    SKIPPED_STEPS, TASKS_COMPLETED, TASKS_CREATED, TASKS_DELETED, TASKS_UPDATED,
    TRANSPORT_ERRORS, UPDATE_FALLBACKS, builtin_kind, scenario_duration,
};
pub use series::{Counter, MetricKind, MetricSeries, MetricSummary, Rate, Trend, TrendSummary};
pub use threshold::{Aggregate, Comparison, ThresholdReport, ThresholdResult, ThresholdSpec};
