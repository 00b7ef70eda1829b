//! Structured result of a run

use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use uuid::Uuid;

use crate::stats::{
    HTTP_REQ_FAILED, HTTP_REQS, ITERATIONS, MetricSummary, MetricsSnapshot, ThresholdReport,
    ThresholdResult,
};

use super::controller::RunConfig;

/// Actor population over the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActorStats {
    /// Highest live actor count
    pub peak: usize,
    pub spawned: u64,
    /// Aborted when the graceful stop expired
    pub interrupted: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub test_type: String,
    pub environment: String,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub planned_duration_secs: f64,
    pub actors: ActorStats,
    pub iterations: u64,
    pub http_reqs: u64,
    pub failure_rate: Option<f64>,
    pub metrics: IndexMap<String, MetricSummary>,
    pub thresholds: Vec<ThresholdResult>,
    pub passed: bool,
}

impl RunReport {
    pub fn new(
        run_id: Uuid,
        config: &RunConfig,
        started_at: DateTime<Utc>,
        duration: Duration,
        actors: ActorStats,
        snapshot: &MetricsSnapshot,
        thresholds: ThresholdReport,
    ) -> Self {
        Self {
            run_id,
            test_type: config.test_type.clone(),
            environment: config.environment.clone(),
            started_at,
            duration_secs: duration.as_secs_f64(),
            planned_duration_secs: config.scheduler.total_duration().as_secs_f64(),
            actors,
            iterations: snapshot.counter(ITERATIONS),
            http_reqs: snapshot.counter(HTTP_REQS),
            failure_rate: snapshot.rate(HTTP_REQ_FAILED).and_then(|r| r.rate()),
            metrics: snapshot.summaries(),
            passed: thresholds.passed,
            thresholds: thresholds.results,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.thresholds.iter().filter(|t| !t.passed)
    }

    /// Pretty JSON for files and CI parsing
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Process exit code for this result
    pub fn exit_code(&self) -> u8 {
        if self.passed { 0 } else { 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{Scenario, WeightTable};
    use crate::schedule::StageScheduler;
    use crate::stats::{MetricsAggregator, ThresholdSpec};

    fn report_with(thresholds: &[ThresholdSpec]) -> RunReport {
        let scheduler = StageScheduler::from_targets(&[(Duration::from_secs(10), 2)]).unwrap();
        let weights = WeightTable::new(vec![(Scenario::HealthCheck, 1.0)]).unwrap();
        let config = RunConfig::new("smoke", scheduler, weights);

        let aggregator = MetricsAggregator::new();
        aggregator.append_trend("http_req_duration", 120.0);
        aggregator.append_rate(HTTP_REQ_FAILED, false);
        aggregator.increment(HTTP_REQS, 1);
        aggregator.increment(ITERATIONS, 1);
        let snapshot = aggregator.snapshot();
        let evaluated = snapshot.evaluate(thresholds);

        RunReport::new(
            Uuid::new_v4(),
            &config,
            Utc::now(),
            Duration::from_secs(11),
            ActorStats {
                peak: 2,
                spawned: 2,
                interrupted: 0,
            },
            &snapshot,
            evaluated,
        )
    }

    #[test]
    fn test_report_carries_totals() {
        let report = report_with(&[]);
        assert!(report.passed);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.iterations, 1);
        assert_eq!(report.http_reqs, 1);
        assert_eq!(report.failure_rate, Some(0.0));
        assert_eq!(report.planned_duration_secs, 10.0);
    }

    #[test]
    fn test_failed_threshold_sets_exit_code() {
        let report = report_with(&[ThresholdSpec::parse("http_req_duration", "max<100").unwrap()]);
        assert!(!report.passed);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn test_json_shape() {
        let report = report_with(&[ThresholdSpec::parse(HTTP_REQ_FAILED, "rate<0.05").unwrap()]);
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["passed"], true);
        assert_eq!(json["test_type"], "smoke");
        assert_eq!(json["actors"]["peak"], 2);
        assert_eq!(json["metrics"]["http_req_duration"]["type"], "trend");
        assert_eq!(json["metrics"]["http_req_duration"]["avg"], 120.0);
        assert_eq!(json["thresholds"][0]["expression"], "rate<0.05");
        assert!(json["started_at"].is_string());
    }
}
