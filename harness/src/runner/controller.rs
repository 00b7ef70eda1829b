//! Run lifecycle: setup, iteration loop, teardown

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{CredentialCache, CredentialConfig};
use crate::backend::TaskBackend;
use crate::config::ConfigurationError;
use crate::scenario::{ActorId, ScenarioDispatcher, ThinkTime, WeightTable};
use crate::schedule::{StagePhase, StageScheduler};
use crate::stats::{AUTH_FAILURES, MetricsAggregator, ThresholdSpec, builtin_kind};

use super::actor::{ActorPool, ActorShared};
use super::report::{ActorStats, RunReport};

/// Everything a run needs besides the backend
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub test_type: String,
    pub environment: String,
    pub scheduler: StageScheduler,
    pub weights: WeightTable,
    pub thresholds: Vec<ThresholdSpec>,
    pub think_time: ThinkTime,
    /// How often the scheduler is consulted
    pub tick_interval: Duration,
    /// Upper bound on the teardown drain
    pub graceful_stop: Duration,
    pub credentials: CredentialConfig,
    /// Fixed seed for reproducible runs, OS entropy otherwise
    pub seed: Option<u64>,
    /// Acquire the first actor's token before the loop starts
    pub prewarm: bool,
}

impl RunConfig {
    pub fn new(test_type: impl Into<String>, scheduler: StageScheduler, weights: WeightTable) -> Self {
        Self {
            test_type: test_type.into(),
            environment: "custom".to_string(),
            scheduler,
            weights,
            thresholds: Vec::new(),
            think_time: ThinkTime::new(Duration::from_secs(1), Duration::from_secs(3)),
            tick_interval: Duration::from_millis(500),
            graceful_stop: Duration::from_secs(30),
            credentials: CredentialConfig::default(),
            seed: None,
            prewarm: true,
        }
    }

    /// Checks not already enforced by the scheduler and weight table
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.tick_interval.is_zero() {
            return Err(ConfigurationError::InvalidValue {
                key: "TICK_INTERVAL",
                value: "0".to_string(),
            });
        }
        if self.think_time.min > self.think_time.max {
            return Err(ConfigurationError::InvalidValue {
                key: "THINK_TIME_MAX",
                value: format!("{:?}", self.think_time.max),
            });
        }
        if self.credentials.ttl.is_zero() {
            return Err(ConfigurationError::InvalidValue {
                key: "TOKEN_TTL",
                value: "0".to_string(),
            });
        }
        // Both are added to clock readings while the run is live
        fits_clock("TICK_INTERVAL", self.tick_interval)?;
        fits_clock("TOKEN_TTL", self.credentials.ttl)?;

        // A rule that cannot apply to a built-in series would only fail
        // once the whole run is over
        for spec in &self.thresholds {
            if builtin_kind(&spec.metric).is_some_and(|kind| !spec.applies_to(kind)) {
                return Err(ConfigurationError::InvalidThreshold {
                    metric: spec.metric.clone(),
                    expression: spec.expression(),
                });
            }
        }
        Ok(())
    }

    /// Whether any scenario that can be drawn needs a token
    fn needs_credentials(&self) -> bool {
        let mut lower = 0.0;
        self.weights.entries().iter().any(|entry| {
            let drawable = entry.upper_bound > lower;
            lower = entry.upper_bound;
            drawable && entry.scenario.requires_auth()
        })
    }
}

fn fits_clock(key: &'static str, duration: Duration) -> Result<(), ConfigurationError> {
    match Instant::now().checked_add(duration) {
        Some(_) => Ok(()),
        None => Err(ConfigurationError::InvalidValue {
            key,
            value: format!("{:?}", duration),
        }),
    }
}

pub struct RunController {
    config: RunConfig,
    backend: Arc<dyn TaskBackend>,
}

impl RunController {
    pub fn new(config: RunConfig, backend: Arc<dyn TaskBackend>) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run every stage, drain, then evaluate thresholds once.
    ///
    /// Only configuration problems are errors; everything that goes wrong
    /// against the backend ends up in the report's metrics.
    pub async fn run(&self) -> Result<RunReport, ConfigurationError> {
        self.config.validate()?;
        let config = &self.config;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        let planned = config.scheduler.total_duration();

        info!(
            %run_id,
            test_type = %config.test_type,
            environment = %config.environment,
            planned_secs = planned.as_secs_f64(),
            max_actors = config.scheduler.max_target(),
            "run starting"
        );

        let aggregator = Arc::new(MetricsAggregator::new());
        let credentials = Arc::new(CredentialCache::new(
            self.backend.clone(),
            config.credentials.clone(),
        ));

        // Setup
        if config.prewarm && config.needs_credentials() {
            let mut outcomes = Vec::new();
            if !credentials.prewarm(ActorId::FIRST, &mut outcomes).await {
                warn!("credential pre-warm failed, actors will retry on demand");
                aggregator.increment(AUTH_FAILURES, 1);
            }
            aggregator.record_all(&outcomes);
        }

        let shared = ActorShared {
            dispatcher: ScenarioDispatcher::new(
                config.weights.clone(),
                self.backend.clone(),
                credentials.clone(),
            ),
            aggregator: aggregator.clone(),
            think_time: config.think_time,
        };
        let mut pool = ActorPool::new(shared, config.seed, config.scheduler.max_target());

        // Iteration loop
        let mut ticker = tokio::time::interval(config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let loop_start = Instant::now();
        let mut phase = StagePhase::Stopped;

        loop {
            ticker.tick().await;
            let elapsed = loop_start.elapsed();
            if elapsed >= planned {
                break;
            }

            let target = config.scheduler.concurrency_at(elapsed);
            pool.scale_to(target);

            let current = config.scheduler.phase_at(elapsed);
            if current != phase {
                info!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    stage = config.scheduler.stage_index_at(elapsed),
                    phase = ?current,
                    target,
                    "stage phase changed"
                );
                phase = current;
            }
            debug!(
                elapsed_ms = elapsed.as_millis() as u64,
                target,
                live = pool.live_count(),
                retiring = pool.retiring_count(),
                "tick"
            );
        }

        // Teardown
        let peak = pool.peak();
        let spawned = pool.spawned();
        info!(grace_secs = config.graceful_stop.as_secs_f64(), "draining actors");
        let shutdown = pool.shutdown(config.graceful_stop).await;

        let snapshot = aggregator.snapshot();
        let thresholds = snapshot.evaluate(&config.thresholds);
        let actors = ActorStats {
            peak,
            spawned,
            interrupted: shutdown.interrupted,
        };
        let report = RunReport::new(
            run_id,
            config,
            started_at,
            start.elapsed(),
            actors,
            &snapshot,
            thresholds,
        );

        info!(
            %run_id,
            passed = report.passed,
            iterations = report.iterations,
            http_reqs = report.http_reqs,
            interrupted = shutdown.interrupted,
            "run finished"
        );
        Ok(report)
    }
}
