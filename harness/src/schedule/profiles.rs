//! Named test-type profiles
//!
//! | Type   | Peak actors | Planned duration |
//! |--------|-------------|------------------|
//! | smoke  | 1           | 10s              |
//! | load   | 100         | 9m               |
//! | stress | 400         | 16m              |
//! | soak   | 50          | 2h10m            |
//! | spike  | 500         | 2m20s            |

use std::str::FromStr;
use std::time::Duration;

use crate::config::ConfigurationError;
use crate::scenario::{Scenario, ThinkTime, UpdateFallback};
use crate::stats::ThresholdSpec;

use super::Stage;

/// Kind of run to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestType {
    /// Single actor sanity check of every endpoint
    Smoke,
    /// Sustained expected load
    Load,
    /// Beyond expected load, in two steps
    Stress,
    /// Moderate load held for a long time
    Soak,
    /// Sudden jump to a high actor count
    Spike,
}

/// Everything a test type fixes about a run
#[derive(Debug, Clone)]
pub struct TestProfile {
    pub stages: Vec<Stage>,
    pub thresholds: Vec<ThresholdSpec>,
    pub mix: Vec<(Scenario, f64)>,
    pub think_time: ThinkTime,
    pub graceful_stop: Duration,
}

const fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

const fn mins(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}

impl TestType {
    pub const ALL: [TestType; 5] = [
        TestType::Smoke,
        TestType::Load,
        TestType::Stress,
        TestType::Soak,
        TestType::Spike,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Smoke => "smoke",
            TestType::Load => "load",
            TestType::Stress => "stress",
            TestType::Soak => "soak",
            TestType::Spike => "spike",
        }
    }

    pub fn profile(&self, fallback: UpdateFallback) -> Result<TestProfile, ConfigurationError> {
        let update = Scenario::UpdateTask { fallback };

        let profile = match self {
            TestType::Smoke => TestProfile {
                stages: vec![Stage::plateau(secs(10), 1)],
                thresholds: vec![
                    ThresholdSpec::parse("http_req_duration", "avg<500")?,
                    ThresholdSpec::parse("http_req_duration", "p(95)<1000")?,
                    ThresholdSpec::parse("http_req_failed", "rate<0.05")?,
                ],
                mix: vec![(Scenario::Smoke, 1.0)],
                think_time: ThinkTime::new(secs(1), secs(3)),
                graceful_stop: secs(5),
            },
            TestType::Load => TestProfile {
                stages: vec![
                    Stage::ramp(mins(2), 0, 100),
                    Stage::plateau(mins(5), 100),
                    Stage::ramp(mins(2), 100, 0),
                ],
                thresholds: vec![
                    ThresholdSpec::parse("http_req_duration", "p(95)<1500")?,
                    ThresholdSpec::parse("http_req_failed", "rate<0.05")?,
                ],
                mix: vec![
                    (Scenario::CreateTask, 0.4),
                    (Scenario::ListTasks, 0.3),
                    (update, 0.2),
                    (Scenario::HealthCheck, 0.1),
                ],
                think_time: ThinkTime::new(secs(1), secs(3)),
                graceful_stop: secs(30),
            },
            TestType::Stress => TestProfile {
                stages: vec![
                    Stage::ramp(mins(2), 0, 200),
                    Stage::plateau(mins(5), 200),
                    Stage::ramp(mins(2), 200, 400),
                    Stage::plateau(mins(5), 400),
                    Stage::ramp(mins(2), 400, 0),
                ],
                thresholds: vec![
                    ThresholdSpec::parse("http_req_duration", "p(95)<1500")?,
                    ThresholdSpec::parse("http_req_duration", "p(99)<3000")?,
                    ThresholdSpec::parse("http_req_failed", "rate<0.08")?,
                ],
                mix: vec![
                    (Scenario::Public, 0.4),
                    (Scenario::Read, 0.3),
                    (Scenario::CreateTask, 0.1),
                    (update, 0.1),
                    (Scenario::CompleteTask, 0.1),
                ],
                think_time: ThinkTime::new(secs(1), secs(4)),
                graceful_stop: secs(30),
            },
            TestType::Soak => TestProfile {
                stages: vec![
                    Stage::ramp(mins(5), 0, 50),
                    Stage::plateau(mins(120), 50),
                    Stage::ramp(mins(5), 50, 0),
                ],
                thresholds: vec![
                    ThresholdSpec::parse("http_req_duration", "p(95)<1500")?,
                    ThresholdSpec::parse("http_req_failed", "rate<0.02")?,
                ],
                mix: vec![
                    (Scenario::CreateTask, 0.4),
                    (Scenario::ListTasks, 0.4),
                    (Scenario::HealthCheck, 0.2),
                ],
                think_time: ThinkTime::new(secs(2), secs(7)),
                graceful_stop: secs(30),
            },
            TestType::Spike => TestProfile {
                stages: vec![
                    Stage::ramp(mins(1), 0, 50),
                    Stage::ramp(secs(10), 50, 500),
                    Stage::plateau(mins(1), 500),
                    Stage::ramp(secs(10), 500, 0),
                ],
                thresholds: vec![
                    ThresholdSpec::parse("http_req_duration", "p(95)<2000")?,
                    ThresholdSpec::parse("http_req_failed", "rate<0.1")?,
                ],
                mix: vec![
                    (Scenario::ListTasks, 0.5),
                    (Scenario::HealthCheck, 0.3),
                    (Scenario::Public, 0.2),
                ],
                think_time: ThinkTime::new(Duration::ZERO, Duration::from_millis(500)),
                graceful_stop: secs(30),
            },
        };
        Ok(profile)
    }
}

impl FromStr for TestType {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TestType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigurationError::UnknownTestType(s.to_string()))
    }
}
