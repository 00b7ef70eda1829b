//! Harness configuration
//!
//! Configuration is loaded from environment variables. A run is described by
//! two named profiles: the target profile (`TEST_ENV`) says where the backend
//! lives, the test type (`TEST_TYPE`) says how hard to push it. Individual
//! variables override single fields of either profile.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::auth::CredentialConfig;
use crate::runner::RunConfig;
use crate::scenario::{Scenario, ThinkTime, UpdateFallback, WeightTable};
use crate::schedule::{StageScheduler, TestType};
use crate::stats::ThresholdSpec;

/// Fatal configuration problems, raised before any iteration runs
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("Stage list is empty")]
    EmptyStages,

    #[error("Stage {index} has a zero duration")]
    ZeroDuration { index: usize },

    #[error("Stage {index} pushes the plan past the longest supported duration")]
    DurationOverflow { index: usize },

    #[error("Stage {index} starts at {start} but the previous stage ends at {previous_end}")]
    DiscontinuousStage {
        index: usize,
        start: u32,
        previous_end: u32,
    },

    #[error("Negative concurrency target: {0}")]
    NegativeTarget(i64),

    #[error("Scenario weight table is empty")]
    EmptyWeights,

    #[error("Invalid weight {weight} for scenario {scenario}")]
    InvalidWeight { scenario: String, weight: f64 },

    #[error("Scenario weights sum to {sum}, expected 1")]
    WeightSum { sum: f64 },

    #[error("Unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("Unknown test type: {0}")]
    UnknownTestType(String),

    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("Invalid threshold for {metric}: {expression}")]
    InvalidThreshold { metric: String, expression: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Endpoint path table of the backend under test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub auth: String,
    pub tasks: String,
    pub categories: String,
    pub users: String,
    pub health: String,
    pub metrics: String,
    pub root: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth: "/auth".to_string(),
            tasks: "/tasks".to_string(),
            categories: "/categories".to_string(),
            users: "/users".to_string(),
            health: "/health".to_string(),
            metrics: "/metrics".to_string(),
            root: "/".to_string(),
        }
    }
}

/// Named deployment the harness points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetProfile {
    pub name: String,
    /// Backend base URL, without trailing slash
    pub backend_url: String,
    /// Frontend base URL
    pub frontend_url: String,
    pub endpoints: Endpoints,
    /// Per-request timeout
    pub timeout: Duration,
}

impl TargetProfile {
    /// Look up a built-in profile by name
    pub fn named(name: &str) -> Option<Self> {
        let (backend_url, frontend_url) = match name {
            "local" => ("http://localhost:8000", "http://localhost"),
            "docker" => ("http://backend:8000", "http://frontend:80"),
            _ => return None,
        };
        Some(Self {
            name: name.to_string(),
            backend_url: backend_url.to_string(),
            frontend_url: frontend_url.to_string(),
            endpoints: Endpoints::default(),
            timeout: Duration::from_secs(30),
        })
    }

    /// Profile for an arbitrary backend, used by tests and ad hoc runs
    pub fn custom(backend_url: impl Into<String>) -> Self {
        let backend_url = backend_url.into().trim_end_matches('/').to_string();
        Self {
            name: "custom".to_string(),
            frontend_url: backend_url.clone(),
            backend_url,
            endpoints: Endpoints::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Main harness configuration
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Selected target profile name
    pub environment: String,
    pub target: TargetProfile,
    pub test_type: TestType,

    /// Overrides of the test-type profile
    pub stages: Option<StageScheduler>,
    pub thresholds: Option<Vec<ThresholdSpec>>,
    pub scenario_mix: Option<Vec<(Scenario, f64)>>,
    pub think_time_min: Option<Duration>,
    pub think_time_max: Option<Duration>,
    pub graceful_stop: Option<Duration>,

    pub tick_interval: Duration,
    pub credentials: CredentialConfig,
    pub update_fallback: UpdateFallback,
    pub seed: Option<u64>,
    pub prewarm: bool,

    /// Where to write the JSON run report
    pub report_path: Option<PathBuf>,
    /// Prometheus exporter listen address
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            environment: "local".to_string(),
            target: TargetProfile::custom("http://localhost:8000"),
            test_type: TestType::Smoke,
            stages: None,
            thresholds: None,
            scenario_mix: None,
            think_time_min: None,
            think_time_max: None,
            graceful_stop: None,
            tick_interval: Duration::from_millis(500),
            credentials: CredentialConfig::default(),
            update_fallback: UpdateFallback::CreateInstead,
            seed: None,
            prewarm: true,
            report_path: None,
            metrics_addr: None,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| env::var(key).ok().filter(|v| !v.is_empty()))
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Target profile
        let environment = lookup("TEST_ENV").unwrap_or_else(|| "local".to_string());
        config.target = TargetProfile::named(&environment)
            .ok_or_else(|| ConfigurationError::UnknownEnvironment(environment.clone()))?;
        config.environment = environment;

        if let Some(url) = lookup("BACKEND_URL") {
            config.target.backend_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = lookup("FRONTEND_URL") {
            config.target.frontend_url = url;
        }
        if let Some(value) = lookup("REQUEST_TIMEOUT") {
            config.target.timeout = duration_value("REQUEST_TIMEOUT", &value)?;
        }

        // Test type and its overrides
        if let Some(value) = lookup("TEST_TYPE") {
            config.test_type = value.parse()?;
        }
        if let Some(value) = lookup("UPDATE_FALLBACK") {
            config.update_fallback = value.parse()?;
        }
        if let Some(value) = lookup("STAGES") {
            config.stages = Some(parse_stages(&value)?);
        }
        if let Some(value) = lookup("THRESHOLDS") {
            config.thresholds = Some(parse_thresholds(&value)?);
        }
        if let Some(value) = lookup("SCENARIO_MIX") {
            config.scenario_mix = Some(parse_scenario_mix(&value, config.update_fallback)?);
        }
        if let Some(value) = lookup("THINK_TIME_MIN") {
            config.think_time_min = Some(duration_value("THINK_TIME_MIN", &value)?);
        }
        if let Some(value) = lookup("THINK_TIME_MAX") {
            config.think_time_max = Some(duration_value("THINK_TIME_MAX", &value)?);
        }
        if let Some(value) = lookup("GRACEFUL_STOP") {
            config.graceful_stop = Some(duration_value("GRACEFUL_STOP", &value)?);
        }
        if let Some(value) = lookup("TICK_INTERVAL") {
            config.tick_interval = duration_value("TICK_INTERVAL", &value)?;
        }

        // Credentials
        if let Some(value) = lookup("TOKEN_TTL") {
            config.credentials.ttl = duration_value("TOKEN_TTL", &value)?;
        }
        if let Some(domain) = lookup("CREDENTIAL_DOMAIN") {
            config.credentials.email_domain = domain;
        }
        if let Some(password) = lookup("CREDENTIAL_PASSWORD") {
            config.credentials.password = password;
        }

        if let Some(value) = lookup("SEED") {
            config.seed = Some(value.parse().map_err(|_| invalid("SEED", &value))?);
        }
        if let Some(value) = lookup("PREWARM") {
            config.prewarm = parse_bool("PREWARM", &value)?;
        }
        config.report_path = lookup("REPORT_PATH").map(PathBuf::from);
        if let Some(value) = lookup("METRICS_ADDR") {
            config.metrics_addr = Some(value.parse().map_err(|_| invalid("METRICS_ADDR", &value))?);
        }

        Ok(config)
    }

    /// Resolve the test-type profile and overrides into a runnable config
    pub fn run_config(&self) -> Result<RunConfig, ConfigurationError> {
        let profile = self.test_type.profile(self.update_fallback)?;

        let scheduler = match &self.stages {
            Some(stages) => stages.clone(),
            None => StageScheduler::new(profile.stages)?,
        };
        let mix = self.scenario_mix.clone().unwrap_or(profile.mix);
        let think_time = ThinkTime::new(
            self.think_time_min.unwrap_or(profile.think_time.min),
            self.think_time_max.unwrap_or(profile.think_time.max),
        );

        let run = RunConfig {
            test_type: self.test_type.as_str().to_string(),
            environment: self.environment.clone(),
            scheduler,
            weights: WeightTable::new(mix)?,
            thresholds: self.thresholds.clone().unwrap_or(profile.thresholds),
            think_time,
            tick_interval: self.tick_interval,
            graceful_stop: self.graceful_stop.unwrap_or(profile.graceful_stop),
            credentials: self.credentials.clone(),
            seed: self.seed,
            prewarm: self.prewarm,
        };
        run.validate()?;
        Ok(run)
    }
}

fn invalid(key: &'static str, value: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        key,
        value: value.to_string(),
    }
}

fn duration_value(key: &'static str, value: &str) -> Result<Duration, ConfigurationError> {
    parse_duration(value).ok_or_else(|| invalid(key, value))
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigurationError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

/// Parse a duration such as `500ms`, `30s`, `2m`, `2h` or `1.5s`.
/// A bare number is milliseconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (number, scale) = if let Some(n) = s.strip_suffix("ms") {
        (n, 0.001)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1.0)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60.0)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3600.0)
    } else {
        (s, 0.001)
    };
    let value: f64 = number.trim().parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(value * scale).ok()
}

/// Parse `duration:target` pairs ramping from zero, e.g. `30s:10,1m:10,30s:0`
pub fn parse_stages(s: &str) -> Result<StageScheduler, ConfigurationError> {
    let mut targets = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (duration, target) = part.split_once(':').ok_or_else(|| invalid("STAGES", part))?;
        let duration = parse_duration(duration).ok_or_else(|| invalid("STAGES", part))?;
        let target: i64 = target.trim().parse().map_err(|_| invalid("STAGES", part))?;
        if target < 0 {
            return Err(ConfigurationError::NegativeTarget(target));
        }
        let target = u32::try_from(target).map_err(|_| invalid("STAGES", part))?;
        targets.push((duration, target));
    }
    StageScheduler::from_targets(&targets)
}

/// Parse `metric:expression` pairs separated by `;`
///
/// The metric name may itself contain `:` (sub-series such as
/// `http_req_duration{scenario:create}`), so the split is on the last one.
pub fn parse_thresholds(s: &str) -> Result<Vec<ThresholdSpec>, ConfigurationError> {
    s.split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|part| {
            let (metric, expression) =
                part.rsplit_once(':').ok_or_else(|| invalid("THRESHOLDS", part))?;
            ThresholdSpec::parse(metric.trim(), expression.trim())
        })
        .collect()
}

/// Parse `scenario:weight` pairs, e.g. `create:0.4,list:0.3,update:0.2,health:0.1`
pub fn parse_scenario_mix(
    s: &str,
    fallback: UpdateFallback,
) -> Result<Vec<(Scenario, f64)>, ConfigurationError> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|part| {
            let (name, weight) =
                part.split_once(':').ok_or_else(|| invalid("SCENARIO_MIX", part))?;
            let scenario = Scenario::from_name(name.trim(), fallback)?;
            let weight: f64 = weight
                .trim()
                .parse()
                .map_err(|_| invalid("SCENARIO_MIX", part))?;
            Ok((scenario, weight))
        })
        .collect()
}
