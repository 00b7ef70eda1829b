//! Ramp stages and the concurrency timeline they describe

use std::time::Duration;

use serde::Serialize;

use crate::config::ConfigurationError;

/// One window of the ramp plan: a linear move from `start_target` to
/// `end_target` actors over `duration`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub start_target: u32,
    pub end_target: u32,
}

impl Stage {
    pub fn ramp(duration: Duration, start_target: u32, end_target: u32) -> Self {
        Self {
            duration,
            start_target,
            end_target,
        }
    }

    pub fn plateau(duration: Duration, target: u32) -> Self {
        Self::ramp(duration, target, target)
    }

    pub fn phase(&self) -> StagePhase {
        match self.start_target.cmp(&self.end_target) {
            std::cmp::Ordering::Less => StagePhase::RampingUp,
            std::cmp::Ordering::Greater => StagePhase::RampingDown,
            std::cmp::Ordering::Equal => StagePhase::Steady,
        }
    }
}

/// Scheduler state at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StagePhase {
    RampingUp,
    RampingDown,
    Steady,
    /// Past the last stage
    Stopped,
}

/// Concatenated stage timeline
#[derive(Debug, Clone)]
pub struct StageScheduler {
    stages: Vec<Stage>,
    /// Offset at which each stage ends, relative to run start
    ends: Vec<Duration>,
    max_target: u32,
}

impl StageScheduler {
    /// Build a scheduler, rejecting empty, zero-length or discontinuous plans
    pub fn new(stages: Vec<Stage>) -> Result<Self, ConfigurationError> {
        if stages.is_empty() {
            return Err(ConfigurationError::EmptyStages);
        }

        let mut ends = Vec::with_capacity(stages.len());
        let mut offset = Duration::ZERO;
        for (index, stage) in stages.iter().enumerate() {
            if stage.duration.is_zero() {
                return Err(ConfigurationError::ZeroDuration { index });
            }
            if index > 0 {
                let previous_end = stages[index - 1].end_target;
                if stage.start_target != previous_end {
                    return Err(ConfigurationError::DiscontinuousStage {
                        index,
                        start: stage.start_target,
                        previous_end,
                    });
                }
            }
            offset = offset
                .checked_add(stage.duration)
                .ok_or(ConfigurationError::DurationOverflow { index })?;
            ends.push(offset);
        }

        let max_target = stages
            .iter()
            .map(|s| s.start_target.max(s.end_target))
            .max()
            .unwrap_or(0);

        Ok(Self {
            stages,
            ends,
            max_target,
        })
    }

    /// Build stages from targets: each `(duration, target)` ramps from the
    /// previous target, the first one from zero
    pub fn from_targets(targets: &[(Duration, u32)]) -> Result<Self, ConfigurationError> {
        let mut previous = 0;
        let stages = targets
            .iter()
            .map(|&(duration, target)| {
                let stage = Stage::ramp(duration, previous, target);
                previous = target;
                stage
            })
            .collect();
        Self::new(stages)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.ends.last().copied().unwrap_or(Duration::ZERO)
    }

    /// Highest target any stage declares
    pub fn max_target(&self) -> u32 {
        self.max_target
    }

    /// Index of the stage covering `elapsed`. A boundary instant belongs to
    /// the stage that ends there.
    pub fn stage_index_at(&self, elapsed: Duration) -> Option<usize> {
        let index = self.ends.partition_point(|end| *end < elapsed);
        (index < self.stages.len()).then_some(index)
    }

    /// Continuous target before rounding
    pub fn target_at(&self, elapsed: Duration) -> f64 {
        let Some(index) = self.stage_index_at(elapsed) else {
            return 0.0;
        };
        let stage = &self.stages[index];
        let stage_start = self.ends[index] - stage.duration;
        let into_stage = elapsed.saturating_sub(stage_start);
        let fraction = (into_stage.as_secs_f64() / stage.duration.as_secs_f64()).clamp(0.0, 1.0);

        let start = f64::from(stage.start_target);
        let end = f64::from(stage.end_target);
        start + (end - start) * fraction
    }

    /// Number of actors that should be live at `elapsed`
    pub fn concurrency_at(&self, elapsed: Duration) -> u32 {
        let target = self
            .target_at(elapsed)
            .round()
            .clamp(0.0, f64::from(self.max_target));
        target as u32
    }

    pub fn phase_at(&self, elapsed: Duration) -> StagePhase {
        match self.stage_index_at(elapsed) {
            Some(index) => self.stages[index].phase(),
            None => StagePhase::Stopped,
        }
    }
}
