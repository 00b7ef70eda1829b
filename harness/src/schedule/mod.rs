//! Stage scheduling
//!
//! This module provides:
//! - `Stage` and `StageScheduler` for turning a ramp plan into a target
//!   concurrency at any elapsed time
//! - `TestType` named profiles (smoke / load / stress / soak / spike)

mod profiles;
mod stage;

pub use profiles::{TestProfile, TestType};
pub use stage::{Stage, StagePhase, StageScheduler};
