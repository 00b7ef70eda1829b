//! Scenario selection and execution
//!
//! - `catalogue`: the request sequences an actor can run
//! - `weights`: cumulative weight table for the per-iteration draw
//! - `dispatcher`: runs one weighted iteration against the backend
//! - `outcome`: what each backend call produced
//! - `rng`: injectable per-actor randomness

mod catalogue;
mod dispatcher;
mod outcome;
mod rng;
mod weights;

pub use catalogue::{Scenario, UpdateFallback};
pub use dispatcher::ScenarioDispatcher;
pub use outcome::{
    ActorId, Expectation, OutcomeKind, OutcomeSink, OutcomeTags, RequestOutcome, SkipReason,
};
pub use rng::{RandomSource, ThinkTime};
pub use weights::{ScenarioWeight, WEIGHT_TOLERANCE, WeightTable};
