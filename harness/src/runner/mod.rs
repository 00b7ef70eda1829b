//! Run orchestration
//!
//! The controller drives the scheduler tick loop, the actor pool spawns and
//! retires actor tasks, and the report is the structured result handed back
//! to the caller. Printing lives in `display` and only reads the report.

mod actor;
mod controller;
pub mod display;
mod report;

pub use actor::{ActorPool, ActorShared, ShutdownStats};
pub use controller::{RunConfig, RunController};
pub use display::print_summary;
pub use report::{ActorStats, RunReport};
