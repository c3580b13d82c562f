//! Recurrent task engine
//!
//! Many independent periodic jobs run forever inside one process:
//! - [`Task`] wraps a [`Workload`] with a timeout and rolling statistics
//! - [`SchedulingPolicy`] decides when the next cycle runs
//! - [`TaskRegistry`] owns every task and rejects duplicate ids
//!
//! Failures of a single cycle are recorded and logged, never propagated to
//! the scheduling loop.

mod error;
mod exec;
mod policy;
mod registry;
mod stats;
#[allow(clippy::module_inception)]
mod task;

pub use error::TaskError;
pub use policy::{
    DEFAULT_NEXT_DELAY, FirstDelay, FuzzyPeriodic, FuzzyPeriodicConfig, SchedulingPolicy, SelfRegulating,
    SelfRegulatingConfig, fuzzy_sleep_duration,
};
pub use registry::TaskRegistry;
pub use stats::{DEFAULT_STATS_WINDOW, TaskErrorEntry, TaskStatistics};
pub use task::{CycleOutcome, DEFAULT_TASK_TIMEOUT, Task, TaskState, Workload};
