#![doc = include_str!("../README.md")]

pub mod scenario;
#[doc(hidden)]
pub mod transaction;

pub(crate) mod controllers;
pub(crate) mod sampler;

pub use stampede_core::{
    AbortReason, Aggregation, CheckSummary, Comparison, ConfigError, Iteration, LoadProfile,
    Metric, Options, RunSummary, Stage, Threshold, ThresholdError, ThresholdResult,
    THRESHOLDS_FAILED_EXIT_CODE,
};
pub use stampede_macros::{scenario, transaction};
pub use scenario::{ConfigurableScenario, Scenario};
pub use transaction::check;

pub mod prelude {
    pub use crate::scenario::ConfigurableScenario;
    pub use crate::transaction::check;
    pub use stampede_core::{Iteration, Options, RunSummary, Stage, Threshold};
    pub use stampede_macros::{scenario, transaction};
}
