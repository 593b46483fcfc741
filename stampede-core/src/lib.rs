//! Virtual-user load generation: a scenario describes what one user does,
//! the scheduler holds a fleet of them to a configured shape, and every
//! request feeds a shared metric stream that thresholds are judged against.

pub mod check;
pub mod config;
pub mod controller;
pub mod error;
pub mod executor;
mod gate;
pub mod recorder;
pub mod report;
pub mod scenario;
mod schedule;
pub mod scheduler;
pub mod shop;
pub mod thresholds;
mod vu;

pub use check::{Check, CheckKind, CheckOutcome};
pub use config::{ConfigError, Stage, WorkloadConfig};
pub use controller::{run, run_with_client};
pub use error::{Error, Result};
pub use executor::{Executed, Executor, RequestOutcome, ScenarioEnv};
pub use report::RunReport;
pub use scenario::{Scenario, SetupError, iteration_rng, iteration_seed, weighted_coin};
pub use scheduler::{SchedulerState, VuScheduler};
pub use thresholds::{ThresholdResult, ThresholdSet};
pub use vu::VuState;
