pub mod archive;
pub mod batch;
pub mod command;
pub mod config;
pub mod errors;
pub mod logging;
pub mod predict;
pub mod runner;
pub mod traits;
pub mod train;
pub mod tune;

pub mod mocks;

mod progress_tracker;

pub use batch::{BatchInferenceRunner, BatchSummary};
pub use command::{InferCommand, InferParams, ParamValue, RunConfig, RunOverrides};
pub use config::{Config, ProjectLayout, RunMode};
pub use errors::{DriverError, Result};
pub use predict::{PredictionPipeline, PredictionReport};
pub use runner::{Invocation, Launcher, OutputMode, ProcessOutput, SystemProcessRunner};
pub use train::TrainingDriver;
pub use traits::*;
pub use tune::{RayTuneStore, SearchResultSet, TrialResult, TuneResultSelector};
