use crate::errors::Result;
use crate::runner::{Invocation, ProcessOutput};
use crate::tune::SearchResultSet;
use async_trait::async_trait;
use std::path::Path;

/// Access to the persisted state of a finished hyperparameter search.
///
/// Keeps the selection logic independent of how the tuner stores trials.
pub trait ResultStore: Send + Sync {
    /// Rebuilds the result set of the experiment stored at `experiment_path`.
    fn restore(&self, experiment_path: &Path) -> Result<SearchResultSet>;
}

/// Launches external processes.
///
/// A non-zero exit status is not an error at this level: the runner reports
/// it in [`ProcessOutput`] and the caller decides whether it is fatal.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput>;
}
