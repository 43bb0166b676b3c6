use crate::errors::{DriverError, Result};
use crate::runner::{Invocation, ProcessOutput};
use crate::traits::{ProcessRunner, ResultStore};
use crate::tune::SearchResultSet;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;

type Behaviour = Box<dyn Fn(&Invocation) -> Result<ProcessOutput> + Send + Sync>;

/// Process runner for tests: records every invocation, spawns nothing.
pub struct MockProcessRunner {
    behaviour: Behaviour,
    calls: Mutex<Vec<Invocation>>,
}

impl MockProcessRunner {
    pub fn new(behaviour: impl Fn(&Invocation) -> Result<ProcessOutput> + Send + Sync + 'static) -> Self {
        Self {
            behaviour: Box::new(behaviour),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every invocation exits with status 0.
    pub fn succeeding() -> Self {
        Self::new(|_| Ok(exit_with(0)))
    }

    /// Exits with status 1 and a stderr message when `predicate` matches.
    pub fn failing_when(predicate: impl Fn(&Invocation) -> bool + Send + Sync + 'static) -> Self {
        Self::new(move |invocation| {
            if predicate(invocation) {
                Ok(ProcessOutput {
                    code: Some(1),
                    stdout: String::new(),
                    stderr: "RuntimeError: simulated failure".to_string(),
                })
            } else {
                Ok(exit_with(0))
            }
        })
    }

    /// Every invocation fails to spawn.
    pub fn erroring() -> Self {
        Self::new(|invocation| {
            Err(DriverError::Spawn {
                program: invocation.program.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such program"),
            })
        })
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        self.calls.lock().push(invocation.clone());
        (self.behaviour)(invocation)
    }
}

pub fn exit_with(code: i32) -> ProcessOutput {
    ProcessOutput {
        code: Some(code),
        ..ProcessOutput::default()
    }
}

/// In-memory search state; `None` behaves like an unrestorable experiment.
#[derive(Debug, Clone, Default)]
pub struct MockResultStore {
    pub results: Option<SearchResultSet>,
}

impl MockResultStore {
    pub fn new(results: SearchResultSet) -> Self {
        Self {
            results: Some(results),
        }
    }

    pub fn unrestorable() -> Self {
        Self { results: None }
    }
}

impl ResultStore for MockResultStore {
    fn restore(&self, experiment_path: &Path) -> Result<SearchResultSet> {
        self.results.clone().ok_or_else(|| DriverError::Restore {
            path: experiment_path.to_path_buf(),
            reason: "mock store has no results".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_runner_records_calls() -> Result<()> {
        let runner = MockProcessRunner::failing_when(|inv| inv.args.contains(&"bad".to_string()));
        let good = Invocation::new("sh", ".").args(["good"]);
        let bad = Invocation::new("sh", ".").args(["bad"]);

        assert!(runner.run(&good).await?.success());
        assert!(!runner.run(&bad).await?.success());
        assert_eq!(runner.calls(), vec![good, bad]);
        Ok(())
    }

    #[test]
    fn test_unrestorable_store() {
        let err = MockResultStore::unrestorable()
            .restore(Path::new("exp"))
            .unwrap_err();
        assert!(matches!(err, DriverError::Restore { .. }));
    }
}
