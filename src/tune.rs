//! Best-trial lookup over a finished Ray Tune experiment.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::errors::{DriverError, Result};
use crate::traits::ResultStore;

/// Metric the selector ranks trials by.
pub const DEFAULT_METRIC: &str = "tt_dice";
/// Sub-directory of a trial's log dir that holds its weights.
pub const MODEL_SUBDIR: &str = "models";
pub const BEST_CHECKPOINT_FILE: &str = "best_model.pth";

const RESULT_FILE: &str = "result.json";
const PARAMS_FILE: &str = "params.json";
const STATE_FILE_PREFIX: &str = "experiment_state";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Max,
    Min,
}

impl Mode {
    fn is_better(self, candidate: f64, current: f64) -> bool {
        match self {
            Self::Max => candidate > current,
            Self::Min => candidate < current,
        }
    }
}

/// Final reported result of one trial.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialResult {
    pub trial_id: String,
    pub config: Value,
    pub metrics: BTreeMap<String, f64>,
    pub log_dir: PathBuf,
}

impl TrialResult {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    pub fn model_dir(&self) -> PathBuf {
        self.log_dir.join(MODEL_SUBDIR)
    }

    /// Builds a trial from its last reported record; every numeric
    /// top-level field becomes a metric.
    fn from_record(log_dir: &Path, record: ResultRecord, params: Option<Value>) -> Self {
        let trial_id = record
            .trial_id
            .or_else(|| {
                log_dir
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .unwrap_or_default();
        let metrics = record
            .fields
            .iter()
            .filter_map(|(key, value)| value.as_f64().map(|v| (key.clone(), v)))
            .collect();
        let config = record
            .config
            .or(params)
            .unwrap_or_else(|| Value::Object(Map::new()));

        Self {
            trial_id,
            config,
            metrics,
            log_dir: log_dir.to_path_buf(),
        }
    }
}

/// One line of a trial's `result.json`.
#[derive(Debug, Deserialize)]
struct ResultRecord {
    #[serde(default)]
    trial_id: Option<String>,
    #[serde(default)]
    config: Option<Value>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

/// All trials of a restored search, in a stable order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResultSet {
    trials: Vec<TrialResult>,
}

impl SearchResultSet {
    pub fn new(trials: Vec<TrialResult>) -> Self {
        Self { trials }
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn trials(&self) -> &[TrialResult] {
        &self.trials
    }

    /// Trial with the best finite value of `metric`; ties go to the earlier trial.
    pub fn best(&self, metric: &str, mode: Mode) -> Option<&TrialResult> {
        self.trials
            .iter()
            .filter_map(|trial| {
                trial
                    .metric(metric)
                    .filter(|v| v.is_finite())
                    .map(|v| (trial, v))
            })
            .fold(None, |best, (trial, value)| match best {
                Some((_, current)) if !mode.is_better(value, current) => best,
                _ => Some((trial, value)),
            })
            .map(|(trial, _)| trial)
    }
}

/// Reads a Ray Tune experiment directory as written by `tune.Tuner`.
///
/// Each sub-directory with a `result.json` is a trial; the file holds one
/// JSON record per reported iteration and the last record is the trial's
/// result.
#[derive(Debug, Clone, Copy, Default)]
pub struct RayTuneStore;

impl RayTuneStore {
    pub const fn new() -> Self {
        Self
    }

    fn load_trial(trial_dir: &Path) -> Result<Option<TrialResult>> {
        let result_path = trial_dir.join(RESULT_FILE);
        let content = fs::read_to_string(&result_path)
            .map_err(|e| DriverError::file_system(&result_path, "read trial results", e))?;

        let mut last = None;
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: ResultRecord =
                serde_json::from_str(line).map_err(|e| DriverError::Restore {
                    path: result_path.clone(),
                    reason: format!("line {}: {}", idx + 1, e),
                })?;
            last = Some(record);
        }

        let Some(record) = last else {
            warn!(trial = %trial_dir.display(), "trial reported no results, skipping");
            return Ok(None);
        };

        let params = if record.config.is_some() {
            None
        } else {
            Self::load_params(trial_dir)?
        };
        Ok(Some(TrialResult::from_record(trial_dir, record, params)))
    }

    fn load_params(trial_dir: &Path) -> Result<Option<Value>> {
        let params_path = trial_dir.join(PARAMS_FILE);
        if !params_path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&params_path)
            .map_err(|e| DriverError::file_system(&params_path, "read trial params", e))?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| DriverError::Restore {
                path: params_path,
                reason: e.to_string(),
            })
    }
}

impl ResultStore for RayTuneStore {
    fn restore(&self, experiment_path: &Path) -> Result<SearchResultSet> {
        if !experiment_path.is_dir() {
            return Err(DriverError::Restore {
                path: experiment_path.to_path_buf(),
                reason: "experiment directory does not exist".to_string(),
            });
        }

        let entries = fs::read_dir(experiment_path)
            .map_err(|e| DriverError::file_system(experiment_path, "list experiment", e))?;

        let mut has_state_file = false;
        let mut trial_dirs = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| DriverError::file_system(experiment_path, "list experiment", e))?
                .path();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            if path.is_file() && name.starts_with(STATE_FILE_PREFIX) && name.ends_with(".json") {
                has_state_file = true;
            } else if path.join(RESULT_FILE).is_file() {
                trial_dirs.push(path);
            }
        }

        if !has_state_file && trial_dirs.is_empty() {
            return Err(DriverError::Restore {
                path: experiment_path.to_path_buf(),
                reason: "no search metadata found".to_string(),
            });
        }

        trial_dirs.sort();
        let mut trials = Vec::with_capacity(trial_dirs.len());
        for dir in &trial_dirs {
            if let Some(trial) = Self::load_trial(dir)? {
                trials.push(trial);
            }
        }
        debug!(
            experiment = %experiment_path.display(),
            trials = trials.len(),
            "restored search state"
        );
        Ok(SearchResultSet::new(trials))
    }
}

/// Picks the best trial of an experiment and points at its model directory.
pub struct TuneResultSelector<S: ResultStore> {
    store: S,
    metric: String,
    mode: Mode,
}

impl<S: ResultStore> TuneResultSelector<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            metric: DEFAULT_METRIC.to_string(),
            mode: Mode::Max,
        }
    }

    pub fn with_metric(mut self, metric: &str, mode: Mode) -> Self {
        self.metric = metric.to_string();
        self.mode = mode;
        self
    }

    /// Returns `<best trial log dir>/models`.
    pub fn best_model_dir(&self, experiment_path: &Path) -> Result<PathBuf> {
        println!("Loading results from {}...", experiment_path.display());

        let results = self.store.restore(experiment_path)?;
        let best = results
            .best(&self.metric, self.mode)
            .ok_or_else(|| DriverError::MetricNotFound {
                metric: self.metric.clone(),
            })?;

        println!("\nBest trial {}: ", best.trial_id);
        println!("config: {}", best.config);
        if let Some(value) = best.metric(&self.metric) {
            println!("{}: {}", self.metric, value);
        }
        if let Some(esc) = best.metric("esc") {
            println!("esc: {}", esc);
        }
        println!("best log dir: {}", best.log_dir.display());

        Ok(best.model_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn trial(id: &str, dice: Option<f64>) -> TrialResult {
        let mut metrics = BTreeMap::new();
        if let Some(d) = dice {
            metrics.insert(DEFAULT_METRIC.to_string(), d);
        }
        TrialResult {
            trial_id: id.to_string(),
            config: json!({}),
            metrics,
            log_dir: PathBuf::from(format!("/exp/{id}")),
        }
    }

    fn write_trial(exp_dir: &Path, name: &str, lines: &[Value]) -> PathBuf {
        let dir = exp_dir.join(name);
        fs::create_dir_all(&dir).unwrap();
        let body: Vec<String> = lines.iter().map(Value::to_string).collect();
        fs::write(dir.join(RESULT_FILE), body.join("\n")).unwrap();
        dir
    }

    #[test]
    fn test_best_is_order_independent() {
        let trials = vec![
            trial("a", Some(0.71)),
            trial("b", Some(0.84)),
            trial("c", Some(0.79)),
        ];
        let mut reversed = trials.clone();
        reversed.reverse();

        for set in [SearchResultSet::new(trials), SearchResultSet::new(reversed)] {
            let best = set.best(DEFAULT_METRIC, Mode::Max).unwrap();
            assert_eq!(best.trial_id, "b");
        }
    }

    #[test]
    fn test_best_min_mode_and_missing_metric() {
        let set = SearchResultSet::new(vec![
            trial("a", Some(0.3)),
            trial("b", None),
            trial("c", Some(f64::NAN)),
            trial("d", Some(0.1)),
        ]);
        assert_eq!(set.best(DEFAULT_METRIC, Mode::Min).unwrap().trial_id, "d");
        assert_eq!(set.best(DEFAULT_METRIC, Mode::Max).unwrap().trial_id, "a");
        assert!(set.best("esc", Mode::Max).is_none());
    }

    #[test]
    fn test_best_tie_keeps_first() {
        let set = SearchResultSet::new(vec![trial("a", Some(0.5)), trial("b", Some(0.5))]);
        assert_eq!(set.best(DEFAULT_METRIC, Mode::Max).unwrap().trial_id, "a");
    }

    #[test]
    fn test_restore_uses_last_record() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let exp = temp_dir.path();
        fs::write(exp.join("experiment_state-2024-01-01.json"), "{}")?;
        write_trial(
            exp,
            "main_aaaa_00000",
            &[
                json!({"trial_id": "aaaa_00000", "tt_dice": 0.9, "config": {"lr": 0.001}}),
                json!({"trial_id": "aaaa_00000", "tt_dice": 0.6, "config": {"lr": 0.001}}),
            ],
        );
        let winner = write_trial(
            exp,
            "main_aaaa_00001",
            &[json!({"trial_id": "aaaa_00001", "tt_dice": 0.8, "esc": 12, "config": {"lr": 0.0001}})],
        );

        let set = RayTuneStore::new().restore(exp)?;
        assert_eq!(set.len(), 2);

        let best = set.best(DEFAULT_METRIC, Mode::Max).unwrap();
        assert_eq!(best.trial_id, "aaaa_00001");
        assert_eq!(best.metric("esc"), Some(12.0));
        assert_eq!(best.config, json!({"lr": 0.0001}));
        assert_eq!(best.model_dir(), winner.join("models"));
        Ok(())
    }

    #[test]
    fn test_restore_falls_back_to_params_and_dir_name() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let dir = write_trial(temp_dir.path(), "trial_7", &[json!({"tt_dice": 0.5})]);
        fs::write(dir.join(PARAMS_FILE), r#"{"feature_size": 48}"#)?;
        // an empty trial is skipped
        write_trial(temp_dir.path(), "trial_8", &[]);

        let set = RayTuneStore::new().restore(temp_dir.path())?;
        assert_eq!(set.len(), 1);
        let only = &set.trials()[0];
        assert_eq!(only.trial_id, "trial_7");
        assert_eq!(only.config, json!({"feature_size": 48}));
        Ok(())
    }

    #[test]
    fn test_restore_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let err = RayTuneStore::new()
            .restore(&temp_dir.path().join("AICUP_training"))
            .unwrap_err();
        assert!(matches!(err, DriverError::Restore { .. }));
    }

    #[test]
    fn test_restore_without_metadata() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("not_a_trial")).unwrap();
        let err = RayTuneStore::new().restore(temp_dir.path()).unwrap_err();
        assert!(matches!(err, DriverError::Restore { .. }));
    }

    #[test]
    fn test_restore_corrupted_results() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("trial_0");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(RESULT_FILE), "{\"tt_dice\": 0.4}\n{not json").unwrap();

        match RayTuneStore::new().restore(temp_dir.path()) {
            Err(DriverError::Restore { reason, .. }) => assert!(reason.starts_with("line 2")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_selector_reports_model_dir() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let dir = write_trial(
            temp_dir.path(),
            "trial_0",
            &[json!({"trial_id": "t0", "tt_dice": 0.77})],
        );
        let model_dir = TuneResultSelector::new(RayTuneStore::new()).best_model_dir(temp_dir.path())?;
        assert_eq!(model_dir, dir.join(MODEL_SUBDIR));
        Ok(())
    }

    #[test]
    fn test_selector_with_custom_metric() -> Result<()> {
        let temp_dir = TempDir::new()?;
        write_trial(temp_dir.path(), "trial_0", &[json!({"tt_dice": 0.9, "val_loss": 0.4})]);
        let lowest = write_trial(
            temp_dir.path(),
            "trial_1",
            &[json!({"tt_dice": 0.6, "val_loss": 0.2})],
        );

        let model_dir = TuneResultSelector::new(RayTuneStore::new())
            .with_metric("val_loss", Mode::Min)
            .best_model_dir(temp_dir.path())?;
        assert_eq!(model_dir, lowest.join(MODEL_SUBDIR));
        Ok(())
    }

    #[test]
    fn test_selector_without_metric_fails() {
        let temp_dir = TempDir::new().unwrap();
        write_trial(temp_dir.path(), "trial_0", &[json!({"loss": 0.2})]);
        let err = TuneResultSelector::new(RayTuneStore::new())
            .best_model_dir(temp_dir.path())
            .unwrap_err();
        assert!(matches!(err, DriverError::MetricNotFound { .. }));
    }
}
