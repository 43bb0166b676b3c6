use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::command::{RunConfig, RunOverrides};
use crate::config::{ProjectLayout, RunMode, TRAIN_DATA_DICT};
use crate::errors::{DriverError, Result};
use crate::runner::{Launcher, OutputMode};
use crate::traits::ProcessRunner;

/// Launches `expers/tune.py` once for training, testing or resuming.
///
/// Unlike the batch runner there is no partial success here: a failing
/// tuning process is returned as an error.
pub struct TrainingDriver<'a, R: ProcessRunner> {
    runner: &'a R,
    launcher: &'a Launcher,
    script: PathBuf,
    base: RunConfig,
}

impl<'a, R: ProcessRunner> TrainingDriver<'a, R> {
    pub fn new(runner: &'a R, launcher: &'a Launcher, layout: &ProjectLayout) -> Self {
        Self {
            runner,
            launcher,
            script: layout.tune_script(),
            base: RunConfig::base(layout),
        }
    }

    pub fn with_base(mut self, base: RunConfig) -> Self {
        self.base = base;
        self
    }

    pub fn base(&self) -> &RunConfig {
        &self.base
    }

    /// Configuration for `mode`. Resume requires an existing checkpoint.
    pub fn config_for(&self, mode: RunMode, checkpoint: Option<&Path>) -> Result<RunConfig> {
        let overrides = match mode {
            RunMode::Train => RunOverrides::train(),
            RunMode::Test => RunOverrides::test(),
            RunMode::Resume => {
                let checkpoint = checkpoint.ok_or_else(|| DriverError::Validation {
                    field: "--checkpoint".to_string(),
                    reason: "is required in resume mode".to_string(),
                })?;
                // tune.py runs from the project root, so a relative path is
                // pinned to the caller's working directory before it is checked.
                let checkpoint = std::path::absolute(checkpoint)
                    .map_err(|e| DriverError::file_system(checkpoint, "resolve checkpoint", e))?;
                if !checkpoint.exists() {
                    return Err(DriverError::Validation {
                        field: "checkpoint".to_string(),
                        reason: format!("does not exist: {}", checkpoint.display()),
                    });
                }
                RunOverrides::resume(&checkpoint)
            }
        };
        Ok(self.base.apply(&overrides))
    }

    pub async fn run(&self, mode: RunMode, checkpoint: Option<&Path>) -> Result<()> {
        let config = self.config_for(mode, checkpoint)?;

        let rule = "=".repeat(60);
        println!("{rule}");
        match (mode, config.get("ssl_checkpoint")) {
            (RunMode::Resume, Some(path)) => println!("從檢查點繼續訓練: {path}"),
            _ => println!("開始{}...", mode.label()),
        }
        println!("{rule}");

        let invocation = self
            .launcher
            .script(&self.script, config.to_args(), OutputMode::Inherit);
        println!("執行命令:");
        println!("{}", invocation.command_line());
        println!("{rule}");

        let program = self.script.display().to_string();
        let outcome = self
            .runner
            .run(&invocation)
            .await
            .and_then(|output| output.into_result(&program));

        match outcome {
            Ok(_) => {
                println!("\n{}完成！", mode.label());
                info!(?mode, "tuning process finished");
                Ok(())
            }
            Err(e) => {
                println!("\n{}失敗: {}", mode.label(), e);
                Err(e)
            }
        }
    }
}

/// Warns when the data dictionary the tuning script expects is missing.
///
/// The file is only passed through, so its absence is not fatal here.
pub fn check_data_dicts(layout: &ProjectLayout) -> bool {
    let data_dicts = layout.data_dicts_json(TRAIN_DATA_DICT);
    if data_dicts.exists() {
        return true;
    }
    println!("警告: 數據字典文件不存在: {}", data_dicts.display());
    println!("請確保已正確設定數據路徑");
    warn!(path = %data_dicts.display(), "data dictionary missing");
    false
}
