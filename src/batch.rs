use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::command::InferCommand;
use crate::errors::{DriverError, Result};
use crate::progress_tracker::ProgressTracker;
use crate::runner::{Launcher, OutputMode};
use crate::traits::ProcessRunner;

/// Result of one inference call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    Success,
    Failure { reason: String, stderr: String },
}

/// Running tally of a batch; `success_count + fail_count == total` once
/// the batch has finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub success_count: usize,
    pub fail_count: usize,
    pub failed: Vec<PathBuf>,
}

impl BatchSummary {
    fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    fn record(&mut self, image: &Path, outcome: &InvocationOutcome) {
        match outcome {
            InvocationOutcome::Success => self.success_count += 1,
            InvocationOutcome::Failure { .. } => {
                self.fail_count += 1;
                self.failed.push(image.to_path_buf());
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.success_count + self.fail_count == self.total
    }

    pub fn report(&self, infer_dir: &Path) -> String {
        let rule = "=".repeat(60);
        [
            rule.clone(),
            "推論完成！".to_string(),
            format!("成功: {}/{}", self.success_count, self.total),
            format!("失敗: {}/{}", self.fail_count, self.total),
            format!("推論結果已儲存於: {}", infer_dir.display()),
            rule,
        ]
        .join("\n")
    }
}

/// Every regular file under `image_dir`, sorted by path.
///
/// No extension filter is applied; `infer.py` decides what it can read.
pub fn collect_image_files(image_dir: &Path) -> Result<Vec<PathBuf>> {
    if !image_dir.is_dir() {
        return Err(DriverError::file_system(
            image_dir,
            "list images",
            std::io::Error::new(std::io::ErrorKind::NotFound, "image directory does not exist"),
        ));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(image_dir) {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Runs `infer.py` once per image, strictly one after another.
///
/// A failing image is counted and logged; the batch always runs to the end.
pub struct BatchInferenceRunner<'a, R: ProcessRunner> {
    runner: &'a R,
    launcher: &'a Launcher,
    script: PathBuf,
    command: InferCommand,
}

impl<'a, R: ProcessRunner> BatchInferenceRunner<'a, R> {
    pub fn new(runner: &'a R, launcher: &'a Launcher, script: PathBuf, command: InferCommand) -> Self {
        Self {
            runner,
            launcher,
            script,
            command,
        }
    }

    pub async fn run(&self, image_dir: &Path) -> Result<BatchSummary> {
        println!("--- 正在從 {} 搜尋圖片 ---", image_dir.display());
        let images = collect_image_files(image_dir)?;
        for image in &images {
            println!("找到: {}", image.display());
        }

        println!("\n--- 開始執行推論 ({} 張圖片) ---", images.len());
        let mut summary = BatchSummary::new(images.len());
        let progress = ProgressTracker::new(images.len());

        for (i, image) in images.iter().enumerate() {
            let file_name = image
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            progress.println(format!("[{}/{}] 推論: {}", i + 1, images.len(), file_name));
            progress.println("-".repeat(60));

            let outcome = self.infer_one(image).await;
            match &outcome {
                InvocationOutcome::Success => progress.println("✓ 成功"),
                InvocationOutcome::Failure { reason, stderr } => {
                    progress.println("✗ 失敗");
                    progress.println(format!("錯誤: {}", reason));
                    if !stderr.is_empty() {
                        progress.println(format!("詳細錯誤: {}", stderr));
                    }
                    warn!(image = %image.display(), %reason, "inference failed");
                }
            }
            summary.record(image, &outcome);
            progress.inc();
        }
        progress.finish();

        Ok(summary)
    }

    async fn infer_one(&self, image: &Path) -> InvocationOutcome {
        let invocation = self.launcher.script(
            &self.script,
            self.command.args_for(image),
            OutputMode::Capture,
        );
        debug!(command = %invocation.command_line(), "inference");

        match self.runner.run(&invocation).await {
            Ok(output) if output.success() => InvocationOutcome::Success,
            Ok(output) => InvocationOutcome::Failure {
                reason: output.status_text(),
                stderr: output.stderr,
            },
            Err(e) => InvocationOutcome::Failure {
                reason: e.to_string(),
                stderr: String::new(),
            },
        }
    }
}
