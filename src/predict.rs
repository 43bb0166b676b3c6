use std::path::PathBuf;

use crate::archive::archive_best_effort;
use crate::batch::{BatchInferenceRunner, BatchSummary};
use crate::command::{InferCommand, InferParams};
use crate::config::ProjectLayout;
use crate::errors::Result;
use crate::runner::Launcher;
use crate::traits::{ProcessRunner, ResultStore};
use crate::tune::{TuneResultSelector, BEST_CHECKPOINT_FILE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionReport {
    pub checkpoint: PathBuf,
    pub summary: BatchSummary,
    /// `None` when the archive step failed
    pub archive: Option<PathBuf>,
}

/// Best-trial selection, batch inference and archiving, in that order.
///
/// Only setup problems (layout, unrestorable search state) are errors;
/// failed images and a failed archive are part of the report.
pub struct PredictionPipeline<'a, R: ProcessRunner, S: ResultStore> {
    layout: &'a ProjectLayout,
    launcher: &'a Launcher,
    runner: &'a R,
    selector: TuneResultSelector<S>,
    params: InferParams,
}

impl<'a, R: ProcessRunner, S: ResultStore> PredictionPipeline<'a, R, S> {
    pub fn new(layout: &'a ProjectLayout, launcher: &'a Launcher, runner: &'a R, store: S) -> Self {
        Self {
            layout,
            launcher,
            runner,
            selector: TuneResultSelector::new(store),
            params: InferParams::default(),
        }
    }

    pub fn with_params(mut self, params: InferParams) -> Self {
        self.params = params;
        self
    }

    pub async fn run(&self) -> Result<PredictionReport> {
        self.layout.prepare_inference_dirs()?;

        println!("--- 正在從 Ray Tune 獲取最佳模型路徑 ---");
        let model_dir = self.selector.best_model_dir(&self.layout.experiment_dir())?;
        let checkpoint = model_dir.join(BEST_CHECKPOINT_FILE);
        println!("--- 找到最佳權重檔: {} ---", checkpoint.display());

        let command = InferCommand::new(self.layout, model_dir, checkpoint.clone())
            .with_params(self.params.clone());
        let batch = BatchInferenceRunner::new(
            self.runner,
            self.launcher,
            self.layout.infer_script(),
            command,
        );
        let summary = batch.run(&self.layout.image_dir()).await?;

        let infer_dir = self.layout.infer_dir();
        println!("\n{}", summary.report(&infer_dir));

        let archive = archive_best_effort(&infer_dir, &self.layout.archive_path());

        Ok(PredictionReport {
            checkpoint,
            summary,
            archive,
        })
    }
}
