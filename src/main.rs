use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;

use cardiac_seg_driver::{
    config::{Commands, Config},
    logging::init_logging,
    train::check_data_dicts,
    Launcher, PredictionPipeline, RayTuneStore, SystemProcessRunner, TrainingDriver,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let config = Config::parse();
    init_logging(config.verbose);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("錯誤: {:#}", e);
            error!(error = ?e, "driver failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<()> {
    let layout = config.layout()?;
    let launcher = Launcher::new(&config.interpreter, &layout.root)
        .with_timeout(config.invocation_timeout());
    let runner = SystemProcessRunner::new();

    match &config.command {
        Commands::Train { mode, checkpoint } => {
            check_data_dicts(&layout);
            layout.prepare_training_dirs()?;
            TrainingDriver::new(&runner, &launcher, &layout)
                .run(*mode, checkpoint.as_deref())
                .await
                .with_context(|| format!("{} run failed", mode.label()))?;
        }
        Commands::Predict => {
            let report = PredictionPipeline::new(&layout, &launcher, &runner, RayTuneStore::new())
                .run()
                .await
                .context("prediction pipeline failed")?;
            tracing::info!(
                success = report.summary.success_count,
                failed = report.summary.fail_count,
                archived = report.archive.is_some(),
                "prediction finished"
            );
            println!("--- 腳本執行完畢 ---");
        }
    }

    Ok(())
}
