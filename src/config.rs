use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{DriverError, Result};

/// Architectures understood by `expers/tune.py` and `expers/infer.py`.
pub const SUPPORTED_MODELS: &[&str] = &[
    "unet3d",
    "attention_unet",
    "cotr",
    "unetr",
    "swinunetr",
    "unetcnx_a1",
    "testnet",
];

/// Data dictionary handed to the tuning script.
pub const TRAIN_DATA_DICT: &str = "AICUP_training.json";

/// Archive name (without extension) written into the inference directory.
pub const ARCHIVE_STEM: &str = "contest1";

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Project root holding `expers/`, `dataset/`, `exps/` and `output/`
    #[arg(long, env = "CARDIAC_SEG_ROOT", default_value = ".", global = true)]
    pub project_root: PathBuf,

    /// Interpreter used to launch the external scripts
    #[arg(
        long,
        env = "CARDIAC_SEG_PYTHON",
        default_value = "python3",
        global = true
    )]
    pub interpreter: PathBuf,

    #[arg(long, default_value = "swinunetr", value_parser = check_model_name, global = true)]
    pub model_name: String,

    #[arg(long, default_value = "chgh", global = true)]
    pub data_name: String,

    #[arg(long, default_value = "AICUP_training", global = true)]
    pub exp_name: String,

    /// Kill an external process after this many seconds
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Train, evaluate or resume through the tuning script
    Train {
        #[arg(long, value_enum, default_value_t = RunMode::Train)]
        mode: RunMode,

        /// Checkpoint to resume from (resume mode only)
        #[arg(long)]
        checkpoint: Option<PathBuf>,
    },
    /// Pick the best tuned trial, run inference over every image and zip the results
    Predict,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    Train,
    Test,
    Resume,
}

impl RunMode {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Train => "訓練",
            Self::Test => "測試",
            Self::Resume => "繼續訓練",
        }
    }
}

impl Config {
    pub fn invocation_timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn layout(&self) -> Result<ProjectLayout> {
        ProjectLayout::new(
            &self.project_root,
            &self.model_name,
            &self.data_name,
            &self.exp_name,
        )
    }
}

fn check_model_name(s: &str) -> std::result::Result<String, String> {
    if SUPPORTED_MODELS.contains(&s) {
        return Ok(s.to_string());
    }
    let supported: Vec<_> = SUPPORTED_MODELS.iter().map(|m| format!("`{}`", m)).collect();
    Err(format!(
        "{} is not supported. Supported models: {}",
        s,
        supported.join(", ")
    ))
}

/// Fixed directory layout under the project root.
///
/// Every path the drivers hand to the external scripts is derived from here.
/// `models/`, `logs/` and `evals/` are passed as `./`-relative paths because
/// the scripts always run with the project root as working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    pub root: PathBuf,
    pub model_name: String,
    pub data_name: String,
    pub exp_name: String,
}

impl ProjectLayout {
    /// Resolves `root` to an absolute path; a missing root is fatal.
    pub fn new(root: &Path, model_name: &str, data_name: &str, exp_name: &str) -> Result<Self> {
        let root = root
            .canonicalize()
            .map_err(|_| DriverError::Configuration {
                message: format!("工作目錄不存在: {}", root.display()),
            })?;
        Ok(Self {
            root,
            model_name: model_name.to_string(),
            data_name: data_name.to_string(),
            exp_name: exp_name.to_string(),
        })
    }

    pub fn output_root(&self) -> PathBuf {
        self.root.join("output").join(&self.data_name)
    }

    pub fn image_dir(&self) -> PathBuf {
        self.output_root().join("image")
    }

    pub fn infer_dir(&self) -> PathBuf {
        self.output_root().join("infer")
    }

    pub fn archive_path(&self) -> PathBuf {
        self.infer_dir().join(format!("{ARCHIVE_STEM}.zip"))
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("dataset").join(&self.data_name)
    }

    pub fn root_exp_dir(&self) -> PathBuf {
        self.root
            .join("exps")
            .join("exps")
            .join(&self.model_name)
            .join(&self.data_name)
            .join("tune_results")
    }

    pub fn experiment_dir(&self) -> PathBuf {
        self.root_exp_dir().join(&self.exp_name)
    }

    pub fn data_dicts_json(&self, file_name: &str) -> PathBuf {
        self.root
            .join("exps")
            .join("data_dicts")
            .join(&self.data_name)
            .join(file_name)
    }

    pub fn model_dir(&self) -> PathBuf {
        PathBuf::from("./models")
    }

    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from("./logs")
    }

    pub fn eval_dir(&self) -> PathBuf {
        PathBuf::from("./evals")
    }

    pub fn tune_script(&self) -> PathBuf {
        self.root.join("expers").join("tune.py")
    }

    pub fn infer_script(&self) -> PathBuf {
        self.root.join("expers").join("infer.py")
    }

    /// Creates `models/`, `logs/`, `evals/` and the tune results directory.
    pub fn prepare_training_dirs(&self) -> Result<()> {
        for dir in [
            self.root.join("models"),
            self.root.join("logs"),
            self.root.join("evals"),
            self.root_exp_dir(),
        ] {
            create_dir(&dir)?;
        }
        Ok(())
    }

    /// Training directories plus the image input and inference output folders.
    pub fn prepare_inference_dirs(&self) -> Result<()> {
        self.prepare_training_dirs()?;
        create_dir(&self.image_dir())?;
        create_dir(&self.infer_dir())
    }
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| DriverError::file_system(path, "create directory", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layout(temp_dir: &TempDir) -> ProjectLayout {
        ProjectLayout::new(temp_dir.path(), "swinunetr", "chgh", "AICUP_training").unwrap()
    }

    #[test]
    fn test_layout_paths() {
        let temp_dir = TempDir::new().unwrap();
        let layout = layout(&temp_dir);
        let root = temp_dir.path().canonicalize().unwrap();

        assert_eq!(layout.image_dir(), root.join("output/chgh/image"));
        assert_eq!(layout.infer_dir(), root.join("output/chgh/infer"));
        assert_eq!(
            layout.archive_path(),
            root.join("output/chgh/infer/contest1.zip")
        );
        assert_eq!(
            layout.experiment_dir(),
            root.join("exps/exps/swinunetr/chgh/tune_results/AICUP_training")
        );
        assert_eq!(
            layout.data_dicts_json(TRAIN_DATA_DICT),
            root.join("exps/data_dicts/chgh/AICUP_training.json")
        );
        assert_eq!(layout.model_dir(), PathBuf::from("./models"));
    }

    #[test]
    fn test_missing_root_is_configuration_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");
        let err = ProjectLayout::new(&missing, "swinunetr", "chgh", "x").unwrap_err();
        assert!(matches!(err, DriverError::Configuration { .. }));
    }

    #[test]
    fn test_prepare_inference_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let layout = layout(&temp_dir);
        layout.prepare_inference_dirs().unwrap();

        assert!(layout.image_dir().is_dir());
        assert!(layout.infer_dir().is_dir());
        assert!(layout.root_exp_dir().is_dir());
        assert!(layout.root.join("models").is_dir());
        assert!(layout.root.join("evals").is_dir());
    }

    #[test]
    fn test_model_name_validation() {
        assert_eq!(check_model_name("unetr"), Ok("unetr".to_string()));
        assert!(check_model_name("resnet").is_err());
    }

    #[test]
    fn test_cli_parsing() {
        let config = Config::try_parse_from([
            "cardiac-seg",
            "train",
            "--mode",
            "resume",
            "--checkpoint",
            "models/final_model.pth",
            "--timeout-secs",
            "30",
        ])
        .unwrap();

        assert_eq!(config.invocation_timeout(), Some(Duration::from_secs(30)));
        match config.command {
            Commands::Train { mode, checkpoint } => {
                assert_eq!(mode, RunMode::Resume);
                assert_eq!(checkpoint, Some(PathBuf::from("models/final_model.pth")));
            }
            Commands::Predict => panic!("expected train subcommand"),
        }
    }
}
