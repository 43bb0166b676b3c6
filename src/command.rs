//! Typed argument builders for the two external scripts.
//!
//! `RunConfig` is the flat parameter map consumed by `expers/tune.py`;
//! `InferCommand` is the fixed flag set consumed by `expers/infer.py`.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{ProjectLayout, TRAIN_DATA_DICT};

/// A single parameter value of a run configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ParamValue>),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // the scripts parse booleans the Python way
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(v) => write!(f, "{v}"),
            // `{:?}` keeps the trailing `.0` on whole floats
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Str(v) => f.write_str(v),
            Self::List(items) => {
                let items: Vec<_> = items.iter().map(ToString::to_string).collect();
                write!(f, "{}", items.join(" "))
            }
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<&Path> for ParamValue {
    fn from(v: &Path) -> Self {
        Self::Str(v.display().to_string())
    }
}

impl From<PathBuf> for ParamValue {
    fn from(v: PathBuf) -> Self {
        Self::from(v.as_path())
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

/// Flat, insertion-ordered parameter map for the tuning script.
///
/// Values are never mutated in place: per-mode variants are produced with
/// [`RunConfig::apply`], which returns a new configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunConfig {
    params: Vec<(String, ParamValue)>,
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, keeping its original position when it already exists.
    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        let value = value.into();
        match self.params.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => *slot = value,
            None => self.params.push((key.to_string(), value)),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn apply(&self, overrides: &RunOverrides) -> Self {
        overrides
            .entries
            .iter()
            .fold(self.clone(), |config, (key, value)| config.with(key, value.clone()))
    }

    /// Encodes the map as command-line tokens.
    ///
    /// `true` becomes `--key`, `false` is dropped, a list becomes `--key`
    /// followed by one token per element, anything else is `--key=value`.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for (key, value) in &self.params {
            match value {
                ParamValue::Bool(true) => args.push(format!("--{key}")),
                ParamValue::Bool(false) => {}
                ParamValue::List(items) => {
                    args.push(format!("--{key}"));
                    args.extend(items.iter().map(ToString::to_string));
                }
                other => args.push(format!("--{key}={other}")),
            }
        }
        args
    }

    /// Base training configuration for a project layout.
    pub fn base(layout: &ProjectLayout) -> Self {
        Self::new()
            .with("tune_mode", "train")
            .with("exp_name", layout.exp_name.as_str())
            .with("data_name", layout.data_name.as_str())
            .with("data_dir", layout.data_dir())
            .with("root_exp_dir", layout.root_exp_dir())
            .with("model_name", layout.model_name.as_str())
            .with("model_dir", layout.model_dir())
            .with("log_dir", layout.log_dir())
            .with("eval_dir", layout.eval_dir())
            .with("start_epoch", 0)
            .with("val_every", 10)
            .with("max_early_stop_count", 30)
            .with("max_epoch", 2000)
            .with("data_dicts_json", layout.data_dicts_json(TRAIN_DATA_DICT))
            .with("pin_memory", true)
            .with("out_channels", 4)
            .with("patch_size", 2)
            .with("feature_size", 48)
            .with("drop_rate", 0.0)
            .with("depths", vec![2_i64, 2, 4, 2])
            .with("norm_name", "instance")
            .with("a_min", -42)
            .with("a_max", 423)
            .with("space_x", 0.7)
            .with("space_y", 0.7)
            .with("space_z", 1.0)
            .with("roi_x", 128)
            .with("roi_y", 128)
            .with("roi_z", 96)
            .with("optim", "AdamW")
            .with("lr", 1e-4)
            .with("weight_decay", 1e-5)
            .with("checkpoint", layout.model_dir().join("final_model.pth"))
            .with("use_init_weights", true)
            .with("infer_post_process", true)
            .with("batch_size", 1)
    }
}

/// Keys layered over the base configuration for one run mode.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunOverrides {
    entries: Vec<(String, ParamValue)>,
}

impl RunOverrides {
    pub fn train() -> Self {
        Self::default()
    }

    /// Evaluation on the tuned trials with a deeper ROI.
    pub fn test() -> Self {
        Self::default()
            .set("tune_mode", "test")
            .set("roi_z", 128)
            .set("resume_tuner", true)
            .set("save_eval_csv", true)
            .set("test_mode", true)
    }

    pub fn resume(checkpoint: &Path) -> Self {
        Self::default().set("ssl_checkpoint", checkpoint)
    }

    pub fn set(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.entries.push((key.to_string(), value.into()));
        self
    }
}

/// Fixed model and geometry hyperparameters for inference.
#[derive(Debug, Clone, PartialEq)]
pub struct InferParams {
    pub out_channels: u32,
    pub patch_size: u32,
    pub feature_size: u32,
    pub drop_rate: f64,
    pub depths: Vec<u32>,
    pub kernel_size: u32,
    pub exp_rate: u32,
    pub norm_name: String,
    pub a_min: i32,
    pub a_max: i32,
    /// voxel spacing (x, y, z)
    pub space: [f64; 3],
    /// region of interest (x, y, z)
    pub roi: [u32; 3],
    pub post_process: bool,
}

impl Default for InferParams {
    fn default() -> Self {
        Self {
            out_channels: 4,
            patch_size: 2,
            feature_size: 48,
            drop_rate: 0.0,
            depths: vec![2, 2, 4, 2],
            kernel_size: 5,
            exp_rate: 4,
            norm_name: "instance".to_string(),
            a_min: -42,
            a_max: 423,
            space: [0.7, 0.7, 1.0],
            roi: [128, 128, 96],
            post_process: true,
        }
    }
}

/// Everything `expers/infer.py` needs except the image path.
#[derive(Debug, Clone, PartialEq)]
pub struct InferCommand {
    pub model_name: String,
    pub data_name: String,
    pub data_dir: PathBuf,
    pub model_dir: PathBuf,
    pub infer_dir: PathBuf,
    pub checkpoint: PathBuf,
    pub params: InferParams,
}

impl InferCommand {
    pub fn new(layout: &ProjectLayout, model_dir: PathBuf, checkpoint: PathBuf) -> Self {
        Self {
            model_name: layout.model_name.clone(),
            data_name: layout.data_name.clone(),
            data_dir: layout.data_dir(),
            model_dir,
            infer_dir: layout.infer_dir(),
            checkpoint,
            params: InferParams::default(),
        }
    }

    pub fn with_params(mut self, params: InferParams) -> Self {
        self.params = params;
        self
    }

    pub fn args_for(&self, img_pth: &Path) -> Vec<String> {
        let p = &self.params;
        let mut args = Vec::with_capacity(48);
        let mut flag = |name: &str, value: String| {
            args.push(format!("--{name}"));
            args.push(value);
        };

        flag("model_name", self.model_name.clone());
        flag("data_name", self.data_name.clone());
        flag("data_dir", self.data_dir.display().to_string());
        flag("model_dir", self.model_dir.display().to_string());
        flag("infer_dir", self.infer_dir.display().to_string());
        flag("checkpoint", self.checkpoint.display().to_string());
        flag("img_pth", img_pth.display().to_string());
        flag("out_channels", p.out_channels.to_string());
        flag("patch_size", p.patch_size.to_string());
        flag("feature_size", p.feature_size.to_string());
        flag("drop_rate", format!("{:?}", p.drop_rate));

        args.push("--depths".to_string());
        args.extend(p.depths.iter().map(ToString::to_string));

        let mut flag = |name: &str, value: String| {
            args.push(format!("--{name}"));
            args.push(value);
        };
        flag("kernel_size", p.kernel_size.to_string());
        flag("exp_rate", p.exp_rate.to_string());
        flag("norm_name", p.norm_name.clone());
        flag("a_min", p.a_min.to_string());
        flag("a_max", p.a_max.to_string());
        for (axis, value) in ["x", "y", "z"].iter().zip(p.space) {
            flag(&format!("space_{axis}"), format!("{value:?}"));
        }
        for (axis, value) in ["x", "y", "z"].iter().zip(p.roi) {
            flag(&format!("roi_{axis}"), value.to_string());
        }

        if p.post_process {
            args.push("--infer_post_process".to_string());
        }
        args
    }
}
