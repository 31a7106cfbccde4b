//! Experiment Configuration Module
//!
//! Defines the hyperparameters of a training run and the string-backed
//! choices (optimizer, noise type, clean-sample selection, imbalance handling,
//! learning-rate schedule).

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use clap::builder::PossibleValue;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::model::mlp::MlpNetConfig;
use crate::utils::error::{NoisyMatchError, Result};

/// One vocabulary per choice enum, shared by the CLI (`clap::ValueEnum`),
/// config files (serde through `String`) and `FromStr`/`Display`.
///
/// The first name of each variant is canonical; matching ignores case.
macro_rules! string_enum {
    ($name:ident, $what:literal, { $($variant:ident => $text:literal $(| $alias:literal)*),+ $(,)? }) => {
        impl ValueEnum for $name {
            fn value_variants<'a>() -> &'a [Self] {
                &[$($name::$variant),+]
            }

            fn to_possible_value(&self) -> Option<PossibleValue> {
                match self {
                    $($name::$variant => Some(PossibleValue::new($text)$(.alias($alias))*),)+
                }
            }
        }

        impl FromStr for $name {
            type Err = NoisyMatchError;

            fn from_str(s: &str) -> Result<Self> {
                <$name as ValueEnum>::from_str(s.trim(), true).map_err(|_| {
                    NoisyMatchError::Config(format!(
                        "unknown {} '{}' (expected one of: {})",
                        $what,
                        s,
                        [$($text),+].join(", ")
                    ))
                })
            }
        }

        impl TryFrom<String> for $name {
            type Error = NoisyMatchError;

            fn try_from(s: String) -> Result<Self> {
                s.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let text = match self {
                    $($name::$variant => $text,)+
                };
                write!(f, "{}", text)
            }
        }
    };
}

/// Optimizer used for the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OptimizerKind {
    Adam,
    Sgd,
}

string_enum!(OptimizerKind, "optimizer", {
    Adam => "adam",
    Sgd => "sgd",
});

/// Label corruption applied to the train split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NoiseType {
    /// Labels are left untouched
    None,
    /// Flip to a uniformly chosen different class
    Symmetric,
    /// Flip class `c` to `c + 1 mod C`
    Pairflip,
}

string_enum!(NoiseType, "noise type", {
    None => "none",
    Symmetric => "symmetric" | "sym",
    Pairflip => "pairflip" | "asym",
});

/// How the train split is divided into clean and noisy samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CleanMethod {
    Consistency,
    Kmeans,
}

string_enum!(CleanMethod, "clean method", {
    Consistency => "consistency",
    Kmeans => "kmeans",
});

/// Class-imbalance correction applied to the labeled loss
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ImbalanceMethod {
    None,
    Resample,
    Mixup,
    Ldam,
}

string_enum!(ImbalanceMethod, "imbalance method", {
    None => "none",
    Resample => "resample",
    Mixup => "mixup",
    Ldam => "ldam",
});

/// Learning-rate schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LrScheduleKind {
    /// Multiply by `milestone_gamma` at each milestone epoch
    MultiStep,
    /// Per-iteration warmup followed by cosine decay
    WarmupCosine,
    /// Multiply by `gamma` every epoch
    Exponential,
}

string_enum!(LrScheduleKind, "lr schedule", {
    MultiStep => "multistep" | "multi-step",
    WarmupCosine => "warmup-cosine" | "cosine",
    Exponential => "exponential" | "exp",
});

/// Shape of the warmup ramp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum WarmupKind {
    Linear,
    Exp,
}

string_enum!(WarmupKind, "warmup kind", {
    Linear => "linear",
    Exp => "exp",
});

/// Hyperparameters of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Base learning rate
    pub lr: f64,
    /// Labeled batch size
    pub batch_size: usize,
    /// SGD momentum
    pub momentum: f64,
    /// L2 penalty
    pub weight_decay: f64,
    /// Use Nesterov momentum with SGD
    pub nesterov: bool,
    /// Feature dimension
    pub input_dim: usize,
    /// Decay factor of the exponential schedule
    pub gamma: f64,
    /// Dataset name (`synthetic` is generated in memory)
    pub dataset: String,
    /// Root directory holding `<dataset>/{train,test}.csv`
    pub data_root: String,
    pub epochs: usize,
    /// Supervised warmup epochs before clean/noisy splitting starts
    pub warmup: usize,
    pub optimizer: OptimizerKind,
    /// Accelerator index (CUDA backend only)
    pub gpu_index: usize,
    pub num_class: usize,
    pub seed: u64,
    /// Fraction of corrupted train labels, in [0, 1)
    pub noise_rate: f64,
    pub noise_type: NoiseType,
    /// Coefficient of the unlabeled loss
    pub lambda_u: f64,
    /// Pseudo-label sharpening temperature
    pub temperature: f64,
    /// Pseudo-label confidence threshold
    pub threshold: f64,
    /// Unlabeled to labeled batch size ratio
    pub mu: usize,
    pub use_pretrain: bool,
    pub use_ema: bool,
    pub ema_decay: f64,
    pub clean_method: CleanMethod,
    /// Minimum confidence for a sample to be selected as clean
    pub clean_theta: f64,
    pub imb_method: ImbalanceMethod,
    /// Mixup Beta(alpha, alpha) parameter
    pub alpha: f64,
    pub pretrain_path: Option<String>,
    /// Align pseudo-labels to the known class distribution
    pub use_true_distribution: bool,
    /// Number of k-means clusters
    pub k: usize,
    pub lr_schedule: LrScheduleKind,
    /// Multi-step milestones (epochs)
    pub milestones: Vec<usize>,
    pub milestone_gamma: f64,
    /// Starting ratio of the warmup ramp
    pub warmup_ratio: f64,
    pub warmup_kind: WarmupKind,
    /// Root of run directories
    pub out_dir: String,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            lr: 1e-3,
            batch_size: 128,
            momentum: 0.9,
            weight_decay: 2e-4,
            nesterov: true,
            input_dim: 1024,
            gamma: 0.95,
            dataset: "malware".to_string(),
            data_root: "./data".to_string(),
            epochs: 120,
            warmup: 10,
            optimizer: OptimizerKind::Adam,
            gpu_index: 0,
            num_class: 12,
            seed: 1,
            noise_rate: 0.5,
            noise_type: NoiseType::None,
            lambda_u: 1.0,
            temperature: 0.5,
            threshold: 0.95,
            mu: 1,
            use_pretrain: true,
            use_ema: false,
            ema_decay: 0.999,
            clean_method: CleanMethod::Consistency,
            clean_theta: 0.95,
            imb_method: ImbalanceMethod::Ldam,
            alpha: 10.0,
            pretrain_path: None,
            use_true_distribution: true,
            k: 10,
            lr_schedule: LrScheduleKind::MultiStep,
            milestones: vec![10, 90],
            milestone_gamma: 0.3,
            warmup_ratio: 5e-4,
            warmup_kind: WarmupKind::Exp,
            out_dir: "output".to_string(),
        }
    }
}

impl ExperimentConfig {
    /// Load a configuration from a TOML file; missing keys take their defaults
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(NoisyMatchError::PathNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| NoisyMatchError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the resolved configuration as pretty JSON
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Pretrained checkpoint to start from, if enabled
    pub fn pretrained_checkpoint(&self) -> Option<&str> {
        if self.use_pretrain {
            self.pretrain_path.as_deref()
        } else {
            None
        }
    }

    /// Classifier shape for this experiment
    pub fn model_config(&self) -> MlpNetConfig {
        MlpNetConfig::new()
            .with_input_dim(self.input_dim)
            .with_num_classes(self.num_class)
    }

    /// Unlabeled batch size
    pub fn unlabeled_batch_size(&self) -> usize {
        self.batch_size * self.mu.max(1)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(NoisyMatchError::Config(msg.to_string()));

        if self.batch_size == 0 {
            return fail("batch_size must be greater than 0");
        }
        if self.epochs == 0 {
            return fail("epochs must be greater than 0");
        }
        if self.num_class < 2 {
            return fail("num_class must be at least 2");
        }
        if self.input_dim == 0 {
            return fail("input_dim must be greater than 0");
        }
        if !(self.lr > 0.0) {
            return fail("lr must be positive");
        }
        if !(0.0..1.0).contains(&self.noise_rate) {
            return fail("noise_rate must be in range [0.0, 1.0)");
        }
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return fail("threshold must be in range (0.0, 1.0]");
        }
        if !(self.temperature > 0.0) {
            return fail("temperature must be positive");
        }
        if !(0.0..1.0).contains(&self.ema_decay) {
            return fail("ema_decay must be in range [0.0, 1.0)");
        }
        if !(0.0..=1.0).contains(&self.clean_theta) {
            return fail("clean_theta must be in range [0.0, 1.0]");
        }
        if self.k == 0 {
            return fail("k must be greater than 0");
        }
        if !(self.alpha > 0.0) {
            return fail("alpha must be positive");
        }
        if !(self.warmup_ratio > 0.0 && self.warmup_ratio <= 1.0) {
            return fail("warmup_ratio must be in range (0.0, 1.0]");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ExperimentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.milestones, vec![10, 90]);
        assert_eq!(config.warmup_kind, WarmupKind::Exp);

        let model = config.model_config();
        assert_eq!(model.input_dim, 1024);
        assert_eq!(model.num_classes, 12);
        assert_eq!(model.hidden_dims, vec![512, 512]);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let config = ExperimentConfig {
            noise_rate: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ExperimentConfig {
            threshold: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ExperimentConfig {
            num_class: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("SGD".parse::<OptimizerKind>().unwrap(), OptimizerKind::Sgd);
        assert_eq!("pairflip".parse::<NoiseType>().unwrap(), NoiseType::Pairflip);
        assert_eq!("warmup-cosine".parse::<LrScheduleKind>().unwrap(), LrScheduleKind::WarmupCosine);
        assert_eq!(ImbalanceMethod::Ldam.to_string(), "ldam");
    }

    #[test]
    fn test_unknown_warmup_kind_is_config_error() {
        let err = "cubic".parse::<WarmupKind>().unwrap_err();
        assert!(matches!(err, NoisyMatchError::Config(_)));
        assert!(err.to_string().contains("linear, exp"));
    }

    #[test]
    fn test_toml_accepts_cli_names_and_aliases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(
            &path,
            concat!(
                "optimizer = \"SGD\"\n",
                "noise_type = \"sym\"\n",
                "clean_method = \"kmeans\"\n",
                "imb_method = \"LDAM\"\n",
                "lr_schedule = \"multistep\"\n",
                "warmup_kind = \"linear\"\n",
            ),
        )
        .unwrap();

        let config = ExperimentConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.optimizer, OptimizerKind::Sgd);
        assert_eq!(config.noise_type, NoiseType::Symmetric);
        assert_eq!(config.clean_method, CleanMethod::Kmeans);
        assert_eq!(config.imb_method, ImbalanceMethod::Ldam);
        assert_eq!(config.lr_schedule, LrScheduleKind::MultiStep);
        assert_eq!(config.warmup_kind, WarmupKind::Linear);

        std::fs::write(&path, "noise_type = \"asym\"\nlr_schedule = \"multi-step\"\n").unwrap();
        let config = ExperimentConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.noise_type, NoiseType::Pairflip);
        assert_eq!(config.lr_schedule, LrScheduleKind::MultiStep);
    }

    #[test]
    fn test_toml_rejects_unknown_choice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, "warmup_kind = \"cubic\"\n").unwrap();

        let err = ExperimentConfig::from_toml_file(&path).unwrap_err();
        assert!(matches!(err, NoisyMatchError::Config(_)));
        assert!(err.to_string().contains("warmup kind"));
    }

    #[test]
    fn test_json_writes_canonical_names() {
        let config = ExperimentConfig {
            noise_type: NoiseType::Pairflip,
            ..Default::default()
        };
        let json: serde_json::Value = serde_json::to_value(&config).unwrap();
        assert_eq!(json["lr_schedule"], "multistep");
        assert_eq!(json["imb_method"], "ldam");
        assert_eq!(json["noise_type"], "pairflip");
        assert_eq!(json["lr_schedule"], config.lr_schedule.to_string().as_str());
    }

    #[test]
    fn test_value_enum_matches_from_str() {
        for kind in LrScheduleKind::value_variants() {
            let name = kind.to_string();
            assert_eq!(name.parse::<LrScheduleKind>().unwrap(), *kind);
            assert_eq!(<LrScheduleKind as ValueEnum>::from_str(&name, true).unwrap(), *kind);
        }
        assert_eq!(
            <ImbalanceMethod as ValueEnum>::from_str("LDAM", true).unwrap(),
            ImbalanceMethod::Ldam
        );
        assert_eq!("cosine".parse::<LrScheduleKind>().unwrap(), LrScheduleKind::WarmupCosine);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(
            &path,
            "lr = 0.01\noptimizer = \"sgd\"\nnoise_type = \"symmetric\"\nlr_schedule = \"warmup-cosine\"\n",
        )
        .unwrap();

        let config = ExperimentConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.lr, 0.01);
        assert_eq!(config.optimizer, OptimizerKind::Sgd);
        assert_eq!(config.noise_type, NoiseType::Symmetric);
        assert_eq!(config.lr_schedule, LrScheduleKind::WarmupCosine);
        assert_eq!(config.batch_size, 128);
    }

    #[test]
    fn test_json_roundtrip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = ExperimentConfig {
            pretrain_path: Some("ckpt/best".to_string()),
            ..Default::default()
        };
        config.save_json(&path).unwrap();
        assert_eq!(ExperimentConfig::load_json(&path).unwrap(), config);
    }

    #[test]
    fn test_pretrained_checkpoint_respects_flag() {
        let mut config = ExperimentConfig {
            pretrain_path: Some("ckpt".to_string()),
            ..Default::default()
        };
        assert_eq!(config.pretrained_checkpoint(), Some("ckpt"));
        config.use_pretrain = false;
        assert_eq!(config.pretrained_checkpoint(), None);
    }
}
