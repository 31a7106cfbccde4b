//! Model checkpointing
//!
//! A checkpoint named `<name>` in a directory consists of:
//! - `<name>.mpk`: the Burn record written by `CompactRecorder`
//! - `<name>.json`: the `MlpNetConfig` needed to rebuild the model
//! - `<name>.meta.json`: epoch and accuracy metadata
//!
//! Loaders accept either the base path or the `.mpk` record path. Weights are
//! stored at half precision.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use burn::{
    config::Config,
    module::{Module, Param, RunningState},
    nn::{BatchNorm, Linear},
    record::CompactRecorder,
    tensor::{backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::mlp::{MlpNet, MlpNetConfig};
use crate::utils::error::{NoisyMatchError, Result};

/// Metadata stored next to a checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    /// Epoch (0-indexed) the checkpoint was taken after
    pub epoch: usize,
    /// Test accuracy at that epoch
    pub accuracy: f64,
    /// Best test accuracy of the run so far
    pub best_accuracy: f64,
    pub num_classes: usize,
    pub timestamp: String,
}

impl CheckpointMeta {
    pub fn new(epoch: usize, accuracy: f64, best_accuracy: f64, num_classes: usize) -> Self {
        Self {
            epoch,
            accuracy,
            best_accuracy,
            num_classes,
            timestamp: chrono::Local::now().to_rfc3339(),
        }
    }
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Checkpoint base path for `path`, which may name the `.mpk` record itself
pub fn checkpoint_base(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|ext| ext == "mpk") {
        path.with_extension("")
    } else {
        path.to_path_buf()
    }
}

/// Path of the model config file for a checkpoint base path
pub fn config_path(base: &Path) -> PathBuf {
    with_suffix(base, ".json")
}

/// Path of the metadata file for a checkpoint base path
pub fn meta_path(base: &Path) -> PathBuf {
    with_suffix(base, ".meta.json")
}

/// Save `model` as checkpoint `<dir>/<name>` and return the base path
pub fn save_checkpoint<B: Backend>(
    model: &MlpNet<B>,
    config: &MlpNetConfig,
    meta: &CheckpointMeta,
    dir: &Path,
    name: &str,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let base = dir.join(name);

    let recorder = CompactRecorder::new();
    model
        .clone()
        .save_file(base.clone(), &recorder)
        .map_err(|e| NoisyMatchError::Checkpoint(format!("Failed to save model: {:?}", e)))?;

    config.save(config_path(&base))?;
    std::fs::write(meta_path(&base), serde_json::to_string_pretty(meta)?)?;

    debug!("Checkpoint saved to {:?} (epoch {})", base, meta.epoch + 1);
    Ok(base)
}

/// Load the model config of a checkpoint
pub fn load_config(base: &Path) -> Result<MlpNetConfig> {
    let path = config_path(&checkpoint_base(base));
    if !path.exists() {
        return Err(NoisyMatchError::PathNotFound(path));
    }
    MlpNetConfig::load(&path)
        .map_err(|e| NoisyMatchError::Checkpoint(format!("Invalid model config {:?}: {}", path, e)))
}

pub fn load_meta(base: &Path) -> Result<CheckpointMeta> {
    let path = meta_path(&checkpoint_base(base));
    if !path.exists() {
        return Err(NoisyMatchError::PathNotFound(path));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Rebuild a model from a checkpoint using its stored config
pub fn load_checkpoint<B: Backend>(
    base: &Path,
    device: &B::Device,
) -> Result<(MlpNet<B>, MlpNetConfig)> {
    let base = checkpoint_base(base);
    let config = load_config(&base)?;
    let recorder = CompactRecorder::new();
    let model = config
        .init::<B>(device)
        .load_file(base.clone(), &recorder, device)
        .map_err(|e| NoisyMatchError::Checkpoint(format!("Failed to load model: {:?}", e)))?;

    info!("Loaded checkpoint {:?}", base);
    Ok((model, config))
}

/// Initialize `model` from a pretrained checkpoint
///
/// Only tensors whose layer exists in both models and whose shapes match are
/// copied; everything else keeps its initialization. Returns the updated
/// model and the number of tensors copied.
pub fn load_pretrained<B: Backend>(
    model: MlpNet<B>,
    base: &Path,
    device: &B::Device,
) -> Result<(MlpNet<B>, usize)> {
    let (source, _) = load_checkpoint::<B>(base, device)?;
    let mut copied = 0;
    let mut model = model;

    let hidden = std::mem::take(&mut model.hidden);
    model.hidden = hidden
        .into_iter()
        .enumerate()
        .map(|(i, mut block)| {
            if let Some(src) = source.hidden.get(i) {
                block.linear = copy_linear(block.linear, &src.linear, &mut copied);
                block.bn = match (block.bn, &src.bn) {
                    (Some(dst), Some(src)) => Some(copy_batch_norm(dst, src, &mut copied)),
                    (bn, _) => bn,
                };
            }
            block
        })
        .collect();
    model.output = copy_linear(model.output, &source.output, &mut copied);

    info!(
        "Pretrained weights from {:?}: {} of {} tensors copied",
        base,
        copied,
        tensor_count(&model)
    );
    Ok((model, copied))
}

/// Number of parameter and running-state tensors in a model
pub fn tensor_count<B: Backend>(model: &MlpNet<B>) -> usize {
    let linear = |l: &Linear<B>| 1 + usize::from(l.bias.is_some());
    model
        .hidden
        .iter()
        .map(|b| linear(&b.linear) + if b.bn.is_some() { 4 } else { 0 })
        .sum::<usize>()
        + linear(&model.output)
}

fn copy_linear<B: Backend>(dst: Linear<B>, src: &Linear<B>, copied: &mut usize) -> Linear<B> {
    let mut linear = dst;
    linear.weight = copy_param(linear.weight, &src.weight, copied);
    linear.bias = match (linear.bias, &src.bias) {
        (Some(dst), Some(src)) => Some(copy_param(dst, src, copied)),
        (bias, _) => bias,
    };
    linear
}

fn copy_batch_norm<B: Backend>(
    dst: BatchNorm<B, 1>,
    src: &BatchNorm<B, 1>,
    copied: &mut usize,
) -> BatchNorm<B, 1> {
    let mut bn = dst;
    bn.gamma = copy_param(bn.gamma, &src.gamma, copied);
    bn.beta = copy_param(bn.beta, &src.beta, copied);
    bn.running_mean = copy_state(bn.running_mean, &src.running_mean, copied);
    bn.running_var = copy_state(bn.running_var, &src.running_var, copied);
    bn
}

fn copy_param<B: Backend, const D: usize>(
    dst: Param<Tensor<B, D>>,
    src: &Param<Tensor<B, D>>,
    copied: &mut usize,
) -> Param<Tensor<B, D>> {
    let value = src.val();
    if value.dims() != dst.val().dims() {
        return dst;
    }
    *copied += 1;
    dst.map(|_| value.detach().require_grad())
}

fn copy_state<B: Backend>(
    dst: RunningState<Tensor<B, 1>>,
    src: &RunningState<Tensor<B, 1>>,
    copied: &mut usize,
) -> RunningState<Tensor<B, 1>> {
    let value = src.value();
    if value.dims() != dst.value().dims() {
        return dst;
    }
    *copied += 1;
    RunningState::new(value)
}
