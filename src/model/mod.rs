//! Model module for the MLP classifier using the Burn framework
//!
//! This module provides:
//! - The MLP classifier for fixed-length feature vectors
//! - Experiment configuration and hyperparameters
//! - An exponential-moving-average shadow model
//! - Checkpoint saving, loading and partial (pretrained) initialization

pub mod checkpoint;
pub mod config;
pub mod ema;
pub mod mlp;

// Re-export main types for convenience
pub use checkpoint::{load_checkpoint, load_pretrained, save_checkpoint, CheckpointMeta};
pub use config::ExperimentConfig;
pub use ema::ModelEma;
pub use mlp::{MlpNet, MlpNetConfig};
