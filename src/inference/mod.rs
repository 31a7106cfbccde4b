//! Inference module for batched prediction
//!
//! This module provides:
//! - Softmax probabilities (plain and averaged over two weak views)
//! - Predicted labels with their confidence
//! - Per-sample losses and test metrics

pub mod predictor;

// Re-export main types for convenience
pub use predictor::{
    evaluate, per_sample_losses, predict, predict_dataset_softmax, predict_softmax, Predictions,
};
