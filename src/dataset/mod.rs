//! Dataset module for feature-vector data handling
//!
//! This module provides functionality for:
//! - Loading train/test splits from CSV (or generating a synthetic one)
//! - Injecting label noise while keeping the clean labels
//! - Burn `Dataset`/`Batcher` integration with weak and strong views
//! - Index batching with optional class-balanced resampling

pub mod augmentation;
pub mod burn_dataset;
pub mod loader;
pub mod noise;
pub mod sampler;
pub mod synthetic;

// Re-export main types for convenience
pub use augmentation::{AugmentStrength, AugmentationConfig, FeatureAugmenter};
pub use burn_dataset::{AugmentingBatcher, FeatureBatch, FeatureBatcher, FeatureDataset, FeatureItem};
pub use loader::{get_dataset, DatasetBundle};
pub use sampler::BatchLoader;

/// Class distribution of the 12-family malware dataset
pub const MALWARE_CLASS_DIST: [f64; 12] = [
    0.14, 0.15, 0.15, 0.12, 0.15, 0.09, 0.01, 0.12, 0.03, 0.02, 0.01, 0.01,
];
