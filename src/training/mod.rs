//! Training module for semi-supervised learning on noisy labels
//!
//! This module provides:
//! - The training driver (`OurMatch`) with supervised warmup and
//!   semi-supervised epochs
//! - Clean/noisy sample selection
//! - Pseudo-labeling with temperature, threshold and distribution alignment
//! - Imbalance-aware labeled losses (resampling, mixup, LDAM)
//! - Learning rate scheduling
//!
//! ## Semi-Supervised Learning Approach
//!
//! 1. Train on all samples with their noisy labels for a few warmup epochs
//! 2. Split the train set into clean (labeled) and noisy (unlabeled) samples
//! 3. Pseudo-label weak views of the noisy samples, keep confident ones
//! 4. Train on clean samples plus strong views against the pseudo-labels
//! 5. Repeat the split every epoch

pub mod imbalance;
pub mod kmeans;
pub mod loss;
pub mod noise_detect;
pub mod our_match;
pub mod pseudo_label;
pub mod scheduler;

// Re-export main types for convenience
pub use imbalance::ImbalanceHandler;
pub use noise_detect::{CleanSplit, NoiseDetector, NoiseReport};
pub use our_match::{OurMatch, RunSummary, TrainingState};
pub use pseudo_label::{PseudoLabelConfig, PseudoLabelStats, PseudoLabeler};
pub use scheduler::{warmup_cosine_ratio, LrSchedule, LrScheduler};
