//! # noisymatch
//!
//! Semi-supervised learning on noisy, class-imbalanced feature vectors using
//! the Burn framework.
//!
//! ## Features
//!
//! - **Label noise** injection (symmetric or pair-flip) with the clean labels kept
//!   for reporting
//! - **Clean sample selection** by prediction consistency or k-means clustering
//! - **FixMatch-style training** with confidence-thresholded pseudo-labels
//! - **Imbalance handling** through resampling, mixup or LDAM margins
//! - **EMA model** for evaluation
//!
//! ## Modules
//!
//! - `dataset`: CSV/synthetic loading, label noise, batching and augmentation
//! - `model`: MLP classifier, EMA copy, checkpoints and experiment configuration
//! - `training`: Training driver, noise detection, pseudo-labeling, losses and scheduling
//! - `inference`: Batched prediction helpers
//! - `utils`: Logging, metrics, scalar summaries and error types
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use noisymatch::dataset::get_dataset;
//! use noisymatch::model::ExperimentConfig;
//!
//! let config = ExperimentConfig { dataset: "synthetic".into(), ..Default::default() };
//! let bundle = get_dataset(config.data_root.as_ref(), &config.dataset, &config)?;
//! let model = config.model_config().init::<TrainingBackend>(&device);
//! // ... build an optimizer and scheduler, then OurMatch::new(...).run(&bundle)
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{DatasetBundle, FeatureBatch, FeatureBatcher, FeatureDataset, FeatureItem};
pub use model::config::ExperimentConfig;
pub use model::{MlpNet, MlpNetConfig, ModelEma};
pub use training::{LrScheduler, OurMatch, RunSummary};
pub use utils::error::{NoisyMatchError, Result};
pub use utils::metrics::{AverageMeter, Metrics};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
