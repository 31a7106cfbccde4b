//! Clean/noisy sample selection
//!
//! The train split is divided into samples whose (noisy) label is trusted and
//! samples that are treated as unlabeled. Two criteria are available:
//!
//! - **consistency**: the averaged weak-view prediction agrees with the label
//!   and is confident enough (`p[label] >= clean_theta`)
//! - **kmeans**: probability rows are clustered and a sample is clean when its
//!   label is the majority label of its cluster
//!
//! Every class keeps at least `min(MIN_CLEAN_PER_CLASS, class size)` clean
//! samples, chosen by the highest `p[label]`.

use burn::tensor::backend::Backend;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::{FeatureAugmenter, FeatureDataset};
use crate::inference::predictor::{argmax, predict_softmax};
use crate::model::config::{CleanMethod, ExperimentConfig};
use crate::model::mlp::MlpNet;
use crate::training::kmeans::{kmeans, DEFAULT_MAX_ITER};
use crate::utils::error::{NoisyMatchError, Result};

/// Clean samples kept per class regardless of the criterion
pub const MIN_CLEAN_PER_CLASS: usize = 5;

/// Positions (into the inspected dataset) of clean and noisy samples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanSplit {
    pub clean: Vec<usize>,
    pub noisy: Vec<usize>,
}

impl CleanSplit {
    fn from_flags(flags: &[bool]) -> Self {
        let mut split = Self::default();
        for (pos, &is_clean) in flags.iter().enumerate() {
            if is_clean {
                split.clean.push(pos);
            } else {
                split.noisy.push(pos);
            }
        }
        split
    }

    pub fn len(&self) -> usize {
        self.clean.len() + self.noisy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Selects clean samples from model predictions
#[derive(Debug, Clone)]
pub struct NoiseDetector {
    method: CleanMethod,
    clean_theta: f64,
    k: usize,
    seed: u64,
    num_classes: usize,
}

impl NoiseDetector {
    pub fn new(method: CleanMethod, clean_theta: f64, k: usize, seed: u64, num_classes: usize) -> Self {
        Self {
            method,
            clean_theta,
            k,
            seed,
            num_classes,
        }
    }

    pub fn from_config(config: &ExperimentConfig) -> Self {
        Self::new(
            config.clean_method,
            config.clean_theta,
            config.k,
            config.seed,
            config.num_class,
        )
    }

    pub fn method(&self) -> CleanMethod {
        self.method
    }

    /// Split from probability rows and the (noisy) labels of the same samples
    pub fn detect_from_probs(&self, probs: &[Vec<f32>], labels: &[usize]) -> Result<CleanSplit> {
        if probs.len() != labels.len() {
            return Err(NoisyMatchError::InvalidInput(format!(
                "{} probability rows for {} labels",
                probs.len(),
                labels.len()
            )));
        }
        if let Some(&bad) = labels.iter().find(|&&l| l >= self.num_classes) {
            return Err(NoisyMatchError::InvalidInput(format!(
                "label {} out of range for {} classes",
                bad, self.num_classes
            )));
        }
        if probs.is_empty() {
            return Ok(CleanSplit::default());
        }

        let mut flags = match self.method {
            CleanMethod::Consistency => self.consistency_flags(probs, labels),
            CleanMethod::Kmeans => self.kmeans_flags(probs, labels)?,
        };
        self.apply_class_floor(&mut flags, probs, labels);

        Ok(CleanSplit::from_flags(&flags))
    }

    /// Split `dataset` using the averaged softmax of two weak views
    pub fn detect<B: Backend, R: Rng + ?Sized>(
        &self,
        model: &MlpNet<B>,
        dataset: &FeatureDataset,
        augmenter: &FeatureAugmenter,
        rng: &mut R,
        device: &B::Device,
    ) -> Result<CleanSplit> {
        let probs = predict_softmax(model, dataset, augmenter, rng, device)?;
        self.detect_from_probs(&probs, &dataset.labels())
    }

    fn consistency_flags(&self, probs: &[Vec<f32>], labels: &[usize]) -> Vec<bool> {
        let theta = self.clean_theta as f32;
        probs
            .iter()
            .zip(labels.iter())
            .map(|(row, &label)| {
                let predicted = argmax(row).0;
                predicted == label && row[label] >= theta
            })
            .collect()
    }

    fn kmeans_flags(&self, probs: &[Vec<f32>], labels: &[usize]) -> Result<Vec<bool>> {
        let clusters = kmeans(probs, self.k, DEFAULT_MAX_ITER, self.seed)?;

        let majority: Vec<Option<usize>> = clusters
            .members()
            .iter()
            .map(|members| {
                let mut counts = vec![0usize; self.num_classes];
                for &pos in members {
                    counts[labels[pos]] += 1;
                }
                // Ties go to the smaller class index
                counts
                    .iter()
                    .enumerate()
                    .filter(|(_, &n)| n > 0)
                    .fold(None, |best: Option<(usize, usize)>, (c, &n)| match best {
                        Some((_, m)) if m >= n => best,
                        _ => Some((c, n)),
                    })
                    .map(|(c, _)| c)
            })
            .collect();

        debug!("k-means clean selection: cluster labels {:?}", majority);

        Ok(clusters
            .assignments
            .iter()
            .zip(labels.iter())
            .map(|(&cluster, &label)| majority[cluster] == Some(label))
            .collect())
    }

    fn apply_class_floor(&self, flags: &mut [bool], probs: &[Vec<f32>], labels: &[usize]) {
        for class in 0..self.num_classes {
            let members: Vec<usize> = (0..labels.len()).filter(|&pos| labels[pos] == class).collect();
            let floor = MIN_CLEAN_PER_CLASS.min(members.len());
            let kept = members.iter().filter(|&&pos| flags[pos]).count();
            if kept >= floor {
                continue;
            }

            let mut candidates: Vec<usize> = members.into_iter().filter(|&pos| !flags[pos]).collect();
            candidates.sort_by(|&a, &b| probs[b][class].total_cmp(&probs[a][class]));
            for pos in candidates.into_iter().take(floor - kept) {
                flags[pos] = true;
            }
        }
    }
}

/// Quality of a clean selection against the true labels
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoiseReport {
    pub num_clean: usize,
    pub num_noisy: usize,
    /// Fraction of selected clean samples whose label is actually correct
    pub precision: f64,
    /// Fraction of correctly labeled samples that were selected as clean
    pub recall: f64,
    /// Fraction of inspected samples whose label is wrong
    pub true_noise_rate: f64,
}

impl NoiseReport {
    /// `noisy_labels` and `clean_labels` are aligned with the split positions
    pub fn new(split: &CleanSplit, noisy_labels: &[usize], clean_labels: &[usize]) -> Self {
        let is_correct = |pos: usize| noisy_labels[pos] == clean_labels[pos];

        let selected_correct = split.clean.iter().filter(|&&pos| is_correct(pos)).count();
        let total = split.len();
        let total_correct = (0..total).filter(|&pos| is_correct(pos)).count();

        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };

        Self {
            num_clean: split.clean.len(),
            num_noisy: split.noisy.len(),
            precision: ratio(selected_correct, split.clean.len()),
            recall: ratio(selected_correct, total_correct),
            true_noise_rate: ratio(total - total_correct, total),
        }
    }
}

impl std::fmt::Display for NoiseReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "clean {} / noisy {} | precision {:.2}% recall {:.2}% | true noise rate {:.2}%",
            self.num_clean,
            self.num_noisy,
            self.precision * 100.0,
            self.recall * 100.0,
            self.true_noise_rate * 100.0
        )
    }
}
