//! Pseudo-Labeling for the unlabeled (noisy) samples
//!
//! ## Algorithm Overview
//!
//! 1. Sharpen the weak-view prediction: `p = softmax(logits / T)`
//! 2. Optionally align `p` to a known class distribution:
//!    `p ∝ p * target_dist / running_model_dist`
//! 3. Pseudo-label = `argmax p`, accepted when `max p >= threshold`
//! 4. Track pseudo-label quality against the clean labels

use burn::tensor::{backend::Backend, Int, Tensor, TensorData};
use serde::{Deserialize, Serialize};

use crate::inference::predictor::{argmax, tensor_rows};
use crate::model::config::ExperimentConfig;
use crate::utils::error::Result;

/// Momentum of the running model class distribution
pub const DIST_MOMENTUM: f64 = 0.999;

/// Configuration for pseudo-labeling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PseudoLabelConfig {
    /// Confidence threshold for accepting predictions
    pub threshold: f64,
    /// Softmax temperature
    pub temperature: f64,
    /// Class distribution to align to, if any
    pub target_distribution: Option<Vec<f64>>,
}

impl PseudoLabelConfig {
    pub fn from_experiment(config: &ExperimentConfig, dist: &[f64]) -> Self {
        Self {
            threshold: config.threshold,
            temperature: config.temperature,
            target_distribution: config.use_true_distribution.then(|| dist.to_vec()),
        }
    }
}

/// Pseudo-labels for one unlabeled batch
#[derive(Debug, Clone)]
pub struct PseudoLabels<B: Backend> {
    /// Pseudo-label per row, shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
    /// 1.0 where the label is confident enough, shape [batch_size]
    pub mask: Tensor<B, 1>,
    pub labels: Vec<usize>,
    pub confidences: Vec<f32>,
    pub accepted: Vec<bool>,
}

/// Pseudo-labeler with distribution alignment state
#[derive(Debug, Clone)]
pub struct PseudoLabeler {
    config: PseudoLabelConfig,
    /// Running mean of the model's predicted class distribution
    model_distribution: Vec<f64>,
    stats: PseudoLabelStats,
}

impl PseudoLabeler {
    pub fn new(config: PseudoLabelConfig, num_classes: usize) -> Self {
        Self {
            config,
            model_distribution: vec![1.0 / num_classes.max(1) as f64; num_classes],
            stats: PseudoLabelStats::default(),
        }
    }

    pub fn config(&self) -> &PseudoLabelConfig {
        &self.config
    }

    pub fn model_distribution(&self) -> &[f64] {
        &self.model_distribution
    }

    /// Sharpened (and aligned) probability rows for `logits`
    ///
    /// Updates the running model distribution when alignment is enabled.
    pub fn probabilities(&mut self, logits: &[Vec<f32>]) -> Vec<Vec<f32>> {
        let t = self.config.temperature as f32;
        let mut rows: Vec<Vec<f32>> = logits.iter().map(|row| softmax_row(row, t)).collect();

        if let Some(target) = &self.config.target_distribution {
            if !rows.is_empty() && target.len() == self.model_distribution.len() {
                let n = rows.len() as f64;
                for (c, running) in self.model_distribution.iter_mut().enumerate() {
                    let batch_mean = rows.iter().map(|r| r[c] as f64).sum::<f64>() / n;
                    *running = DIST_MOMENTUM * *running + (1.0 - DIST_MOMENTUM) * batch_mean;
                }

                let factors: Vec<f32> = target
                    .iter()
                    .zip(self.model_distribution.iter())
                    .map(|(t, m)| (t / m.max(1e-6)) as f32)
                    .collect();
                for row in rows.iter_mut() {
                    for (p, f) in row.iter_mut().zip(factors.iter()) {
                        *p *= f;
                    }
                    let sum: f32 = row.iter().sum();
                    if sum > 0.0 {
                        row.iter_mut().for_each(|p| *p /= sum);
                    }
                }
            }
        }

        rows
    }

    /// Pseudo-labels for the weak-view `logits` of an unlabeled batch
    pub fn generate<B: Backend>(&mut self, logits: Tensor<B, 2>) -> Result<PseudoLabels<B>> {
        let device = logits.device();
        let rows = tensor_rows(logits.detach())?;
        let probs = self.probabilities(&rows);

        let threshold = self.config.threshold as f32;
        let (labels, confidences): (Vec<usize>, Vec<f32>) = probs.iter().map(|row| argmax(row)).unzip();
        let accepted: Vec<bool> = confidences.iter().map(|&c| c >= threshold).collect();

        let batch_size = labels.len();
        let targets_data: Vec<i64> = labels.iter().map(|&l| l as i64).collect();
        let mask_data: Vec<f32> = accepted.iter().map(|&a| if a { 1.0 } else { 0.0 }).collect();

        Ok(PseudoLabels {
            targets: Tensor::from_data(TensorData::new(targets_data, [batch_size]), &device),
            mask: Tensor::from_floats(TensorData::new(mask_data, [batch_size]), &device),
            labels,
            confidences,
            accepted,
        })
    }

    /// Record pseudo-label quality against the clean labels of the batch
    pub fn record(&mut self, labels: &[usize], accepted: &[bool], clean: &[usize]) {
        for ((&label, &ok), &truth) in labels.iter().zip(accepted.iter()).zip(clean.iter()) {
            self.stats.total_processed += 1;
            if !ok {
                self.stats.rejected_low_confidence += 1;
                continue;
            }
            self.stats.total_accepted += 1;
            if label == truth {
                self.stats.correct_predictions += 1;
            } else {
                self.stats.incorrect_predictions += 1;
            }
        }
    }

    /// Get statistics about pseudo-labeling
    pub fn stats(&self) -> &PseudoLabelStats {
        &self.stats
    }

    /// Reset statistics (alignment state is kept)
    pub fn reset_stats(&mut self) {
        self.stats = PseudoLabelStats::default();
    }
}

fn softmax_row(logits: &[f32], temperature: f32) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = logits.iter().map(|&l| ((l - max) / temperature).exp()).collect();
    let sum: f32 = exp.iter().sum();
    exp.into_iter().map(|e| e / sum).collect()
}

/// Statistics about pseudo-labeling quality
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PseudoLabelStats {
    /// Total unlabeled samples seen
    pub total_processed: usize,

    /// Total pseudo-labels accepted
    pub total_accepted: usize,

    /// Rejected due to low confidence
    pub rejected_low_confidence: usize,

    /// Accepted labels matching the clean label
    pub correct_predictions: usize,

    /// Accepted labels differing from the clean label
    pub incorrect_predictions: usize,
}

impl PseudoLabelStats {
    /// Calculate acceptance rate
    pub fn acceptance_rate(&self) -> f64 {
        if self.total_processed == 0 {
            return 0.0;
        }
        self.total_accepted as f64 / self.total_processed as f64
    }

    /// Calculate accuracy of accepted pseudo-labels
    pub fn accuracy(&self) -> f64 {
        if self.total_accepted == 0 {
            return 0.0;
        }
        self.correct_predictions as f64 / self.total_accepted as f64
    }
}

impl std::fmt::Display for PseudoLabelStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "pseudo-labels: {}/{} accepted ({:.1}%), accuracy {:.1}% ({} correct, {} incorrect)",
            self.total_accepted,
            self.total_processed,
            self.acceptance_rate() * 100.0,
            self.accuracy() * 100.0,
            self.correct_predictions,
            self.incorrect_predictions
        )
    }
}
