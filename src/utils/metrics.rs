//! Metrics Module for Model Evaluation
//!
//! Provides running averages for training losses and evaluation metrics
//! suited to class-imbalanced data:
//! - Overall and balanced accuracy (mean per-class recall)
//! - Per-class precision, recall, F1-score
//! - Confusion Matrix

use serde::{Deserialize, Serialize};

/// Computes and stores the average and current value of a scalar series
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AverageMeter {
    /// Last value passed to `update`
    pub val: f64,
    /// Running average (sum / count)
    pub avg: f64,
    /// Weighted sum of all values
    pub sum: f64,
    /// Total weight (number of samples)
    pub count: usize,
}

impl AverageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record `val` observed over `n` samples
    pub fn update(&mut self, val: f64, n: usize) {
        self.val = val;
        self.sum += val * n as f64;
        self.count += n;
        if self.count > 0 {
            self.avg = self.sum / self.count as f64;
        }
    }
}

/// Evaluation metrics for a classification run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    /// Total number of samples evaluated
    pub total_samples: usize,

    /// Number of correct predictions
    pub correct_predictions: usize,

    /// Overall accuracy (correct / total)
    pub accuracy: f64,

    /// Mean of per-class recall over classes present in the ground truth
    pub balanced_accuracy: f64,

    /// Macro-averaged F1-score
    pub macro_f1: f64,

    /// Average loss over all samples (set by the evaluator)
    pub average_loss: Option<f64>,

    /// Per-class metrics
    pub per_class: Vec<ClassMetrics>,

    /// Confusion matrix
    pub confusion_matrix: ConfusionMatrix,
}

impl Metrics {
    /// Create new metrics from predictions and ground truth labels
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Self {
        assert_eq!(
            predictions.len(),
            ground_truth.len(),
            "Predictions and ground truth must have same length"
        );

        let total_samples = predictions.len();
        if total_samples == 0 {
            return Self::empty(num_classes);
        }

        let confusion_matrix =
            ConfusionMatrix::from_predictions(predictions, ground_truth, num_classes);
        let correct_predictions = confusion_matrix.correct();
        let accuracy = correct_predictions as f64 / total_samples as f64;

        let per_class: Vec<ClassMetrics> = (0..num_classes)
            .map(|class_idx| ClassMetrics::from_confusion_matrix(&confusion_matrix, class_idx))
            .collect();

        let present: Vec<&ClassMetrics> = per_class.iter().filter(|m| m.support > 0).collect();
        let (balanced_accuracy, macro_f1) = if present.is_empty() {
            (0.0, 0.0)
        } else {
            let n = present.len() as f64;
            (
                present.iter().map(|m| m.recall).sum::<f64>() / n,
                present.iter().map(|m| m.f1).sum::<f64>() / n,
            )
        };

        Self {
            total_samples,
            correct_predictions,
            accuracy,
            balanced_accuracy,
            macro_f1,
            average_loss: None,
            per_class,
            confusion_matrix,
        }
    }

    fn empty(num_classes: usize) -> Self {
        Self {
            total_samples: 0,
            correct_predictions: 0,
            accuracy: 0.0,
            balanced_accuracy: 0.0,
            macro_f1: 0.0,
            average_loss: None,
            per_class: Vec::new(),
            confusion_matrix: ConfusionMatrix::new(num_classes),
        }
    }

    /// Pretty print metrics
    pub fn display(&self) -> String {
        let mut output = String::new();

        output.push_str("╔══════════════════════════════════════════════════════════════╗\n");
        output.push_str("║                    Evaluation Metrics                        ║\n");
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        output.push_str(&format!("║ Accuracy:          {:6.2}%                                  ║\n", self.accuracy * 100.0));
        output.push_str(&format!("║ Balanced Accuracy: {:6.2}%                                  ║\n", self.balanced_accuracy * 100.0));
        output.push_str(&format!("║ Macro F1:          {:6.2}%                                  ║\n", self.macro_f1 * 100.0));
        if let Some(loss) = self.average_loss {
            output.push_str(&format!("║ Average Loss:      {:8.4}                                  ║\n", loss));
        }
        output.push_str(&format!("║ Total Samples:     {:6}                                    ║\n", self.total_samples));
        output.push_str("╚══════════════════════════════════════════════════════════════╝\n");

        for class in self.per_class.iter().filter(|m| m.support > 0) {
            output.push_str(&format!(
                "  class {:>3}: recall {:6.2}%  precision {:6.2}%  support {}\n",
                class.class_idx,
                class.recall * 100.0,
                class.precision * 100.0,
                class.support
            ));
        }

        output
    }
}

impl std::fmt::Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Per-class metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    /// Class index
    pub class_idx: usize,

    /// True positives
    pub true_positives: usize,

    /// False positives
    pub false_positives: usize,

    /// False negatives
    pub false_negatives: usize,

    /// Precision = TP / (TP + FP)
    pub precision: f64,

    /// Recall = TP / (TP + FN)
    pub recall: f64,

    /// F1 = 2 * (precision * recall) / (precision + recall)
    pub f1: f64,

    /// Support = number of actual samples of this class
    pub support: usize,
}

impl ClassMetrics {
    /// Calculate metrics for a class from confusion matrix
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class_idx: usize) -> Self {
        let true_positives = cm.get(class_idx, class_idx);

        // Predicted as this class but actually other classes
        let false_positives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(i, class_idx))
            .sum();

        // Actually this class but predicted as other classes
        let false_negatives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(class_idx, i))
            .sum();

        let support = true_positives + false_negatives;

        let precision = if true_positives + false_positives > 0 {
            true_positives as f64 / (true_positives + false_positives) as f64
        } else {
            0.0
        };

        let recall = if support > 0 {
            true_positives as f64 / support as f64
        } else {
            0.0
        };

        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            class_idx,
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1,
            support,
        }
    }
}

/// Confusion Matrix for multi-class classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Number of classes
    pub num_classes: usize,

    /// Matrix data (row = actual, column = predicted), row-major
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    /// Create a new empty confusion matrix
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Create confusion matrix from predictions and ground truth
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Self {
        let mut cm = Self::new(num_classes);

        for (&pred, &actual) in predictions.iter().zip(ground_truth.iter()) {
            cm.add(actual, pred);
        }

        cm
    }

    /// Add a single prediction to the matrix
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            let idx = actual * self.num_classes + predicted;
            self.matrix[idx] += 1;
        }
    }

    /// Get the count at (actual, predicted)
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    /// Get the total count
    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Get the number of correct predictions (diagonal sum)
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    /// Get overall accuracy
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.correct() as f64 / total as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_meter_running_average() {
        let mut meter = AverageMeter::new();
        meter.update(2.0, 1);
        meter.update(4.0, 3);

        assert_eq!(meter.val, 4.0);
        assert_eq!(meter.count, 4);
        assert!((meter.sum - 14.0).abs() < 1e-12);
        assert!((meter.avg - meter.sum / meter.count as f64).abs() < 1e-12);
        assert!((meter.avg - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_average_meter_repeated_updates() {
        let mut meter = AverageMeter::new();
        for i in 1..=10 {
            meter.update(i as f64, 2);
            assert!((meter.avg - meter.sum / meter.count as f64).abs() < 1e-12);
        }
        assert!((meter.avg - 5.5).abs() < 1e-12);
    }

    #[test]
    fn test_average_meter_zero_weight_and_reset() {
        let mut meter = AverageMeter::new();
        meter.update(7.0, 0);
        assert_eq!(meter.count, 0);
        assert_eq!(meter.avg, 0.0);
        assert_eq!(meter.val, 7.0);

        meter.update(1.0, 5);
        meter.reset();
        assert_eq!(meter, AverageMeter::default());
    }

    #[test]
    fn test_metrics_balanced_accuracy() {
        // Class 0 dominates; class 1 is always wrong
        let predictions = vec![0, 0, 0, 0, 0, 0];
        let ground_truth = vec![0, 0, 0, 0, 1, 1];
        let metrics = Metrics::from_predictions(&predictions, &ground_truth, 2);

        assert!((metrics.accuracy - 4.0 / 6.0).abs() < 1e-9);
        assert!((metrics.balanced_accuracy - 0.5).abs() < 1e-9);
        assert_eq!(metrics.per_class[1].support, 2);
        assert_eq!(metrics.per_class[1].recall, 0.0);
    }

    #[test]
    fn test_metrics_empty() {
        let metrics = Metrics::from_predictions(&[], &[], 3);
        assert_eq!(metrics.total_samples, 0);
        assert_eq!(metrics.accuracy, 0.0);
        assert_eq!(metrics.confusion_matrix.num_classes, 3);
    }

    #[test]
    fn test_confusion_matrix() {
        let cm = ConfusionMatrix::from_predictions(&[0, 1, 2, 1], &[0, 1, 1, 1], 3);
        assert_eq!(cm.get(1, 2), 1);
        assert_eq!(cm.correct(), 3);
        assert_eq!(cm.total(), 4);
        assert!((cm.accuracy() - 0.75).abs() < 1e-9);
    }
}
