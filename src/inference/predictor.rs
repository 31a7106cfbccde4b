//! Batched prediction helpers
//!
//! Every helper runs the model without gradients over a `FeatureDataset` in
//! fixed-size sequential batches and returns one entry per sample, in dataset
//! order.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::tensor::{activation::softmax, backend::Backend, Tensor, TensorData};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::{FeatureAugmenter, FeatureBatch, FeatureBatcher, FeatureDataset, FeatureItem};
use crate::model::mlp::MlpNet;
use crate::training::loss::per_sample_cross_entropy;
use crate::utils::error::{NoisyMatchError, Result};
use crate::utils::metrics::Metrics;

/// Batch size used for inference passes
pub const EVAL_BATCH_SIZE: usize = 256;

/// Predicted label and its probability for every sample
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Predictions {
    pub labels: Vec<usize>,
    pub confidences: Vec<f32>,
}

impl Predictions {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Build from probability rows
    pub fn from_probabilities(rows: &[Vec<f32>]) -> Self {
        let (labels, confidences) = rows.iter().map(|row| argmax(row)).unzip();
        Self { labels, confidences }
    }
}

/// Index and value of the largest entry (first wins on ties)
pub fn argmax(row: &[f32]) -> (usize, f32) {
    row.iter()
        .cloned()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best })
}

/// Copy a [rows, cols] tensor into row vectors
pub fn tensor_rows<B: Backend>(tensor: Tensor<B, 2>) -> Result<Vec<Vec<f32>>> {
    let [_rows, cols] = tensor.dims();
    let values: Vec<f32> = tensor
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| NoisyMatchError::Model(format!("tensor readback failed: {:?}", e)))?;
    Ok(values.chunks(cols.max(1)).map(|c| c.to_vec()).collect())
}

fn tensor_values<B: Backend>(tensor: Tensor<B, 1>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| NoisyMatchError::Model(format!("tensor readback failed: {:?}", e)))
}

/// Sequential item chunks of `dataset`
fn item_batches(dataset: &FeatureDataset) -> Vec<Vec<FeatureItem>> {
    let positions: Vec<usize> = (0..dataset.len()).collect();
    positions
        .chunks(EVAL_BATCH_SIZE)
        .map(|chunk| dataset.gather(chunk))
        .collect()
}

fn rows_tensor<B: Backend>(rows: Vec<f32>, batch_size: usize, device: &B::Device) -> Tensor<B, 2> {
    let num_features = if batch_size > 0 { rows.len() / batch_size } else { 0 };
    Tensor::from_floats(TensorData::new(rows, [batch_size, num_features]), device)
}

/// Softmax probability rows of `model` on `dataset`
pub fn predict_dataset_softmax<B: Backend>(
    model: &MlpNet<B>,
    dataset: &FeatureDataset,
    device: &B::Device,
) -> Result<Vec<Vec<f32>>> {
    let mut rows = Vec::with_capacity(dataset.len());
    for items in item_batches(dataset) {
        let batch: FeatureBatch<B> = FeatureBatcher.batch(items, device);
        rows.extend(tensor_rows(model.forward_softmax(batch.features))?);
    }
    Ok(rows)
}

/// Predicted labels and max probabilities of `model` on `dataset`
pub fn predict<B: Backend>(
    model: &MlpNet<B>,
    dataset: &FeatureDataset,
    device: &B::Device,
) -> Result<Predictions> {
    let rows = predict_dataset_softmax(model, dataset, device)?;
    Ok(Predictions::from_probabilities(&rows))
}

/// Mean softmax over two weakly augmented views of every sample
pub fn predict_softmax<B: Backend, R: Rng + ?Sized>(
    model: &MlpNet<B>,
    dataset: &FeatureDataset,
    augmenter: &FeatureAugmenter,
    rng: &mut R,
    device: &B::Device,
) -> Result<Vec<Vec<f32>>> {
    let mut rows = Vec::with_capacity(dataset.len());
    for items in item_batches(dataset) {
        let batch_size = items.len();
        let mut first = Vec::new();
        let mut second = Vec::new();
        for item in &items {
            first.extend(augmenter.weak(&item.features, rng));
            second.extend(augmenter.weak(&item.features, rng));
        }

        let probs_a = softmax(model.forward(rows_tensor::<B>(first, batch_size, device)), 1);
        let probs_b = softmax(model.forward(rows_tensor::<B>(second, batch_size, device)), 1);
        rows.extend(tensor_rows((probs_a + probs_b).div_scalar(2.0))?);
    }
    Ok(rows)
}

/// Cross-entropy of every sample against its dataset label
pub fn per_sample_losses<B: Backend>(
    model: &MlpNet<B>,
    dataset: &FeatureDataset,
    device: &B::Device,
) -> Result<Vec<f32>> {
    let mut losses = Vec::with_capacity(dataset.len());
    for items in item_batches(dataset) {
        let batch: FeatureBatch<B> = FeatureBatcher.batch(items, device);
        let logits = model.forward(batch.features);
        losses.extend(tensor_values(per_sample_cross_entropy(logits, batch.targets))?);
    }
    Ok(losses)
}

/// Test metrics of `model` on `dataset`, including the mean loss
pub fn evaluate<B: Backend>(
    model: &MlpNet<B>,
    dataset: &FeatureDataset,
    num_classes: usize,
    device: &B::Device,
) -> Result<Metrics> {
    let mut predictions = Vec::with_capacity(dataset.len());
    let mut loss_sum = 0.0f64;

    for items in item_batches(dataset) {
        let batch: FeatureBatch<B> = FeatureBatcher.batch(items, device);
        let logits = model.forward(batch.features);
        let losses = tensor_values(per_sample_cross_entropy(logits.clone(), batch.targets))?;
        loss_sum += losses.iter().map(|&l| l as f64).sum::<f64>();

        let rows = tensor_rows(softmax(logits, 1))?;
        predictions.extend(rows.iter().map(|row| argmax(row).0));
    }

    let labels = dataset.labels();
    let mut metrics = Metrics::from_predictions(&predictions, &labels, num_classes);
    if !labels.is_empty() {
        metrics.average_loss = Some(loss_sum / labels.len() as f64);
    }
    Ok(metrics)
}

#[cfg(all(test, feature = "ndarray"))]
mod tests {
    use super::*;
    use crate::model::mlp::MlpNetConfig;
    use burn_ndarray::NdArray;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    type TestBackend = NdArray;

    fn setup(n: usize) -> (MlpNet<TestBackend>, FeatureDataset) {
        let device = Default::default();
        let model = MlpNetConfig::new()
            .with_input_dim(3)
            .with_hidden_dims(vec![8])
            .with_num_classes(4)
            .with_batch_norm(false)
            .init::<TestBackend>(&device);
        let features = (0..n).map(|i| vec![i as f32 * 0.1, 1.0, -(i as f32) * 0.05]).collect();
        let labels = (0..n).map(|i| i % 4).collect();
        (model, FeatureDataset::from_parts(features, labels))
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let device = Default::default();
        // Spans more than one inference batch
        let (model, dataset) = setup(EVAL_BATCH_SIZE + 7);
        let rows = predict_dataset_softmax(&model, &dataset, &device).unwrap();
        assert_eq!(rows.len(), dataset.len());
        for row in &rows {
            assert_eq!(row.len(), 4);
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let two_view =
            predict_softmax(&model, &dataset, &FeatureAugmenter::default(), &mut rng, &device).unwrap();
        assert_eq!(two_view.len(), dataset.len());
        for row in &two_view {
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_predict_matches_softmax_argmax() {
        let device = Default::default();
        let (model, dataset) = setup(10);
        let rows = predict_dataset_softmax(&model, &dataset, &device).unwrap();
        let preds = predict(&model, &dataset, &device).unwrap();
        assert_eq!(preds.len(), 10);
        for (row, (&label, &conf)) in rows.iter().zip(preds.labels.iter().zip(preds.confidences.iter())) {
            assert_eq!(argmax(row).0, label);
            assert!((row[label] - conf).abs() < 1e-6);
        }
    }

    #[test]
    fn test_losses_and_evaluate_agree() {
        let device = Default::default();
        let (model, dataset) = setup(12);
        let losses = per_sample_losses(&model, &dataset, &device).unwrap();
        assert_eq!(losses.len(), 12);
        assert!(losses.iter().all(|l| l.is_finite() && *l >= 0.0));

        let metrics = evaluate(&model, &dataset, 4, &device).unwrap();
        assert_eq!(metrics.total_samples, 12);
        let mean = losses.iter().map(|&l| l as f64).sum::<f64>() / 12.0;
        assert!((metrics.average_loss.unwrap() - mean).abs() < 1e-4);
    }

    #[test]
    fn test_empty_dataset() {
        let device = Default::default();
        let (model, _) = setup(1);
        let empty = FeatureDataset::new(Vec::new());
        assert!(predict(&model, &empty, &device).unwrap().is_empty());
        assert_eq!(evaluate(&model, &empty, 4, &device).unwrap().total_samples, 0);
    }
}
