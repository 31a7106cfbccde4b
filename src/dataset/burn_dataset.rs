//! Burn Dataset Integration for feature vectors
//!
//! This module implements Burn's Dataset trait and Batcher for in-memory
//! feature datasets.
//!
//! - `FeatureBatcher`: stacks items into a batch as-is (labeled loss, evaluation)
//! - `AugmentingBatcher`: applies a weak or strong augmentation while batching

use std::sync::Mutex;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::augmentation::{AugmentStrength, FeatureAugmenter};

/// A single training sample
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureItem {
    /// Position in the original split (preserved through subsetting)
    pub index: usize,
    /// Feature vector
    pub features: Vec<f32>,
    /// Class label (possibly corrupted)
    pub label: usize,
}

impl FeatureItem {
    pub fn new(index: usize, features: Vec<f32>, label: usize) -> Self {
        Self {
            index,
            features,
            label,
        }
    }
}

/// In-memory feature dataset implementing Burn's Dataset trait
#[derive(Debug, Clone, Default)]
pub struct FeatureDataset {
    items: Vec<FeatureItem>,
}

impl FeatureDataset {
    pub fn new(items: Vec<FeatureItem>) -> Self {
        Self { items }
    }

    /// Build from parallel feature/label vectors; indices are positions
    pub fn from_parts(features: Vec<Vec<f32>>, labels: Vec<usize>) -> Self {
        let items = features
            .into_iter()
            .zip(labels)
            .enumerate()
            .map(|(index, (features, label))| FeatureItem::new(index, features, label))
            .collect();
        Self { items }
    }

    pub fn items(&self) -> &[FeatureItem] {
        &self.items
    }

    /// Items at the given positions of this dataset
    pub fn subset(&self, positions: &[usize]) -> Self {
        let items = positions
            .iter()
            .filter_map(|&i| self.items.get(i).cloned())
            .collect();
        Self { items }
    }

    /// Copy of this dataset with its labels replaced
    pub fn with_labels(&self, labels: &[usize]) -> Self {
        let items = self
            .items
            .iter()
            .zip(labels.iter())
            .map(|(item, &label)| FeatureItem {
                label,
                ..item.clone()
            })
            .collect();
        Self { items }
    }

    pub fn labels(&self) -> Vec<usize> {
        self.items.iter().map(|item| item.label).collect()
    }

    /// Original indices of the items
    pub fn indices(&self) -> Vec<usize> {
        self.items.iter().map(|item| item.index).collect()
    }

    /// Samples per class count
    pub fn class_counts(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0usize; num_classes];
        for item in &self.items {
            if item.label < num_classes {
                counts[item.label] += 1;
            }
        }
        counts
    }

    pub fn num_features(&self) -> usize {
        self.items.first().map(|item| item.features.len()).unwrap_or(0)
    }

    /// Items at the given positions, for handing to a batcher
    pub fn gather(&self, positions: &[usize]) -> Vec<FeatureItem> {
        positions
            .iter()
            .filter_map(|&i| self.items.get(i).cloned())
            .collect()
    }
}

impl Dataset<FeatureItem> for FeatureDataset {
    fn get(&self, index: usize) -> Option<FeatureItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// A batch of feature vectors
#[derive(Clone, Debug)]
pub struct FeatureBatch<B: Backend> {
    /// Features with shape [batch_size, num_features]
    pub features: Tensor<B, 2>,
    /// Labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
    /// Original indices of the items
    pub indices: Vec<usize>,
}

fn stack_items<B: Backend>(
    items: &[FeatureItem],
    features: Vec<f32>,
    device: &B::Device,
) -> FeatureBatch<B> {
    let batch_size = items.len();
    let num_features = if batch_size > 0 {
        features.len() / batch_size
    } else {
        0
    };

    let features = Tensor::<B, 2>::from_floats(
        TensorData::new(features, [batch_size, num_features]),
        device,
    );

    let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
    let targets =
        Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

    FeatureBatch {
        features,
        targets,
        indices: items.iter().map(|item| item.index).collect(),
    }
}

/// Batcher for feature items without augmentation
#[derive(Clone, Debug, Default)]
pub struct FeatureBatcher;

impl FeatureBatcher {
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Batcher<B, FeatureItem, FeatureBatch<B>> for FeatureBatcher {
    fn batch(&self, items: Vec<FeatureItem>, device: &B::Device) -> FeatureBatch<B> {
        let features: Vec<f32> = items.iter().flat_map(|item| item.features.clone()).collect();
        stack_items(&items, features, device)
    }
}

/// Batcher that augments every item while batching
///
/// The RNG sits behind a mutex because `Batcher::batch` takes `&self`.
#[derive(Debug)]
pub struct AugmentingBatcher {
    augmenter: FeatureAugmenter,
    strength: AugmentStrength,
    rng: Mutex<ChaCha8Rng>,
}

impl AugmentingBatcher {
    pub fn new(augmenter: FeatureAugmenter, strength: AugmentStrength, seed: u64) -> Self {
        Self {
            augmenter,
            strength,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    pub fn weak(augmenter: FeatureAugmenter, seed: u64) -> Self {
        Self::new(augmenter, AugmentStrength::Weak, seed)
    }

    pub fn strong(augmenter: FeatureAugmenter, seed: u64) -> Self {
        Self::new(augmenter, AugmentStrength::Strong, seed)
    }
}

impl<B: Backend> Batcher<B, FeatureItem, FeatureBatch<B>> for AugmentingBatcher {
    fn batch(&self, items: Vec<FeatureItem>, device: &B::Device) -> FeatureBatch<B> {
        // A poisoned lock only means another batch panicked mid-way
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let features: Vec<f32> = items
            .iter()
            .flat_map(|item| self.augmenter.apply(&item.features, self.strength, &mut *rng))
            .collect();
        stack_items(&items, features, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_dataset() -> FeatureDataset {
        FeatureDataset::from_parts(
            vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.5, 0.5], vec![1.0, 1.0]],
            vec![0, 1, 1, 2],
        )
    }

    #[test]
    fn test_subset_preserves_original_index() {
        let dataset = toy_dataset();
        let subset = dataset.subset(&[3, 1]);
        assert_eq!(subset.len(), 2);
        assert_eq!(subset.indices(), vec![3, 1]);
        assert_eq!(subset.labels(), vec![2, 1]);

        let nested = subset.subset(&[1]);
        assert_eq!(nested.indices(), vec![1]);
    }

    #[test]
    fn test_with_labels_and_counts() {
        let dataset = toy_dataset().with_labels(&[2, 2, 0, 1]);
        assert_eq!(dataset.labels(), vec![2, 2, 0, 1]);
        assert_eq!(dataset.class_counts(3), vec![1, 1, 2]);
        assert_eq!(dataset.num_features(), 2);
        assert_eq!(dataset.get(2).map(|item| item.features), Some(vec![0.5, 0.5]));
        assert!(dataset.get(9).is_none());
    }

    #[cfg(feature = "ndarray")]
    #[test]
    fn test_batcher_shapes() {
        use burn_ndarray::NdArray;

        let dataset = toy_dataset();
        let device = Default::default();
        let batch: FeatureBatch<NdArray> =
            FeatureBatcher::new().batch(dataset.gather(&[0, 2, 3]), &device);

        assert_eq!(batch.features.dims(), [3, 2]);
        assert_eq!(batch.indices, vec![0, 2, 3]);
        let targets: Vec<i64> = batch.targets.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(targets, vec![0, 1, 2]);
    }

    #[cfg(feature = "ndarray")]
    #[test]
    fn test_augmenting_batcher_keeps_shape() {
        use burn_ndarray::NdArray;

        let dataset = toy_dataset();
        let device = Default::default();
        let batcher = AugmentingBatcher::strong(FeatureAugmenter::default(), 3);
        let batch: FeatureBatch<NdArray> = batcher.batch(dataset.gather(&[0, 1]), &device);
        assert_eq!(batch.features.dims(), [2, 2]);
    }
}
