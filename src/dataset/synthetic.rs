//! Synthetic imbalanced feature data
//!
//! Gaussian class blobs: each class gets a random center and its samples are
//! drawn around it. Class sizes follow the given distribution.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::dataset::burn_dataset::FeatureDataset;
use crate::utils::error::{NoisyMatchError, Result};

/// Parameters of a synthetic dataset
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub num_features: usize,
    /// Class proportions; normalized before use
    pub class_dist: Vec<f64>,
    pub train_size: usize,
    pub test_size: usize,
    /// Standard deviation of samples around their class center
    pub cluster_std: f32,
    pub seed: u64,
}

impl SyntheticConfig {
    pub fn new(num_features: usize, class_dist: Vec<f64>, seed: u64) -> Self {
        Self {
            num_features,
            class_dist,
            train_size: 4000,
            test_size: 1000,
            cluster_std: 1.0,
            seed,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.class_dist.len()
    }
}

/// Samples per class for `total` samples, at least one per class
pub fn class_sizes(dist: &[f64], total: usize) -> Vec<usize> {
    let sum: f64 = dist.iter().sum();
    if sum <= 0.0 {
        return vec![0; dist.len()];
    }
    dist.iter()
        .map(|p| ((p / sum) * total as f64).round().max(1.0) as usize)
        .collect()
}

/// Generate `(train, test)` splits with clean labels
pub fn generate(config: &SyntheticConfig) -> Result<(FeatureDataset, FeatureDataset)> {
    if config.num_classes() < 2 {
        return Err(NoisyMatchError::InvalidInput(
            "synthetic data needs at least 2 classes".to_string(),
        ));
    }
    if config.num_features == 0 {
        return Err(NoisyMatchError::InvalidInput(
            "synthetic data needs at least 1 feature".to_string(),
        ));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let unit = Normal::new(0.0f32, 1.0)
        .map_err(|e| NoisyMatchError::InvalidInput(e.to_string()))?;
    let spread = Normal::new(0.0f32, config.cluster_std)
        .map_err(|e| NoisyMatchError::InvalidInput(e.to_string()))?;

    let centers: Vec<Vec<f32>> = (0..config.num_classes())
        .map(|_| (0..config.num_features).map(|_| unit.sample(&mut rng)).collect())
        .collect();

    let mut sample_split = |total: usize| {
        let mut rows: Vec<(Vec<f32>, usize)> = Vec::with_capacity(total);
        for (label, &count) in class_sizes(&config.class_dist, total).iter().enumerate() {
            for _ in 0..count {
                let features = centers[label]
                    .iter()
                    .map(|c| c + spread.sample(&mut rng))
                    .collect();
                rows.push((features, label));
            }
        }
        rows.shuffle(&mut rng);
        let (features, labels) = rows.into_iter().unzip();
        FeatureDataset::from_parts(features, labels)
    };

    let train = sample_split(config.train_size);
    let test = sample_split(config.test_size);
    Ok((train, test))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MALWARE_CLASS_DIST;
    use burn::data::dataset::Dataset;

    #[test]
    fn test_class_sizes_follow_distribution() {
        let sizes = class_sizes(&MALWARE_CLASS_DIST, 1000);
        assert_eq!(sizes.len(), 12);
        assert_eq!(sizes[0], 140);
        assert_eq!(sizes[6], 10);
        assert!(class_sizes(&[0.999, 0.001], 10)[1] >= 1);
    }

    #[test]
    fn test_generate_shapes_and_imbalance() {
        let mut config = SyntheticConfig::new(8, MALWARE_CLASS_DIST.to_vec(), 42);
        config.train_size = 500;
        config.test_size = 100;
        let (train, test) = generate(&config).unwrap();

        assert_eq!(train.num_features(), 8);
        assert!(train.len() >= 490 && train.len() <= 512);
        assert!(test.len() >= 95);

        let counts = train.class_counts(12);
        assert!(counts[1] > counts[10]);
        assert!(counts.iter().all(|&c| c > 0));
    }

    #[test]
    fn test_generate_is_seeded() {
        let config = SyntheticConfig {
            train_size: 50,
            test_size: 10,
            ..SyntheticConfig::new(4, vec![0.5, 0.5], 1)
        };
        let (a, _) = generate(&config).unwrap();
        let (b, _) = generate(&config).unwrap();
        assert_eq!(a.items(), b.items());
    }
}
