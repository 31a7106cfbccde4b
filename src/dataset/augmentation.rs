//! Feature-vector augmentation
//!
//! Two views are used by the consistency-based algorithms:
//!
//! - **Weak**: small Gaussian jitter, used for pseudo-labels and clean detection
//! - **Strong**: larger jitter, random feature dropout and a per-sample scale,
//!   used as the view the model has to agree with

use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Which view to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AugmentStrength {
    None,
    Weak,
    Strong,
}

/// Configuration for feature augmentation
#[derive(Clone, Debug, PartialEq)]
pub struct AugmentationConfig {
    /// Standard deviation of the weak-view jitter
    pub weak_noise_std: f32,
    /// Standard deviation of the strong-view jitter
    pub strong_noise_std: f32,
    /// Probability of zeroing a feature in the strong view
    pub dropout_prob: f32,
    /// Per-sample scale is drawn from 1.0 ± scale_delta
    pub scale_delta: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            weak_noise_std: 0.01,
            strong_noise_std: 0.05,
            dropout_prob: 0.1,
            scale_delta: 0.1,
        }
    }
}

impl AugmentationConfig {
    /// Disable all augmentations
    pub fn none() -> Self {
        Self {
            weak_noise_std: 0.0,
            strong_noise_std: 0.0,
            dropout_prob: 0.0,
            scale_delta: 0.0,
        }
    }
}

/// Feature augmenter that applies random perturbations
#[derive(Clone, Debug, Default)]
pub struct FeatureAugmenter {
    config: AugmentationConfig,
}

impl FeatureAugmenter {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    /// Create an augmenter that returns its input unchanged
    pub fn no_augmentation() -> Self {
        Self::new(AugmentationConfig::none())
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Produce the requested view of `features`
    pub fn apply<R: Rng + ?Sized>(
        &self,
        features: &[f32],
        strength: AugmentStrength,
        rng: &mut R,
    ) -> Vec<f32> {
        match strength {
            AugmentStrength::None => features.to_vec(),
            AugmentStrength::Weak => self.weak(features, rng),
            AugmentStrength::Strong => self.strong(features, rng),
        }
    }

    pub fn weak<R: Rng + ?Sized>(&self, features: &[f32], rng: &mut R) -> Vec<f32> {
        jitter(features, self.config.weak_noise_std, rng)
    }

    pub fn strong<R: Rng + ?Sized>(&self, features: &[f32], rng: &mut R) -> Vec<f32> {
        let scale = if self.config.scale_delta > 0.0 {
            1.0 + rng.gen_range(-self.config.scale_delta..=self.config.scale_delta)
        } else {
            1.0
        };

        let mut out = jitter(features, self.config.strong_noise_std, rng);
        for value in out.iter_mut() {
            if self.config.dropout_prob > 0.0 && rng.gen::<f32>() < self.config.dropout_prob {
                *value = 0.0;
            } else {
                *value *= scale;
            }
        }
        out
    }
}

fn jitter<R: Rng + ?Sized>(features: &[f32], std: f32, rng: &mut R) -> Vec<f32> {
    match Normal::new(0.0f32, std) {
        Ok(normal) if std > 0.0 => features.iter().map(|&x| x + normal.sample(rng)).collect(),
        _ => features.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn sample() -> Vec<f32> {
        (0..64).map(|i| i as f32 / 64.0).collect()
    }

    #[test]
    fn test_no_augmentation_is_identity() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let augmenter = FeatureAugmenter::no_augmentation();
        let x = sample();
        assert_eq!(augmenter.apply(&x, AugmentStrength::Weak, &mut rng), x);
        assert_eq!(augmenter.apply(&x, AugmentStrength::Strong, &mut rng), x);
    }

    #[test]
    fn test_weak_view_stays_close() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let augmenter = FeatureAugmenter::default();
        let x = sample();
        let weak = augmenter.weak(&x, &mut rng);
        assert_eq!(weak.len(), x.len());
        assert!(weak.iter().zip(x.iter()).all(|(a, b)| (a - b).abs() < 0.1));
        assert_ne!(weak, x);
    }

    #[test]
    fn test_strong_view_drops_features() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let augmenter = FeatureAugmenter::new(AugmentationConfig {
            dropout_prob: 0.5,
            ..Default::default()
        });
        let x: Vec<f32> = vec![1.0; 256];
        let strong = augmenter.strong(&x, &mut rng);
        let zeros = strong.iter().filter(|v| **v == 0.0).count();
        assert!(zeros > 64 && zeros < 192);
    }

    #[test]
    fn test_seeded_views_are_reproducible() {
        let augmenter = FeatureAugmenter::default();
        let x = sample();
        let a = augmenter.strong(&x, &mut ChaCha8Rng::seed_from_u64(9));
        let b = augmenter.strong(&x, &mut ChaCha8Rng::seed_from_u64(9));
        assert_eq!(a, b);
    }
}
