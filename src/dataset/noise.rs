//! Label noise injection
//!
//! Corrupts train labels to simulate annotation errors. The clean labels are
//! kept by the caller so selection quality can be measured later.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::model::config::NoiseType;
use crate::utils::error::{NoisyMatchError, Result};

/// Return a corrupted copy of `labels`
///
/// - `None`: identity
/// - `Symmetric`: with probability `rate`, replace with a uniformly chosen
///   *different* class
/// - `Pairflip`: with probability `rate`, class `c` becomes `(c + 1) % C`
pub fn corrupt_labels(
    labels: &[usize],
    num_classes: usize,
    noise_type: NoiseType,
    rate: f64,
    seed: u64,
) -> Result<Vec<usize>> {
    if !(0.0..1.0).contains(&rate) {
        return Err(NoisyMatchError::InvalidInput(format!(
            "noise rate must be in [0, 1), got {}",
            rate
        )));
    }
    if num_classes < 2 {
        return Err(NoisyMatchError::InvalidInput(
            "label noise needs at least 2 classes".to_string(),
        ));
    }
    if let Some(&bad) = labels.iter().find(|&&l| l >= num_classes) {
        return Err(NoisyMatchError::Dataset(format!(
            "label {} out of range for {} classes",
            bad, num_classes
        )));
    }

    if noise_type == NoiseType::None || rate == 0.0 {
        return Ok(labels.to_vec());
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let noisy = labels
        .iter()
        .map(|&label| {
            if rng.gen::<f64>() >= rate {
                return label;
            }
            match noise_type {
                NoiseType::Symmetric => {
                    let other = rng.gen_range(0..num_classes - 1);
                    if other >= label {
                        other + 1
                    } else {
                        other
                    }
                }
                NoiseType::Pairflip => (label + 1) % num_classes,
                NoiseType::None => label,
            }
        })
        .collect();

    Ok(noisy)
}

/// Fraction of labels that differ between `noisy` and `clean`
pub fn actual_noise_rate(noisy: &[usize], clean: &[usize]) -> f64 {
    if noisy.is_empty() {
        return 0.0;
    }
    let flipped = noisy.iter().zip(clean.iter()).filter(|(n, c)| n != c).count();
    flipped as f64 / noisy.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n: usize, classes: usize) -> Vec<usize> {
        (0..n).map(|i| i % classes).collect()
    }

    #[test]
    fn test_zero_rate_is_identity() {
        let clean = labels(200, 5);
        for noise_type in [NoiseType::None, NoiseType::Symmetric, NoiseType::Pairflip] {
            let noisy = corrupt_labels(&clean, 5, noise_type, 0.0, 3).unwrap();
            assert_eq!(noisy, clean);
        }
    }

    #[test]
    fn test_pairflip_moves_to_next_class() {
        let clean = labels(500, 4);
        let noisy = corrupt_labels(&clean, 4, NoiseType::Pairflip, 0.4, 7).unwrap();
        for (n, c) in noisy.iter().zip(clean.iter()) {
            assert!(n == c || *n == (c + 1) % 4);
        }
        let rate = actual_noise_rate(&noisy, &clean);
        assert!(rate > 0.3 && rate < 0.5, "rate {}", rate);
    }

    #[test]
    fn test_symmetric_always_changes_flipped_labels() {
        let clean = labels(2000, 3);
        let noisy = corrupt_labels(&clean, 3, NoiseType::Symmetric, 0.5, 11).unwrap();
        let rate = actual_noise_rate(&noisy, &clean);
        // Every selected label moves to a different class
        assert!(rate > 0.45 && rate < 0.55, "rate {}", rate);
        assert!(noisy.iter().all(|&l| l < 3));
    }

    #[test]
    fn test_same_seed_same_noise() {
        let clean = labels(100, 6);
        let a = corrupt_labels(&clean, 6, NoiseType::Symmetric, 0.3, 5).unwrap();
        let b = corrupt_labels(&clean, 6, NoiseType::Symmetric, 0.3, 5).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(corrupt_labels(&[0, 1], 2, NoiseType::Symmetric, 1.0, 0).is_err());
        assert!(corrupt_labels(&[0, 5], 2, NoiseType::Symmetric, 0.1, 0).is_err());
    }
}
