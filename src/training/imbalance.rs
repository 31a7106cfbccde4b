//! Class-imbalance correction for the labeled loss
//!
//! - `none`: plain cross-entropy
//! - `resample`: plain cross-entropy; batches are drawn class-balanced
//! - `mixup`: convex combinations of samples and their one-hot targets
//! - `ldam`: label-distribution-aware margins, larger for rare classes

use burn::tensor::{backend::Backend, Int, Tensor, TensorData};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Beta, Distribution};

use crate::model::config::ImbalanceMethod;
use crate::model::mlp::MlpNet;
use crate::training::loss::{cross_entropy, label_tensor, one_hot, soft_cross_entropy};
use crate::utils::error::{NoisyMatchError, Result};

/// Largest LDAM margin
pub const LDAM_MAX_MARGIN: f32 = 0.5;

/// LDAM logit scale
pub const LDAM_SCALE: f32 = 30.0;

/// Per-class margins `m_c ∝ n_c^(-1/4)`, scaled so the largest is `max_margin`
///
/// Empty classes are treated as having a single sample.
pub fn ldam_margins(class_counts: &[usize], max_margin: f32) -> Vec<f32> {
    let raw: Vec<f64> = class_counts
        .iter()
        .map(|&n| 1.0 / (n.max(1) as f64).powf(0.25))
        .collect();
    let max = raw.iter().cloned().fold(0.0f64, f64::max);
    if max <= 0.0 {
        return vec![0.0; class_counts.len()];
    }
    raw.iter()
        .map(|m| (m * max_margin as f64 / max) as f32)
        .collect()
}

/// Mixing coefficient drawn from Beta(alpha, alpha)
pub fn sample_mixup_lambda<R: Rng + ?Sized>(alpha: f64, rng: &mut R) -> Result<f32> {
    let beta = Beta::new(alpha, alpha)
        .map_err(|e| NoisyMatchError::Config(format!("invalid mixup alpha {}: {}", alpha, e)))?;
    Ok(beta.sample(rng) as f32)
}

/// Builds the labeled loss for the configured imbalance method
#[derive(Debug, Clone)]
pub struct ImbalanceHandler {
    method: ImbalanceMethod,
    num_classes: usize,
    margins: Vec<f32>,
    scale: f32,
    alpha: f64,
}

impl ImbalanceHandler {
    /// `class_counts` are the (noisy) labeled counts used for LDAM margins
    pub fn new(method: ImbalanceMethod, class_counts: &[usize], alpha: f64) -> Self {
        Self {
            method,
            num_classes: class_counts.len(),
            margins: ldam_margins(class_counts, LDAM_MAX_MARGIN),
            scale: LDAM_SCALE,
            alpha,
        }
    }

    pub fn method(&self) -> ImbalanceMethod {
        self.method
    }

    /// Whether labeled batches should be drawn class-balanced
    pub fn wants_resampling(&self) -> bool {
        self.method == ImbalanceMethod::Resample
    }

    /// LDAM loss: `CE(s * (logits - m_y * onehot(y)), y)`
    pub fn ldam_loss<B: Backend>(
        &self,
        logits: Tensor<B, 2>,
        labels: &[usize],
        device: &B::Device,
    ) -> Tensor<B, 1> {
        let margin_rows: Vec<f32> = labels
            .iter()
            .flat_map(|&y| {
                (0..self.num_classes).map(move |c| if c == y { self.margins[y] } else { 0.0 })
            })
            .collect();
        let margins = Tensor::<B, 2>::from_floats(
            TensorData::new(margin_rows, [labels.len(), self.num_classes]),
            device,
        );
        let adjusted = (logits - margins).mul_scalar(self.scale);
        cross_entropy(adjusted, label_tensor(labels, device))
    }

    /// Labeled loss of `model` on `features` with (noisy) `labels`
    pub fn labeled_loss<B: Backend, R: Rng + ?Sized>(
        &self,
        model: &MlpNet<B>,
        features: Tensor<B, 2>,
        labels: &[usize],
        rng: &mut R,
        device: &B::Device,
    ) -> Result<Tensor<B, 1>> {
        let loss = match self.method {
            ImbalanceMethod::None | ImbalanceMethod::Resample => {
                cross_entropy(model.forward(features), label_tensor(labels, device))
            }
            ImbalanceMethod::Ldam => self.ldam_loss(model.forward(features), labels, device),
            ImbalanceMethod::Mixup => {
                let lambda = sample_mixup_lambda(self.alpha, rng)?;
                let mut perm: Vec<usize> = (0..labels.len()).collect();
                perm.shuffle(rng);

                let perm_labels: Vec<usize> = perm.iter().map(|&i| labels[i]).collect();
                let perm_index: Tensor<B, 1, Int> = label_tensor(&perm, device);

                let mixed = features.clone().mul_scalar(lambda)
                    + features.select(0, perm_index).mul_scalar(1.0 - lambda);
                let targets = one_hot::<B>(labels, self.num_classes, device).mul_scalar(lambda)
                    + one_hot::<B>(&perm_labels, self.num_classes, device).mul_scalar(1.0 - lambda);

                soft_cross_entropy(model.forward(mixed), targets)
            }
        };
        Ok(loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_ldam_margins_largest_for_rarest() {
        let margins = ldam_margins(&[1000, 100, 10], LDAM_MAX_MARGIN);
        assert!((margins[2] - 0.5).abs() < 1e-6);
        assert!(margins[0] < margins[1] && margins[1] < margins[2]);
        // n^(-1/4) ratio between 10 and 1000 samples
        assert!((margins[0] / margins[2] - 0.1f32.sqrt()).abs() < 1e-4);
    }

    #[test]
    fn test_ldam_margins_empty_class() {
        let margins = ldam_margins(&[16, 0], LDAM_MAX_MARGIN);
        assert!((margins[1] - 0.5).abs() < 1e-6);
        assert!((margins[0] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_mixup_lambda_in_unit_interval() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        for _ in 0..100 {
            let lambda = sample_mixup_lambda(10.0, &mut rng).unwrap();
            assert!((0.0..=1.0).contains(&lambda));
        }
        assert!(sample_mixup_lambda(-1.0, &mut rng).is_err());
    }

    #[test]
    fn test_resample_flag() {
        assert!(ImbalanceHandler::new(ImbalanceMethod::Resample, &[1, 2], 1.0).wants_resampling());
        assert!(!ImbalanceHandler::new(ImbalanceMethod::Ldam, &[1, 2], 1.0).wants_resampling());
    }

    #[cfg(feature = "ndarray")]
    mod tensor {
        use super::*;
        use crate::model::mlp::MlpNetConfig;
        use burn_ndarray::NdArray;

        type TestBackend = NdArray;

        fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
            t.into_data().convert::<f32>().to_vec::<f32>().unwrap()[0]
        }

        #[test]
        fn test_ldam_penalizes_rare_class_more() {
            let device = Default::default();
            let handler = ImbalanceHandler::new(ImbalanceMethod::Ldam, &[10_000, 1], 1.0);
            let logits = Tensor::<TestBackend, 2>::zeros([1, 2], &device);

            let common = scalar(handler.ldam_loss(logits.clone(), &[0], &device));
            let rare = scalar(handler.ldam_loss(logits, &[1], &device));
            assert!(rare > common);
        }

        #[test]
        fn test_every_method_gives_finite_loss() {
            let device = Default::default();
            let model = MlpNetConfig::new()
                .with_input_dim(4)
                .with_hidden_dims(vec![8])
                .with_num_classes(3)
                .init::<TestBackend>(&device);
            let features = Tensor::<TestBackend, 2>::ones([3, 4], &device);
            let mut rng = ChaCha8Rng::seed_from_u64(4);

            for method in [
                ImbalanceMethod::None,
                ImbalanceMethod::Resample,
                ImbalanceMethod::Mixup,
                ImbalanceMethod::Ldam,
            ] {
                let handler = ImbalanceHandler::new(method, &[5, 3, 1], 2.0);
                let loss = handler
                    .labeled_loss(&model, features.clone(), &[0, 1, 2], &mut rng, &device)
                    .unwrap();
                assert!(scalar(loss).is_finite(), "{:?}", method);
            }
        }
    }
}
