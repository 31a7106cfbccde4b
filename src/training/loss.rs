//! Loss functions built on log-softmax + gather
//!
//! All reductions are means over the batch dimension.

use burn::tensor::{activation::log_softmax, backend::Backend, Int, Tensor, TensorData};

/// Negative log-likelihood of `targets` for every row, shape [batch_size]
pub fn per_sample_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
) -> Tensor<B, 1> {
    let [batch_size, _num_classes] = logits.dims();
    let log_probs = log_softmax(logits, 1);
    log_probs
        .gather(1, targets.reshape([batch_size, 1]))
        .reshape([batch_size])
        .neg()
}

/// Mean cross-entropy
pub fn cross_entropy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    per_sample_cross_entropy(logits, targets).mean()
}

/// Cross-entropy where only rows with `mask == 1` contribute, averaged over
/// the full batch
pub fn masked_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
    mask: Tensor<B, 1>,
) -> Tensor<B, 1> {
    (per_sample_cross_entropy(logits, targets) * mask).mean()
}

/// Cross-entropy against soft target rows
pub fn soft_cross_entropy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    let [batch_size, _] = logits.dims();
    let nll = (log_softmax(logits, 1) * targets).sum_dim(1).neg();
    nll.reshape([batch_size]).mean()
}

/// One-hot rows for `labels`, shape [labels.len(), num_classes]
pub fn one_hot<B: Backend>(labels: &[usize], num_classes: usize, device: &B::Device) -> Tensor<B, 2> {
    let mut data = vec![0.0f32; labels.len() * num_classes];
    for (row, &label) in labels.iter().enumerate() {
        if label < num_classes {
            data[row * num_classes + label] = 1.0;
        }
    }
    Tensor::from_floats(TensorData::new(data, [labels.len(), num_classes]), device)
}

/// Label tensor for `labels`
pub fn label_tensor<B: Backend>(labels: &[usize], device: &B::Device) -> Tensor<B, 1, Int> {
    let data: Vec<i64> = labels.iter().map(|&l| l as i64).collect();
    Tensor::from_data(TensorData::new(data, [labels.len()]), device)
}

#[cfg(all(test, feature = "ndarray"))]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_data().convert::<f32>().to_vec::<f32>().unwrap()[0]
    }

    #[test]
    fn test_uniform_logits_give_log_c() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::zeros([4, 4], &device);
        let loss = cross_entropy(logits, label_tensor::<TestBackend>(&[0, 1, 2, 3], &device));
        assert!((scalar(loss) - 4f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_masked_loss_averages_over_full_batch() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::zeros([2, 2], &device);
        let targets = label_tensor::<TestBackend>(&[0, 1], &device);
        let mask = Tensor::<TestBackend, 1>::from_floats([1.0, 0.0], &device);
        let loss = masked_cross_entropy(logits, targets, mask);
        assert!((scalar(loss) - 2f32.ln() / 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_soft_cross_entropy_matches_hard_for_one_hot() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats([[2.0, 0.5, -1.0], [0.0, 1.0, 0.0]], &device);
        let labels = [0usize, 2];
        let hard = cross_entropy(logits.clone(), label_tensor::<TestBackend>(&labels, &device));
        let soft = soft_cross_entropy(logits, one_hot::<TestBackend>(&labels, 3, &device));
        assert!((scalar(hard) - scalar(soft)).abs() < 1e-5);
    }

    #[test]
    fn test_one_hot_rows() {
        let device = Default::default();
        let rows: Vec<f32> = one_hot::<TestBackend>(&[1, 0], 3, &device)
            .into_data()
            .convert::<f32>()
            .to_vec()
            .unwrap();
        assert_eq!(rows, vec![0.0, 1.0, 0.0, 1.0, 0.0, 0.0]);
    }
}
