//! Multi-layer perceptron classifier for fixed-length feature vectors
//!
//! Architecture: a stack of hidden blocks (Linear, optional BatchNorm, ReLU)
//! followed by a Linear output head producing class logits.

use burn::{
    config::Config,
    module::Module,
    nn::{BatchNorm, BatchNormConfig, Linear, LinearConfig, Relu},
    tensor::{activation::softmax, backend::Backend, Tensor},
};

/// Configuration for the MLP classifier
#[derive(Config, Debug)]
pub struct MlpNetConfig {
    /// Dimension of the input feature vectors
    #[config(default = "1024")]
    pub input_dim: usize,

    /// Width of each hidden layer
    #[config(default = "vec![512, 512]")]
    pub hidden_dims: Vec<usize>,

    /// Number of output classes
    #[config(default = "12")]
    pub num_classes: usize,

    /// Apply BatchNorm after each hidden Linear layer
    #[config(default = "true")]
    pub batch_norm: bool,
}

impl MlpNetConfig {
    /// Initialize the model on the given device
    pub fn init<B: Backend>(&self, device: &B::Device) -> MlpNet<B> {
        let mut hidden = Vec::with_capacity(self.hidden_dims.len());
        let mut in_dim = self.input_dim;

        for &out_dim in &self.hidden_dims {
            hidden.push(MlpBlock::new(in_dim, out_dim, self.batch_norm, device));
            in_dim = out_dim;
        }

        MlpNet {
            hidden,
            output: LinearConfig::new(in_dim, self.num_classes).init(device),
            num_classes: self.num_classes,
        }
    }
}

/// Hidden block: Linear, optional BatchNorm, ReLU
#[derive(Module, Debug)]
pub struct MlpBlock<B: Backend> {
    pub linear: Linear<B>,
    pub bn: Option<BatchNorm<B, 1>>,
    pub relu: Relu,
}

impl<B: Backend> MlpBlock<B> {
    pub fn new(in_dim: usize, out_dim: usize, batch_norm: bool, device: &B::Device) -> Self {
        Self {
            linear: LinearConfig::new(in_dim, out_dim).init(device),
            bn: batch_norm.then(|| BatchNormConfig::new(out_dim).init(device)),
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.linear.forward(x);
        let x = match &self.bn {
            Some(bn) => {
                // BatchNorm normalizes over dim 1 of a [N, C, L] tensor
                let [n, c] = x.dims();
                bn.forward(x.reshape([n, c, 1])).reshape([n, c])
            }
            None => x,
        };
        self.relu.forward(x)
    }
}

/// MLP classifier
#[derive(Module, Debug)]
pub struct MlpNet<B: Backend> {
    pub hidden: Vec<MlpBlock<B>>,
    pub output: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> MlpNet<B> {
    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Feature tensor with shape [batch_size, input_dim]
    ///
    /// # Returns
    /// * Logits tensor with shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self
            .hidden
            .iter()
            .fold(x, |x, block| block.forward(x));
        self.output.forward(x)
    }

    /// Forward pass with softmax (for inference)
    pub fn forward_softmax(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        softmax(self.forward(x), 1)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

#[cfg(all(test, feature = "ndarray"))]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let model = MlpNetConfig::new()
            .with_input_dim(16)
            .with_hidden_dims(vec![8, 8])
            .with_num_classes(4)
            .init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 2>::ones([5, 16], &device);
        assert_eq!(model.forward(x).dims(), [5, 4]);
        assert_eq!(model.num_classes(), 4);
        assert_eq!(model.hidden.len(), 2);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let device = Default::default();
        let model = MlpNetConfig::new()
            .with_input_dim(6)
            .with_hidden_dims(vec![10])
            .with_num_classes(3)
            .with_batch_norm(false)
            .init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 2>::random(
            [4, 6],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let sums: Vec<f32> = model
            .forward_softmax(x)
            .sum_dim(1)
            .into_data()
            .convert::<f32>()
            .to_vec()
            .unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_batch_norm_toggle() {
        let device = Default::default();
        let with_bn = MlpNetConfig::new().with_input_dim(4).init::<TestBackend>(&device);
        let without_bn = MlpNetConfig::new()
            .with_input_dim(4)
            .with_batch_norm(false)
            .init::<TestBackend>(&device);

        assert!(with_bn.hidden.iter().all(|b| b.bn.is_some()));
        assert!(without_bn.hidden.iter().all(|b| b.bn.is_none()));
    }
}
