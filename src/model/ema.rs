//! Exponential moving average of model weights
//!
//! The shadow model lives on the inference backend and is refreshed after
//! every optimizer step from the live model's `valid()` copy.

use burn::{
    module::{Param, RunningState},
    nn::{BatchNorm, Linear},
    tensor::{backend::Backend, Tensor},
};

use crate::model::mlp::{MlpBlock, MlpNet};

/// EMA shadow copy of an [`MlpNet`]
#[derive(Debug, Clone)]
pub struct ModelEma<B: Backend> {
    model: MlpNet<B>,
    decay: f64,
}

impl<B: Backend> ModelEma<B> {
    /// Start the shadow from a copy of `model`
    pub fn new(model: MlpNet<B>, decay: f64) -> Self {
        Self { model, decay }
    }

    /// `ema = decay * ema + (1 - decay) * live` for every parameter.
    /// BatchNorm running statistics are copied from `live`.
    pub fn update(&mut self, live: &MlpNet<B>) {
        let mut ema = self.model.clone();
        let decay = self.decay;

        ema.hidden = ema
            .hidden
            .into_iter()
            .zip(live.hidden.iter())
            .map(|(e, l)| blend_block(e, l, decay))
            .collect();
        ema.output = blend_linear(ema.output, &live.output, decay);

        self.model = ema;
    }

    pub fn model(&self) -> &MlpNet<B> {
        &self.model
    }

    pub fn decay(&self) -> f64 {
        self.decay
    }
}

fn blend_block<B: Backend>(ema: MlpBlock<B>, live: &MlpBlock<B>, decay: f64) -> MlpBlock<B> {
    let mut block = ema;
    block.linear = blend_linear(block.linear, &live.linear, decay);
    block.bn = match (block.bn, &live.bn) {
        (Some(e), Some(l)) => Some(blend_batch_norm(e, l, decay)),
        (bn, _) => bn,
    };
    block
}

fn blend_linear<B: Backend>(ema: Linear<B>, live: &Linear<B>, decay: f64) -> Linear<B> {
    let mut linear = ema;
    linear.weight = blend_param(linear.weight, &live.weight, decay);
    linear.bias = match (linear.bias, &live.bias) {
        (Some(e), Some(l)) => Some(blend_param(e, l, decay)),
        (bias, _) => bias,
    };
    linear
}

fn blend_batch_norm<B: Backend>(
    ema: BatchNorm<B, 1>,
    live: &BatchNorm<B, 1>,
    decay: f64,
) -> BatchNorm<B, 1> {
    let mut bn = ema;
    bn.gamma = blend_param(bn.gamma, &live.gamma, decay);
    bn.beta = blend_param(bn.beta, &live.beta, decay);
    bn.running_mean = RunningState::new(live.running_mean.value());
    bn.running_var = RunningState::new(live.running_var.value());
    bn
}

fn blend_param<B: Backend, const D: usize>(
    ema: Param<Tensor<B, D>>,
    live: &Param<Tensor<B, D>>,
    decay: f64,
) -> Param<Tensor<B, D>> {
    let live = live.val();
    ema.map(|e| e.mul_scalar(decay).add(live.mul_scalar(1.0 - decay)))
}
