use crate::model::layers::conv3x3;
use burn::nn::conv::Conv2d;
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;

/// Configuration for the fixed feature network used by the perceptual loss.
#[derive(Config, Debug)]
pub struct PerceptualConfig {
    pub in_channels: usize,
    pub dims: Vec<usize>,
}

/// VGG-style stack of conv stages; the loss compares stage activations.
#[derive(Module, Debug)]
pub struct PerceptualLoss<B: Backend> {
    stages: Vec<Conv2d<B>>,
    pool: MaxPool2d,
    #[module(ignore)]
    weights: Vec<f64>,
}

impl PerceptualConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> PerceptualLoss<B> {
        let mut stages = Vec::with_capacity(self.dims.len());
        let mut in_channels = self.in_channels;
        for &dim in &self.dims {
            stages.push(conv3x3(in_channels, dim, device));
            in_channels = dim;
        }

        PerceptualLoss {
            stages,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            weights: stage_weights(self.dims.len()),
        }
    }
}

impl<B: Backend> PerceptualLoss<B> {
    /// Activations after every stage, shallowest first.
    pub fn features(&self, images: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        let mut features = Vec::with_capacity(self.stages.len());
        let mut x = images;
        for (idx, stage) in self.stages.iter().enumerate() {
            if idx > 0 {
                x = self.pool.forward(x);
            }
            x = relu(stage.forward(x));
            features.push(x.clone());
        }
        features
    }

    /// Weighted L1 distance between the features of `images` and `target`.
    pub fn forward(&self, images: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
        let device = images.device();
        let fake = self.features(images);
        let real = self.features(target.detach());
        fake.into_iter()
            .zip(real)
            .zip(self.weights.iter())
            .fold(Tensor::zeros([1], &device), |acc, ((f, r), &w)| {
                acc.add(f.sub(r.detach()).abs().mean().mul_scalar(w))
            })
    }
}

/// Deepest stage weighs 1.0, each shallower stage half of the next.
fn stage_weights(stages: usize) -> Vec<f64> {
    (0..stages)
        .map(|idx| 1.0 / (1u64 << (stages - 1 - idx)) as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_weights_halve_towards_shallow_layers() {
        assert_eq!(stage_weights(5), vec![1.0 / 16.0, 1.0 / 8.0, 0.25, 0.5, 1.0]);
        assert_eq!(stage_weights(1), vec![1.0]);
        assert!(stage_weights(0).is_empty());
    }
}
