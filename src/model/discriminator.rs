use crate::model::layers::{conv4x4, level_channels};
use burn::nn::conv::Conv2d;
use burn::nn::{InstanceNorm, InstanceNormConfig};
use burn::prelude::*;
use burn::tensor::activation::leaky_relu;

/// Configuration for the PatchGAN-style discriminator.
#[derive(Config, Debug)]
pub struct DiscriminatorConfig {
    pub in_channels: usize,
    pub discriminator_dim: usize,
    #[config(default = 3)]
    pub n_layers: usize,
}

/// Discriminator scoring overlapping image patches as real or synthetic.
///
/// Instance norm keeps the module free of running statistics, so a forward
/// pass never mutates its state.
#[derive(Module, Debug)]
pub struct Discriminator<B: Backend> {
    convs: Vec<Conv2d<B>>,
    norms: Vec<InstanceNorm<B>>,
    head: Conv2d<B>,
}

impl DiscriminatorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Discriminator<B> {
        let mut convs = Vec::with_capacity(self.n_layers + 1);
        let mut norms = Vec::with_capacity(self.n_layers);
        convs.push(conv4x4(self.in_channels, self.discriminator_dim, 2, true, device));

        let mut in_channels = self.discriminator_dim;
        for level in 1..=self.n_layers {
            let out_channels = level_channels(self.discriminator_dim, level);
            let stride = if level == self.n_layers { 1 } else { 2 };
            convs.push(conv4x4(in_channels, out_channels, stride, false, device));
            norms.push(InstanceNormConfig::new(out_channels).init(device));
            in_channels = out_channels;
        }

        Discriminator {
            convs,
            norms,
            head: conv4x4(in_channels, 1, 1, true, device),
        }
    }
}

impl<B: Backend> Discriminator<B> {
    /// Forward pass returning patch logits flattened to `[N, patches]`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = leaky_relu(self.convs[0].forward(images), 0.2);
        for (conv, norm) in self.convs.iter().skip(1).zip(self.norms.iter()) {
            x = leaky_relu(norm.forward(conv.forward(x)), 0.2);
        }
        let logits = self.head.forward(x);
        let [batch, channels, height, width] = logits.dims();
        logits.reshape([batch, channels * height * width])
    }
}
