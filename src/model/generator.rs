use crate::model::layers::{conv3x3, level_channels, UpBlock};
use burn::nn::conv::Conv2d;
use burn::prelude::*;
use burn::tensor::activation::relu;

/// Configuration for the feature-to-image synthesis generator.
#[derive(Config, Debug)]
pub struct GeneratorConfig {
    /// Channels of the concatenated reference-edge and source features.
    pub feature_channels: usize,
    pub base_dim: usize,
    pub n_upsample: usize,
    pub image_channels: usize,
}

/// Generator that decodes `cat(refer_edge_feat, src_feat)` back to image
/// resolution and fuses the source image before the output projection.
#[derive(Module, Debug)]
pub struct Generator<B: Backend> {
    ups: Vec<UpBlock<B>>,
    fuse: Conv2d<B>,
    output: Conv2d<B>,
}

impl GeneratorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Generator<B> {
        let mut ups = Vec::with_capacity(self.n_upsample);
        let mut in_channels = self.feature_channels;
        for level in (0..self.n_upsample).rev() {
            let out_channels = level_channels(self.base_dim, level);
            ups.push(UpBlock::new(in_channels, out_channels, device));
            in_channels = out_channels;
        }

        Generator {
            ups,
            fuse: conv3x3(in_channels + self.image_channels, self.base_dim, device),
            output: conv3x3(self.base_dim, self.image_channels, device),
        }
    }
}

impl<B: Backend> Generator<B> {
    /// Synthesize an image in [-1, 1] from features and the source image.
    pub fn forward(&self, syn_feat: Tensor<B, 4>, src_img: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.ups.iter().fold(syn_feat, |x, up| up.forward(x));
        let x = Tensor::cat(vec![x, src_img], 1);
        let x = relu(self.fuse.forward(x));
        self.output.forward(x).tanh()
    }
}
