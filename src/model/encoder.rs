use crate::model::layers::{level_channels, DownBlock};
use burn::prelude::*;

/// Configuration for a strided convolutional feature encoder.
#[derive(Config, Debug)]
pub struct EncoderConfig {
    pub in_channels: usize,
    pub base_dim: usize,
    pub n_downsample: usize,
}

/// Convolutional encoder used for both the reference-edge and source branches.
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    blocks: Vec<DownBlock<B>>,
}

impl EncoderConfig {
    /// Channels of the encoded feature map.
    pub fn out_channels(&self) -> usize {
        level_channels(self.base_dim, self.n_downsample.saturating_sub(1))
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Encoder<B> {
        let mut blocks = Vec::with_capacity(self.n_downsample);
        let mut in_channels = self.in_channels;
        for level in 0..self.n_downsample {
            let out_channels = level_channels(self.base_dim, level);
            blocks.push(DownBlock::new(in_channels, out_channels, level > 0, device));
            in_channels = out_channels;
        }
        Encoder { blocks }
    }
}

impl<B: Backend> Encoder<B> {
    /// Encode `[N, C, H, W]` images to `[N, F, H / 2^n, W / 2^n]` features.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks
            .iter()
            .fold(images, |x, block| block.forward(x))
    }
}
