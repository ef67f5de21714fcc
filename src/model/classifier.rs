use crate::model::layers::{level_channels, DownBlock};
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;

/// Configuration for the garment type classifier.
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    pub in_channels: usize,
    pub classifier_dim: usize,
    pub num_types: usize,
    #[config(default = 4)]
    pub n_downsample: usize,
}

/// Predicts the garment type of an image; its loss steers the generator
/// towards the labeled type. Unnormalized so that it carries no running
/// statistics while used as a fixed loss network.
#[derive(Module, Debug)]
pub struct Classifier<B: Backend> {
    blocks: Vec<DownBlock<B>>,
    fc: Linear<B>,
}

impl ClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Classifier<B> {
        let mut blocks = Vec::with_capacity(self.n_downsample);
        let mut in_channels = self.in_channels;
        for level in 0..self.n_downsample {
            let out_channels = level_channels(self.classifier_dim, level);
            blocks.push(DownBlock::new(in_channels, out_channels, false, device));
            in_channels = out_channels;
        }
        Classifier {
            blocks,
            fc: LinearConfig::new(in_channels, self.num_types).init(device),
        }
    }
}

impl<B: Backend> Classifier<B> {
    /// Class logits `[N, num_types]`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.blocks.iter().fold(images, |x, block| block.forward(x));
        let [batch, channels, height, width] = x.dims();
        // Global average pool.
        let pooled = x
            .reshape([batch, channels, height * width])
            .mean_dim(2)
            .reshape([batch, channels]);
        self.fc.forward(pooled)
    }
}
