pub mod classifier;
pub mod discriminator;
pub mod encoder;
pub mod generator;
pub mod layers;
pub mod params;
pub mod perceptual;

use burn::nn::loss::{BinaryCrossEntropyLossConfig, CrossEntropyLossConfig};
use burn::prelude::*;

pub use classifier::{Classifier, ClassifierConfig};
pub use discriminator::{Discriminator, DiscriminatorConfig};
pub use encoder::{Encoder, EncoderConfig};
pub use generator::{Generator, GeneratorConfig};
pub use params::ParamGroup;
pub use perceptual::{PerceptualConfig, PerceptualLoss};

/// Hyperparameters for every network of the synthesis model.
#[derive(Config, Debug)]
pub struct ModelConfig {
    #[config(default = 256)]
    pub image_size: usize,
    #[config(default = 1)]
    pub edge_channels: usize,
    #[config(default = 3)]
    pub image_channels: usize,
    /// Number of garment type classes predicted by the classifier.
    pub num_types: usize,
    #[config(default = 64)]
    pub encoder_dim: usize,
    #[config(default = 3)]
    pub n_downsample: usize,
    #[config(default = 64)]
    pub discriminator_dim: usize,
    #[config(default = 3)]
    pub discriminator_layers: usize,
    #[config(default = 32)]
    pub classifier_dim: usize,
    #[config(default = "vec![16, 32, 64]")]
    pub perceptual_dims: Vec<usize>,
}

impl ModelConfig {
    pub fn edge_encoder_config(&self) -> EncoderConfig {
        EncoderConfig::new(self.edge_channels, self.encoder_dim, self.n_downsample)
    }

    pub fn src_encoder_config(&self) -> EncoderConfig {
        EncoderConfig::new(self.image_channels, self.encoder_dim, self.n_downsample)
    }

    pub fn generator_config(&self) -> GeneratorConfig {
        let feature_channels = self.edge_encoder_config().out_channels()
            + self.src_encoder_config().out_channels();
        GeneratorConfig::new(
            feature_channels,
            self.encoder_dim,
            self.n_downsample,
            self.image_channels,
        )
    }

    pub fn discriminator_config(&self) -> DiscriminatorConfig {
        DiscriminatorConfig::new(self.image_channels, self.discriminator_dim)
            .with_n_layers(self.discriminator_layers)
    }

    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig::new(self.image_channels, self.classifier_dim, self.num_types)
            .with_n_downsample(self.n_downsample + 1)
    }

    pub fn perceptual_config(&self) -> PerceptualConfig {
        PerceptualConfig::new(self.image_channels, self.perceptual_dims.clone())
    }

    /// Check that the image size survives every downsampling layer.
    pub fn validate(&self) -> anyhow::Result<()> {
        // Two stride-1 convolutions close the discriminator and trim 2 pixels.
        let min_size = (1usize << (self.n_downsample + 1)).max(3 << self.discriminator_layers);
        if self.n_downsample == 0 {
            return Err(anyhow::anyhow!("n_downsample must be at least 1"));
        }
        if self.num_types == 0 {
            return Err(anyhow::anyhow!("num_types must be at least 1"));
        }
        if self.image_size < min_size || self.image_size % (1 << self.n_downsample) != 0 {
            return Err(anyhow::anyhow!(
                "image_size {} must be a multiple of {} and at least {min_size}",
                self.image_size,
                1 << self.n_downsample
            ));
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> TailorGan<B> {
        TailorGan {
            edge_encoder: self.edge_encoder_config().init(device),
            src_encoder: self.src_encoder_config().init(device),
            generator: self.generator_config().init(device),
            discriminator: self.discriminator_config().init(device),
            classifier: self.classifier_config().init(device),
            perceptual: self.perceptual_config().init(device),
        }
    }
}

/// The full model bundle.
///
/// Only the generator and discriminator are optimized. The encoders run every
/// iteration but keep their initial weights; the classifier and perceptual
/// network act as fixed loss terms.
#[derive(Module, Debug)]
pub struct TailorGan<B: Backend> {
    pub edge_encoder: Encoder<B>,
    pub src_encoder: Encoder<B>,
    pub generator: Generator<B>,
    pub discriminator: Discriminator<B>,
    pub classifier: Classifier<B>,
    pub perceptual: PerceptualLoss<B>,
}

impl<B: Backend> TailorGan<B> {
    /// Channel-concatenated reference-edge and source features.
    pub fn encode(&self, refer_edge_img: Tensor<B, 4>, src_img: Tensor<B, 4>) -> Tensor<B, 4> {
        let refer_edge_feat = self.edge_encoder.forward(refer_edge_img);
        let src_feat = self.src_encoder.forward(src_img);
        Tensor::cat(vec![refer_edge_feat, src_feat], 1)
    }
}

/// Binary cross-entropy on discriminator logits against an all-real or
/// all-fake target.
pub fn adversarial_loss<B: Backend>(logits: Tensor<B, 2>, target_is_real: bool) -> Tensor<B, 1> {
    let device = logits.device();
    let targets = if target_is_real {
        Tensor::<B, 2, Int>::ones(logits.dims(), &device)
    } else {
        Tensor::<B, 2, Int>::zeros(logits.dims(), &device)
    };
    BinaryCrossEntropyLossConfig::new()
        .with_logits(true)
        .init(&device)
        .forward(logits, targets)
}

pub fn classification_loss<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
) -> Tensor<B, 1> {
    let device = logits.device();
    CrossEntropyLossConfig::new()
        .init(&device)
        .forward(logits, targets)
}

/// `0.5 * real + 0.5 * fake`.
pub fn discriminator_loss<B: Backend>(real: Tensor<B, 1>, fake: Tensor<B, 1>) -> Tensor<B, 1> {
    real.mul_scalar(0.5).add(fake.mul_scalar(0.5))
}

/// The backpropagated generator objective. The perceptual loss is reported
/// alongside but does not enter the sum.
pub fn generator_loss<B: Backend>(gan: Tensor<B, 1>, class: Tensor<B, 1>) -> Tensor<B, 1> {
    gan.add(class)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;

    fn small_config() -> ModelConfig {
        ModelConfig::new(3)
            .with_image_size(16)
            .with_encoder_dim(4)
            .with_n_downsample(2)
            .with_discriminator_dim(4)
            .with_discriminator_layers(2)
            .with_classifier_dim(4)
            .with_perceptual_dims(vec![4, 8])
    }

    #[test]
    fn networks_produce_expected_shapes() {
        let device = Default::default();
        let config = small_config();
        config.validate().unwrap();
        let model = config.init::<TestBackend>(&device);

        let edge = Tensor::<TestBackend, 4>::zeros([2, 1, 16, 16], &device);
        let src = Tensor::<TestBackend, 4>::zeros([2, 3, 16, 16], &device);
        let syn_feat = model.encode(edge, src.clone());
        assert_eq!(syn_feat.dims(), [2, 16, 4, 4]);

        let syn_img = model.generator.forward(syn_feat, src);
        assert_eq!(syn_img.dims(), [2, 3, 16, 16]);

        assert_eq!(model.classifier.forward(syn_img.clone()).dims(), [2, 3]);
        assert_eq!(model.discriminator.forward(syn_img).dims()[0], 2);
    }

    #[test]
    fn validate_rejects_sizes_lost_to_downsampling() {
        assert!(small_config().with_image_size(6).validate().is_err());
        assert!(small_config().with_image_size(18).validate().is_err());
        assert!(small_config().with_n_downsample(0).validate().is_err());
    }

    #[test]
    fn discriminator_loss_is_equal_weighted_average() {
        let device = Default::default();
        let real = Tensor::<TestBackend, 1>::from_data(TensorData::from([0.8f32]), &device);
        let fake = Tensor::<TestBackend, 1>::from_data(TensorData::from([0.2f32]), &device);
        let loss = discriminator_loss(real, fake).into_scalar();
        assert!((loss - 0.5).abs() < 1e-6);
    }

    #[test]
    fn adversarial_loss_prefers_matching_targets() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_data(TensorData::from([[4.0f32, 4.0]]), &device);
        let as_real = adversarial_loss(logits.clone(), true).into_scalar();
        let as_fake = adversarial_loss(logits, false).into_scalar();
        assert!(as_real < as_fake);
    }
}
