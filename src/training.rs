use crate::checkpoint::{load_module, save_module, CheckpointTag, RunLayout};
use crate::data::{DataConfig, GarmentBatch, GarmentBatcher, GarmentDataset, GarmentItem};
use crate::model::{
    adversarial_loss, classification_loss, discriminator_loss, generator_loss, Discriminator,
    Generator, ModelConfig, ParamGroup, TailorGan,
};
use crate::schedule::{is_checkpoint_epoch, LoopState, PeriodicTrigger, StepCounters};
use crate::utils::save_image_grid;
use anyhow::{Context, Result};
use burn::config::Config;
use burn::data::dataloader::{DataLoader, DataLoaderBuilder, DataLoaderIterator};
use burn::data::dataset::Dataset;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use log::info;
use std::path::Path;
use std::time::Instant;

/// Training always starts from the first epoch with an empty epoch counter.
pub const START_EPOCH: usize = 1;

/// Training configuration loaded from `config.json`.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    pub model: ModelConfig,
    pub data_dir: String,
    #[config(default = 8)]
    pub batch_size: usize,
    #[config(default = 4)]
    pub num_workers: usize,
    #[config(default = 0)]
    pub gpu_id: usize,
    /// Last epoch, inclusive.
    #[config(default = 100)]
    pub niter: usize,
    #[config(default = 100)]
    pub print_freq: usize,
    #[config(default = 100)]
    pub display_freq: usize,
    /// Rolling `latest` snapshots are written only when set.
    pub save_latest_freq: Option<usize>,
    #[config(default = 10)]
    pub checkpoint_epochs: usize,
    #[config(default = "String::from(\"./checkpoints\")")]
    pub checkpoints_dir: String,
    #[config(default = "String::from(\"./result\")")]
    pub results_dir: String,
    #[config(default = "String::from(\"syn_woE\")")]
    pub experiment: String,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 0.0002)]
    pub learning_rate: f64,
    #[config(default = "AdamConfig::new().with_beta_1(0.5)")]
    pub optimizer_gen: AdamConfig,
    #[config(default = "AdamConfig::new().with_beta_1(0.5)")]
    pub optimizer_disc: AdamConfig,
    /// Pretrained classifier weights saved with [`save_module`].
    pub classifier_weights: Option<String>,
    /// Pretrained perceptual network weights saved with [`save_module`].
    pub perceptual_weights: Option<String>,
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        let checks = [
            (self.batch_size, "batch_size"),
            (self.print_freq, "print_freq"),
            (self.display_freq, "display_freq"),
            (self.checkpoint_epochs, "checkpoint_epochs"),
            (self.save_latest_freq.unwrap_or(1), "save_latest_freq"),
        ];
        for (value, name) in checks {
            if value == 0 {
                return Err(anyhow::anyhow!("{name} must be positive"));
            }
        }
        Ok(())
    }

    pub fn data_config(&self) -> DataConfig {
        DataConfig {
            image_size: self.model.image_size as u32,
            edge_channels: self.model.edge_channels,
            image_channels: self.model.image_channels,
        }
    }

    pub fn layout(&self) -> RunLayout {
        RunLayout::new(&self.checkpoints_dir, &self.results_dir, &self.experiment)
    }
}

/// Which sub-module an update step optimizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdatePhase {
    /// Discriminator trainable, synthetic images detached from the generator.
    Discriminator,
    /// Discriminator frozen; gradients pass through it into the generator.
    Generator,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DiscriminatorLosses {
    pub real: f64,
    pub fake: f64,
    pub total: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GeneratorLosses {
    pub gan: f64,
    pub class: f64,
    /// Reported only, never backpropagated.
    pub perceptual: f64,
    pub total: f64,
}

#[derive(Clone, Debug)]
pub struct GeneratorOutput<B: Backend> {
    pub losses: GeneratorLosses,
    /// Synthetic images from the generator step, detached.
    pub syn_img: Tensor<B, 4>,
}

/// What happened during a run.
///
/// The step lists hold one entry per event, so they grow with
/// `total_steps / freq` over the run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrainingReport {
    pub epochs_completed: usize,
    pub iterations: usize,
    pub total_steps: usize,
    /// `total_steps` at every progress log.
    pub log_steps: Vec<usize>,
    /// `total_steps` at every sample export.
    pub sample_steps: Vec<usize>,
    /// Epochs that produced a checkpoint.
    pub checkpoint_epochs: Vec<usize>,
}

struct Timers {
    total_start: Instant,
    epoch_start: Instant,
    iter_start: Option<Instant>,
}

impl Timers {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            total_start: now,
            epoch_start: now,
            iter_start: None,
        }
    }
}

/// All mutable training state for one run: model bundle, optimizers, step
/// counters and periodic triggers.
pub struct TrainingSession<B: AutodiffBackend> {
    config: TrainingConfig,
    model: TailorGan<B>,
    optim_gen: OptimizerAdaptor<Adam, Generator<B>, B>,
    optim_disc: OptimizerAdaptor<Adam, Discriminator<B>, B>,
    phase: UpdatePhase,
    counters: StepCounters,
    print_trigger: PeriodicTrigger,
    display_trigger: PeriodicTrigger,
    latest_trigger: Option<PeriodicTrigger>,
    layout: RunLayout,
    timers: Timers,
    device: B::Device,
}

impl<B: AutodiffBackend> TrainingSession<B> {
    /// Initialize the model from the config, loading pretrained loss networks
    /// when configured.
    pub fn new(config: TrainingConfig, device: B::Device, dataset_size: usize) -> Result<Self> {
        let mut model = config.model.init::<B>(&device);
        if let Some(path) = &config.classifier_weights {
            model.classifier = load_module(model.classifier, Path::new(path), &device)?;
            info!("loaded classifier weights from {path}");
        }
        if let Some(path) = &config.perceptual_weights {
            model.perceptual = load_module(model.perceptual, Path::new(path), &device)?;
            info!("loaded perceptual weights from {path}");
        }
        Self::with_model(config, model, device, dataset_size)
    }

    pub fn with_model(
        config: TrainingConfig,
        mut model: TailorGan<B>,
        device: B::Device,
        dataset_size: usize,
    ) -> Result<Self> {
        config.validate()?;

        model.classifier = model.classifier.freeze();
        model.perceptual = model.perceptual.freeze();

        let counters = StepCounters::new(
            START_EPOCH,
            config.niter,
            0,
            config.batch_size,
            dataset_size,
        )?;
        let print_trigger = PeriodicTrigger::phased(config.print_freq, counters.total_steps)?;
        let display_trigger = PeriodicTrigger::phased(config.display_freq, counters.total_steps)?;
        let latest_trigger = config
            .save_latest_freq
            .map(|freq| PeriodicTrigger::phased(freq, counters.total_steps))
            .transpose()?;

        let optim_gen = config.optimizer_gen.init::<B, Generator<B>>();
        let optim_disc = config.optimizer_disc.init::<B, Discriminator<B>>();

        Ok(Self {
            layout: config.layout(),
            config,
            model,
            optim_gen,
            optim_disc,
            phase: UpdatePhase::Discriminator,
            counters,
            print_trigger,
            display_trigger,
            latest_trigger,
            timers: Timers::new(),
            device,
        })
    }

    pub fn model(&self) -> &TailorGan<B> {
        &self.model
    }

    pub fn counters(&self) -> &StepCounters {
        &self.counters
    }

    pub fn phase(&self) -> UpdatePhase {
        self.phase
    }

    /// Switch discriminator trainability for the next update.
    fn enter_phase(&mut self, phase: UpdatePhase) {
        let discriminator = self.model.discriminator.clone();
        self.model.discriminator = match phase {
            UpdatePhase::Discriminator => discriminator.unfreeze(),
            UpdatePhase::Generator => discriminator.freeze(),
        };
        self.phase = phase;
    }

    /// Encode reference edges and source textures into generator input.
    pub fn encode(&self, batch: &GarmentBatch<B>) -> Tensor<B, 4> {
        self.model
            .encode(batch.refer_edge_img.clone(), batch.src_img.clone())
    }

    /// One discriminator update on real images and detached synthetic ones.
    pub fn discriminator_step(
        &mut self,
        syn_feat: Tensor<B, 4>,
        batch: &GarmentBatch<B>,
    ) -> DiscriminatorLosses {
        self.enter_phase(UpdatePhase::Discriminator);

        let syn_img = self
            .model
            .generator
            .forward(syn_feat, batch.src_img.clone())
            .detach();
        let org_img_d = self.model.discriminator.forward(batch.org_img.clone());
        let syn_img_d = self.model.discriminator.forward(syn_img);
        let loss_real = adversarial_loss(org_img_d, true);
        let loss_fake = adversarial_loss(syn_img_d, false);
        let loss = discriminator_loss(loss_real.clone(), loss_fake.clone());

        let losses = DiscriminatorLosses {
            real: scalar(&loss_real),
            fake: scalar(&loss_fake),
            total: scalar(&loss),
        };

        let mut grads = loss.backward();
        let grads = GradientsParams::from_module(&mut grads, &self.model.discriminator);
        self.model.discriminator = self.optim_disc.step(
            self.config.learning_rate,
            self.model.discriminator.clone(),
            grads,
        );
        losses
    }

    /// One generator update through the frozen discriminator and classifier.
    pub fn generator_step(
        &mut self,
        syn_feat: Tensor<B, 4>,
        batch: &GarmentBatch<B>,
    ) -> GeneratorOutput<B> {
        self.enter_phase(UpdatePhase::Generator);

        let syn_img = self
            .model
            .generator
            .forward(syn_feat, batch.src_img.clone());
        let syn_img_d = self.model.discriminator.forward(syn_img.clone());
        let ganloss = adversarial_loss(syn_img_d, true);
        let pred_class = self.model.classifier.forward(syn_img.clone());
        let classloss = classification_loss(pred_class, batch.img_type.clone());
        let vggloss = self
            .model
            .perceptual
            .forward(syn_img.clone(), batch.org_img.clone());
        let loss = generator_loss(ganloss.clone(), classloss.clone());

        let losses = GeneratorLosses {
            gan: scalar(&ganloss),
            class: scalar(&classloss),
            perceptual: scalar(&vggloss),
            total: scalar(&loss),
        };

        let mut grads = loss.backward();
        let grads = GradientsParams::from_module(&mut grads, &self.model.generator);
        self.model.generator = self.optim_gen.step(
            self.config.learning_rate,
            self.model.generator.clone(),
            grads,
        );

        GeneratorOutput {
            losses,
            syn_img: syn_img.detach(),
        }
    }

    /// Drive every epoch from [`START_EPOCH`] to `niter` over `loader`.
    pub fn run(&mut self, loader: &dyn DataLoader<B, GarmentBatch<B>>) -> Result<TrainingReport> {
        let mut report = TrainingReport {
            total_steps: self.counters.total_steps,
            ..Default::default()
        };
        let mut batches: Option<Box<dyn DataLoaderIterator<GarmentBatch<B>> + '_>> = None;
        let mut state = LoopState::initial(START_EPOCH, self.config.niter);
        self.timers = Timers::new();

        loop {
            state = match state {
                LoopState::EpochStart { epoch } => {
                    self.timers.epoch_start = Instant::now();
                    self.counters.begin_epoch(epoch);
                    batches = Some(loader.iter());
                    LoopState::IterationRunning {
                        epoch,
                        iteration: 0,
                    }
                }
                LoopState::IterationRunning { epoch, iteration } => {
                    match batches.as_mut().and_then(|iter| iter.next()) {
                        Some(batch) => {
                            self.iteration(epoch, iteration, batch, &mut report)?;
                            LoopState::IterationRunning {
                                epoch,
                                iteration: iteration + 1,
                            }
                        }
                        None => LoopState::EpochEnd { epoch },
                    }
                }
                LoopState::EpochEnd { epoch } => {
                    batches = None;
                    self.end_epoch(epoch, &mut report)?;
                    LoopState::after_epoch(epoch, self.config.niter)
                }
                LoopState::TrainingComplete => break,
            };
        }

        Ok(report)
    }

    fn iteration(
        &mut self,
        epoch: usize,
        iteration: usize,
        batch: GarmentBatch<B>,
        report: &mut TrainingReport,
    ) -> Result<()> {
        if self.print_trigger.fires(self.counters.total_steps) {
            self.timers.iter_start = Some(Instant::now());
        }
        self.counters.advance();
        let total_steps = self.counters.total_steps;
        let images_seen = (iteration + 1) * self.counters.batch_size();

        let batch = batch.to_device(&self.device);
        let syn_feat = self.encode(&batch);
        let d_losses = self.discriminator_step(syn_feat.clone(), &batch);
        let output = self.generator_step(syn_feat, &batch);

        if self.print_trigger.fires(total_steps) {
            self.log_progress(epoch, images_seen, &d_losses, &output.losses);
            report.log_steps.push(total_steps);
        }

        if self.display_trigger.fires(total_steps) {
            self.export_samples(epoch, images_seen, &batch, output.syn_img)?;
            report.sample_steps.push(total_steps);
        }

        if let Some(trigger) = self.latest_trigger {
            if trigger.fires(total_steps) {
                info!("saving the latest model (epoch {epoch}, total_steps {total_steps})");
                self.save_checkpoint(CheckpointTag::Latest)?;
            }
        }

        report.iterations += 1;
        report.total_steps = total_steps;
        Ok(())
    }

    fn end_epoch(&mut self, epoch: usize, report: &mut TrainingReport) -> Result<()> {
        let save_dir = self.layout.save_dir();
        std::fs::create_dir_all(&save_dir)
            .with_context(|| format!("failed to create {}", save_dir.display()))?;
        if is_checkpoint_epoch(epoch, self.config.checkpoint_epochs) {
            self.save_checkpoint(CheckpointTag::Epoch(epoch))?;
            info!("Model saved!");
            report.checkpoint_epochs.push(epoch);
        }
        report.epochs_completed += 1;
        Ok(())
    }

    fn log_progress(
        &self,
        epoch: usize,
        images_seen: usize,
        d_losses: &DiscriminatorLosses,
        g_losses: &GeneratorLosses,
    ) {
        let total_time = self.timers.total_start.elapsed().as_secs_f64();
        let epoch_time = self.timers.epoch_start.elapsed().as_secs_f64();
        let iter_time = self
            .timers
            .iter_start
            .unwrap_or(self.timers.epoch_start)
            .elapsed()
            .as_secs_f64();
        info!(
            "epoch: {}/{}; iters: {}/{}; total_time: {:.3}; epoch_time: {:.3}; iter_time: {:.3}",
            epoch,
            self.config.niter,
            images_seen,
            self.counters.dataset_size(),
            total_time,
            epoch_time,
            iter_time
        );
        info!(
            "Total loss: {:.5}; ganloss: {:.5}; classloss: {:.5}; VGGloss: {:.5}; discriminatorloss: {:.5}",
            g_losses.total, g_losses.gan, g_losses.class, g_losses.perceptual, d_losses.total
        );
    }

    fn export_samples(
        &self,
        epoch: usize,
        images_seen: usize,
        batch: &GarmentBatch<B>,
        syn_img: Tensor<B, 4>,
    ) -> Result<()> {
        info!("save imgs");
        let dir = self.layout.sample_dir(epoch, images_seen);
        std::fs::create_dir_all(&dir)?;
        save_image_grid(batch.org_img.clone(), &dir.join("org_imgs.png"))?;
        save_image_grid(batch.src_img.clone(), &dir.join("src_imgs.png"))?;
        save_image_grid(batch.refer_edge_img.clone(), &dir.join("refer_imgs.png"))?;
        save_image_grid(syn_img, &dir.join("syn_imgs.png"))?;
        Ok(())
    }

    /// Write generator and discriminator weights. Encoders are not saved.
    pub fn save_checkpoint(&self, tag: CheckpointTag) -> Result<()> {
        save_module(&self.model.generator, &self.layout.checkpoint_path("G", tag))?;
        save_module(&self.model.discriminator, &self.layout.checkpoint_path("D", tag))?;
        Ok(())
    }
}

fn scalar<B: Backend>(loss: &Tensor<B, 1>) -> f64 {
    loss.clone().into_scalar().elem::<f64>()
}

/// Train the garment synthesis GAN on `config.data_dir`.
pub fn train<B: AutodiffBackend>(config: TrainingConfig, device: B::Device) -> Result<TrainingReport> {
    config.validate()?;
    info!("{config}");

    let dataset = GarmentDataset::from_dir(Path::new(&config.data_dir))?;
    dataset.check_labels(config.model.num_types)?;
    let dataset_size = dataset.len();
    info!("train examples -> {dataset_size}");

    B::seed(&device, config.seed);

    let batcher = GarmentBatcher::new(config.data_config());
    let mut builder = DataLoaderBuilder::<B, GarmentItem, GarmentBatch<B>>::new(batcher)
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .set_device(device.clone());
    if config.num_workers > 0 {
        builder = builder.num_workers(config.num_workers);
    }
    let loader = builder.build(dataset);

    let mut session = TrainingSession::new(config, device, dataset_size)?;
    session.run(loader.as_ref())
}
