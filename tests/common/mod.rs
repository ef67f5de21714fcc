#![allow(dead_code)]

use burn::backend::{Autodiff, NdArray};
use burn::data::dataset::Dataset;
use burn::module::{ModuleVisitor, Param};
use burn::prelude::*;
use image::{GrayImage, Luma, Rgb, RgbImage};
use std::path::Path;
use tailorgan_burn::data::{build_batch, GarmentBatch, GarmentDataset, GarmentItem};
use tailorgan_burn::model::ModelConfig;
use tailorgan_burn::training::TrainingConfig;

pub type TestBackend = Autodiff<NdArray<f32>>;

pub const IMAGE_SIZE: u32 = 16;
pub const NUM_TYPES: usize = 3;

/// Write `count` garment samples and a manifest under `root`.
pub fn write_dataset(root: &Path, count: usize) {
    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let shade = (i * 40 % 256) as u8;
        let rgb = RgbImage::from_fn(IMAGE_SIZE, IMAGE_SIZE, |x, y| {
            Rgb([shade, (x * 16) as u8, (y * 16) as u8])
        });
        let edge = GrayImage::from_fn(IMAGE_SIZE, IMAGE_SIZE, |x, y| {
            Luma([if (x + y + i as u32) % 4 == 0 { 255 } else { 0 }])
        });
        let names = [
            format!("image_{i}.png"),
            format!("edge_{i}.png"),
            format!("refer_{i}.png"),
            format!("source_{i}.png"),
        ];
        rgb.save(root.join(&names[0])).unwrap();
        edge.save(root.join(&names[1])).unwrap();
        edge.save(root.join(&names[2])).unwrap();
        rgb.save(root.join(&names[3])).unwrap();
        entries.push(serde_json::json!({
            "image": names[0],
            "edge": names[1],
            "reference_edge": names[2],
            "source": names[3],
            "image_type": i % NUM_TYPES,
        }));
    }
    std::fs::write(
        root.join("manifest.json"),
        serde_json::to_string_pretty(&entries).unwrap(),
    )
    .unwrap();
}

pub fn tiny_model() -> ModelConfig {
    ModelConfig::new(NUM_TYPES)
        .with_image_size(IMAGE_SIZE as usize)
        .with_encoder_dim(4)
        .with_n_downsample(2)
        .with_discriminator_dim(4)
        .with_discriminator_layers(2)
        .with_classifier_dim(4)
        .with_perceptual_dims(vec![4, 8])
}

/// A config that keeps every output inside `scratch`.
pub fn tiny_config(data_dir: &Path, scratch: &Path) -> TrainingConfig {
    TrainingConfig::new(tiny_model(), data_dir.display().to_string())
        .with_batch_size(2)
        .with_num_workers(0)
        .with_checkpoints_dir(scratch.join("checkpoints").display().to_string())
        .with_results_dir(scratch.join("result").display().to_string())
}

pub fn first_batch(data_dir: &Path, config: &TrainingConfig) -> GarmentBatch<TestBackend> {
    let dataset = GarmentDataset::from_dir(data_dir).unwrap();
    let items: Vec<GarmentItem> = (0..config.batch_size)
        .filter_map(|i| dataset.get(i))
        .collect();
    build_batch::<TestBackend>(&items, &config.data_config(), &Default::default()).unwrap()
}

/// Every float parameter of a module, flattened in visit order.
#[derive(Default)]
pub struct ParamSnapshot(pub Vec<Vec<f32>>);

impl<B: Backend> ModuleVisitor<B> for ParamSnapshot {
    fn visit_float<const D: usize>(&mut self, param: &Param<Tensor<B, D>>) {
        self.0
            .push(param.val().to_data().convert::<f32>().to_vec::<f32>().unwrap());
    }
}

pub fn snapshot<B: Backend, M: Module<B>>(module: &M) -> Vec<Vec<f32>> {
    let mut snapshot = ParamSnapshot::default();
    module.visit(&mut snapshot);
    snapshot.0
}
