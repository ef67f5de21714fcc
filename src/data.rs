use anyhow::{Context, Result};
use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use burn::tensor::TensorData;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One row of `manifest.json`; paths are relative to the dataset root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub image: PathBuf,
    pub edge: PathBuf,
    pub reference_edge: PathBuf,
    pub source: PathBuf,
    pub image_type: i64,
}

/// A garment sample with absolute image paths.
#[derive(Debug, Clone)]
pub struct GarmentItem {
    pub org_path: PathBuf,
    pub edge_path: PathBuf,
    pub refer_edge_path: PathBuf,
    pub src_path: PathBuf,
    pub img_type: i64,
}

/// Settings for decoding and assembling image batches.
#[derive(Debug, Clone)]
pub struct DataConfig {
    pub image_size: u32,
    pub edge_channels: usize,
    pub image_channels: usize,
}

/// Five aligned tensors for one training iteration.
#[derive(Clone, Debug)]
pub struct GarmentBatch<B: Backend> {
    pub edge_img: Tensor<B, 4>,
    pub refer_edge_img: Tensor<B, 4>,
    pub src_img: Tensor<B, 4>,
    pub img_type: Tensor<B, 1, Int>,
    pub org_img: Tensor<B, 4>,
}

impl<B: Backend> GarmentBatch<B> {
    pub fn batch_size(&self) -> usize {
        self.img_type.dims()[0]
    }

    pub fn to_device(self, device: &B::Device) -> Self {
        Self {
            edge_img: self.edge_img.to_device(device),
            refer_edge_img: self.refer_edge_img.to_device(device),
            src_img: self.src_img.to_device(device),
            img_type: self.img_type.to_device(device),
            org_img: self.org_img.to_device(device),
        }
    }
}

/// Garment dataset backed by a manifest; images are decoded lazily per batch.
#[derive(Clone, Debug)]
pub struct GarmentDataset {
    items: Vec<GarmentItem>,
}

impl GarmentDataset {
    /// Load `<root>/manifest.json`, resolving and checking every image path.
    pub fn from_dir(root: &Path) -> Result<Self> {
        let manifest_path = root.join("manifest.json");
        let contents = std::fs::read_to_string(&manifest_path)
            .with_context(|| format!("failed to read {}", manifest_path.display()))?;
        let entries: Vec<ManifestEntry> = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", manifest_path.display()))?;
        if entries.is_empty() {
            return Err(anyhow::anyhow!(
                "manifest {} lists no samples",
                manifest_path.display()
            ));
        }

        let items = entries
            .into_iter()
            .map(|entry| resolve_entry(root, entry))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { items })
    }

    /// Reject labels outside `0..num_types` before they reach the loss.
    pub fn check_labels(&self, num_types: usize) -> Result<()> {
        match self
            .items
            .iter()
            .find(|item| item.img_type < 0 || item.img_type as usize >= num_types)
        {
            Some(item) => Err(anyhow::anyhow!(
                "image_type {} of {} is outside 0..{num_types}",
                item.img_type,
                item.org_path.display()
            )),
            None => Ok(()),
        }
    }
}

fn resolve_entry(root: &Path, entry: ManifestEntry) -> Result<GarmentItem> {
    let resolve = |path: &Path| -> Result<PathBuf> {
        let full = root.join(path);
        if !full.is_file() {
            return Err(anyhow::anyhow!("missing image {}", full.display()));
        }
        Ok(full)
    };
    Ok(GarmentItem {
        org_path: resolve(&entry.image)?,
        edge_path: resolve(&entry.edge)?,
        refer_edge_path: resolve(&entry.reference_edge)?,
        src_path: resolve(&entry.source)?,
        img_type: entry.image_type,
    })
}

impl Dataset<GarmentItem> for GarmentDataset {
    fn get(&self, index: usize) -> Option<GarmentItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

#[derive(Clone, Debug)]
pub struct GarmentBatcher {
    config: DataConfig,
}

impl GarmentBatcher {
    pub fn new(config: DataConfig) -> Self {
        Self { config }
    }
}

impl<B: Backend> Batcher<B, GarmentItem, GarmentBatch<B>> for GarmentBatcher {
    fn batch(&self, items: Vec<GarmentItem>, device: &B::Device) -> GarmentBatch<B> {
        build_batch::<B>(&items, &self.config, device).expect("failed to build batch")
    }
}

/// Decode and stack a batch of garment samples, normalized to [-1, 1].
pub fn build_batch<B: Backend>(
    items: &[GarmentItem],
    config: &DataConfig,
    device: &B::Device,
) -> Result<GarmentBatch<B>> {
    let load = |paths: Vec<&Path>, channels: usize| -> Result<Tensor<B, 4>> {
        let size = config.image_size as usize;
        let mut values = Vec::with_capacity(paths.len() * channels * size * size);
        for path in &paths {
            let img = image::open(path)
                .with_context(|| format!("failed to decode {}", path.display()))?;
            values.append(&mut image_to_chw(&img, config.image_size, channels)?);
        }
        Ok(Tensor::<B, 4>::from_data(
            TensorData::new(values, [paths.len(), channels, size, size]),
            device,
        ))
    };

    let edge_img = load(items.iter().map(|i| i.edge_path.as_path()).collect(), config.edge_channels)?;
    let refer_edge_img = load(
        items.iter().map(|i| i.refer_edge_path.as_path()).collect(),
        config.edge_channels,
    )?;
    let src_img = load(items.iter().map(|i| i.src_path.as_path()).collect(), config.image_channels)?;
    let org_img = load(items.iter().map(|i| i.org_path.as_path()).collect(), config.image_channels)?;
    let labels = items.iter().map(|i| i.img_type).collect::<Vec<_>>();
    let img_type = Tensor::<B, 1, Int>::from_data(TensorData::new(labels, [items.len()]), device);

    Ok(GarmentBatch {
        edge_img,
        refer_edge_img,
        src_img,
        img_type,
        org_img,
    })
}

/// Resize to `size x size` and convert to CHW floats in [-1, 1].
fn image_to_chw(img: &DynamicImage, size: u32, channels: usize) -> Result<Vec<f32>> {
    let img = if img.width() != size || img.height() != size {
        img.resize_exact(size, size, image::imageops::FilterType::CatmullRom)
    } else {
        img.clone()
    };

    let hw = (size * size) as usize;
    let mut out = vec![0.0f32; hw * channels];
    match channels {
        1 => {
            let luma = img.to_luma8();
            for (idx, pixel) in luma.pixels().enumerate() {
                out[idx] = (pixel.0[0] as f32 / 127.5) - 1.0;
            }
        }
        3 => {
            let rgb = img.to_rgb8();
            for (idx, pixel) in rgb.pixels().enumerate() {
                for c in 0..3 {
                    out[c * hw + idx] = (pixel.0[c] as f32 / 127.5) - 1.0;
                }
            }
        }
        other => return Err(anyhow::anyhow!("unsupported channel count {other}")),
    }
    Ok(out)
}
