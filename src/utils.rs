use anyhow::{Context, Result};
use burn::prelude::*;
use image::{Rgb, RgbImage};
use std::path::Path;

/// Images per grid row in exported samples.
pub const GRID_NROW: usize = 8;
/// Black border between and around grid cells, in pixels.
pub const GRID_PADDING: usize = 2;

/// Lay out a BCHW tensor as one image grid, min-max normalized over the
/// whole batch. Single-channel batches are rendered as gray.
pub fn tensor_to_grid<B: Backend>(
    tensor: Tensor<B, 4>,
    nrow: usize,
    padding: usize,
) -> Result<RgbImage> {
    let data = tensor.to_data().convert::<f32>();
    let shape = data.shape.clone();
    if shape.len() != 4 {
        return Err(anyhow::anyhow!(
            "expected rank-4 tensor for images, got shape {shape:?}"
        ));
    }
    let (batch, channels, height, width) = (shape[0], shape[1], shape[2], shape[3]);
    if channels != 1 && channels != 3 {
        return Err(anyhow::anyhow!(
            "expected 1 or 3 channels for images, got {channels}"
        ));
    }
    if batch == 0 || nrow == 0 {
        return Err(anyhow::anyhow!("no images to merge"));
    }

    let values = data
        .to_vec::<f32>()
        .context("failed to read tensor data as f32")?;
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = (max - min).max(1e-5);
    let to_u8 = |v: f32| (((v.clamp(min, max) - min) / range) * 255.0 + 0.5).clamp(0.0, 255.0) as u8;

    let cols = nrow.min(batch);
    let rows = batch.div_ceil(cols);
    let cell_w = width + padding;
    let cell_h = height + padding;
    let mut grid = RgbImage::new((cols * cell_w + padding) as u32, (rows * cell_h + padding) as u32);

    let hw = height * width;
    for b in 0..batch {
        let base = b * channels * hw;
        let x0 = (b % cols) * cell_w + padding;
        let y0 = (b / cols) * cell_h + padding;
        for y in 0..height {
            for x in 0..width {
                let idx = base + y * width + x;
                let pixel = if channels == 1 {
                    let v = to_u8(values[idx]);
                    Rgb([v, v, v])
                } else {
                    Rgb([
                        to_u8(values[idx]),
                        to_u8(values[idx + hw]),
                        to_u8(values[idx + 2 * hw]),
                    ])
                };
                grid.put_pixel((x0 + x) as u32, (y0 + y) as u32, pixel);
            }
        }
    }

    Ok(grid)
}

/// Save a normalized grid of a batch as PNG, creating parent directories.
pub fn save_image_grid<B: Backend>(tensor: Tensor<B, 4>, path: &Path) -> Result<()> {
    let grid = tensor_to_grid(tensor, GRID_NROW, GRID_PADDING)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    grid.save(path)
        .with_context(|| format!("failed to save {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;

    #[test]
    fn grid_wraps_rows_and_pads_cells() {
        let images = Tensor::<TestBackend, 4>::zeros([10, 3, 4, 4], &Default::default());
        let grid = tensor_to_grid(images, 8, 2).unwrap();
        assert_eq!(grid.dimensions(), (8 * 6 + 2, 2 * 6 + 2));

        let images = Tensor::<TestBackend, 4>::zeros([3, 1, 4, 5], &Default::default());
        let grid = tensor_to_grid(images, 8, 2).unwrap();
        assert_eq!(grid.dimensions(), (3 * 7 + 2, 6 + 2));
    }

    #[test]
    fn grid_stretches_value_range_to_full_scale() {
        let values = vec![-0.5f32, 0.5, 0.5, -0.5];
        let images = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(values, [1, 1, 2, 2]),
            &Default::default(),
        );
        let grid = tensor_to_grid(images, 8, 1).unwrap();
        assert_eq!(grid.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(grid.get_pixel(1, 1), &Rgb([0, 0, 0]));
        assert_eq!(grid.get_pixel(2, 1), &Rgb([255, 255, 255]));
        assert_eq!(grid.get_pixel(1, 2), &Rgb([255, 255, 255]));
    }

    #[test]
    fn save_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("3").join("16").join("syn_imgs.png");
        let images = Tensor::<TestBackend, 4>::ones([2, 3, 4, 4], &Default::default());
        save_image_grid(images, &path).unwrap();
        assert!(path.is_file());
    }
}
