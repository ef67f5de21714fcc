#![recursion_limit = "256"]
use anyhow::{Context, Result};
use burn::backend::Autodiff;
use burn::config::Config;
use clap::Parser;
use env_logger::Env;
use log::info;
use std::path::PathBuf;
use tailorgan_burn::training::{train, TrainingConfig};

#[derive(Parser, Debug)]
#[command(about = "Train the TailorGAN garment synthesis stage with Burn")]
struct Args {
    #[arg(long, default_value = "config.json")]
    config: PathBuf,
    /// Overrides `data_dir` from the config.
    #[arg(long)]
    data_dir: Option<String>,
    #[arg(long)]
    gpu_id: Option<usize>,
    /// Last epoch to train.
    #[arg(long)]
    niter: Option<usize>,
    #[arg(long)]
    batch_size: Option<usize>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = TrainingConfig::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(gpu_id) = args.gpu_id {
        config.gpu_id = gpu_id;
    }
    if let Some(niter) = args.niter {
        config.niter = niter;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }

    launch(config)?;
    info!("Training Finished");
    Ok(())
}

#[cfg(feature = "cuda")]
fn launch(config: TrainingConfig) -> Result<()> {
    use burn::backend::cuda::CudaDevice;
    use burn::backend::Cuda;

    let device = CudaDevice::new(config.gpu_id);
    let report = train::<Autodiff<Cuda>>(config, device)?;
    info!("completed {} epochs, {} iterations", report.epochs_completed, report.iterations);
    Ok(())
}

#[cfg(all(feature = "webgpu", not(feature = "cuda")))]
fn launch(config: TrainingConfig) -> Result<()> {
    use burn::backend::wgpu::WgpuDevice;
    use burn::backend::WebGpu;

    let device = WgpuDevice::DiscreteGpu(config.gpu_id);
    let report = train::<Autodiff<WebGpu<f32, i32>>>(config, device)?;
    info!("completed {} epochs, {} iterations", report.epochs_completed, report.iterations);
    Ok(())
}

#[cfg(not(any(feature = "cuda", feature = "webgpu")))]
fn launch(config: TrainingConfig) -> Result<()> {
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::NdArray;

    if config.gpu_id != 0 {
        log::warn!("built without a GPU backend; ignoring gpu_id {}", config.gpu_id);
    }
    let report = train::<Autodiff<NdArray<f32>>>(config, NdArrayDevice::Cpu)?;
    info!("completed {} epochs, {} iterations", report.epochs_completed, report.iterations);
    Ok(())
}
