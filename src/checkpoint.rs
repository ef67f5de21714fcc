use anyhow::{Context, Result};
use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder};
use std::path::{Path, PathBuf};

const DATASET_DIR: &str = "TailorGAN_Garmentset";
const FILE_PREFIX: &str = "TailorGAN_Garment_syn";

/// Which snapshot a checkpoint file holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckpointTag {
    Epoch(usize),
    Latest,
}

impl std::fmt::Display for CheckpointTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointTag::Epoch(epoch) => write!(f, "{epoch}"),
            CheckpointTag::Latest => write!(f, "latest"),
        }
    }
}

/// File layout for checkpoints and exported samples of one experiment.
#[derive(Clone, Debug)]
pub struct RunLayout {
    checkpoints_dir: PathBuf,
    results_dir: PathBuf,
    experiment: String,
}

impl RunLayout {
    pub fn new(checkpoints_dir: impl Into<PathBuf>, results_dir: impl Into<PathBuf>, experiment: &str) -> Self {
        Self {
            checkpoints_dir: checkpoints_dir.into(),
            results_dir: results_dir.into(),
            experiment: experiment.to_string(),
        }
    }

    /// `<checkpoints_dir>/TailorGAN_Garmentset/path/<experiment>`
    pub fn save_dir(&self) -> PathBuf {
        self.checkpoints_dir
            .join(DATASET_DIR)
            .join("path")
            .join(&self.experiment)
    }

    /// `<save_dir>/TailorGAN_Garment_syn_net<net>_<tag>.pth`
    pub fn checkpoint_path(&self, net: &str, tag: CheckpointTag) -> PathBuf {
        self.save_dir().join(format!("{FILE_PREFIX}_net{net}_{tag}.pth"))
    }

    /// `<results_dir>/<experiment>/<epoch>/<images_seen>`
    pub fn sample_dir(&self, epoch: usize, images_seen: usize) -> PathBuf {
        self.results_dir
            .join(&self.experiment)
            .join(epoch.to_string())
            .join(images_seen.to_string())
    }
}

fn recorder() -> NamedMpkBytesRecorder<FullPrecisionSettings> {
    NamedMpkBytesRecorder::<FullPrecisionSettings>::default()
}

/// Serialize a module's parameters to exactly `path`.
pub fn save_module<B: Backend, M: Module<B>>(module: &M, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let bytes = Recorder::<B>::record(&recorder(), module.clone().into_record(), ())
        .with_context(|| format!("failed to serialize {}", path.display()))?;
    std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Load parameters saved by [`save_module`] into `module`.
pub fn load_module<B: Backend, M: Module<B>>(module: M, path: &Path, device: &B::Device) -> Result<M> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let record = Recorder::<B>::load(&recorder(), bytes, device)
        .with_context(|| format!("failed to load weights from {}", path.display()))?;
    Ok(module.load_record(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_paths_follow_experiment_layout() {
        let layout = RunLayout::new("/tmp/ckpt", "./result", "syn_woE");
        assert_eq!(
            layout.checkpoint_path("G", CheckpointTag::Epoch(10)),
            PathBuf::from("/tmp/ckpt/TailorGAN_Garmentset/path/syn_woE/TailorGAN_Garment_syn_netG_10.pth")
        );
        assert_eq!(
            layout.checkpoint_path("D", CheckpointTag::Latest),
            PathBuf::from("/tmp/ckpt/TailorGAN_Garmentset/path/syn_woE/TailorGAN_Garment_syn_netD_latest.pth")
        );
    }

    #[test]
    fn sample_dir_is_keyed_by_epoch_and_images_seen() {
        let layout = RunLayout::new("/tmp/ckpt", "./result", "syn_woE");
        assert_eq!(layout.sample_dir(3, 64), PathBuf::from("./result/syn_woE/3/64"));
    }
}
