mod common;

use common::{tiny_config, write_dataset, TestBackend};
use tailorgan_burn::checkpoint::{load_module, CheckpointTag};
use tailorgan_burn::training::train;

#[test]
fn ten_epoch_run_checkpoints_and_exports_on_schedule() {
    let data = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    write_dataset(data.path(), 4);

    let config = tiny_config(data.path(), scratch.path())
        .with_niter(10)
        .with_print_freq(4)
        .with_display_freq(6);
    let layout = config.layout();
    let model_config = config.model.clone();

    let report = train::<TestBackend>(config, Default::default()).unwrap();

    // `total_steps` starts at (10 - 1) * 4 and grows by the batch size.
    let initial = 36;
    assert_eq!(report.epochs_completed, 10);
    assert_eq!(report.iterations, 20);
    assert_eq!(report.total_steps, initial + 20 * 2);

    let expected_logs: Vec<usize> = (initial + 2..=report.total_steps)
        .step_by(2)
        .filter(|s| s % 4 == initial % 4)
        .collect();
    assert_eq!(report.log_steps, expected_logs);
    assert_eq!(report.log_steps.first(), Some(&40));

    assert!(!report.sample_steps.is_empty());
    assert!(report.sample_steps.iter().all(|s| s % 6 == initial % 6));
    assert!(layout.sample_dir(2, 2).join("syn_imgs.png").is_file());
    assert!(layout.sample_dir(2, 2).join("refer_imgs.png").is_file());

    assert_eq!(report.checkpoint_epochs, vec![10]);
    for net in ["G", "D"] {
        assert!(layout.checkpoint_path(net, CheckpointTag::Epoch(10)).is_file());
        for epoch in 1..10 {
            assert!(!layout.checkpoint_path(net, CheckpointTag::Epoch(epoch)).exists());
        }
        assert!(!layout.checkpoint_path(net, CheckpointTag::Latest).exists());
    }

    let device = Default::default();
    let generator = model_config.generator_config().init::<TestBackend>(&device);
    load_module(
        generator,
        &layout.checkpoint_path("G", CheckpointTag::Epoch(10)),
        &device,
    )
    .unwrap();
    let discriminator = model_config.discriminator_config().init::<TestBackend>(&device);
    load_module(
        discriminator,
        &layout.checkpoint_path("D", CheckpointTag::Epoch(10)),
        &device,
    )
    .unwrap();
}

#[test]
fn latest_snapshot_is_opt_in() {
    let data = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    write_dataset(data.path(), 4);

    let config = tiny_config(data.path(), scratch.path())
        .with_niter(1)
        .with_save_latest_freq(Some(2));
    let layout = config.layout();
    let report = train::<TestBackend>(config, Default::default()).unwrap();

    assert_eq!(report.iterations, 2);
    assert!(report.checkpoint_epochs.is_empty());
    assert!(layout.checkpoint_path("G", CheckpointTag::Latest).is_file());
    assert!(layout.checkpoint_path("D", CheckpointTag::Latest).is_file());
}

#[test]
fn save_dir_is_created_on_every_epoch() {
    let data = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    write_dataset(data.path(), 4);

    let config = tiny_config(data.path(), scratch.path()).with_niter(1);
    let layout = config.layout();
    let report = train::<TestBackend>(config, Default::default()).unwrap();

    assert!(report.checkpoint_epochs.is_empty());
    assert!(layout.save_dir().is_dir());
    assert!(!layout.checkpoint_path("G", CheckpointTag::Epoch(1)).exists());
}

#[test]
fn out_of_range_labels_fail_before_training() {
    let data = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    write_dataset(data.path(), 4);

    // The dataset writes labels 0..3; two types leave label 2 out of range.
    let mut config = tiny_config(data.path(), scratch.path()).with_niter(1);
    config.model.num_types = 2;
    let layout = config.layout();
    let err = train::<TestBackend>(config, Default::default()).unwrap_err();

    assert!(err.to_string().contains("outside 0..2"));
    assert!(!layout.save_dir().exists());
}

#[test]
fn missing_dataset_fails_before_training() {
    let data = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let config = tiny_config(data.path(), scratch.path()).with_niter(1);
    assert!(train::<TestBackend>(config, Default::default()).is_err());
}
