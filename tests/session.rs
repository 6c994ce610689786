mod common;

use std::time::Duration;

use ferrite_viz::data::create_batch_source;
use ferrite_viz::error::TrainerError;
use ferrite_viz::network::{Architecture, SavedModel, WeightValues};
use ferrite_viz::preprocess::encode_png;
use ferrite_viz::train::{Device, TrainingConfig, TrainingEvent, TrainingSession};

use common::{collect_until_complete, log_messages, settings, write_cifar_dataset, write_idx_dataset};

fn config(architecture: &str, epochs: usize) -> TrainingConfig {
    TrainingConfig {
        architecture: architecture.to_owned(),
        dataset: "MNIST".to_owned(),
        batch_size: 64,
        learning_rate: 0.001,
        epochs,
        optimizer: "adam".to_owned(),
    }
}

#[test]
fn lenet_run_streams_updates_and_completes() {
    let dir = tempfile::tempdir().unwrap();
    write_idx_dataset(dir.path(), "MNIST", "train", 640);
    let session = TrainingSession::new(settings(dir.path(), Device::Parallel { threads: 4 }));
    let rx = session.subscribe();

    let report = session.start(config("lenet", 1)).unwrap();
    assert_eq!(report.architecture, Architecture::LeNet);
    assert_eq!(report.batch_size, 64);
    assert_eq!(report.total_batches, 10);

    let events = collect_until_complete(&rx);
    assert!(!events.iter().any(|e| matches!(e, TrainingEvent::TrainingError { .. })));

    let updates: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            TrainingEvent::TrainingUpdate(s) => Some(s.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(updates.len(), 1);
    let update = &updates[0];
    assert_eq!((update.epoch, update.batch, update.total_batches), (1, 0, 10));
    assert!(update.loss.is_finite() && update.loss > 0.0);
    assert!((0.0..=100.0).contains(&update.accuracy));
    assert!(update.weights.contains_key("conv1.weight"));
    assert!(update.weights.contains_key("fc3.weight"));
    assert!(update.sample_input.is_some());
    assert_eq!(update.sample_output.as_ref().map(Vec::len), Some(10));
    assert!(update.sample_activations.contains_key("Cv1"));
    assert!(update.sample_activations.contains_key("FC3"));

    let messages = log_messages(&events);
    assert!(messages.iter().any(|m| m.starts_with("Using device")));
    assert!(messages.iter().any(|m| m == "Starting loop. Epochs: 1, Batches: 10"));
    assert!(messages.iter().any(|m| m == "Starting Epoch 1"));
    assert!(messages.iter().any(|m| m == "Epoch 1 complete"));

    assert!(!session.is_running());

    // The trained model stays available.
    match session.get_weights(Some("conv1.weight")).get("conv1.weight") {
        Some(WeightValues::Matrix(rows)) => assert_eq!(rows.len(), 6),
        other => panic!("unexpected {:?}", other),
    }
    assert!(session.get_weights(Some("conv9.weight")).is_empty());

    let path = session.save_model().unwrap().unwrap();
    let saved: SavedModel = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
    assert_eq!(saved.architecture, Architecture::LeNet);
    assert!(saved.tensors.contains_key("fc1.bias"));

    let mut drawing = image::GrayImage::from_pixel(64, 64, image::Luma([255]));
    for y in 10..54 {
        for x in 30..36 {
            drawing.put_pixel(x, y, image::Luma([0]));
        }
    }
    let result = session.predict(&encode_png(&drawing).unwrap()).unwrap();
    assert!((0..10).contains(&result.prediction));
    assert!(result.confidence > 0.0 && result.confidence <= 1.0);
    assert!(result.processed_image.unwrap().starts_with("data:image/png;base64,"));
}

#[test]
fn second_start_is_rejected_until_the_loop_exits() {
    let dir = tempfile::tempdir().unwrap();
    write_idx_dataset(dir.path(), "MNIST", "train", 640);
    let session = TrainingSession::new(settings(dir.path(), Device::Cpu));
    let rx = session.subscribe();

    session.start(config("mlp", 500)).unwrap();
    assert!(session.is_running());
    assert!(matches!(session.start(config("lenet", 1)), Err(TrainerError::AlreadyRunning)));

    session.stop();
    let events = collect_until_complete(&rx);
    let completes = events.iter().filter(|e| matches!(e, TrainingEvent::TrainingComplete)).count();
    assert_eq!(completes, 1);
    assert!(log_messages(&events).iter().any(|m| m.starts_with("Training stopped")));
    assert!(!session.is_running());

    // No stray completion afterwards.
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

    // The previous model was left in place by the rejected start.
    assert_eq!(session.get_weights(None).len(), 3);

    // And a new run can start once the loop has exited.
    session.start(config("mlp", 500)).unwrap();
    session.stop();
    collect_until_complete(&rx);
}

#[test]
fn stop_while_the_dataset_loads_is_honoured() {
    let dir = tempfile::tempdir().unwrap();
    write_idx_dataset(dir.path(), "MNIST", "train", 12_000);
    let session = TrainingSession::new(settings(dir.path(), Device::Cpu));
    let rx = session.subscribe();
    let mut run_config = config("mlp", 1);
    run_config.batch_size = 2;

    std::thread::scope(|scope| {
        let starter = scope.spawn(|| session.start(run_config));
        while !session.is_running() {
            std::thread::yield_now();
        }
        session.stop();
        let report = starter.join().unwrap().unwrap();
        assert_eq!(report.total_batches, 6_000);
    });

    let messages = log_messages(&collect_until_complete(&rx));
    assert!(messages.iter().any(|m| m.starts_with("Training stopped")));
    assert!(!messages.iter().any(|m| m == "Epoch 1 complete"));
}

#[test]
fn resnet_batch_size_is_reduced_on_a_single_threaded_device() {
    let dir = tempfile::tempdir().unwrap();
    write_idx_dataset(dir.path(), "MNIST", "train", 64);
    let session = TrainingSession::new(settings(dir.path(), Device::Cpu));
    let rx = session.subscribe();

    let report = session.start(config("resnet", 1)).unwrap();
    assert_eq!(report.batch_size, 2);
    assert_eq!(report.total_batches, 32);
    session.stop();

    let events = collect_until_complete(&rx);
    assert!(log_messages(&events)
        .iter()
        .any(|m| m == "Batch size 64 overridden to 2 for resnet on cpu"));
}

#[test]
fn every_dataset_yields_single_channel_batches() {
    let dir = tempfile::tempdir().unwrap();
    write_idx_dataset(dir.path(), "MNIST", "train", 12);
    write_idx_dataset(dir.path(), "FashionMNIST", "t10k", 12);
    write_cifar_dataset(dir.path(), 4);

    for (name, train) in [("MNIST", true), ("Fashion-MNIST", false), ("CIFAR-10", true)] {
        let source = create_batch_source(dir.path(), name, 4, train).unwrap();
        let batch = source.epoch().next().unwrap();
        assert_eq!(batch.inputs.shape, vec![4, 1, 28, 28], "{}", name);
        assert_eq!(batch.targets.len(), 4);
        assert!(batch.targets.iter().all(|&t| t < 10));
    }

    let cifar = create_batch_source(dir.path(), "cifar-10", 4, true).unwrap();
    assert_eq!(cifar.dataset().len(), 20);
}

#[test]
fn no_model_before_first_start() {
    let dir = tempfile::tempdir().unwrap();
    let session = TrainingSession::new(settings(dir.path(), Device::Cpu));
    assert!(session.get_weights(None).is_empty());
    assert!(session.get_weights(Some("fc1.weight")).is_empty());
    assert_eq!(session.save_model().unwrap(), None);
    assert!(!dir.path().join("exported.json").exists());
}
