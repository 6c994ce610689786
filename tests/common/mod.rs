#![allow(dead_code)]

use std::path::Path;
use std::sync::mpsc::Receiver;
use std::time::Duration;

use ferrite_viz::train::{Device, SessionSettings, TrainingEvent};

/// Writes an IDX image/label pair of `n` 28×28 images under
/// `dir/<folder>/raw/` using the given split prefix (`train` or `t10k`).
///
/// Each image is a bright vertical bar whose column depends on the label, so
/// the classes are actually separable.
pub fn write_idx_dataset(dir: &Path, folder: &str, prefix: &str, n: usize) {
    let raw = dir.join(folder).join("raw");
    std::fs::create_dir_all(&raw).unwrap();

    let mut images = vec![0u8, 0, 8, 3];
    images.extend_from_slice(&(n as u32).to_be_bytes());
    images.extend_from_slice(&28u32.to_be_bytes());
    images.extend_from_slice(&28u32.to_be_bytes());
    let mut labels = vec![0u8, 0, 8, 1];
    labels.extend_from_slice(&(n as u32).to_be_bytes());

    for i in 0..n {
        let label = (i % 10) as u8;
        let column = 4 + 2 * label as usize;
        for _row in 0..28 {
            for x in 0..28 {
                images.push(if x == column || x == column + 1 { 255 } else { 0 });
            }
        }
        labels.push(label);
    }

    std::fs::write(raw.join(format!("{}-images-idx3-ubyte", prefix)), images).unwrap();
    std::fs::write(raw.join(format!("{}-labels-idx1-ubyte", prefix)), labels).unwrap();
}

/// Writes `n` solid-colour CIFAR-10 records as `data_batch_1..5.bin`.
pub fn write_cifar_dataset(dir: &Path, n_per_file: usize) {
    let batches = dir.join("cifar-10-batches-bin");
    std::fs::create_dir_all(&batches).unwrap();
    for file in 1..=5 {
        let mut bytes = Vec::new();
        for i in 0..n_per_file {
            bytes.push((i % 10) as u8);
            for channel in 0..3 {
                let value = ((i * 20 + channel * 30) % 256) as u8;
                bytes.extend(std::iter::repeat(value).take(1024));
            }
        }
        std::fs::write(batches.join(format!("data_batch_{}.bin", file)), bytes).unwrap();
    }
}

pub fn settings(dir: &Path, device: Device) -> SessionSettings {
    SessionSettings {
        data_dir: dir.to_path_buf(),
        export_path: dir.join("exported.json"),
        device,
        snapshot_interval: 10,
    }
}

/// Receives events until `training_complete`, returning everything seen.
pub fn collect_until_complete(rx: &Receiver<TrainingEvent>) -> Vec<TrainingEvent> {
    let mut seen = Vec::new();
    loop {
        let event = rx
            .recv_timeout(Duration::from_secs(120))
            .expect("training did not complete in time");
        let done = matches!(event, TrainingEvent::TrainingComplete);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

pub fn log_messages(events: &[TrainingEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            TrainingEvent::Log(line) => Some(line.message.clone()),
            _ => None,
        })
        .collect()
}
