use std::fmt;
use std::path::PathBuf;

use serde::{Serialize, Deserialize};

use crate::network::registry::Architecture;
use crate::optim::OptimizerKind;

const DEFAULT_BATCH_SIZE: usize = 64;
const DEFAULT_EPOCHS: usize = 10;

fn default_architecture() -> String { "mlp".to_owned() }
fn default_dataset() -> String { "mnist".to_owned() }
fn default_batch_size() -> usize { DEFAULT_BATCH_SIZE }
fn default_learning_rate() -> f64 { 0.001 }
fn default_epochs() -> usize { DEFAULT_EPOCHS }
fn default_optimizer() -> String { "adam".to_owned() }

/// Hyperparameters for one training run, as posted by the frontend.
///
/// Every field is optional. `lr` and `epoch_count` are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_architecture")]
    pub architecture: String,
    #[serde(default = "default_dataset")]
    pub dataset: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_learning_rate", alias = "lr")]
    pub learning_rate: f64,
    #[serde(default = "default_epochs", alias = "epoch_count")]
    pub epochs: usize,
    #[serde(default = "default_optimizer")]
    pub optimizer: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            architecture: default_architecture(),
            dataset: default_dataset(),
            batch_size: DEFAULT_BATCH_SIZE,
            learning_rate: default_learning_rate(),
            epochs: DEFAULT_EPOCHS,
            optimizer: default_optimizer(),
        }
    }
}

impl TrainingConfig {
    /// Replaces values that cannot drive a run (zero sizes, non-positive or
    /// non-finite learning rates) with the defaults.
    pub fn normalized(mut self) -> TrainingConfig {
        if self.batch_size == 0 {
            self.batch_size = DEFAULT_BATCH_SIZE;
        }
        if self.epochs == 0 {
            self.epochs = DEFAULT_EPOCHS;
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            self.learning_rate = default_learning_rate();
        }
        self
    }

    pub fn architecture(&self) -> Architecture {
        Architecture::from_name(&self.architecture)
    }

    /// `sgd` selects plain SGD; anything else is Adam.
    pub fn optimizer_kind(&self) -> OptimizerKind {
        if self.optimizer.trim().eq_ignore_ascii_case("sgd") {
            OptimizerKind::Sgd
        } else {
            OptimizerKind::Adam
        }
    }
}

/// Where the numeric work runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    /// Too few worker threads for batch-parallel convolutions to pay off.
    Cpu,
    Parallel { threads: usize },
}

impl Device {
    /// `Parallel` when the global rayon pool has at least four threads.
    pub fn detect() -> Device {
        match rayon::current_num_threads() {
            n if n >= 4 => Device::Parallel { threads: n },
            _ => Device::Cpu,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Parallel { threads } => write!(f, "parallel cpu ({} threads)", threads),
        }
    }
}

/// Batch size actually used for a run, plus a notice when it differs from
/// the requested one.
///
/// Only ResNet is adjusted: the default 64 is doubled on a parallel device,
/// and a single-threaded device trains with the smallest batch batch-norm
/// accepts.
pub fn effective_batch_size(
    architecture: Architecture,
    requested: usize,
    device: Device,
) -> (usize, Option<String>) {
    let chosen = match (architecture, device) {
        (Architecture::ResNet, Device::Parallel { .. }) if requested == DEFAULT_BATCH_SIZE => 128,
        (Architecture::ResNet, Device::Cpu) => 2,
        _ => requested,
    };
    if chosen == requested {
        (requested, None)
    } else {
        let notice = format!(
            "Batch size {} overridden to {} for {} on {}",
            requested,
            chosen,
            architecture.name(),
            device
        );
        (chosen, Some(notice))
    }
}

/// Process-wide settings a session is created with.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Root directory holding the dataset files.
    pub data_dir: PathBuf,
    /// Where `save_model` writes the model JSON.
    pub export_path: PathBuf,
    pub device: Device,
    /// A metric snapshot is pushed every this many batches.
    pub snapshot_interval: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            data_dir: PathBuf::from("./data"),
            export_path: PathBuf::from("model.json"),
            device: Device::detect(),
            snapshot_interval: 10,
        }
    }
}
