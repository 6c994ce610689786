use std::path::{Path, PathBuf};

use crate::data::cifar::parse_cifar_batch;
use crate::data::idx::parse_idx_pair;
use crate::error::DatasetError;
use crate::network::registry::{INPUT_SIDE, NUM_CLASSES};

/// Display names offered to the frontend, in menu order.
pub const DATASET_NAMES: [&str; 3] = ["MNIST", "Fashion-MNIST", "CIFAR-10"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Mnist,
    FashionMnist,
    Cifar10,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl DatasetKind {
    /// Case-insensitive lookup. Anything unrecognised is MNIST.
    pub fn from_name(name: &str) -> DatasetKind {
        match name.trim().to_ascii_lowercase().as_str() {
            "fashion-mnist" => DatasetKind::FashionMnist,
            "cifar-10" => DatasetKind::Cifar10,
            _ => DatasetKind::Mnist,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DatasetKind::Mnist => DATASET_NAMES[0],
            DatasetKind::FashionMnist => DATASET_NAMES[1],
            DatasetKind::Cifar10 => DATASET_NAMES[2],
        }
    }

    /// `(mean, std)` applied after scaling pixels to `[0, 1]`.
    pub fn normalization(&self) -> (f64, f64) {
        match self {
            DatasetKind::Mnist | DatasetKind::FashionMnist => (0.1307, 0.3081),
            DatasetKind::Cifar10 => (0.5, 0.5),
        }
    }

    /// Files making up `split`, relative to the data directory.
    pub fn files(&self, split: Split) -> Vec<PathBuf> {
        let idx = |dir: &str| {
            let prefix = match split {
                Split::Train => "train",
                Split::Test => "t10k",
            };
            let raw = Path::new(dir).join("raw");
            vec![
                raw.join(format!("{}-images-idx3-ubyte", prefix)),
                raw.join(format!("{}-labels-idx1-ubyte", prefix)),
            ]
        };
        match self {
            DatasetKind::Mnist => idx("MNIST"),
            DatasetKind::FashionMnist => idx("FashionMNIST"),
            DatasetKind::Cifar10 => {
                let dir = Path::new("cifar-10-batches-bin");
                match split {
                    Split::Train => (1..=5)
                        .map(|i| dir.join(format!("data_batch_{}.bin", i)))
                        .collect(),
                    Split::Test => vec![dir.join("test_batch.bin")],
                }
            }
        }
    }
}

/// A fully loaded, normalized split: `len()` single-channel 28×28 images.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub kind: DatasetKind,
    pixels: Vec<f64>,
    labels: Vec<usize>,
}

impl Dataset {
    /// Normalizes raw 8-bit pixels (`labels.len()` images of 28×28).
    pub fn from_raw(kind: DatasetKind, pixels: &[u8], labels: &[u8]) -> Result<Dataset, DatasetError> {
        let per_image = INPUT_SIDE * INPUT_SIDE;
        if pixels.len() != labels.len() * per_image {
            return Err(DatasetError::Format(format!(
                "expected {} pixels for {} images, got {}",
                labels.len() * per_image,
                labels.len(),
                pixels.len()
            )));
        }
        let (mean, std) = kind.normalization();
        Ok(Dataset {
            kind,
            pixels: pixels.iter().map(|&p| (p as f64 / 255.0 - mean) / std).collect(),
            labels: labels.iter().map(|&l| l as usize).collect(),
        })
    }

    /// Reads and normalizes `split` of `kind` from `data_dir`.
    pub fn load(data_dir: &Path, kind: DatasetKind, split: Split) -> Result<Dataset, DatasetError> {
        let files = kind.files(split);
        match kind {
            DatasetKind::Mnist | DatasetKind::FashionMnist => {
                let images = read_file(&data_dir.join(&files[0]))?;
                let labels = read_file(&data_dir.join(&files[1]))?;
                let pair = parse_idx_pair(&images, &labels, NUM_CLASSES)?;
                if pair.rows != INPUT_SIDE || pair.cols != INPUT_SIDE {
                    return Err(DatasetError::Format(format!(
                        "{} images are {}×{}, expected {}×{}",
                        kind.display_name(),
                        pair.rows,
                        pair.cols,
                        INPUT_SIDE,
                        INPUT_SIDE
                    )));
                }
                Dataset::from_raw(kind, &pair.pixels, &pair.labels)
            }
            DatasetKind::Cifar10 => {
                let mut pixels = Vec::new();
                let mut labels = Vec::new();
                for file in &files {
                    let bytes = read_file(&data_dir.join(file))?;
                    let (p, l) = parse_cifar_batch(&bytes, INPUT_SIDE as u32)?;
                    pixels.extend(p);
                    labels.extend(l);
                }
                Dataset::from_raw(kind, &pixels, &labels)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Normalized pixels of image `i`.
    pub fn image(&self, i: usize) -> &[f64] {
        let n = INPUT_SIDE * INPUT_SIDE;
        &self.pixels[i * n..(i + 1) * n]
    }

    pub fn label(&self, i: usize) -> usize {
        self.labels[i]
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, DatasetError> {
    std::fs::read(path).map_err(|source| DatasetError::Io { path: path.to_path_buf(), source })
}
