pub mod batch;
pub mod cifar;
pub mod dataset;
pub mod idx;

pub use batch::{create_batch_source, Batch, BatchSource};
pub use dataset::{Dataset, DatasetKind, Split, DATASET_NAMES};
