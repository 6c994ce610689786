use std::path::Path;
use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::data::dataset::{Dataset, DatasetKind, Split};
use crate::error::DatasetError;
use crate::math::tensor::Tensor;
use crate::network::registry::INPUT_SIDE;

/// One mini-batch: images `[B, 1, 28, 28]` and their class indices.
#[derive(Debug, Clone)]
pub struct Batch {
    pub inputs: Tensor,
    pub targets: Vec<usize>,
}

/// Re-iterable source of fixed-size batches over a loaded dataset.
///
/// Partial trailing batches are always dropped so every batch has exactly
/// `batch_size` samples (batch-norm needs at least two).
#[derive(Debug, Clone)]
pub struct BatchSource {
    dataset: Arc<Dataset>,
    batch_size: usize,
    shuffle: bool,
}

impl BatchSource {
    pub fn new(dataset: Arc<Dataset>, batch_size: usize, shuffle: bool) -> BatchSource {
        BatchSource { dataset, batch_size: batch_size.max(1), shuffle }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches per epoch.
    pub fn len(&self) -> usize {
        self.dataset.len() / self.batch_size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Batches for one pass over the data, in a fresh order when shuffling.
    pub fn epoch(&self) -> EpochBatches<'_> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            order.shuffle(&mut rand::thread_rng());
        }
        EpochBatches { source: self, order, next: 0 }
    }
}

pub struct EpochBatches<'a> {
    source: &'a BatchSource,
    order: Vec<usize>,
    next: usize,
}

impl Iterator for EpochBatches<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let size = self.source.batch_size;
        let end = self.next + size;
        if end > self.order.len() {
            return None;
        }
        let indices = &self.order[self.next..end];
        self.next = end;

        let ds = &self.source.dataset;
        let mut data = Vec::with_capacity(size * INPUT_SIDE * INPUT_SIDE);
        let mut targets = Vec::with_capacity(size);
        for &i in indices {
            data.extend_from_slice(ds.image(i));
            targets.push(ds.label(i));
        }
        Some(Batch {
            inputs: Tensor::from_vec(&[size, 1, INPUT_SIDE, INPUT_SIDE], data),
            targets,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.order.len() - self.next) / self.source.batch_size;
        (left, Some(left))
    }
}

/// Loads the named dataset split from `data_dir` and wraps it in a batch
/// source. Training sources reshuffle every epoch; test sources keep file
/// order.
pub fn create_batch_source(
    data_dir: &Path,
    name: &str,
    batch_size: usize,
    train: bool,
) -> Result<BatchSource, DatasetError> {
    let kind = DatasetKind::from_name(name);
    let split = if train { Split::Train } else { Split::Test };
    let dataset = Dataset::load(data_dir, kind, split)?;
    log::info!(
        "Loaded {} {} images from {}",
        dataset.len(),
        kind.display_name(),
        data_dir.display()
    );
    Ok(BatchSource::new(Arc::new(dataset), batch_size, train))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(n: usize) -> Arc<Dataset> {
        let pixels: Vec<u8> = (0..n).flat_map(|i| vec![i as u8; 784]).collect();
        let labels: Vec<u8> = (0..n).map(|i| (i % 10) as u8).collect();
        Arc::new(Dataset::from_raw(DatasetKind::Mnist, &pixels, &labels).unwrap())
    }

    #[test]
    fn drops_partial_last_batch() {
        let source = BatchSource::new(dataset(10), 4, true);
        assert_eq!(source.len(), 2);
        let batches: Vec<Batch> = source.epoch().collect();
        assert_eq!(batches.len(), 2);
        for b in &batches {
            assert_eq!(b.inputs.shape, vec![4, 1, 28, 28]);
            assert_eq!(b.targets.len(), 4);
        }
    }

    #[test]
    fn unshuffled_source_keeps_order() {
        let source = BatchSource::new(dataset(6), 3, false);
        let targets: Vec<usize> = source.epoch().flat_map(|b| b.targets).collect();
        assert_eq!(targets, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn shuffled_epoch_visits_each_sample_once() {
        let source = BatchSource::new(dataset(20), 5, true);
        let mut targets: Vec<usize> = source.epoch().flat_map(|b| b.targets).collect();
        targets.sort_unstable();
        let mut expected: Vec<usize> = (0..20).map(|i| i % 10).collect();
        expected.sort_unstable();
        assert_eq!(targets, expected);
    }

    #[test]
    fn oversized_batch_yields_nothing() {
        let source = BatchSource::new(dataset(3), 8, true);
        assert!(source.is_empty());
        assert_eq!(source.epoch().count(), 0);
    }
}
