use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use crate::math::tensor::Tensor;

/// Collects the mean absolute activation of the first sample for every
/// instrumented layer a training pass runs through.
///
/// Attached to a `Network` for the duration of a training run and detached
/// afterwards; values are overwritten on every pass, so a snapshot always
/// reflects the most recent batch.
#[derive(Debug, Default)]
pub struct ActivationProbe {
    values: Mutex<BTreeMap<String, f64>>,
}

impl ActivationProbe {
    pub fn new() -> ActivationProbe {
        ActivationProbe::default()
    }

    pub fn record(&self, layer: &str, output: &Tensor) {
        if output.numel() == 0 || output.batch() == 0 {
            return;
        }
        let first = output.sample(0);
        let mean_abs = first.iter().map(|x| x.abs()).sum::<f64>() / first.len().max(1) as f64;
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(layer.to_owned(), mean_abs);
    }

    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
