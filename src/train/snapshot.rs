use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

/// Periodic training metrics pushed as a `training_update` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub epoch: usize,
    /// Zero-based batch index within the epoch.
    pub batch: usize,
    pub total_batches: usize,
    pub loss: f64,
    /// Percent of the batch classified correctly.
    pub accuracy: f64,
    /// L2 norm of every weight tensor.
    pub weights: BTreeMap<String, f64>,
    /// First input of the batch as a PNG data URL.
    pub sample_input: Option<String>,
    /// Softmax output for the first input.
    pub sample_output: Option<Vec<f64>>,
    /// Mean |activation| of every instrumented layer, by short name.
    pub sample_activations: BTreeMap<String, f64>,
    /// Seconds since the loop started.
    pub time_elapsed: f64,
}

/// Outcome of a single-image prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub prediction: i64,
    pub confidence: f64,
    pub processed_image: Option<String>,
}

impl PredictionResult {
    /// Sentinel returned to clients when prediction fails for any reason.
    pub fn failed() -> PredictionResult {
        PredictionResult { prediction: -1, confidence: 0.0, processed_image: None }
    }
}

/// Shortens a dotted layer path for the activation chart:
/// `layer2.0.downsample.0` → `L2.0.DS.0`, `conv1` → `Cv1`.
pub fn short_layer_name(name: &str) -> String {
    name.replace("layer", "L")
        .replace("downsample", "DS")
        .replace("conv", "Cv")
        .replace("bn", "Bn")
        .replace("fc", "FC")
}
