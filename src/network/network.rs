use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Serialize, Deserialize};

use crate::layers::{Mode, Module, Param, Pass, Sequential};
use crate::math::tensor::Tensor;
use crate::network::probe::ActivationProbe;
use crate::network::registry::Architecture;

/// Weight values shaped for the heatmap viewer: rank-1 tensors stay flat,
/// everything else is viewed as `[dim0, rest]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WeightValues {
    Vector(Vec<f64>),
    Matrix(Vec<Vec<f64>>),
}

impl WeightValues {
    fn from_tensor(t: &Tensor) -> WeightValues {
        if t.rank() <= 1 {
            WeightValues::Vector(t.data.clone())
        } else {
            WeightValues::Matrix(t.rows())
        }
    }
}

/// On-disk form of a network: every parameter and buffer by dotted name.
#[derive(Debug, Serialize, Deserialize)]
pub struct SavedModel {
    pub architecture: Architecture,
    pub tensors: BTreeMap<String, Tensor>,
}

/// A registry architecture plus its run-time state (mode, attached probe).
pub struct Network {
    architecture: Architecture,
    body: Sequential,
    mode: Mode,
    probe: Option<Arc<ActivationProbe>>,
}

/// Restores the previous mode when dropped, including during unwinding.
struct ModeRestore<'a> {
    network: &'a mut Network,
    previous: Mode,
}

impl Drop for ModeRestore<'_> {
    fn drop(&mut self) {
        self.network.mode = self.previous;
    }
}

impl Network {
    pub fn new(architecture: Architecture, body: Sequential) -> Network {
        Network { architecture, body, mode: Mode::Train, probe: None }
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switches mode and returns the previous one.
    pub fn set_mode(&mut self, mode: Mode) -> Mode {
        std::mem::replace(&mut self.mode, mode)
    }

    /// Forward pass in the current mode; training passes cache activations
    /// for `backward` and feed the attached probe.
    pub fn forward(&mut self, input: &Tensor) -> Tensor {
        let pass = Pass::new(self.mode, self.probe.as_deref());
        self.body.forward(input, &pass)
    }

    /// Backpropagates ∂L/∂logits, accumulating into every parameter gradient.
    pub fn backward(&mut self, grad_output: &Tensor) -> Tensor {
        self.body.backward(grad_output)
    }

    /// Eval-mode forward pass. The previous mode is restored afterwards even
    /// if the pass panics.
    pub fn infer(&mut self, input: &Tensor) -> Tensor {
        let previous = self.set_mode(Mode::Eval);
        let guard = ModeRestore { network: self, previous };
        guard.network.forward(input)
    }

    pub fn zero_grad(&mut self) {
        for (_, p) in self.params_mut() {
            p.zero_grad();
        }
    }

    pub fn params(&self) -> Vec<(String, &Param)> {
        let mut out = Vec::new();
        self.body.collect_params("", &mut out);
        out
    }

    pub fn params_mut(&mut self) -> Vec<(String, &mut Param)> {
        let mut out = Vec::new();
        self.body.collect_params_mut("", &mut out);
        out
    }

    pub fn attach_probe(&mut self, probe: Arc<ActivationProbe>) {
        self.probe = Some(probe);
    }

    pub fn detach_probe(&mut self) -> Option<Arc<ActivationProbe>> {
        self.probe.take()
    }

    pub fn has_probe(&self) -> bool {
        self.probe.is_some()
    }

    /// L2 norm of every weight tensor (names containing `weight`).
    pub fn weight_norms(&self) -> BTreeMap<String, f64> {
        self.params()
            .into_iter()
            .filter(|(name, _)| name.contains("weight"))
            .map(|(name, p)| (name, p.value.l2_norm()))
            .collect()
    }

    /// Weight tensors for the heatmap viewer.
    ///
    /// With `layer` set, only the weight tensor with exactly that name is
    /// returned; an unknown name gives an empty map rather than every tensor.
    pub fn weights(&self, layer: Option<&str>) -> BTreeMap<String, WeightValues> {
        self.params()
            .into_iter()
            .filter(|(name, _)| name.contains("weight"))
            .filter(|(name, _)| layer.map_or(true, |wanted| name.as_str() == wanted))
            .map(|(name, p)| (name, WeightValues::from_tensor(&p.value)))
            .collect()
    }

    pub fn to_saved(&self) -> SavedModel {
        SavedModel {
            architecture: self.architecture,
            tensors: self
                .params()
                .into_iter()
                .map(|(name, p)| (name, p.value.clone()))
                .collect(),
        }
    }

    /// Serializes every parameter and buffer to a JSON file, overwriting it.
    pub fn save_json(&self, path: &Path) -> std::io::Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer(writer, &self.to_saved())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_restores_training_mode() {
        let mut net = Architecture::Mlp.build();
        assert_eq!(net.mode(), Mode::Train);
        let out = net.infer(&Tensor::zeros(&[1, 1, 28, 28]));
        assert_eq!(out.shape, vec![1, 10]);
        assert_eq!(net.mode(), Mode::Train);
    }

    #[test]
    fn infer_restores_mode_after_panic() {
        let mut net = Architecture::Mlp.build();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            net.infer(&Tensor::zeros(&[1, 3]));
        }));
        assert!(result.is_err());
        assert_eq!(net.mode(), Mode::Train);
    }

    #[test]
    fn inference_between_forward_and_backward_is_harmless() {
        let mut net = Architecture::ResNet.build();
        let x = Tensor::filled(&[2, 1, 28, 28], 0.5);
        let logits = net.forward(&x);
        net.infer(&Tensor::zeros(&[1, 1, 28, 28]));
        let grad = net.backward(&Tensor::filled(&logits.shape, 0.1));
        assert_eq!(grad.shape, vec![2, 1, 28, 28]);
    }

    #[test]
    fn unknown_layer_yields_empty_weights() {
        let net = Architecture::Mlp.build();
        assert!(net.weights(Some("fc9.weight")).is_empty());
        assert!(net.weights(Some("fc1.bias")).is_empty());
        assert_eq!(net.weights(Some("fc1.weight")).len(), 1);
        assert_eq!(net.weights(None).len(), 3);
    }

    #[test]
    fn convolution_weights_are_flattened_to_rows() {
        let net = Architecture::LeNet.build();
        let weights = net.weights(Some("conv2.weight"));
        match weights.get("conv2.weight") {
            Some(WeightValues::Matrix(rows)) => {
                assert_eq!(rows.len(), 16);
                assert_eq!(rows[0].len(), 6 * 5 * 5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn saved_model_contains_batch_norm_buffers() {
        let net = Architecture::ResNet.build();
        let saved = net.to_saved();
        assert_eq!(saved.architecture, Architecture::ResNet);
        assert!(saved.tensors.contains_key("bn1.running_mean"));
        assert!(saved.tensors.contains_key("fc.weight"));
    }
}
