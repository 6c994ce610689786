use crate::layers::{forward_child, Module, Param, Pass};
use crate::math::tensor::Tensor;

/// Named modules applied in order. Names become the dotted prefixes of the
/// contained parameters (`fc1.weight`, `layer1.0.conv1.weight`, …).
#[derive(Default)]
pub struct Sequential {
    layers: Vec<(String, Box<dyn Module>)>,
}

impl Sequential {
    pub fn new() -> Sequential {
        Sequential::default()
    }

    /// Builder-style append.
    pub fn with<M: Module + 'static>(mut self, name: &str, layer: M) -> Sequential {
        self.layers.push((name.to_owned(), Box::new(layer)));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl Module for Sequential {
    fn forward(&mut self, input: &Tensor, pass: &Pass) -> Tensor {
        let mut current = input.clone();
        for (name, layer) in self.layers.iter_mut() {
            current = forward_child(layer.as_mut(), name, &current, pass);
        }
        current
    }

    fn backward(&mut self, grad_output: &Tensor) -> Tensor {
        let mut grad = grad_output.clone();
        for (_, layer) in self.layers.iter_mut().rev() {
            grad = layer.backward(&grad);
        }
        grad
    }

    fn collect_params<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a Param)>) {
        for (name, layer) in &self.layers {
            layer.collect_params(&format!("{}{}.", prefix, name), out);
        }
    }

    fn collect_params_mut<'a>(&'a mut self, prefix: &str, out: &mut Vec<(String, &'a mut Param)>) {
        for (name, layer) in self.layers.iter_mut() {
            layer.collect_params_mut(&format!("{}{}.", prefix, name), out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{gradcheck, Linear, Mode, Relu};
    use crate::network::probe::ActivationProbe;

    #[test]
    fn parameter_names_are_dotted() {
        let seq = Sequential::new()
            .with("fc1", Linear::new(4, 3))
            .with("relu1", Relu::new())
            .with("fc2", Linear::new(3, 2));
        let mut params = Vec::new();
        seq.collect_params("", &mut params);
        let names: Vec<&str> = params.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["fc1.weight", "fc1.bias", "fc2.weight", "fc2.bias"]);
    }

    #[test]
    fn probe_records_instrumented_layers_only() {
        let mut seq = Sequential::new()
            .with("fc1", Linear::new(2, 2))
            .with("relu1", Relu::new());
        let probe = ActivationProbe::new();
        seq.forward(&Tensor::filled(&[1, 2], 1.0), &Pass::new(Mode::Train, Some(&probe)));
        let seen = probe.snapshot();
        assert_eq!(seen.keys().collect::<Vec<_>>(), vec!["fc1"]);
    }

    #[test]
    fn chained_gradients_match_finite_differences() {
        let mut seq = Sequential::new()
            .with("fc1", Linear::new(3, 4))
            .with("fc2", Linear::new(4, 2));
        let x = Tensor::from_vec(&[2, 3], vec![0.1, 0.4, -0.3, 0.9, -0.6, 0.2]);
        assert!(gradcheck::max_gradient_error(&mut seq, &x) < 1e-6);
    }
}
