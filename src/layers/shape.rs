use crate::layers::{Module, Pass};
use crate::math::tensor::Tensor;

/// Element-wise max(0, x).
#[derive(Debug, Default)]
pub struct Relu {
    mask: Option<Vec<bool>>,
}

impl Relu {
    pub fn new() -> Relu {
        Relu::default()
    }
}

impl Module for Relu {
    fn forward(&mut self, input: &Tensor, pass: &Pass) -> Tensor {
        let out = input.map(|x| if x > 0.0 { x } else { 0.0 });
        if pass.is_training() {
            self.mask = Some(input.data.iter().map(|&x| x > 0.0).collect());
        }
        out
    }

    fn backward(&mut self, grad_output: &Tensor) -> Tensor {
        let mask = self.mask.as_ref().expect("Relu::backward called without a training forward pass");
        let data = grad_output
            .data
            .iter()
            .zip(mask.iter())
            .map(|(&g, &on)| if on { g } else { 0.0 })
            .collect();
        Tensor::from_vec(&grad_output.shape, data)
    }
}

/// Collapses everything after the batch dimension: `[B, ...]` → `[B, n]`.
#[derive(Debug, Default)]
pub struct Flatten {
    input_shape: Option<Vec<usize>>,
}

impl Flatten {
    pub fn new() -> Flatten {
        Flatten::default()
    }
}

impl Module for Flatten {
    fn forward(&mut self, input: &Tensor, pass: &Pass) -> Tensor {
        if pass.is_training() {
            self.input_shape = Some(input.shape.clone());
        }
        input.clone().reshape(&[input.batch(), input.sample_len()])
    }

    fn backward(&mut self, grad_output: &Tensor) -> Tensor {
        let shape = self.input_shape.as_ref().expect("Flatten::backward called without a training forward pass");
        grad_output.clone().reshape(shape)
    }
}
