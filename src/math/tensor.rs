use rand::prelude::*;
use serde::{Serialize, Deserialize};
use std::f64::consts::PI;

/// Dense n-dimensional array stored row-major.
///
/// The first dimension is always the batch dimension for activations
/// flowing through a network; parameters use whatever shape their layer needs
/// (e.g. `[out, in]` for linear weights, `[out, in, k, k]` for convolutions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl Tensor {
    pub fn zeros(shape: &[usize]) -> Tensor {
        Tensor {
            shape: shape.to_vec(),
            data: vec![0.0; shape.iter().product()],
        }
    }

    pub fn filled(shape: &[usize], value: f64) -> Tensor {
        Tensor {
            shape: shape.to_vec(),
            data: vec![value; shape.iter().product()],
        }
    }

    pub fn from_vec(shape: &[usize], data: Vec<f64>) -> Tensor {
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "shape {:?} does not match {} elements",
            shape,
            data.len()
        );
        Tensor { shape: shape.to_vec(), data }
    }

    /// Samples a single value from N(0, 1) using the Box-Muller transform.
    fn sample_standard_normal(rng: &mut ThreadRng) -> f64 {
        // Both uniforms in (0, 1] to avoid log(0).
        let u1: f64 = 1.0 - rng.gen::<f64>();
        let u2: f64 = 1.0 - rng.gen::<f64>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    /// He initialization: samples from N(0, sqrt(2 / fan_in)).
    ///
    /// Every trainable weight in the registry sits in front of a ReLU (or is
    /// the final classifier), so this is the only initializer needed.
    pub fn he(shape: &[usize], fan_in: usize) -> Tensor {
        let mut rng = rand::thread_rng();
        let std_dev = (2.0 / fan_in.max(1) as f64).sqrt();
        let n = shape.iter().product();
        let data = (0..n)
            .map(|_| Tensor::sample_standard_normal(&mut rng) * std_dev)
            .collect();
        Tensor { shape: shape.to_vec(), data }
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Size of the leading (batch) dimension.
    pub fn batch(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Number of elements per entry of the leading dimension.
    pub fn sample_len(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    pub fn sample(&self, index: usize) -> &[f64] {
        let len = self.sample_len();
        &self.data[index * len..(index + 1) * len]
    }

    pub fn reshape(self, shape: &[usize]) -> Tensor {
        Tensor::from_vec(shape, self.data)
    }

    pub fn fill(&mut self, value: f64) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    pub fn map<F>(&self, functor: F) -> Tensor
    where
        F: Fn(f64) -> f64,
    {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&x| functor(x)).collect(),
        }
    }

    pub fn add_assign(&mut self, rhs: &Tensor) {
        if self.shape != rhs.shape {
            panic!("Tensors are of incorrect sizes: {:?} vs {:?}", self.shape, rhs.shape)
        }
        self.data.iter_mut().zip(rhs.data.iter()).for_each(|(a, b)| *a += b);
    }

    /// Euclidean norm over every element.
    pub fn l2_norm(&self) -> f64 {
        self.data.iter().map(|x| x * x).sum::<f64>().sqrt()
    }

    /// Views the tensor as `[dim0, rest]` rows; rank-1 tensors become one row.
    pub fn rows(&self) -> Vec<Vec<f64>> {
        if self.rank() < 2 {
            return vec![self.data.clone()];
        }
        let cols = self.sample_len();
        if cols == 0 {
            return vec![Vec::new(); self.batch()];
        }
        self.data.chunks(cols).map(|row| row.to_vec()).collect()
    }
}

impl Default for Tensor {
    fn default() -> Self {
        Tensor { shape: vec![0], data: vec![] }
    }
}

/// Index of the maximum element in a slice.
pub fn argmax(v: &[f64]) -> usize {
    v.iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}
