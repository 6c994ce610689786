use crate::layers::{Module, Param, Pass};
use crate::math::tensor::Tensor;

const EPS: f64 = 1e-5;
const MOMENTUM: f64 = 0.1;

/// Per-channel batch normalization over `[B, C, H, W]`.
///
/// Training passes normalize with the batch statistics and fold them into
/// the running mean/variance; eval passes use the running values, which is
/// what makes single-image inference possible.
#[derive(Debug)]
pub struct BatchNorm2d {
    pub channels: usize,
    pub weight: Param,
    pub bias: Param,
    pub running_mean: Param,
    pub running_var: Param,
    // (normalized input x̂, 1/σ per channel)
    cache: Option<(Tensor, Vec<f64>)>,
}

impl BatchNorm2d {
    pub fn new(channels: usize) -> BatchNorm2d {
        BatchNorm2d {
            channels,
            weight: Param::new(Tensor::filled(&[channels], 1.0)),
            bias: Param::new(Tensor::zeros(&[channels])),
            running_mean: Param::buffer(Tensor::zeros(&[channels])),
            running_var: Param::buffer(Tensor::filled(&[channels], 1.0)),
            cache: None,
        }
    }

    /// Flat indices of every element belonging to channel `c`.
    fn channel_indices(shape: &[usize], c: usize) -> impl Iterator<Item = usize> {
        let (batch, channels, plane) = (shape[0], shape[1], shape[2] * shape[3]);
        (0..batch).flat_map(move |n| {
            let base = (n * channels + c) * plane;
            base..base + plane
        })
    }
}

impl Module for BatchNorm2d {
    fn forward(&mut self, input: &Tensor, pass: &Pass) -> Tensor {
        assert_eq!(input.rank(), 4, "BatchNorm2d expects [B, C, H, W], got {:?}", input.shape);
        assert_eq!(input.shape[1], self.channels, "BatchNorm2d expects {} channels", self.channels);
        let mut out = Tensor::zeros(&input.shape);

        if !pass.is_training() {
            for c in 0..self.channels {
                let inv_std = 1.0 / (self.running_var.value.data[c] + EPS).sqrt();
                let mean = self.running_mean.value.data[c];
                let (gamma, beta) = (self.weight.value.data[c], self.bias.value.data[c]);
                for i in Self::channel_indices(&input.shape, c) {
                    out.data[i] = gamma * (input.data[i] - mean) * inv_std + beta;
                }
            }
            return out;
        }

        let m = (input.batch() * input.shape[2] * input.shape[3]) as f64;
        let mut x_hat = Tensor::zeros(&input.shape);
        let mut inv_stds = Vec::with_capacity(self.channels);

        for c in 0..self.channels {
            let mean = Self::channel_indices(&input.shape, c).map(|i| input.data[i]).sum::<f64>() / m;
            let var = Self::channel_indices(&input.shape, c)
                .map(|i| (input.data[i] - mean).powi(2))
                .sum::<f64>()
                / m;
            let inv_std = 1.0 / (var + EPS).sqrt();
            let (gamma, beta) = (self.weight.value.data[c], self.bias.value.data[c]);

            for i in Self::channel_indices(&input.shape, c) {
                let xh = (input.data[i] - mean) * inv_std;
                x_hat.data[i] = xh;
                out.data[i] = gamma * xh + beta;
            }

            // Running variance uses the unbiased estimate.
            let unbiased = if m > 1.0 { var * m / (m - 1.0) } else { var };
            let rm = &mut self.running_mean.value.data[c];
            *rm = (1.0 - MOMENTUM) * *rm + MOMENTUM * mean;
            let rv = &mut self.running_var.value.data[c];
            *rv = (1.0 - MOMENTUM) * *rv + MOMENTUM * unbiased;

            inv_stds.push(inv_std);
        }

        self.cache = Some((x_hat, inv_stds));
        out
    }

    fn backward(&mut self, grad_output: &Tensor) -> Tensor {
        let (x_hat, inv_stds) = self.cache.as_ref().expect("BatchNorm2d::backward called without a training forward pass");
        let shape = &x_hat.shape;
        let m = (shape[0] * shape[2] * shape[3]) as f64;
        let mut grad_input = Tensor::zeros(shape);

        for c in 0..self.channels {
            let mut sum_g = 0.0;
            let mut sum_gx = 0.0;
            for i in Self::channel_indices(shape, c) {
                sum_g += grad_output.data[i];
                sum_gx += grad_output.data[i] * x_hat.data[i];
            }
            self.weight.grad.data[c] += sum_gx;
            self.bias.grad.data[c] += sum_g;

            let scale = self.weight.value.data[c] * inv_stds[c] / m;
            for i in Self::channel_indices(shape, c) {
                grad_input.data[i] = scale * (m * grad_output.data[i] - sum_g - x_hat.data[i] * sum_gx);
            }
        }

        grad_input
    }

    fn collect_params<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a Param)>) {
        out.push((format!("{}weight", prefix), &self.weight));
        out.push((format!("{}bias", prefix), &self.bias));
        out.push((format!("{}running_mean", prefix), &self.running_mean));
        out.push((format!("{}running_var", prefix), &self.running_var));
    }

    fn collect_params_mut<'a>(&'a mut self, prefix: &str, out: &mut Vec<(String, &'a mut Param)>) {
        out.push((format!("{}weight", prefix), &mut self.weight));
        out.push((format!("{}bias", prefix), &mut self.bias));
        out.push((format!("{}running_mean", prefix), &mut self.running_mean));
        out.push((format!("{}running_var", prefix), &mut self.running_var));
    }
}
