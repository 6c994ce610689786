use crate::layers::{Module, Param, Pass};
use crate::math::tensor::Tensor;

/// Fully-connected layer: y = x·Wᵀ + b.
///
/// Shapes: input `[B, in]`, weight `[out, in]`, bias `[out]`, output `[B, out]`.
#[derive(Debug)]
pub struct Linear {
    pub in_features: usize,
    pub out_features: usize,
    pub weight: Param,
    pub bias: Param,
    input: Option<Tensor>, // cached for backprop, training passes only
}

impl Linear {
    pub fn new(in_features: usize, out_features: usize) -> Linear {
        Linear {
            in_features,
            out_features,
            weight: Param::new(Tensor::he(&[out_features, in_features], in_features)),
            bias: Param::new(Tensor::zeros(&[out_features])),
            input: None,
        }
    }
}

impl Module for Linear {
    fn forward(&mut self, input: &Tensor, pass: &Pass) -> Tensor {
        assert_eq!(
            input.sample_len(),
            self.in_features,
            "Linear expects {} input features, got {}",
            self.in_features,
            input.sample_len()
        );
        let batch = input.batch();
        let w = &self.weight.value.data;
        let b = &self.bias.value.data;
        let mut out = Tensor::zeros(&[batch, self.out_features]);

        for n in 0..batch {
            let x = input.sample(n);
            let row = &mut out.data[n * self.out_features..(n + 1) * self.out_features];
            for (o, y) in row.iter_mut().enumerate() {
                let w_row = &w[o * self.in_features..(o + 1) * self.in_features];
                *y = b[o] + w_row.iter().zip(x.iter()).map(|(w, x)| w * x).sum::<f64>();
            }
        }

        if pass.is_training() {
            self.input = Some(input.clone());
        }
        out
    }

    fn backward(&mut self, grad_output: &Tensor) -> Tensor {
        let input = self.input.as_ref().expect("Linear::backward called without a training forward pass");
        let batch = input.batch();
        let (n_in, n_out) = (self.in_features, self.out_features);
        let mut grad_input = Tensor::zeros(&input.shape);

        for n in 0..batch {
            let x = input.sample(n);
            let g = grad_output.sample(n);
            let gx = &mut grad_input.data[n * n_in..(n + 1) * n_in];
            for o in 0..n_out {
                let go = g[o];
                if go == 0.0 {
                    continue;
                }
                self.bias.grad.data[o] += go;
                let w_row = &self.weight.value.data[o * n_in..(o + 1) * n_in];
                let gw_row = &mut self.weight.grad.data[o * n_in..(o + 1) * n_in];
                for i in 0..n_in {
                    gw_row[i] += go * x[i];
                    gx[i] += go * w_row[i];
                }
            }
        }

        grad_input
    }

    fn collect_params<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a Param)>) {
        out.push((format!("{}weight", prefix), &self.weight));
        out.push((format!("{}bias", prefix), &self.bias));
    }

    fn collect_params_mut<'a>(&'a mut self, prefix: &str, out: &mut Vec<(String, &'a mut Param)>) {
        out.push((format!("{}weight", prefix), &mut self.weight));
        out.push((format!("{}bias", prefix), &mut self.bias));
    }

    fn is_instrumented(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{gradcheck, Mode};

    #[test]
    fn forward_matches_hand_computation() {
        let mut layer = Linear::new(2, 1);
        layer.weight.value = Tensor::from_vec(&[1, 2], vec![2.0, -1.0]);
        layer.bias.value = Tensor::from_vec(&[1], vec![0.5]);
        let x = Tensor::from_vec(&[2, 2], vec![1.0, 1.0, 3.0, 2.0]);
        let y = layer.forward(&x, &Pass::new(Mode::Eval, None));
        assert_eq!(y.shape, vec![2, 1]);
        assert_eq!(y.data, vec![1.5, 4.5]);
    }

    #[test]
    fn gradients_match_finite_differences() {
        let mut layer = Linear::new(3, 2);
        let x = Tensor::from_vec(&[2, 3], vec![0.3, -0.2, 0.8, 1.1, 0.05, -0.7]);
        assert!(gradcheck::max_gradient_error(&mut layer, &x) < 1e-6);
    }

    #[test]
    fn eval_pass_keeps_training_cache() {
        let mut layer = Linear::new(2, 2);
        layer.forward(&Tensor::zeros(&[1, 2]), &Pass::new(Mode::Eval, None));
        assert!(layer.input.is_none());

        let x = Tensor::filled(&[3, 2], 1.0);
        layer.forward(&x, &Pass::new(Mode::Train, None));
        layer.forward(&Tensor::zeros(&[1, 2]), &Pass::new(Mode::Eval, None));
        assert_eq!(layer.input.as_ref(), Some(&x));
        let g = layer.backward(&Tensor::filled(&[3, 2], 1.0));
        assert_eq!(g.shape, vec![3, 2]);
    }
}
