use crate::network::network::Network;
use crate::optim::Optimizer;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPS: f64 = 1e-8;

/// Adam with bias-corrected first and second moment estimates.
///
/// Moment buffers are allocated on the first step and matched to trainable
/// parameters by position, which is stable for a given network.
pub struct Adam {
    pub learning_rate: f64,
    t: i32,
    moments: Vec<(Vec<f64>, Vec<f64>)>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Adam {
        Adam { learning_rate, t: 0, moments: Vec::new() }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, network: &mut Network) {
        self.t += 1;
        let correction1 = 1.0 - BETA1.powi(self.t);
        let correction2 = 1.0 - BETA2.powi(self.t);

        let mut params = network.params_mut();
        params.retain(|(_, p)| p.trainable);

        if self.moments.len() != params.len() {
            self.moments = params
                .iter()
                .map(|(_, p)| (vec![0.0; p.value.numel()], vec![0.0; p.value.numel()]))
                .collect();
        }

        for ((_, param), (m, v)) in params.into_iter().zip(self.moments.iter_mut()) {
            let values = param.value.data.iter_mut();
            let grads = param.grad.data.iter();
            for (((w, g), m), v) in values.zip(grads).zip(m.iter_mut()).zip(v.iter_mut()) {
                *m = BETA1 * *m + (1.0 - BETA1) * g;
                *v = BETA2 * *v + (1.0 - BETA2) * g * g;
                let m_hat = *m / correction1;
                let v_hat = *v / correction2;
                *w -= self.learning_rate * m_hat / (v_hat.sqrt() + EPS);
            }
        }
    }
}
