use crate::network::network::Network;
use crate::optim::Optimizer;

/// Plain stochastic gradient descent: w ← w − lr·∇w.
pub struct Sgd {
    pub learning_rate: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Sgd {
        Sgd { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, network: &mut Network) {
        for (_, param) in network.params_mut() {
            if !param.trainable {
                continue;
            }
            for (w, g) in param.value.data.iter_mut().zip(param.grad.data.iter()) {
                *w -= self.learning_rate * g;
            }
        }
    }
}
