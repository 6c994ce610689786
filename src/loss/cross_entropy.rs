use crate::math::tensor::{argmax, Tensor};

/// Softmax + categorical cross-entropy over raw logits and class indices.
pub struct CrossEntropyLoss;

/// Small epsilon added inside log() to prevent log(0) = -inf.
const EPS: f64 = 1e-12;

/// Numerically stable softmax of one logit row.
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|&z| (z - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

impl CrossEntropyLoss {
    /// Mean loss over the batch and its gradient w.r.t. the logits.
    ///
    /// `logits`  — shape `[B, n_classes]`
    /// `targets` — `B` class indices
    ///
    /// With softmax folded in, the per-sample gradient simplifies to
    ///   ∂L/∂z_i = (p_i - y_i) / B
    pub fn forward(logits: &Tensor, targets: &[usize]) -> (f64, Tensor) {
        let batch = logits.batch();
        assert_eq!(batch, targets.len(), "one target per logit row required");
        let classes = logits.sample_len();
        let mut grad = Tensor::zeros(&logits.shape);
        let mut total = 0.0;

        for (n, &target) in targets.iter().enumerate() {
            let probs = softmax(logits.sample(n));
            total += -(probs[target] + EPS).ln();
            let row = &mut grad.data[n * classes..(n + 1) * classes];
            for (i, (g, p)) in row.iter_mut().zip(probs.iter()).enumerate() {
                let y = if i == target { 1.0 } else { 0.0 };
                *g = (p - y) / batch as f64;
            }
        }

        (total / batch.max(1) as f64, grad)
    }

    /// Percentage of rows whose argmax equals the target, in [0, 100].
    pub fn accuracy(logits: &Tensor, targets: &[usize]) -> f64 {
        if targets.is_empty() {
            return 0.0;
        }
        let correct = targets
            .iter()
            .enumerate()
            .filter(|&(n, &t)| argmax(logits.sample(n)) == t)
            .count();
        100.0 * correct as f64 / targets.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_sums_to_one() {
        let p = softmax(&[1000.0, 1001.0, 999.0]);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(p[1] > p[0] && p[0] > p[2]);
    }

    #[test]
    fn uniform_logits_give_log_n_loss() {
        let logits = Tensor::zeros(&[2, 10]);
        let (loss, grad) = CrossEntropyLoss::forward(&logits, &[3, 7]);
        assert!((loss - (10.0f64).ln()).abs() < 1e-9);
        // Each gradient row sums to zero.
        for n in 0..2 {
            assert!(grad.sample(n).iter().sum::<f64>().abs() < 1e-12);
        }
        assert!((grad.sample(0)[3] - (0.1 - 1.0) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn accuracy_is_a_percentage() {
        let logits = Tensor::from_vec(&[2, 2], vec![0.9, 0.1, 0.2, 0.8]);
        assert_eq!(CrossEntropyLoss::accuracy(&logits, &[0, 1]), 100.0);
        assert_eq!(CrossEntropyLoss::accuracy(&logits, &[1, 1]), 50.0);
    }
}
