pub mod linear;
pub mod conv;
pub mod pool;
pub mod batch_norm;
pub mod shape;
pub mod residual;
pub mod sequential;

pub use linear::Linear;
pub use conv::Conv2d;
pub use pool::{MaxPool2d, GlobalAvgPool};
pub use batch_norm::BatchNorm2d;
pub use shape::{Flatten, Relu};
pub use residual::ResidualBlock;
pub use sequential::Sequential;

use crate::math::tensor::Tensor;
use crate::network::probe::ActivationProbe;

/// Whether a forward pass is part of training.
///
/// Layers only cache what `backward` needs in `Train` mode, and batch-norm
/// switches between batch and running statistics on it. `Eval` passes leave
/// the training caches untouched, so an inference may run between a
/// training forward and its backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

/// A learnable (or tracked) tensor together with its accumulated gradient.
#[derive(Debug, Clone)]
pub struct Param {
    pub value: Tensor,
    pub grad: Tensor,
    /// `false` for buffers such as batch-norm running statistics: saved with
    /// the model but never touched by the optimizer.
    pub trainable: bool,
}

impl Param {
    pub fn new(value: Tensor) -> Param {
        let grad = Tensor::zeros(&value.shape);
        Param { value, grad, trainable: true }
    }

    pub fn buffer(value: Tensor) -> Param {
        let grad = Tensor::zeros(&value.shape);
        Param { value, grad, trainable: false }
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }
}

/// Per-call context threaded through a forward pass.
///
/// Carries the mode and, while a probe is attached, the dotted path of the
/// module currently running so instrumented layers can report their output.
pub struct Pass<'a> {
    pub mode: Mode,
    probe: Option<&'a ActivationProbe>,
    scope: String,
}

impl<'a> Pass<'a> {
    pub fn new(mode: Mode, probe: Option<&'a ActivationProbe>) -> Pass<'a> {
        Pass { mode, probe, scope: String::new() }
    }

    pub fn is_training(&self) -> bool {
        self.mode == Mode::Train
    }

    /// Context for a named child module.
    pub fn scoped(&self, name: &str) -> Pass<'a> {
        let scope = match self.probe {
            Some(_) if self.scope.is_empty() => name.to_owned(),
            Some(_) => format!("{}.{}", self.scope, name),
            None => String::new(),
        };
        Pass { mode: self.mode, probe: self.probe, scope }
    }

    /// Hands a module output to the probe. Only training passes are recorded.
    pub fn record(&self, output: &Tensor) {
        if let (Some(probe), Mode::Train) = (self.probe, self.mode) {
            probe.record(&self.scope, output);
        }
    }
}

/// A differentiable building block.
///
/// `backward` receives ∂L/∂output for the most recent training-mode
/// `forward`, accumulates parameter gradients into each `Param::grad`, and
/// returns ∂L/∂input.
pub trait Module: Send {
    fn forward(&mut self, input: &Tensor, pass: &Pass) -> Tensor;

    fn backward(&mut self, grad_output: &Tensor) -> Tensor;

    /// Appends `(dotted name, param)` pairs. `prefix` is empty or ends in a dot.
    fn collect_params<'a>(&'a self, _prefix: &str, _out: &mut Vec<(String, &'a Param)>) {}

    fn collect_params_mut<'a>(&'a mut self, _prefix: &str, _out: &mut Vec<(String, &'a mut Param)>) {}

    /// Instrumented layers have their outputs reported to an attached probe.
    fn is_instrumented(&self) -> bool {
        false
    }
}

/// Runs `child.forward` inside a named scope, recording its output when the
/// child is instrumented.
pub(crate) fn forward_child(child: &mut dyn Module, name: &str, input: &Tensor, pass: &Pass) -> Tensor {
    let scoped = pass.scoped(name);
    let output = child.forward(input, &scoped);
    if child.is_instrumented() {
        scoped.record(&output);
    }
    output
}
