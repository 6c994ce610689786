pub mod adam;
pub mod sgd;

pub use adam::Adam;
pub use sgd::Sgd;

use serde::{Serialize, Deserialize};

use crate::network::network::Network;

/// Updates a network's trainable parameters from their accumulated gradients.
pub trait Optimizer: Send {
    fn step(&mut self, network: &mut Network);
}

/// Optimizer selection carried in a training config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    #[default]
    Adam,
    Sgd,
}

impl OptimizerKind {
    pub fn build(&self, learning_rate: f64) -> Box<dyn Optimizer> {
        match self {
            OptimizerKind::Adam => Box::new(Adam::new(learning_rate)),
            OptimizerKind::Sgd => Box::new(Sgd::new(learning_rate)),
        }
    }
}
