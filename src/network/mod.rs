pub mod network;
pub mod probe;
pub mod registry;

pub use network::{Network, SavedModel, WeightValues};
pub use probe::ActivationProbe;
pub use registry::{create_architecture, Architecture, INPUT_SIDE, NUM_CLASSES};
