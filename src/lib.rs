pub mod math;
pub mod layers;
pub mod network;
pub mod loss;
pub mod optim;
pub mod data;
pub mod preprocess;
pub mod train;
pub mod error;

// Convenience re-exports
pub use math::tensor::Tensor;
pub use network::network::Network;
pub use network::registry::{create_architecture, Architecture};
pub use data::batch::{create_batch_source, BatchSource};
pub use preprocess::normalize_for_model;
pub use train::session::TrainingSession;
pub use train::config::{SessionSettings, TrainingConfig};
pub use train::events::{EventBus, TrainingEvent};
pub use error::{DatasetError, PreprocessError, TrainerError};
