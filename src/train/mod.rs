pub mod config;
pub mod events;
pub mod loop_fn;
pub mod session;
pub mod snapshot;

pub use config::{effective_batch_size, Device, SessionSettings, TrainingConfig};
pub use events::{EventBus, LogLine, TrainingEvent};
pub use loop_fn::TrainingRun;
pub use session::{StartReport, TrainingSession};
pub use snapshot::{MetricSnapshot, PredictionResult};
