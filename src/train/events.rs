use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Serialize, Deserialize};
use serde_json::{json, Value};

use crate::train::snapshot::MetricSnapshot;

/// A timestamped line for the frontend console.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    /// Local wall-clock time, `HH:MM:SS`.
    pub time: String,
    pub message: String,
}

impl LogLine {
    pub fn now(message: impl Into<String>) -> LogLine {
        LogLine {
            time: chrono::Local::now().format("%H:%M:%S").to_string(),
            message: message.into(),
        }
    }
}

/// Everything pushed to connected browsers.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainingEvent {
    Status { msg: String },
    Log(LogLine),
    TrainingUpdate(MetricSnapshot),
    TrainingError { error: String },
    TrainingComplete,
}

impl TrainingEvent {
    /// Event name on the push channel.
    pub fn name(&self) -> &'static str {
        match self {
            TrainingEvent::Status { .. } => "status",
            TrainingEvent::Log(_) => "log",
            TrainingEvent::TrainingUpdate(_) => "training_update",
            TrainingEvent::TrainingError { .. } => "training_error",
            TrainingEvent::TrainingComplete => "training_complete",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            TrainingEvent::Status { msg } => json!({ "msg": msg }),
            TrainingEvent::Log(line) => serde_json::to_value(line).unwrap_or_default(),
            TrainingEvent::TrainingUpdate(s) => serde_json::to_value(s).unwrap_or_default(),
            TrainingEvent::TrainingError { error } => json!({ "error": error }),
            TrainingEvent::TrainingComplete => json!({ "status": "complete" }),
        }
    }
}

/// Events a subscriber may have queued before further ones are dropped for it.
pub const SUBSCRIBER_QUEUE: usize = 1024;

/// Fan-out of training events to every subscriber.
///
/// Each subscriber owns a channel bounded at `SUBSCRIBER_QUEUE`; events are
/// delivered in publish order. A subscriber whose queue is full misses the
/// event but stays subscribed. Subscribers whose receiver has been dropped
/// are pruned on the next publish.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<SyncSender<TrainingEvent>>>>,
}

impl EventBus {
    pub fn new() -> EventBus {
        EventBus::default()
    }

    pub fn subscribe(&self) -> Receiver<TrainingEvent> {
        let (tx, rx) = mpsc::sync_channel(SUBSCRIBER_QUEUE);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn publish(&self, event: TrainingEvent) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| match tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    log::debug!("Subscriber queue full, dropping {} event", event.name());
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            });
    }

    /// Publishes a `log` event and mirrors it to the process log.
    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        log::info!("{}", message);
        self.publish(TrainingEvent::Log(LogLine::now(message)));
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
