use std::sync::Arc;

use ferrite_viz::train::{SessionSettings, TrainingSession};

/// Process-wide state shared by every request thread.
pub struct AppState {
    pub session: TrainingSession,
}

impl AppState {
    pub fn new(settings: SessionSettings) -> Self {
        AppState { session: TrainingSession::new(settings) }
    }
}

/// Shared state type — an `Arc<AppState>` passed to every handler. The
/// session does its own locking.
pub type SharedState = Arc<AppState>;
