use serde_json::json;

use ferrite_viz::error::TrainerError;
use ferrite_viz::train::TrainingConfig;

use crate::routes::Reply;
use crate::state::SharedState;

// ---------------------------------------------------------------------------
// POST /api/start-training
// ---------------------------------------------------------------------------

/// Starts a run from the posted JSON config. An empty body uses every
/// default.
pub fn start(state: &SharedState, body: &[u8]) -> Reply {
    let config = if body.iter().all(u8::is_ascii_whitespace) {
        TrainingConfig::default()
    } else {
        match serde_json::from_slice::<TrainingConfig>(body) {
            Ok(c) => c,
            Err(e) => {
                return Reply::json(400, &json!({ "status": "error", "error": format!("invalid config: {}", e) }))
            }
        }
    };

    match state.session.start(config) {
        Ok(report) => {
            log::info!(
                "Training {} on {} (batch size {}, {} batches per epoch)",
                report.architecture.name(),
                report.dataset,
                report.batch_size,
                report.total_batches
            );
            Reply::json(200, &json!({ "status": "started" }))
        }
        Err(TrainerError::AlreadyRunning) => Reply::json(400, &json!({ "status": "already_running" })),
        Err(e) => Reply::json(400, &json!({ "status": "error", "error": e.to_string() })),
    }
}

// ---------------------------------------------------------------------------
// POST /api/stop-training
// ---------------------------------------------------------------------------

pub fn stop(state: &SharedState) -> Reply {
    state.session.stop();
    Reply::json(200, &json!({ "status": "stopped" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::state_in;

    #[test]
    fn invalid_json_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let reply = start(&state_in(dir.path()), b"{not json");
        assert_eq!(reply.status, 400);
        assert_eq!(reply.json_body()["status"], "error");
    }

    #[test]
    fn missing_dataset_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path());
        let reply = start(&state, br#"{"dataset":"MNIST","epochs":1}"#);
        assert_eq!(reply.status, 400);
        assert_eq!(reply.json_body()["status"], "error");
        assert!(!state.session.is_running());
    }

    #[test]
    fn stop_is_always_acknowledged() {
        let dir = tempfile::tempdir().unwrap();
        let reply = stop(&state_in(dir.path()));
        assert_eq!(reply.json_body(), json!({"status": "stopped"}));
    }
}
