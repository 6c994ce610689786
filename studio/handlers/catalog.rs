use serde_json::json;

use ferrite_viz::data::DATASET_NAMES;
use ferrite_viz::train::TrainingConfig;

use crate::routes::Reply;

// ---------------------------------------------------------------------------
// GET /api/datasets
// ---------------------------------------------------------------------------

pub fn datasets() -> Reply {
    Reply::json(200, &json!(DATASET_NAMES))
}

// ---------------------------------------------------------------------------
// POST /api/create-model
// ---------------------------------------------------------------------------

/// Acknowledges a model configuration. The network itself is built when
/// training starts, so there is only ever one model id.
pub fn create_model(body: &[u8]) -> Reply {
    match serde_json::from_slice::<TrainingConfig>(body) {
        Ok(config) => log::info!("Model configured: {}", config.architecture().name()),
        Err(e) => log::debug!("create-model body ignored: {}", e),
    }
    Reply::json(200, &json!({ "model_id": "model_1", "status": "ready" }))
}
