use serde_json::json;

use crate::routes::Reply;
use crate::state::SharedState;

// ---------------------------------------------------------------------------
// GET /api/export-model
// ---------------------------------------------------------------------------

/// Saves the current model and sends the file back as an attachment.
pub fn export_model(state: &SharedState) -> Reply {
    let saved = state.session.save_model().and_then(|path| match path {
        Some(p) => std::fs::read(&p).map(Some).map_err(Into::into),
        None => Ok(None),
    });

    match saved {
        Ok(Some(bytes)) => Reply::download(bytes, "model.json"),
        Ok(None) => Reply::json(404, &json!({ "error": "No model to export" })),
        Err(e) => {
            log::error!("Model export failed: {}", e);
            Reply::json(500, &json!({ "error": e.to_string() }))
        }
    }
}
