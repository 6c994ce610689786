use serde_json::json;

use crate::routes::Reply;
use crate::state::SharedState;
use crate::util::form::{form_get, parse_form};

// ---------------------------------------------------------------------------
// GET /api/weights?layer=<name>
// ---------------------------------------------------------------------------

/// Weight tensors of the current model as nested arrays. Without `layer`
/// (or with an empty one) every weight tensor is returned.
pub fn get(state: &SharedState, query: &str) -> Reply {
    let pairs = parse_form(query);
    let layer = form_get(&pairs, "layer").filter(|l| !l.is_empty());
    let weights = state.session.get_weights(layer);
    Reply::json(200, &json!(weights))
}
