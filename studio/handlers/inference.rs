use serde_json::json;

use ferrite_viz::train::PredictionResult;

use crate::routes::Reply;
use crate::state::SharedState;
use crate::util::multipart::{extract_boundary, multipart_extract_file_by_name};

// ---------------------------------------------------------------------------
// POST /api/upload-image
// ---------------------------------------------------------------------------

/// Classifies the uploaded `image` file. Any failure after the upload was
/// found is answered with the `-1` sentinel rather than an error status.
pub fn upload_image(state: &SharedState, content_type: &str, body: &[u8]) -> Reply {
    let image = extract_boundary(content_type)
        .and_then(|boundary| multipart_extract_file_by_name(body, &boundary, "image"))
        .filter(|bytes| !bytes.is_empty());

    let bytes = match image {
        Some(b) => b,
        None => return Reply::json(400, &json!({ "error": "No image provided" })),
    };

    let result = state.session.predict(&bytes).unwrap_or_else(|e| {
        log::warn!("Prediction failed: {}", e);
        PredictionResult::failed()
    });
    Reply::json(200, &json!(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::state_in;

    const BOUNDARY: &str = "----ferrite";

    fn multipart(field: &str, bytes: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"digit.png\"\r\n\
             Content-Type: image/png\r\n\r\n",
            BOUNDARY, field
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn content_type() -> String {
        format!("multipart/form-data; boundary={}", BOUNDARY)
    }

    #[test]
    fn missing_image_field_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let reply = upload_image(&state_in(dir.path()), &content_type(), &multipart("file", b"abc"));
        assert_eq!(reply.status, 400);
        assert_eq!(reply.json_body(), json!({"error": "No image provided"}));
    }

    #[test]
    fn failure_returns_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let reply = upload_image(&state_in(dir.path()), &content_type(), &multipart("image", b"not a png"));
        assert_eq!(reply.status, 200);
        assert_eq!(
            reply.json_body(),
            json!({"prediction": -1, "confidence": 0.0, "processed_image": null})
        );
    }
}
