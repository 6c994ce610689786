use std::io::Cursor;

use serde_json::Value;
use tiny_http::{Header, Method, Request, Response, StatusCode};

use crate::handlers;
use crate::state::SharedState;

/// Headers added to every response so the frontend can be served from a
/// different origin.
pub const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
    ("Access-Control-Allow-Headers", "Content-Type"),
];

// ---------------------------------------------------------------------------
// Reply
// ---------------------------------------------------------------------------

/// A fully buffered handler result, converted to a tiny_http response by
/// the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn json(status: u16, value: &Value) -> Reply {
        Reply {
            status,
            content_type: "application/json",
            headers: Vec::new(),
            body: value.to_string().into_bytes(),
        }
    }

    pub fn no_content() -> Reply {
        Reply { status: 204, content_type: "text/plain", headers: Vec::new(), body: Vec::new() }
    }

    pub fn download(body: Vec<u8>, filename: &str) -> Reply {
        Reply {
            status: 200,
            content_type: "application/json",
            headers: vec![(
                "Content-Disposition".to_owned(),
                format!("attachment; filename=\"{}\"", filename),
            )],
            body,
        }
    }

    pub fn not_found() -> Reply {
        Reply::json(404, &serde_json::json!({ "error": "Not found" }))
    }

    /// Parsed JSON body; test helper and logging aid.
    #[cfg(test)]
    pub fn json_body(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    pub fn into_response(self) -> Response<Cursor<Vec<u8>>> {
        let len = self.body.len();
        let headers = std::iter::once(("Content-Type", self.content_type))
            .chain(CORS_HEADERS)
            .chain(self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .filter_map(|(k, v)| Header::from_bytes(k.as_bytes(), v.as_bytes()).ok())
            .collect();
        Response::new(StatusCode(self.status), headers, Cursor::new(self.body), Some(len), None)
    }
}

// ---------------------------------------------------------------------------
// Request dispatcher
// ---------------------------------------------------------------------------

fn header_value(request: &Request, name: &'static str) -> String {
    request
        .headers()
        .iter()
        .find(|h| h.field.equiv(name))
        .map(|h| h.value.as_str().to_owned())
        .unwrap_or_default()
}

/// Dispatches incoming requests to the appropriate handler.
///
/// Every handler except the event stream returns a buffered `Reply`. The
/// stream handler takes ownership of the request to write frames for as long
/// as the client stays connected.
pub fn dispatch(mut request: Request, state: SharedState) {
    let method = request.method().clone();
    let url = request.url().to_owned();

    let (path, query) = match url.find('?') {
        Some(pos) => (url[..pos].to_owned(), url[pos + 1..].to_owned()),
        None => (url.clone(), String::new()),
    };
    log::debug!("{} {}", method, url);

    if method == Method::Get && path == "/api/events" {
        handlers::events::handle(request, state);
        return;
    }

    let mut body = Vec::new();
    if method == Method::Post {
        if let Err(e) = request.as_reader().read_to_end(&mut body) {
            log::warn!("failed to read request body for {}: {}", path, e);
        }
    }
    let content_type = header_value(&request, "Content-Type");

    let reply = match (method, path.as_str()) {
        (Method::Options, _) => Reply::no_content(),

        (Method::Get,  "/api/datasets")       => handlers::catalog::datasets(),
        (Method::Post, "/api/create-model")   => handlers::catalog::create_model(&body),

        (Method::Post, "/api/start-training") => handlers::training::start(&state, &body),
        (Method::Post, "/api/stop-training")  => handlers::training::stop(&state),

        (Method::Get,  "/api/weights")        => handlers::weights::get(&state, &query),
        (Method::Post, "/api/upload-image")   => handlers::inference::upload_image(&state, &content_type, &body),
        (Method::Get,  "/api/export-model")   => handlers::export::export_model(&state),

        _ => Reply::not_found(),
    };

    if let Err(e) = request.respond(reply.into_response()) {
        log::debug!("client went away before the response for {}: {}", path, e);
    }
}
