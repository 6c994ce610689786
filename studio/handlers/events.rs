use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use tiny_http::Request;

use ferrite_viz::train::TrainingEvent;

use crate::state::SharedState;
use crate::util::sse::{format_sse_event, format_sse_keepalive, write_sse, SSE_RESPONSE_HEAD};

/// Silence after which a keep-alive comment is sent.
const KEEPALIVE: Duration = Duration::from_secs(15);

/// `GET /api/events` — Server-Sent Events stream of training events.
///
/// Consumes `request` (so we can call `into_writer`), subscribes to the
/// session's event bus and forwards every event as a named SSE frame. A
/// `status` event greets each new connection; a keep-alive comment is
/// written after 15 s without traffic. The loop ends when a write fails,
/// i.e. the browser went away.
///
/// Client reconnection is handled natively by `EventSource`.
pub fn handle(request: Request, state: SharedState) {
    // tiny_http's `into_writer()` gives us the raw TCP stream so we can
    // write the HTTP response head and then stream frames directly.
    let mut writer = request.into_writer();
    if !write_sse(&mut writer, SSE_RESPONSE_HEAD) {
        return;
    }

    let events = state.session.subscribe();
    log::info!("Event stream client connected");

    let greeting = TrainingEvent::Status { msg: "Connected to training server".to_owned() };
    if !write_sse(&mut writer, &format_sse_event(greeting.name(), &greeting.payload().to_string())) {
        return;
    }

    loop {
        let frame = match events.recv_timeout(KEEPALIVE) {
            Ok(event) => format_sse_event(event.name(), &event.payload().to_string()),
            Err(RecvTimeoutError::Timeout) => format_sse_keepalive().to_owned(),
            Err(RecvTimeoutError::Disconnected) => return,
        };
        if !write_sse(&mut writer, &frame) {
            log::info!("Event stream client disconnected");
            return;
        }
    }
}
