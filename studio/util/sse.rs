use std::io::Write;

// ---------------------------------------------------------------------------
// SSE response helpers
// ---------------------------------------------------------------------------

/// Raw HTTP response head for an event stream, written straight to the
/// socket before the first frame.
pub const SSE_RESPONSE_HEAD: &str = "HTTP/1.1 200 OK\r\n\
                                     Content-Type: text/event-stream\r\n\
                                     Cache-Control: no-cache\r\n\
                                     Connection: keep-alive\r\n\
                                     X-Accel-Buffering: no\r\n\
                                     Access-Control-Allow-Origin: *\r\n\
                                     \r\n";

/// Formats a named SSE event with a JSON data payload.
///
/// Output format (EventSource wire format):
/// ```text
/// event: <name>\n
/// data: <json>\n
/// \n
/// ```
pub fn format_sse_event(event_name: &str, json_data: &str) -> String {
    format!("event: {}\ndata: {}\n\n", event_name, json_data)
}

/// Formats a keep-alive SSE comment.
/// SSE comments start with `:` and are ignored by EventSource clients
/// but prevent the connection from timing out.
pub fn format_sse_keepalive() -> &'static str {
    ": ping\n\n"
}

/// Writes a single SSE message to a writer, flushing immediately.
/// Returns `false` if the write failed (client disconnected).
pub fn write_sse<W: Write>(writer: &mut W, msg: &str) -> bool {
    writer.write_all(msg.as_bytes()).is_ok() && writer.flush().is_ok()
}
