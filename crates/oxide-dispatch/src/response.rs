//! HTTP response state accumulated by handlers.

use std::fmt;

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tracing::debug;

use crate::error::HttpError;
use crate::headers::Headers;

/// A continuous body source, forwarded to the client chunk by chunk.
pub type BodyStream = BoxStream<'static, std::io::Result<Vec<u8>>>;

/// The body a handler wants to send.
///
/// Discrete bodies are serialized by the negotiated formatter at
/// finalization. Streams are forwarded as-is.
#[derive(Default)]
pub enum Body {
    /// No body.
    #[default]
    Empty,
    /// A string, formatted as raw text or a JSON string.
    Text(String),
    /// A JSON value.
    Json(serde_json::Value),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// A streaming body.
    Stream(BodyStream),
}

impl Body {
    /// Returns true for [`Body::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Returns true for [`Body::Stream`].
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Self::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<()> for Body {
    fn from((): ()) -> Self {
        Self::Empty
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<serde_json::Value> for Body {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

/// Response state for one request.
///
/// Handlers set headers and then *send* exactly once. Once sent, further
/// status and body writes are ignored; the dispatcher flushes the result
/// after the chain completes.
#[derive(Debug)]
pub struct Response {
    status: u16,
    headers: Headers,
    body: Body,
    sent: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    /// Creates an unsent 200 response with no body.
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: Headers::new(),
            body: Body::Empty,
            sent: false,
        }
    }

    /// The current status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Sets the status code, unless the response was already sent.
    pub fn set_status(&mut self, status: u16) {
        if self.ignore_write("set_status") {
            return;
        }
        self.status = status;
    }

    /// Response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Gets a header value.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Sets (replaces) a header.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        if self.ignore_write("set_header") {
            return;
        }
        self.headers.set(name, value);
    }

    /// Appends a header value.
    pub fn append_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        if self.ignore_write("append_header") {
            return;
        }
        self.headers.append(name, value);
    }

    /// Read-modify-write of a single header value.
    ///
    /// ```
    /// use oxide_dispatch::Response;
    ///
    /// let mut res = Response::new();
    /// res.set_header("Access-Control-Allow-Headers", "Accept");
    /// res.update_header("Access-Control-Allow-Headers", |cur| {
    ///     format!("{}, If-Match", cur.unwrap_or_default())
    /// });
    /// assert_eq!(res.get_header("access-control-allow-headers"), Some("Accept, If-Match"));
    /// ```
    pub fn update_header<F>(&mut self, name: &str, f: F)
    where
        F: FnOnce(Option<&str>) -> String,
    {
        if self.ignore_write("update_header") {
            return;
        }
        self.headers.update(name, f);
    }

    /// Removes a header.
    pub fn remove_header(&mut self, name: &str) -> Option<String> {
        if self.ignore_write("remove_header") {
            return None;
        }
        self.headers.remove(name)
    }

    /// Sends a body with the current status.
    pub fn send(&mut self, body: impl Into<Body>) {
        if self.ignore_write("send") {
            return;
        }
        self.body = body.into();
        self.sent = true;
    }

    /// Sends a status with no body.
    pub fn send_status(&mut self, status: u16) {
        self.send_with(status, Body::Empty);
    }

    /// Sends a status and a body.
    pub fn send_with(&mut self, status: u16, body: impl Into<Body>) {
        if self.ignore_write("send_with") {
            return;
        }
        self.status = status;
        self.body = body.into();
        self.sent = true;
    }

    /// Sends a streaming body.
    pub fn stream<S>(&mut self, stream: S)
    where
        S: Stream<Item = std::io::Result<Vec<u8>>> + Send + 'static,
    {
        self.send(Body::Stream(stream.boxed()));
    }

    /// Sends an error as `{"code", "message"}` with its status.
    pub fn send_error(&mut self, err: &HttpError) {
        self.send_with(err.status, Body::Json(err.to_json()));
    }

    /// Returns true once a body or status has been sent.
    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// The body to be written.
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Takes the body out for finalization.
    pub(crate) fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    /// Mutable headers for the finalizer, bypassing the sent check.
    pub(crate) fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Replaces whatever a failed handler left behind with an error.
    pub(crate) fn force_error(&mut self, err: &HttpError) {
        self.status = err.status;
        self.body = Body::Json(err.to_json());
        self.sent = true;
    }

    /// Returns the response to an unsent 200 with no body, keeping headers.
    pub(crate) fn reset(&mut self) {
        self.status = 200;
        self.body = Body::Empty;
        self.sent = false;
    }

    fn ignore_write(&self, op: &str) -> bool {
        if self.sent {
            debug!(op, status = self.status, "response already sent; write ignored");
        }
        self.sent
    }

    /// Returns the status text for the current status code.
    pub fn status_text(&self) -> &'static str {
        status_text(self.status)
    }
}

/// Reason phrase for a status code.
pub fn status_text(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        409 => "Conflict",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_is_one_shot() {
        let mut res = Response::new();
        res.send("hello");
        res.send_with(500, "again");
        res.set_status(201);
        res.set_header("X-Late", "1");

        assert!(res.is_sent());
        assert_eq!(res.status(), 200);
        assert!(matches!(res.body(), Body::Text(s) if s == "hello"));
        assert_eq!(res.get_header("X-Late"), None);
    }

    #[test]
    fn test_send_status() {
        let mut res = Response::new();
        res.send_status(204);
        assert_eq!(res.status(), 204);
        assert!(res.body().is_empty());
        assert_eq!(res.status_text(), "No Content");
    }

    #[test]
    fn test_send_error() {
        let mut res = Response::new();
        res.send_error(&HttpError::bad_request("nope"));
        assert_eq!(res.status(), 400);
        assert!(matches!(
            res.body(),
            Body::Json(v) if v["code"] == "BadRequest" && v["message"] == "nope"
        ));
    }

    #[test]
    fn test_force_error_overrides_sent_body() {
        let mut res = Response::new();
        res.send("partial");
        res.force_error(&HttpError::internal("boom"));
        assert_eq!(res.status(), 500);
        assert!(matches!(res.body(), Body::Json(_)));
    }

    #[test]
    fn test_stream_body() {
        let mut res = Response::new();
        res.stream(futures::stream::iter(vec![Ok(b"a".to_vec())]));
        assert!(res.body().is_stream());
        assert!(res.is_sent());
    }
}
