//! Response finalization and the transport sink interface.
//!
//! Finalization happens once per request, after the handler chain has
//! completed: the body-suppression rules are applied, the body is encoded
//! with the negotiated format, and the result is written to the sink.

use std::io;

use futures::StreamExt;
use tracing::{debug, warn};

use crate::format::{negotiate, Format};
use crate::handler::BoxFuture;
use crate::headers::Headers;
use crate::request::Method;
use crate::response::{Body, Response};

/// Returns false when HTTP forbids a body: `HEAD` requests and 1xx, 204
/// and 304 responses.
pub fn body_allowed(method: Method, status: u16) -> bool {
    method != Method::Head && !(100..200).contains(&status) && status != 204 && status != 304
}

/// Applies the body-suppression rules. The status is never changed.
///
/// ```
/// use oxide_dispatch::{finalize, Body, Method};
///
/// let (status, body) = finalize(Method::Delete, 204, Body::Text("hi there".into()));
/// assert_eq!(status, 204);
/// assert!(body.is_empty());
/// ```
pub fn finalize(method: Method, status: u16, body: Body) -> (u16, Body) {
    if body_allowed(method, status) {
        (status, body)
    } else {
        (status, Body::Empty)
    }
}

/// The writable half of a connection, provided by the host transport.
pub trait ResponseSink: Send {
    /// True once the peer has gone away; nothing more will be delivered.
    fn is_closed(&self) -> bool {
        false
    }

    /// Writes the status line and headers.
    fn write_head<'a>(&'a mut self, status: u16, headers: &'a Headers)
        -> BoxFuture<'a, io::Result<()>>;

    /// Writes one chunk of body bytes.
    fn write_chunk<'a>(&'a mut self, chunk: &'a [u8]) -> BoxFuture<'a, io::Result<()>>;

    /// Flushes and completes the response.
    fn finish(&mut self) -> BoxFuture<'_, io::Result<()>>;
}

/// What a client received, as captured by [`BufferedSink`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizedResponse {
    /// Status code written, `0` if nothing was written.
    pub status: u16,
    /// Headers written.
    pub headers: Headers,
    /// Body bytes written.
    pub body: Vec<u8>,
    /// Number of body chunks written.
    pub chunks: usize,
    /// False if the connection was closed before the response was written.
    pub delivered: bool,
}

impl FinalizedResponse {
    /// Gets a header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Returns the body as a string.
    pub fn body_string(&self) -> Option<String> {
        String::from_utf8(self.body.clone()).ok()
    }

    /// Parses the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// A sink that records everything in memory.
#[derive(Debug, Default)]
pub struct BufferedSink {
    response: FinalizedResponse,
    closed: bool,
}

impl BufferedSink {
    /// Creates an open sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink whose peer has already disconnected.
    pub fn closed() -> Self {
        Self {
            response: FinalizedResponse::default(),
            closed: true,
        }
    }

    /// Marks the peer as disconnected.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Returns what was written.
    pub fn into_response(self) -> FinalizedResponse {
        self.response
    }
}

impl ResponseSink for BufferedSink {
    fn is_closed(&self) -> bool {
        self.closed
    }

    fn write_head<'a>(
        &'a mut self,
        status: u16,
        headers: &'a Headers,
    ) -> BoxFuture<'a, io::Result<()>> {
        self.response.status = status;
        self.response.headers = headers.clone();
        Box::pin(async { Ok(()) })
    }

    fn write_chunk<'a>(&'a mut self, chunk: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        self.response.body.extend_from_slice(chunk);
        self.response.chunks += 1;
        Box::pin(async { Ok(()) })
    }

    fn finish(&mut self) -> BoxFuture<'_, io::Result<()>> {
        self.response.delivered = true;
        Box::pin(async { Ok(()) })
    }
}

enum Payload {
    None,
    Bytes(Vec<u8>),
    Stream(crate::response::BodyStream),
}

/// Encodes and writes a finished [`Response`] to a sink.
#[derive(Debug, Clone)]
pub struct Finalizer {
    default_format: Format,
    server_name: Option<String>,
}

impl Finalizer {
    /// Creates a finalizer.
    pub fn new(default_format: Format, server_name: Option<String>) -> Self {
        Self {
            default_format,
            server_name,
        }
    }

    /// Picks the format: an explicit `Content-Type` wins, raw bytes are
    /// binary, everything else follows `Accept`.
    pub fn format_for(&self, res: &Response, accept: Option<&str>) -> Format {
        if let Some(content_type) = res.get_header("content-type") {
            Format::from_content_type(content_type)
        } else if matches!(res.body(), Body::Bytes(_) | Body::Stream(_)) {
            Format::Binary
        } else {
            negotiate(accept, self.default_format)
        }
    }

    /// Finalizes `res` and writes it to `sink`.
    ///
    /// Suppressed bodies are dropped before any byte is written; streams
    /// are forwarded chunk by chunk. If the sink is already closed nothing
    /// is written.
    ///
    /// # Errors
    ///
    /// Propagates sink write errors and errors yielded by a body stream.
    pub async fn flush(
        &self,
        method: Method,
        accept: Option<&str>,
        res: &mut Response,
        sink: &mut dyn ResponseSink,
    ) -> io::Result<()> {
        let status = res.status();

        if sink.is_closed() {
            debug!(status, "client disconnected before response was written");
            drop(res.take_body());
            return Ok(());
        }

        let format = self.format_for(res, accept);
        let body = res.take_body();
        let allowed = body_allowed(method, status);

        let payload = match body {
            Body::Stream(stream) => Payload::Stream(stream),
            Body::Empty => Payload::None,
            other => format.encode(&other).map_or(Payload::None, Payload::Bytes),
        };

        let headers = res.headers_mut();
        match &payload {
            Payload::Bytes(bytes) => {
                if !headers.contains("content-type") {
                    headers.set("Content-Type", format.content_type());
                }
                headers.set("Content-Length", bytes.len().to_string());
            }
            Payload::Stream(_) => {
                if !headers.contains("content-type") {
                    headers.set("Content-Type", format.content_type());
                }
                headers.remove("content-length");
            }
            Payload::None => {
                headers.set("Content-Length", "0");
            }
        }
        if (100..200).contains(&status) || status == 204 {
            headers.remove("content-length");
            headers.remove("content-type");
        }
        if let Some(name) = &self.server_name {
            if !headers.contains("server") {
                headers.set("Server", name.clone());
            }
        }

        let payload = if allowed { payload } else { Payload::None };

        let head = res.headers().clone();
        sink.write_head(status, &head).await?;

        match payload {
            Payload::None => {}
            Payload::Bytes(bytes) => {
                if !bytes.is_empty() {
                    sink.write_chunk(&bytes).await?;
                }
            }
            Payload::Stream(mut stream) => {
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk?;
                    if sink.is_closed() {
                        warn!("client disconnected mid-stream");
                        return Ok(());
                    }
                    sink.write_chunk(&chunk).await?;
                }
            }
        }

        sink.finish().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finalizer() -> Finalizer {
        Finalizer::new(Format::Json, None)
    }

    #[test]
    fn test_finalize_rules() {
        let (_, body) = finalize(Method::Head, 200, Body::Text("hi there".into()));
        assert!(body.is_empty());
        let (_, body) = finalize(Method::Get, 304, Body::Text("x".into()));
        assert!(body.is_empty());
        let (_, body) = finalize(Method::Get, 101, Body::Text("x".into()));
        assert!(body.is_empty());
        let (status, body) = finalize(Method::Get, 200, Body::Text("x".into()));
        assert_eq!(status, 200);
        assert!(!body.is_empty());
    }

    #[tokio::test]
    async fn test_flush_json_text() {
        let mut res = Response::new();
        res.send("mark");
        let mut sink = BufferedSink::new();
        finalizer()
            .flush(Method::Get, Some("application/json"), &mut res, &mut sink)
            .await
            .unwrap();
        let out = sink.into_response();
        assert_eq!(out.status, 200);
        assert_eq!(out.body_string().unwrap(), "\"mark\"");
        assert_eq!(out.header("content-type"), Some("application/json"));
        assert_eq!(out.header("content-length"), Some("6"));
        assert!(out.delivered);
    }

    #[tokio::test]
    async fn test_flush_head_writes_no_bytes() {
        let mut res = Response::new();
        res.send("hi there");
        let mut sink = BufferedSink::new();
        finalizer()
            .flush(Method::Head, Some("text/plain"), &mut res, &mut sink)
            .await
            .unwrap();
        let out = sink.into_response();
        assert_eq!(out.status, 200);
        assert!(out.body.is_empty());
        assert_eq!(out.chunks, 0);
        assert_eq!(out.header("content-length"), Some("8"));
    }

    #[tokio::test]
    async fn test_flush_204_drops_body_and_length() {
        let mut res = Response::new();
        res.send_with(204, "hi there");
        let mut sink = BufferedSink::new();
        finalizer()
            .flush(Method::Delete, None, &mut res, &mut sink)
            .await
            .unwrap();
        let out = sink.into_response();
        assert_eq!(out.status, 204);
        assert!(out.body.is_empty());
        assert_eq!(out.header("content-length"), None);
    }

    #[tokio::test]
    async fn test_flush_stream_is_chunked_through() {
        let mut res = Response::new();
        let chunks = vec![Ok(b"one ".to_vec()), Ok(b"two ".to_vec()), Ok(b"three".to_vec())];
        res.stream(futures::stream::iter(chunks));
        let mut sink = BufferedSink::new();
        finalizer()
            .flush(Method::Get, None, &mut res, &mut sink)
            .await
            .unwrap();
        let out = sink.into_response();
        assert_eq!(out.chunks, 3);
        assert_eq!(out.body_string().unwrap(), "one two three");
        assert_eq!(out.header("content-type"), Some("application/octet-stream"));
        assert_eq!(out.header("content-length"), None);
    }

    #[tokio::test]
    async fn test_flush_closed_sink_writes_nothing() {
        let mut res = Response::new();
        res.send("late");
        let mut sink = BufferedSink::closed();
        finalizer()
            .flush(Method::Get, None, &mut res, &mut sink)
            .await
            .unwrap();
        let out = sink.into_response();
        assert_eq!(out.status, 0);
        assert!(!out.delivered);
    }

    #[tokio::test]
    async fn test_explicit_content_type_wins() {
        let mut res = Response::new();
        res.set_header("Content-Type", "text/html");
        res.send("<p>hi</p>");
        let mut sink = BufferedSink::new();
        Finalizer::new(Format::Json, Some("api".to_string()))
            .flush(Method::Get, Some("application/json"), &mut res, &mut sink)
            .await
            .unwrap();
        let out = sink.into_response();
        assert_eq!(out.body_string().unwrap(), "<p>hi</p>");
        assert_eq!(out.header("content-type"), Some("text/html"));
        assert_eq!(out.header("server"), Some("api"));
    }
}
