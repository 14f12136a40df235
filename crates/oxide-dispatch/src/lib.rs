//! # oxide-dispatch
//!
//! HTTP routing and middleware dispatch, independent of any transport.
//!
//! This crate provides:
//! - Path patterns with `:name` / `{name}` parameters, and regex routes
//! - A route table that can change while requests are in flight
//! - Semantic-version negotiation through the `accept-version` header
//! - Pre-routing handlers, global `use` handlers and per-route chains
//! - Panic trapping with an overridable failure response
//! - Response finalization: content negotiation, `HEAD`/204 body rules,
//!   streaming bodies
//!
//! The host transport parses requests into [`Request`] values and provides
//! a [`ResponseSink`] to write to. [`Server::handle`] dispatches into an
//! in-memory sink instead.
//!
//! ## Quick Start
//!
//! ```
//! use oxide_dispatch::{handler_fn, Next, Request, Server};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let server = Server::new();
//! server
//!     .get("/users/:id", handler_fn(|req, res| {
//!         let id = req.params.get("id").unwrap_or("unknown").to_string();
//!         res.send(serde_json::json!({ "id": id }));
//!         Next::Continue
//!     }))
//!     .unwrap();
//!
//! let res = server.handle(Request::get("/users/123")).await;
//! assert_eq!(res.status, 200);
//! assert_eq!(res.body_string().unwrap(), r#"{"id":"123"}"#);
//!
//! let res = server.handle(Request::post("/users/123")).await;
//! assert_eq!(res.status, 405);
//! assert_eq!(res.header("allow"), Some("GET"));
//! # });
//! ```
//!
//! ## Versioned Routes
//!
//! ```ignore
//! use oxide_dispatch::RouteSpec;
//!
//! server.get(RouteSpec::path("/foo/:id").version("1.2.3"), v1)?;
//! server.get(RouteSpec::path("/foo/:id").version("3.2.1"), v3)?;
//!
//! // `accept-version: ~1.2` reaches v1, `~2.1` is a 400.
//! ```
//!
//! ## Handler Chains
//!
//! Handlers return [`Next`] to continue, halt, or fail with an
//! [`HttpError`]:
//!
//! ```ignore
//! let mut server = Server::new();
//! server.pre(handler_fn(|req, _res| {
//!     req.headers.set("Accept", "application/json");
//!     Next::Continue
//! }));
//! server.use_handler(handler_fn(|req, _res| match req.get_header("authorization") {
//!     Some(_) => Next::Continue,
//!     None => Next::Error(HttpError::unauthorized("login required")),
//! }));
//! ```
//!
//! ## Failures
//!
//! ```ignore
//! server.on_uncaught(|_req, res, _route, failure| {
//!     tracing::error!(%failure, "handler failed");
//!     res.send_status(204);
//! });
//! ```

mod error;
mod finalize;
mod format;
mod handler;
mod headers;
mod options;
mod path;
mod request;
mod response;
mod server;
mod table;
mod trap;
mod version;

pub use error::{DispatchError, HttpError, Result};
pub use finalize::{
    body_allowed, finalize, BufferedSink, FinalizedResponse, Finalizer, ResponseSink,
};
pub use format::{negotiate, Format};
pub use handler::{async_handler, handler_fn, BoxFuture, Handler, Next, SharedHandler};
pub use headers::Headers;
pub use options::ServerOptions;
pub use path::{decode_component, normalize_path, PathPattern, RoutePattern};
pub use request::{Method, PathParams, Request};
pub use response::{status_text, Body, BodyStream, Response};
pub use server::{AfterHook, RouteSpec, Server};
pub use table::{join_methods, NewRoute, Route, RouteId, RouteMatch, RouteSnapshot, RouteTable};
pub use trap::{HandlerFailure, UncaughtHook};
pub use version::{parse_version, resolve, VersionRange, VersionTieBreak};
