//! Handler contract and continuation signal.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::HttpError;
use crate::request::Request;
use crate::response::Response;

/// A boxed future for async handler operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A shared, type-erased handler.
pub type SharedHandler = Arc<dyn Handler>;

/// The continuation signal a handler returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    /// Pass control to the next handler in the chain.
    Continue,
    /// Stop the chain without an error. Whatever was sent is flushed.
    Halt,
    /// Stop the chain and render this error, skipping every later handler.
    Error(HttpError),
}

impl From<HttpError> for Next {
    fn from(err: HttpError) -> Self {
        Self::Error(err)
    }
}

impl<E: Into<HttpError>> From<Result<(), E>> for Next {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::Continue,
            Err(err) => Self::Error(err.into()),
        }
    }
}

/// A request handler: pre-routing hook, global middleware, or route handler.
///
/// Handlers may suspend before returning their [`Next`]. Any function or
/// closure with the signature
/// `for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, Next>`
/// is a handler; [`async_handler`] and [`handler_fn`] help closures get
/// that signature inferred.
pub trait Handler: Send + Sync {
    /// Runs the handler for one request.
    fn call<'a>(&'a self, req: &'a mut Request, res: &'a mut Response) -> BoxFuture<'a, Next>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, Next> + Send + Sync,
{
    fn call<'a>(&'a self, req: &'a mut Request, res: &'a mut Response) -> BoxFuture<'a, Next> {
        self(req, res)
    }
}

/// Pins down the signature of an async handler closure.
///
/// ```
/// use oxide_dispatch::{async_handler, Next};
///
/// let hello = async_handler(|req, res| {
///     Box::pin(async move {
///         let name = req.params.get("name").unwrap_or("world").to_string();
///         res.send(name);
///         Next::Continue
///     })
/// });
/// # let _ = hello;
/// ```
pub fn async_handler<F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, Next> + Send + Sync,
{
    f
}

/// Wraps a synchronous closure as a [`Handler`].
///
/// ```
/// use oxide_dispatch::{handler_fn, Next};
///
/// let echo = handler_fn(|req, res| {
///     res.send(req.path.clone());
///     Next::Continue
/// });
/// # let _ = echo;
/// ```
pub fn handler_fn<F>(f: F) -> impl Handler
where
    F: Fn(&mut Request, &mut Response) -> Next + Send + Sync,
{
    async_handler(move |req, res| {
        let next = f(req, res);
        Box::pin(async move { next })
    })
}
