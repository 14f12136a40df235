//! Trapping of handler panics.
//!
//! Every handler call runs under `catch_unwind`, so a panicking handler
//! turns into a response instead of tearing down the dispatch task.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{error, warn};

use crate::error::DispatchError;
use crate::handler::{Handler, Next};
use crate::request::Request;
use crate::response::Response;
use crate::table::Route;

/// Hook invoked when a handler panics.
///
/// It receives the request, the response (reset to an unsent state), the
/// resolved route if any, and the failure. Whatever it sends is the
/// response. If it sends nothing, the default 500 applies. It is not
/// called when a handler already sent the response before failing.
pub type UncaughtHook =
    Arc<dyn Fn(&Request, &mut Response, Option<&Route>, &HandlerFailure) + Send + Sync>;

/// A panic caught while running a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    message: String,
}

impl HandlerFailure {
    /// Creates a failure with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Extracts the message from a panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "handler panicked".to_string());
        Self { message }
    }

    /// The panic message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HandlerFailure {}

/// Runs a handler, converting a panic into a [`HandlerFailure`].
///
/// The call itself happens inside the guarded future, so panics raised
/// before the handler's first suspension point are caught as well.
pub(crate) async fn guarded(
    handler: &dyn Handler,
    req: &mut Request,
    res: &mut Response,
) -> Result<Next, HandlerFailure> {
    AssertUnwindSafe(async move { handler.call(req, res).await })
        .catch_unwind()
        .await
        .map_err(HandlerFailure::from_panic)
}

/// Turns a caught failure into the response, via the hook if one is set.
///
/// A response that was already sent is left as it is.
pub(crate) fn recover(
    hook: Option<&UncaughtHook>,
    req: &Request,
    res: &mut Response,
    route: Option<&Route>,
    failure: &HandlerFailure,
) {
    error!(path = %req.path, message = failure.message(), "handler panicked");

    if res.is_sent() {
        return;
    }

    if let Some(hook) = hook {
        res.reset();
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            hook(req, res, route, failure);
        }));
        match outcome {
            Ok(()) if res.is_sent() => return,
            Ok(()) => warn!("uncaught-failure hook sent no response; using default"),
            Err(payload) => warn!(
                message = HandlerFailure::from_panic(payload).message(),
                "uncaught-failure hook panicked; using default"
            ),
        }
    }

    res.force_error(&DispatchError::Uncaught(failure.clone()).to_http_error());
}
