//! Error types for routing and dispatch.

use serde::Serialize;
use thiserror::Error;

use crate::request::Method;
use crate::trap::HandlerFailure;

/// An error carried through the handler chain and rendered as a response.
///
/// Handlers return it through [`Next::Error`](crate::Next::Error). The body
/// sent to the client is `{"code": ..., "message": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{code} ({status}): {message}")]
pub struct HttpError {
    /// HTTP status code to respond with.
    #[serde(skip)]
    pub status: u16,
    /// Machine-readable error code, e.g. `BadRequest`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl HttpError {
    /// Creates an error with an explicit status and code.
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// 400 Bad Request.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, "BadRequest", message)
    }

    /// 401 Unauthorized.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(401, "Unauthorized", message)
    }

    /// 403 Forbidden.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(403, "Forbidden", message)
    }

    /// 404 Not Found.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, "ResourceNotFound", message)
    }

    /// 409 Conflict.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(409, "Conflict", message)
    }

    /// 500 Internal Server Error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, "InternalError", message)
    }

    /// Renders the error as the JSON value sent to clients.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "code": self.code, "message": self.message })
    }
}

/// Dispatch errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No route of any method matched the path.
    #[error("{path} does not exist")]
    NotFound { method: Method, path: String },

    /// The path matched, but not for this method.
    #[error("{method} is not allowed")]
    MethodNotAllowed {
        method: Method,
        path: String,
        /// Methods with a route for the path, in registration order.
        allowed: Vec<Method>,
    },

    /// No route variant satisfies the requested version range.
    ///
    /// The message is the requested range, verbatim.
    #[error("{0}")]
    VersionNotAllowed(String),

    /// The request path contains an escape sequence that does not decode.
    #[error("malformed path: {0}")]
    MalformedPath(String),

    /// Invalid path pattern at registration.
    #[error("invalid path pattern: {0}")]
    InvalidPattern(String),

    /// Invalid route version at registration.
    #[error("invalid route version: {0}")]
    InvalidVersion(String),

    /// A route with the same method, pattern and version already exists.
    #[error("duplicate route: {method} {pattern} (version {version})")]
    DuplicateRoute {
        method: Method,
        pattern: String,
        version: String,
    },

    /// A handler passed an error to its continuation.
    #[error(transparent)]
    Handler(#[from] HttpError),

    /// A handler panicked.
    #[error("uncaught handler failure: {0}")]
    Uncaught(HandlerFailure),
}

impl DispatchError {
    /// HTTP status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::MethodNotAllowed { .. } => 405,
            Self::VersionNotAllowed(_) | Self::MalformedPath(_) => 400,
            Self::Handler(err) => err.status,
            Self::InvalidPattern(_)
            | Self::InvalidVersion(_)
            | Self::DuplicateRoute { .. }
            | Self::Uncaught(_) => 500,
        }
    }

    /// Converts into the error rendered to the client.
    pub fn to_http_error(&self) -> HttpError {
        match self {
            Self::Handler(err) => err.clone(),
            Self::NotFound { .. } => HttpError::not_found(self.to_string()),
            Self::MethodNotAllowed { .. } => {
                HttpError::new(405, "MethodNotAllowed", self.to_string())
            }
            Self::VersionNotAllowed(range) => HttpError::new(400, "InvalidVersion", range.clone()),
            Self::MalformedPath(_) => HttpError::bad_request(self.to_string()),
            Self::Uncaught(_) => HttpError::internal("internal error"),
            Self::InvalidPattern(_) | Self::InvalidVersion(_) | Self::DuplicateRoute { .. } => {
                HttpError::internal(self.to_string())
            }
        }
    }
}

/// Result type alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
