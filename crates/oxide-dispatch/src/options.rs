//! Server configuration.

use serde::{Deserialize, Serialize};

use crate::format::Format;
use crate::version::VersionTieBreak;

/// Options fixed at server construction.
///
/// Deserializes from JSON with every field optional:
///
/// ```
/// use oxide_dispatch::{ServerOptions, VersionTieBreak};
///
/// let opts = ServerOptions::from_json(r#"{"name": "api", "version_tie_break": "last_registered"}"#)
///     .unwrap();
/// assert_eq!(opts.name, "api");
/// assert_eq!(opts.version_tie_break, VersionTieBreak::LastRegistered);
/// assert!(opts.head_falls_back_to_get);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    /// Server name, sent in the `Server` header when `server_header` is set.
    pub name: String,
    /// Version applied to routes registered without one.
    pub default_version: Option<String>,
    /// Winner among versioned candidates when no `accept-version` is sent.
    pub version_tie_break: VersionTieBreak,
    /// Format used when the client accepts anything.
    pub default_format: Format,
    /// Serve `HEAD` from `GET` routes when no `HEAD` route matches.
    pub head_falls_back_to_get: bool,
    /// Add a `Server` header to every response.
    pub server_header: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            name: "oxide-dispatch".to_string(),
            default_version: None,
            version_tie_break: VersionTieBreak::default(),
            default_format: Format::default(),
            head_falls_back_to_get: true,
            server_header: true,
        }
    }
}

impl ServerOptions {
    /// Creates the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for malformed input.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Sets the server name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the version applied to unversioned routes.
    #[must_use]
    pub fn default_version(mut self, version: impl Into<String>) -> Self {
        self.default_version = Some(version.into());
        self
    }

    /// Sets the tie-break used when no version is requested.
    #[must_use]
    pub fn version_tie_break(mut self, tie_break: VersionTieBreak) -> Self {
        self.version_tie_break = tie_break;
        self
    }

    /// Sets the format used for `*/*` and missing `Accept` headers.
    #[must_use]
    pub fn default_format(mut self, format: Format) -> Self {
        self.default_format = format;
        self
    }

    /// Enables or disables `HEAD` fallback to `GET` routes.
    #[must_use]
    pub fn head_falls_back_to_get(mut self, enabled: bool) -> Self {
        self.head_falls_back_to_get = enabled;
        self
    }

    /// Enables or disables the `Server` header.
    #[must_use]
    pub fn server_header(mut self, enabled: bool) -> Self {
        self.server_header = enabled;
        self
    }
}
