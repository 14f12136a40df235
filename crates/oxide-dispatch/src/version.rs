//! API version negotiation.
//!
//! Routes may carry a semantic version. Clients ask for a range through
//! the `accept-version` header (`~1.2`, `^2`, `1.2.x`, `>=1.0.0 <2.0.0`),
//! and the resolver narrows the routes matching a path and method down to
//! one variant.

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Result};
use crate::table::RouteMatch;

/// Which candidate wins when the client sends no version range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionTieBreak {
    /// The earliest registered candidate.
    #[default]
    FirstRegistered,
    /// The most recently registered candidate.
    LastRegistered,
}

/// A client-requested version range.
#[derive(Debug, Clone)]
pub struct VersionRange {
    raw: String,
    req: VersionReq,
}

impl VersionRange {
    /// Parses a node-style range expression.
    ///
    /// Whitespace-separated comparators are intersected. A bare full
    /// version (`1.2.3`) is an exact match and a partial one (`1.2`) means
    /// `1.2.x`. Alternatives joined by `||` and hyphen ranges are not
    /// supported.
    ///
    /// ```
    /// use oxide_dispatch::VersionRange;
    /// use semver::Version;
    ///
    /// let range = VersionRange::parse("~1.2").unwrap();
    /// assert!(range.matches(&Version::new(1, 2, 3)));
    /// assert!(!range.matches(&Version::new(1, 3, 0)));
    /// ```
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.contains("||") || trimmed.contains(" - ") {
            return None;
        }

        let comparators: Vec<String> = trimmed.split_whitespace().map(translate).collect();
        let expr = if comparators.is_empty() {
            "*".to_string()
        } else {
            comparators.join(", ")
        };

        VersionReq::parse(&expr).ok().map(|req| Self {
            raw: raw.to_string(),
            req,
        })
    }

    /// Returns true if `version` satisfies this range.
    pub fn matches(&self, version: &Version) -> bool {
        self.req.matches(version)
    }

    /// The range as the client sent it.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn translate(comparator: &str) -> String {
    let comparator = comparator.strip_prefix('v').unwrap_or(comparator);
    let comparator = comparator.replace(['x', 'X'], "*");

    if comparator == "*" || comparator.starts_with(['~', '^', '>', '<', '=']) {
        return comparator;
    }

    if comparator.contains('*') {
        comparator
    } else if comparator.split('.').count() >= 3 {
        format!("={comparator}")
    } else {
        format!("{comparator}.*")
    }
}

/// Parses a route's version, padding partial versions (`1.2` is `1.2.0`).
///
/// # Errors
///
/// Returns [`DispatchError::InvalidVersion`] if the text is not a version.
pub fn parse_version(raw: &str) -> Result<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    let padded = match trimmed.split('.').count() {
        1 => format!("{trimmed}.0.0"),
        2 => format!("{trimmed}.0"),
        _ => trimmed.to_string(),
    };
    Version::parse(&padded).map_err(|e| DispatchError::InvalidVersion(format!("{raw}: {e}")))
}

/// Selects one route variant among the candidates for a path and method.
///
/// `candidates` must be non-empty and in registration order.
///
/// - When no candidate carries a version the first one is selected and
///   the requested range is not looked at.
/// - Without a requested range every candidate qualifies and `tie_break`
///   decides.
/// - With a range, unversioned candidates always qualify and versioned
///   ones must satisfy it; the most recently registered qualifying
///   candidate wins.
///
/// # Errors
///
/// [`DispatchError::VersionNotAllowed`] carrying the requested range
/// verbatim when nothing qualifies or the range does not parse.
pub fn resolve(
    candidates: Vec<RouteMatch>,
    requested: Option<&str>,
    tie_break: VersionTieBreak,
) -> Result<RouteMatch> {
    let not_allowed = || DispatchError::VersionNotAllowed(requested.unwrap_or("*").to_string());

    if candidates.iter().all(|c| c.route.version().is_none()) {
        return candidates.into_iter().next().ok_or_else(not_allowed);
    }

    let Some(raw) = requested else {
        let picked = match tie_break {
            VersionTieBreak::FirstRegistered => candidates.into_iter().next(),
            VersionTieBreak::LastRegistered => candidates.into_iter().last(),
        };
        return picked.ok_or_else(not_allowed);
    };

    let range = VersionRange::parse(raw).ok_or_else(not_allowed)?;

    candidates
        .into_iter()
        .filter(|c| c.route.version().map_or(true, |v| range.matches(v)))
        .last()
        .ok_or_else(not_allowed)
}
