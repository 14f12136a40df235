//! Path pattern matching and request path normalization.

use std::borrow::Cow;
use std::fmt;

use regex::Regex;

use crate::error::{DispatchError, Result};
use crate::request::PathParams;

/// A compiled literal path pattern with named parameters.
#[derive(Debug, Clone)]
pub struct PathPattern {
    /// The pattern as written.
    pattern: String,
    /// Compiled regex for matching.
    regex: Regex,
    /// Parameter names in order.
    param_names: Vec<String>,
}

impl PathPattern {
    /// Parses a path pattern string.
    ///
    /// Pattern syntax:
    /// - `/users` - Literal path
    /// - `/users/:id` or `/users/{id}` - Path with a named parameter
    ///
    /// Literal segments match case-sensitively. Trailing slashes are
    /// ignored on both sides.
    ///
    /// # Example
    ///
    /// ```
    /// use oxide_dispatch::PathPattern;
    ///
    /// let pattern = PathPattern::new("/posts/:id/comments/{comment_id}").unwrap();
    /// let params = pattern.match_path("/posts/123/comments/456").unwrap();
    /// assert_eq!(params.get("id"), Some("123"));
    /// assert_eq!(params.get("comment_id"), Some("456"));
    /// ```
    pub fn new(pattern: &str) -> Result<Self> {
        let mut param_names = Vec::new();
        let mut regex_str = String::from("^");

        for part in pattern.split('/').filter(|s| !s.is_empty()) {
            regex_str.push('/');

            let param = part
                .strip_prefix(':')
                .or_else(|| part.strip_prefix('{').and_then(|s| s.strip_suffix('}')));

            match param {
                Some("") => {
                    return Err(DispatchError::InvalidPattern(format!(
                        "{pattern}: empty parameter name"
                    )));
                }
                Some(name) => {
                    if param_names.iter().any(|n| n == name) {
                        return Err(DispatchError::InvalidPattern(format!(
                            "{pattern}: parameter '{name}' appears twice"
                        )));
                    }
                    param_names.push(name.to_string());
                    regex_str.push_str("([^/]+)");
                }
                None => regex_str.push_str(&regex::escape(part)),
            }
        }

        regex_str.push_str("/?$");

        let regex =
            Regex::new(&regex_str).map_err(|e| DispatchError::InvalidPattern(e.to_string()))?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            param_names,
        })
    }

    /// Attempts to match a normalized path against this pattern.
    ///
    /// Returns extracted, percent-decoded parameters if the path matches.
    pub fn match_path(&self, path: &str) -> Option<PathParams> {
        let caps = self.regex.captures(path)?;

        let mut params = PathParams::new();

        for (i, name) in self.param_names.iter().enumerate() {
            if let Some(value) = caps.get(i + 1) {
                params.insert(name.clone(), decode_lossy(value.as_str()));
            }
        }

        Some(params)
    }

    /// Returns the pattern as written.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns the parameter names.
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }
}

/// A route pattern: a literal path or a regular expression.
#[derive(Debug, Clone)]
pub enum RoutePattern {
    /// Literal path with optional named parameters.
    Path(PathPattern),
    /// Regular expression; captures bind by position.
    Regex(Regex),
}

impl RoutePattern {
    /// Compiles a literal path pattern.
    pub fn path(pattern: &str) -> Result<Self> {
        PathPattern::new(pattern).map(Self::Path)
    }

    /// Wraps a compiled regular expression.
    ///
    /// Flags such as case-insensitivity travel with the compiled regex,
    /// e.g. `Regex::new(r"(?i)^/echo/(\w+)")`.
    pub fn regex(regex: Regex) -> Self {
        Self::Regex(regex)
    }

    /// The source text of the pattern.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Path(p) => p.pattern(),
            Self::Regex(r) => r.as_str(),
        }
    }

    /// Returns true for the regular-expression variant.
    pub fn is_regex(&self) -> bool {
        matches!(self, Self::Regex(_))
    }

    /// Matches a normalized path (no query string).
    ///
    /// Regex captures are stored under their zero-based index; named
    /// groups are also stored under their name.
    pub fn match_path(&self, path: &str) -> Option<PathParams> {
        match self {
            Self::Path(p) => p.match_path(path),
            Self::Regex(re) => {
                let caps = re.captures(path)?;
                let mut params = PathParams::new();
                for (i, name) in re.capture_names().enumerate().skip(1) {
                    if let Some(value) = caps.get(i) {
                        let value = decode_lossy(value.as_str());
                        if let Some(name) = name {
                            params.insert(name, value.clone());
                        }
                        params.insert((i - 1).to_string(), value);
                    }
                }
                Some(params)
            }
        }
    }
}

impl From<Regex> for RoutePattern {
    fn from(regex: Regex) -> Self {
        Self::Regex(regex)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => f.write_str(p.pattern()),
            Self::Regex(r) => write!(f, "/{}/", r.as_str()),
        }
    }
}

/// Normalizes a request target into the path used for matching.
///
/// Strips the query string and fragment, removes trailing slashes and
/// checks that every percent-escape decodes. The returned path keeps its
/// escapes; parameters are decoded individually after matching.
///
/// # Errors
///
/// Returns [`DispatchError::MalformedPath`] for an escape like `mark%`.
pub fn normalize_path(url: &str) -> Result<String> {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let path = &url[..end];

    decode_component(path)?;

    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        Ok("/".to_string())
    } else if trimmed.starts_with('/') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("/{trimmed}"))
    }
}

/// Percent-decodes a path component.
///
/// # Errors
///
/// Fails on a `%` not followed by two hex digits, or on escapes that do
/// not form valid UTF-8.
pub fn decode_component(s: &str) -> Result<String> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                return Err(DispatchError::MalformedPath(s.to_string()));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    urlencoding::decode(s)
        .map(Cow::into_owned)
        .map_err(|_| DispatchError::MalformedPath(s.to_string()))
}

fn decode_lossy(s: &str) -> String {
    decode_component(s).unwrap_or_else(|_| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_path() {
        let pattern = RoutePattern::path("/users").unwrap();
        assert!(pattern.match_path("/users").is_some());
        assert!(pattern.match_path("/users/").is_some());
        assert!(pattern.match_path("/Users").is_none());
        assert!(pattern.match_path("/posts").is_none());
    }

    #[test]
    fn test_root_path() {
        let pattern = RoutePattern::path("/").unwrap();
        assert!(pattern.match_path("/").is_some());
        assert!(pattern.match_path("/foo").is_none());
    }

    #[test]
    fn test_colon_and_brace_params() {
        let pattern = RoutePattern::path("/foo/:id").unwrap();
        let params = pattern.match_path("/foo/bar").unwrap();
        assert_eq!(params.get("id"), Some("bar"));
        assert!(pattern.match_path("/foo").is_none());
        assert!(pattern.match_path("/foo/bar/baz").is_none());

        let pattern = RoutePattern::path("/posts/{post_id}/comments/{comment_id}").unwrap();
        let params = pattern.match_path("/posts/42/comments/7").unwrap();
        assert_eq!(params.get("post_id"), Some("42"));
        assert_eq!(params.get("comment_id"), Some("7"));
    }

    #[test]
    fn test_params_are_decoded() {
        let pattern = RoutePattern::path("/hello/:name").unwrap();
        let params = pattern.match_path("/hello/mark%20c").unwrap();
        assert_eq!(params.get("name"), Some("mark c"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(matches!(
            RoutePattern::path("/foo/:"),
            Err(DispatchError::InvalidPattern(_))
        ));
        assert!(matches!(
            RoutePattern::path("/foo/:id/:id"),
            Err(DispatchError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_regex_positional_captures() {
        let pattern = RoutePattern::regex(Regex::new(r"(?i)/echo/(\w+)").unwrap());
        let params = pattern.match_path("/ECHO/mark").unwrap();
        assert_eq!(params.index(0), Some("mark"));
        assert!(pattern.is_regex());
    }

    #[test]
    fn test_regex_named_captures() {
        let pattern = RoutePattern::regex(Regex::new(r"^/files/(?P<name>[^/]+)$").unwrap());
        let params = pattern.match_path("/files/a.txt").unwrap();
        assert_eq!(params.get("name"), Some("a.txt"));
        assert_eq!(params.index(0), Some("a.txt"));
    }

    #[test]
    fn test_regex_is_unanchored() {
        let pattern = RoutePattern::regex(Regex::new(r"\/foo").unwrap());
        assert!(pattern.match_path("/foo").is_some());
        assert!(pattern.match_path("/bar/foo").is_some());
    }

    #[test]
    fn test_normalize_strips_query_and_trailing_slash() {
        assert_eq!(normalize_path("/?foo=bar/foo").unwrap(), "/");
        assert_eq!(normalize_path("/foo/bar/").unwrap(), "/foo/bar");
        assert_eq!(normalize_path("/foo/bar//?x=1").unwrap(), "/foo/bar");
        assert_eq!(normalize_path("").unwrap(), "/");
        assert_eq!(normalize_path("/a#frag").unwrap(), "/a");
    }

    #[test]
    fn test_normalize_rejects_malformed_escape() {
        assert!(matches!(
            normalize_path("/echo/mark%"),
            Err(DispatchError::MalformedPath(_))
        ));
        assert!(normalize_path("/echo/%zz").is_err());
        assert!(normalize_path("/echo/%ff").is_err());
        assert!(normalize_path("/echo/%41").is_ok());
    }
}
