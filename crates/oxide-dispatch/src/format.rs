//! Content negotiation and body formatting.

use serde::{Deserialize, Serialize};

use crate::response::Body;

/// A response body format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    /// `application/json`
    #[default]
    Json,
    /// `text/plain`
    Text,
    /// `application/octet-stream`
    Binary,
}

impl Format {
    /// The `Content-Type` header value written for this format.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Text => "text/plain; charset=utf-8",
            Self::Binary => "application/octet-stream",
        }
    }

    /// Maps an `Accept` media range to a supported format.
    fn from_media_range(range: &str, default: Self) -> Option<Self> {
        match range {
            "*/*" => Some(default),
            "application/json" | "application/*" => Some(Self::Json),
            "text/plain" | "text/*" => Some(Self::Text),
            "application/octet-stream" => Some(Self::Binary),
            other if other.starts_with("application/") && other.ends_with("+json") => {
                Some(Self::Json)
            }
            _ => None,
        }
    }

    /// Picks the formatter for a `Content-Type` a handler set explicitly.
    ///
    /// JSON types get the JSON formatter; anything else is written raw.
    pub fn from_content_type(content_type: &str) -> Self {
        let essence = essence(content_type);
        if essence == "application/json" || essence.ends_with("+json") {
            Self::Json
        } else if essence == "application/octet-stream" {
            Self::Binary
        } else {
            Self::Text
        }
    }

    /// Serializes a discrete body. Returns `None` for empty and streaming
    /// bodies.
    pub fn encode(self, body: &Body) -> Option<Vec<u8>> {
        match (self, body) {
            (_, Body::Empty | Body::Stream(_)) => None,
            (_, Body::Bytes(bytes)) => Some(bytes.clone()),
            (Self::Json, Body::Text(s)) => {
                Some(serde_json::Value::String(s.clone()).to_string().into_bytes())
            }
            (Self::Text | Self::Binary, Body::Text(s)) => Some(s.clone().into_bytes()),
            (_, Body::Json(value)) => Some(value.to_string().into_bytes()),
        }
    }
}

fn essence(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Chooses a format from an `Accept` header.
///
/// Media ranges are ordered by `q` weight (stable for equal weights);
/// ranges with `q=0` are skipped. A missing header, or one naming no
/// supported type, yields `default`.
pub fn negotiate(accept: Option<&str>, default: Format) -> Format {
    let Some(accept) = accept else {
        return default;
    };

    let mut ranges: Vec<(String, f32)> = accept
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.split(';');
            let range = pieces.next()?.trim().to_ascii_lowercase();
            if range.is_empty() {
                return None;
            }
            let q = pieces
                .filter_map(|p| p.trim().strip_prefix("q="))
                .find_map(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            Some((range, q))
        })
        .filter(|(_, q)| *q > 0.0)
        .collect();

    ranges.sort_by(|a, b| b.1.total_cmp(&a.1));

    ranges
        .iter()
        .find_map(|(range, _)| Format::from_media_range(range, default))
        .unwrap_or(default)
}
