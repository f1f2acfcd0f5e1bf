//! Response body reading and decoding.

use crate::error::{HttpToolsError, Result};
use base64::Engine as _;
use mime::Mime;
use serde::Serialize;
use serde_json::{Value, json};

/// How a body should be interpreted, judged by its `Content-Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// `application/json`, `application/problem+json`, ...
    Json,
    /// Anything else (including a missing header).
    Other,
}

impl ContentKind {
    #[must_use]
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(ct) = content_type else {
            return Self::Other;
        };
        let Ok(m) = ct.parse::<Mime>() else {
            return Self::Other;
        };
        if m.subtype() == mime::JSON || m.suffix() == Some(mime::JSON) {
            Self::Json
        } else {
            Self::Other
        }
    }
}

/// A decoded response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
    Binary {
        encoding: &'static str,
        #[serde(rename = "mimeType")]
        mime_type: Option<String>,
        data: String,
    },
}

impl ResponseBody {
    /// Decode raw bytes: JSON content types are parsed (falling back to text when the
    /// payload is not valid JSON), everything else is read as text. Bytes that are not
    /// UTF-8 are kept as base64.
    #[must_use]
    pub fn decode(bytes: &[u8], content_type: Option<&str>) -> Self {
        let Ok(text) = std::str::from_utf8(bytes) else {
            return Self::Binary {
                encoding: "base64",
                mime_type: content_type.map(str::to_string),
                data: base64::engine::general_purpose::STANDARD.encode(bytes),
            };
        };

        if ContentKind::from_content_type(content_type) == ContentKind::Json
            && let Ok(v) = serde_json::from_str::<Value>(text)
        {
            return Self::Json(v);
        }
        Self::Text(text.to_string())
    }

    /// Human-readable rendering: structured bodies are pretty-printed.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Json(v) => serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()),
            Self::Text(s) => s.clone(),
            Self::Binary { .. } => {
                let v = self.to_value();
                serde_json::to_string_pretty(&v).unwrap_or_else(|_| v.to_string())
            }
        }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Json(v) => v.clone(),
            Self::Text(s) => Value::String(s.clone()),
            Self::Binary {
                encoding,
                mime_type,
                data,
            } => json!({ "encoding": encoding, "mimeType": mime_type, "data": data }),
        }
    }
}

/// Read a response body, enforcing an optional size cap.
///
/// # Errors
///
/// Returns [`HttpToolsError::TooLarge`] when the declared or streamed size exceeds
/// `max_bytes`, and [`HttpToolsError::Transport`] when reading fails.
pub async fn read_limited(mut response: reqwest::Response, max_bytes: Option<usize>) -> Result<Vec<u8>> {
    let Some(max) = max_bytes else {
        return Ok(response.bytes().await?.to_vec());
    };

    if let Some(len) = response.content_length()
        && len > max as u64
    {
        return Err(HttpToolsError::TooLarge(format!("{len} bytes (limit {max})")));
    }

    let mut out: Vec<u8> = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if out.len().saturating_add(chunk.len()) > max {
            return Err(HttpToolsError::TooLarge(format!("exceeded {max} bytes")));
        }
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}
