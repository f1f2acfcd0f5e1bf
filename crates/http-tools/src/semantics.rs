//! MCP tool annotations derived from HTTP method semantics (RFC 9110).

use reqwest::Method;
use rmcp::model::ToolAnnotations;

/// `(read_only, destructive, idempotent)` hints for a method, `None` where unknown.
fn method_hints(method: &Method) -> (Option<bool>, Option<bool>, Option<bool>) {
    match method.as_str() {
        "GET" | "HEAD" | "OPTIONS" | "TRACE" => (Some(true), Some(false), Some(true)),
        "POST" => (Some(false), Some(false), Some(false)),
        "PUT" | "DELETE" => (Some(false), Some(true), Some(true)),
        // PATCH may or may not be idempotent.
        "PATCH" => (Some(false), Some(true), None),
        _ => (None, None, None),
    }
}

/// Tool annotations for an HTTP-backed tool. `openWorldHint` is always set: every call
/// reaches an external system.
#[must_use]
pub fn annotations_for_method(method: &Method) -> ToolAnnotations {
    let (read_only_hint, destructive_hint, idempotent_hint) = method_hints(method);
    ToolAnnotations {
        title: None,
        read_only_hint,
        destructive_hint,
        idempotent_hint,
        open_world_hint: Some(true),
    }
}
