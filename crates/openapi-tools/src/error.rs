//! Error types for `apibridge-openapi-tools`.
//!
//! Load-time variants (`Spec*`, `Config`, `Startup`) abort startup. The per-invocation
//! variants (`ToolNotFound`, `Validation`, `Call`, `SpecNotLoaded`) are turned into error
//! tool results at the invocation boundary.

use apibridge_http_tools::error::HttpToolsError;
use thiserror::Error;

/// Main error type for the `OpenAPI` tool engine.
#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    /// Invalid configuration, or no usable base URL.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Startup did not finish (timeout).
    #[error("Startup error: {0}")]
    Startup(String),

    #[error("OpenAPI error: failed to fetch spec from '{url}': {message}")]
    SpecFetch { url: String, message: String },

    #[error("OpenAPI error: fetching spec from '{url}' returned HTTP {status}")]
    SpecStatus { url: String, status: u16 },

    #[error("OpenAPI error: failed to read spec body from '{url}': {message}")]
    SpecReadBody { url: String, message: String },

    #[error("OpenAPI error: failed to read spec file '{path}': {source}")]
    SpecReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("OpenAPI error: failed to parse OpenAPI spec from '{location}': {message}")]
    SpecParse { location: String, message: String },

    #[error("OpenAPI error: spec hash mismatch (expected {expected}, got {actual})")]
    SpecHashMismatch { expected: String, actual: String },

    /// A tool was invoked before the catalog was loaded.
    #[error("OpenAPI spec not loaded")]
    SpecNotLoaded,

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Every violation found by pre-flight validation.
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// The outbound HTTP call failed.
    #[error("Call failed: {0}")]
    Call(String),
}

impl OpenApiToolsError {
    /// `true` for errors that prevent a catalog from existing at all.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::Startup(_)
                | Self::SpecFetch { .. }
                | Self::SpecStatus { .. }
                | Self::SpecReadBody { .. }
                | Self::SpecReadFile { .. }
                | Self::SpecParse { .. }
                | Self::SpecHashMismatch { .. }
        )
    }
}

impl From<HttpToolsError> for OpenApiToolsError {
    fn from(e: HttpToolsError) -> Self {
        Self::Call(e.to_string())
    }
}

/// Result type alias for `OpenAPI` tooling operations.
pub type Result<T> = std::result::Result<T, OpenApiToolsError>;
