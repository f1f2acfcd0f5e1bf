use apibridge_http_tools::safety::OutboundPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one OpenAPI-backed tool source.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSourceConfig {
    /// `OpenAPI` document location (http(s) URL, `file://` URL or file path).
    pub spec: String,

    /// Optional pinned document hash (`sha256:<hex>`).
    #[serde(default)]
    pub spec_hash: Option<String>,

    /// What to do when the pinned hash does not match.
    #[serde(default)]
    pub spec_hash_policy: HashPolicy,

    /// Override the base URL declared by the document's first server.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Tool names to hide (exact names or `*` globs), e.g. operations superseded by a
    /// newer variant.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Fixed client identifier header sent with every call.
    #[serde(default)]
    pub client_header: ClientHeader,

    /// How the caller's credential is put into the `Authorization` header.
    #[serde(default)]
    pub auth_scheme: AuthScheme,

    /// Send `0`, `false` and `""` query values instead of dropping them.
    #[serde(default)]
    pub keep_falsy_query_values: bool,

    /// Per-request timeout in seconds. Unset means no timeout beyond the transport's own.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Upper bound for loading the document and building the catalog.
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    /// Outbound HTTP policy for both the document fetch and tool calls.
    #[serde(default)]
    pub outbound: OutboundPolicy,
}

fn default_startup_timeout_secs() -> u64 {
    30
}

impl ApiSourceConfig {
    /// Config with defaults for everything but the document location.
    #[must_use]
    pub fn new(spec: impl Into<String>) -> Self {
        Self {
            spec: spec.into(),
            spec_hash: None,
            spec_hash_policy: HashPolicy::default(),
            base_url: None,
            exclude: Vec::new(),
            client_header: ClientHeader::default(),
            auth_scheme: AuthScheme::default(),
            keep_falsy_query_values: false,
            request_timeout_secs: None,
            startup_timeout_secs: default_startup_timeout_secs(),
            outbound: OutboundPolicy::default(),
        }
    }

    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }

    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

/// Hash verification policy.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HashPolicy {
    /// Log a warning if the hash doesn't match.
    #[default]
    Warn,
    /// Fail loading if the hash doesn't match.
    Fail,
    /// Skip verification.
    Ignore,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ClientHeader {
    pub name: String,
    pub value: String,
}

impl Default for ClientHeader {
    fn default() -> Self {
        Self {
            name: "x-client-id".to_string(),
            value: "apibridge".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    /// Forward the credential as-is.
    #[default]
    Verbatim,
    /// Send `Bearer <credential>` (an existing `Bearer ` prefix is not doubled).
    Bearer,
}

impl AuthScheme {
    #[must_use]
    pub fn header_value(self, credential: &str) -> String {
        match self {
            Self::Verbatim => credential.to_string(),
            Self::Bearer => {
                let has_prefix = credential
                    .get(..7)
                    .is_some_and(|p| p.eq_ignore_ascii_case("bearer "));
                if has_prefix {
                    credential.to_string()
                } else {
                    format!("Bearer {credential}")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_yaml_config_uses_defaults() {
        let cfg: ApiSourceConfig =
            serde_yaml::from_str("spec: https://api.example.com/openapi.json").expect("parse");
        assert_eq!(cfg.spec_hash_policy, HashPolicy::Warn);
        assert_eq!(cfg.client_header, ClientHeader::default());
        assert_eq!(cfg.auth_scheme, AuthScheme::Verbatim);
        assert!(!cfg.keep_falsy_query_values);
        assert_eq!(cfg.request_timeout(), None);
        assert_eq!(cfg.startup_timeout(), Duration::from_secs(30));
        assert!(cfg.outbound.allow_private_networks);
    }

    #[test]
    fn camel_case_fields_parse() {
        let cfg: ApiSourceConfig = serde_yaml::from_str(
            r"
spec: ./openapi.yaml
baseUrl: https://override.example.com
exclude: [legacyCreate, 'internal_*']
authScheme: bearer
keepFalsyQueryValues: true
requestTimeoutSecs: 5
clientHeader:
  name: X-Client
  value: tests
",
        )
        .expect("parse");
        assert_eq!(cfg.base_url.as_deref(), Some("https://override.example.com"));
        assert_eq!(cfg.exclude.len(), 2);
        assert_eq!(cfg.auth_scheme, AuthScheme::Bearer);
        assert!(cfg.keep_falsy_query_values);
        assert_eq!(cfg.request_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(cfg.client_header.name, "X-Client");
    }

    #[test]
    fn bearer_scheme_does_not_double_prefix() {
        assert_eq!(AuthScheme::Bearer.header_value("abc"), "Bearer abc");
        assert_eq!(AuthScheme::Bearer.header_value("bearer abc"), "bearer abc");
        assert_eq!(AuthScheme::Verbatim.header_value("Token abc"), "Token abc");
    }
}
