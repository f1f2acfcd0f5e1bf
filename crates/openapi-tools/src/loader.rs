//! Fetching and parsing the API document.

use crate::config::{ApiSourceConfig, HashPolicy};
use crate::document::ApiDocument;
use crate::error::{OpenApiToolsError, Result};
use apibridge_http_tools::body::{ContentKind, read_limited};
use apibridge_http_tools::safety::{OutboundPolicy, sanitize_reqwest_error};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use url::Url;

/// Raw document bytes plus what we know about their encoding.
#[derive(Debug, Clone)]
pub struct FetchedSpec {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SpecLoader {
    client: reqwest::Client,
    policy: OutboundPolicy,
    location: String,
    base_url_override: Option<String>,
    spec_hash: Option<String>,
    hash_policy: HashPolicy,
}

impl SpecLoader {
    #[must_use]
    pub fn new(client: reqwest::Client, config: &ApiSourceConfig) -> Self {
        Self {
            client,
            policy: config.outbound.clone(),
            location: config.spec.clone(),
            base_url_override: config.base_url.clone(),
            spec_hash: config.spec_hash.clone(),
            hash_policy: config.spec_hash_policy,
        }
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Fetch, verify and parse the document.
    ///
    /// # Errors
    ///
    /// Any `Spec*` load error, or [`OpenApiToolsError::Config`] if no base URL can be
    /// determined.
    pub async fn load(&self) -> Result<ApiDocument> {
        let fetched = self.fetch().await?;
        self.verify_hash(&fetched.bytes)?;
        let raw = parse_document(&self.location, &fetched.bytes, fetched.content_type.as_deref())?;
        let doc = ApiDocument::from_value(&self.location, raw, self.base_url_override.as_deref())?;
        tracing::info!(
            spec = %self.location,
            title = %doc.title(),
            openapi = %doc.version(),
            base_url = %doc.base_url(),
            "loaded API document"
        );
        Ok(doc)
    }

    /// Read the document from an `http(s)` URL, a `file://` URL, or a local path.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::SpecFetch`], [`OpenApiToolsError::SpecStatus`],
    /// [`OpenApiToolsError::SpecReadBody`] or [`OpenApiToolsError::SpecReadFile`].
    pub async fn fetch(&self) -> Result<FetchedSpec> {
        match Url::parse(&self.location) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => self.fetch_remote(url).await,
            Ok(url) if url.scheme() == "file" => {
                let path = url.to_file_path().map_err(|()| OpenApiToolsError::SpecFetch {
                    url: self.location.clone(),
                    message: "not a local file URL".to_string(),
                })?;
                self.read_file(path).await
            }
            _ => self.read_file(PathBuf::from(&self.location)).await,
        }
    }

    async fn fetch_remote(&self, url: Url) -> Result<FetchedSpec> {
        tracing::info!(spec = %self.location, "fetching API document");
        let fetch_error = |message: String| OpenApiToolsError::SpecFetch {
            url: self.location.clone(),
            message,
        };

        self.policy
            .check_url(&url)
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(sanitize_reqwest_error(&e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(OpenApiToolsError::SpecStatus {
                url: self.location.clone(),
                status: status.as_u16(),
            });
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = read_limited(resp, self.policy.max_response_bytes)
            .await
            .map_err(|e| OpenApiToolsError::SpecReadBody {
                url: self.location.clone(),
                message: e.to_string(),
            })?;

        Ok(FetchedSpec {
            bytes,
            content_type,
        })
    }

    async fn read_file(&self, path: PathBuf) -> Result<FetchedSpec> {
        tracing::info!(path = %path.display(), "loading API document");
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| OpenApiToolsError::SpecReadFile {
                path: path.display().to_string(),
                source,
            })?;

        let content_type = path
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| e.eq_ignore_ascii_case("json"))
            .map(|_| "application/json".to_string());

        Ok(FetchedSpec {
            bytes,
            content_type,
        })
    }

    fn verify_hash(&self, bytes: &[u8]) -> Result<()> {
        let Some(expected) = &self.spec_hash else {
            return Ok(());
        };
        if self.hash_policy == HashPolicy::Ignore {
            return Ok(());
        }

        let actual = spec_hash(bytes);
        if actual.eq_ignore_ascii_case(expected) {
            return Ok(());
        }
        match self.hash_policy {
            HashPolicy::Fail => Err(OpenApiToolsError::SpecHashMismatch {
                expected: expected.clone(),
                actual,
            }),
            HashPolicy::Warn => {
                tracing::warn!(spec = %self.location, expected = %expected, actual = %actual, "API document hash mismatch");
                Ok(())
            }
            HashPolicy::Ignore => Ok(()),
        }
    }
}

/// `sha256:<hex>` of the raw document bytes.
#[must_use]
pub fn spec_hash(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

/// Parse document bytes. JSON content types must be JSON; anything else is tried as JSON
/// first, then as YAML.
///
/// # Errors
///
/// Returns [`OpenApiToolsError::SpecParse`] if no parser accepts the bytes.
pub fn parse_document(location: &str, bytes: &[u8], content_type: Option<&str>) -> Result<Value> {
    let parse_error = |message: String| OpenApiToolsError::SpecParse {
        location: location.to_string(),
        message,
    };

    if ContentKind::from_content_type(content_type) == ContentKind::Json {
        return serde_json::from_slice(bytes).map_err(|e| parse_error(e.to_string()));
    }
    if let Ok(v) = serde_json::from_slice::<Value>(bytes) {
        return Ok(v);
    }
    let mut yaml: serde_yaml::Value =
        serde_yaml::from_slice(bytes).map_err(|e| parse_error(e.to_string()))?;
    // `<<: *anchor` merge keys are only expanded on request.
    yaml.apply_merge().map_err(|e| parse_error(e.to_string()))?;
    serde_json::to_value(yaml).map_err(|e| parse_error(e.to_string()))
}
