//! Request building and execution for a resolved tool.

use crate::catalog::{CatalogEntry, LoadedCatalog};
use crate::config::{ApiSourceConfig, AuthScheme, ClientHeader};
use crate::document::Operation;
use crate::error::{OpenApiToolsError, Result};
use crate::params::path_tokens;
use crate::validator;
use apibridge_http_tools::body::{ResponseBody, read_limited};
use apibridge_http_tools::error::HttpToolsError;
use apibridge_http_tools::safety::{OutboundPolicy, redact_url};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;
use url::Url;

/// Decoded tool arguments: `{ path?, query?, body?, headers? }`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CallParameters {
    #[serde(default)]
    pub path: Map<String, Value>,
    #[serde(default)]
    pub query: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default)]
    pub headers: Map<String, Value>,
}

impl CallParameters {
    /// `null` means no arguments.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::Validation`] if `arguments` is not an object of the
    /// expected sections.
    pub fn from_arguments(arguments: Value) -> Result<Self> {
        match arguments {
            Value::Null => Ok(Self::default()),
            Value::Object(_) => serde_json::from_value(arguments)
                .map_err(|e| OpenApiToolsError::Validation(vec![format!("Invalid arguments: {e}")])),
            other => Err(OpenApiToolsError::Validation(vec![format!(
                "Invalid arguments: expected an object with path/query/body/headers, got {other}"
            )])),
        }
    }
}

/// Per-invocation data supplied by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationContext {
    pub authorization: Option<String>,
}

impl InvocationContext {
    #[must_use]
    pub fn with_authorization(credential: impl Into<String>) -> Self {
        Self {
            authorization: Some(credential.into()),
        }
    }
}

/// Normalized outcome of one upstream call. Non-2xx statuses are reported, not raised.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallReport {
    pub url: String,
    pub method: String,
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub body: ResponseBody,
}

impl CallReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "URL: {}", self.url);
        let _ = writeln!(out, "Method: {}", self.method);
        let _ = writeln!(out, "Status: {} {}", self.status, self.status_text);
        let _ = writeln!(out, "Headers:");
        for (k, v) in &self.headers {
            let _ = writeln!(out, "  {k}: {v}");
        }
        let _ = writeln!(out, "Body:");
        out.push_str(&self.body.render());
        out
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    policy: OutboundPolicy,
    client_header: ClientHeader,
    auth_scheme: AuthScheme,
    keep_falsy_query_values: bool,
    request_timeout: Option<Duration>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(client: reqwest::Client, config: &ApiSourceConfig) -> Self {
        Self {
            client,
            policy: config.outbound.clone(),
            client_header: config.client_header.clone(),
            auth_scheme: config.auth_scheme,
            keep_falsy_query_values: config.keep_falsy_query_values,
            request_timeout: config.request_timeout(),
        }
    }

    /// Look the tool up, validate the arguments, and perform the call.
    ///
    /// # Errors
    ///
    /// [`OpenApiToolsError::ToolNotFound`], [`OpenApiToolsError::Validation`] (no request is
    /// sent) or [`OpenApiToolsError::Call`].
    pub async fn dispatch(
        &self,
        catalog: &LoadedCatalog,
        name: &str,
        params: &CallParameters,
        ctx: &InvocationContext,
    ) -> Result<CallReport> {
        let entry = catalog
            .lookup(name)
            .ok_or_else(|| OpenApiToolsError::ToolNotFound(name.to_string()))?;
        validator::validate(entry, params)?;
        self.execute(catalog.base_url(), entry, params, ctx).await
    }

    /// Perform the call for an already validated invocation.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::Call`] for URL/header construction failures, outbound
    /// policy blocks and transport errors.
    pub async fn execute(
        &self,
        base_url: &str,
        entry: &CatalogEntry,
        params: &CallParameters,
        ctx: &InvocationContext,
    ) -> Result<CallReport> {
        let operation = &entry.operation;
        let url = build_url(base_url, operation, params, self.keep_falsy_query_values)?;
        self.policy.check_url(&url).await?;

        let method = operation.verb.method();
        tracing::debug!(
            tool = %entry.descriptor.name,
            method = %method,
            url = %redact_url(&url),
            "dispatching tool call"
        );

        let mut request = self
            .client
            .request(method.clone(), url)
            .headers(self.request_headers(params, ctx)?);
        if operation.verb.sends_body()
            && let Some(body) = &params.body
        {
            request = request.json(body);
        }
        if let Some(timeout) = self.request_timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(HttpToolsError::from)?;

        let status = response.status();
        let final_url = response.url().to_string();
        let headers = collect_headers(response.headers());
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = read_limited(response, self.policy.max_response_bytes).await?;

        tracing::debug!(tool = %entry.descriptor.name, status = status.as_u16(), "upstream responded");

        Ok(CallReport {
            url: final_url,
            method: method.to_string(),
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body: ResponseBody::decode(&bytes, content_type.as_deref()),
        })
    }

    /// Caller headers, then the client identifier, then `Authorization` from the context.
    /// Later entries replace earlier ones with the same name.
    fn request_headers(&self, params: &CallParameters, ctx: &InvocationContext) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in &params.headers {
            if value.is_null() {
                continue;
            }
            headers.insert(header_name(name)?, header_value(name, &scalar_to_string(value))?);
        }

        headers.insert(
            header_name(&self.client_header.name)?,
            header_value(&self.client_header.name, &self.client_header.value)?,
        );

        if let Some(credential) = ctx.authorization.as_deref().filter(|c| !c.is_empty()) {
            let mut value = header_value("authorization", &self.auth_scheme.header_value(credential))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

fn header_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| OpenApiToolsError::Call(format!("invalid header name '{name}': {e}")))
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| OpenApiToolsError::Call(format!("invalid value for header '{name}': {e}")))
}

fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        out.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    out
}

/// `<base_url><path>` with path tokens substituted and query parameters appended.
///
/// # Errors
///
/// Returns [`OpenApiToolsError::Call`] if a template token has no value or the result is
/// not a valid URL.
pub fn build_url(base_url: &str, operation: &Operation, params: &CallParameters, keep_falsy: bool) -> Result<Url> {
    let mut path = operation.path.clone();
    for token in path_tokens(&operation.path) {
        let value = params
            .path
            .get(&token)
            .filter(|v| !v.is_null())
            .ok_or_else(|| OpenApiToolsError::Call(format!("no value for path parameter '{token}'")))?;
        path = path.replace(&format!("{{{token}}}"), &urlencoding::encode(&scalar_to_string(value)));
    }

    let mut url = Url::parse(&format!("{}{path}", base_url.trim_end_matches('/')))
        .map_err(|e| OpenApiToolsError::Call(format!("invalid request URL: {e}")))?;

    let pairs = query_pairs(&params.query, keep_falsy);
    if !pairs.is_empty() {
        let mut serializer = url.query_pairs_mut();
        for (k, v) in &pairs {
            serializer.append_pair(k, v);
        }
    }
    Ok(url)
}

/// Arrays repeat the key once per element. Falsy values are dropped unless `keep_falsy`;
/// `null` is always dropped.
fn query_pairs(query: &Map<String, Value>, keep_falsy: bool) -> Vec<(String, String)> {
    let keep = |v: &Value| !v.is_null() && (keep_falsy || !is_falsy(v));
    let mut pairs = Vec::new();
    for (key, value) in query {
        match value {
            Value::Array(items) => {
                for item in items.iter().filter(|i| keep(i)) {
                    pairs.push((key.clone(), scalar_to_string(item)));
                }
            }
            v if keep(v) => pairs.push((key.clone(), scalar_to_string(v))),
            _ => {}
        }
    }
    pairs
}

fn is_falsy(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

fn scalar_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
