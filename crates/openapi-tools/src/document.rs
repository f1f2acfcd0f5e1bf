//! The loaded API document and the operations it declares.
//!
//! `info` and `servers` are read through `openapiv3`'s typed model. Operations, parameters
//! and schemas are read from the raw JSON tree so that nothing the typed model cannot
//! represent (3.1 type lists, non-string enums next to a `type`) is lost before
//! [`SchemaConverter`] sees it.

use crate::error::{OpenApiToolsError, Result};
use crate::resolver::SchemaResolver;
use crate::schema::{PrimitiveKind, SchemaConverter, SchemaNode};
use apibridge_http_tools::body::ContentKind;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpVerb {
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Patch,
    Trace,
}

impl HttpVerb {
    /// Path-item keys, in the order operations are enumerated.
    pub const ALL: [HttpVerb; 8] = [
        Self::Get,
        Self::Put,
        Self::Post,
        Self::Delete,
        Self::Options,
        Self::Head,
        Self::Patch,
        Self::Trace,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Put => "put",
            Self::Post => "post",
            Self::Delete => "delete",
            Self::Options => "options",
            Self::Head => "head",
            Self::Patch => "patch",
            Self::Trace => "trace",
        }
    }

    #[must_use]
    pub fn method(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Put => reqwest::Method::PUT,
            Self::Post => reqwest::Method::POST,
            Self::Delete => reqwest::Method::DELETE,
            Self::Options => reqwest::Method::OPTIONS,
            Self::Head => reqwest::Method::HEAD,
            Self::Patch => reqwest::Method::PATCH,
            Self::Trace => reqwest::Method::TRACE,
        }
    }

    /// Verbs for which a supplied body is serialized into the request.
    #[must_use]
    pub fn sends_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch | Self::Delete)
    }
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_ascii_uppercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
}

impl ParamLocation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub schema: SchemaNode,
    pub description: Option<String>,
}

impl ParameterSpec {
    /// Same location and name; header names compare case-insensitively.
    #[must_use]
    pub fn same_slot(&self, other: &ParameterSpec) -> bool {
        if self.location != other.location {
            return false;
        }
        match self.location {
            ParamLocation::Header => self.name.eq_ignore_ascii_case(&other.name),
            _ => self.name == other.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestBodySpec {
    pub schema: SchemaNode,
    pub required: bool,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub verb: HttpVerb,
    pub path: String,
    pub operation_id: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    /// Path-item and operation parameters merged, operation-level winning.
    pub parameters: Vec<ParameterSpec>,
    pub request_body: Option<RequestBodySpec>,
}

impl Operation {
    /// `GET /pets/{id}`
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.verb, self.path)
    }
}

#[derive(Deserialize)]
struct RawParameter {
    name: String,
    #[serde(rename = "in")]
    location: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    schema: Option<Value>,
    #[serde(default)]
    content: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct RawRequestBody {
    #[serde(default)]
    required: bool,
    #[serde(default)]
    content: Map<String, Value>,
}

/// An immutable, parsed API document.
#[derive(Debug, Clone)]
pub struct ApiDocument {
    location: String,
    raw: Value,
    version: String,
    title: String,
    base_url: String,
}

impl ApiDocument {
    /// Build a document from its parsed JSON tree.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::SpecParse`] if the tree is not an `OpenAPI` 3.x
    /// document, and [`OpenApiToolsError::Config`] if no absolute base URL can be
    /// determined.
    pub fn from_value(location: &str, raw: Value, base_url_override: Option<&str>) -> Result<Self> {
        let parse_error = |message: String| OpenApiToolsError::SpecParse {
            location: location.to_string(),
            message,
        };

        if !raw.is_object() {
            return Err(parse_error("document is not an object".to_string()));
        }
        let version = raw
            .get("openapi")
            .and_then(Value::as_str)
            .ok_or_else(|| parse_error("missing 'openapi' version field".to_string()))?
            .to_string();
        if !version.starts_with("3.") {
            return Err(parse_error(format!("unsupported OpenAPI version '{version}'")));
        }

        let info: Option<openapiv3::Info> = raw
            .get("info")
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(|e| parse_error(format!("invalid 'info': {e}")))?;
        let servers: Vec<openapiv3::Server> = raw
            .get("servers")
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(|e| parse_error(format!("invalid 'servers': {e}")))?
            .unwrap_or_default();

        let base_url = resolve_base_url(base_url_override, &servers, location)?;

        Ok(Self {
            location: location.to_string(),
            raw,
            version,
            title: info.map(|i| i.title).unwrap_or_default(),
            base_url,
        })
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    #[must_use]
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Absolute base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn resolver(&self) -> SchemaResolver<'_> {
        SchemaResolver::new(&self.raw)
    }

    /// Every operation in document order (paths as declared, verbs in
    /// [`HttpVerb::ALL`] order). Unresolvable path items, parameters and request bodies
    /// are skipped with a warning.
    #[must_use]
    pub fn operations(&self) -> Vec<Operation> {
        let resolver = self.resolver();
        let converter = SchemaConverter::new(resolver);
        let Some(paths) = self.raw.get("paths").and_then(Value::as_object) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for (path, item) in paths {
            let item = match resolver.deref(item) {
                Ok(item) => item,
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "skipping path item");
                    continue;
                }
            };
            let shared = parameter_list(&converter, item.get("parameters"));

            for verb in HttpVerb::ALL {
                let Some(raw_op) = item.get(verb.as_str()).filter(|v| v.is_object()) else {
                    continue;
                };
                let own = parameter_list(&converter, raw_op.get("parameters"));
                out.push(Operation {
                    verb,
                    path: path.clone(),
                    operation_id: string_field(raw_op, "operationId"),
                    summary: string_field(raw_op, "summary"),
                    description: string_field(raw_op, "description"),
                    parameters: merge_parameters(shared.clone(), own),
                    request_body: raw_op
                        .get("requestBody")
                        .and_then(|b| request_body(&converter, b, path)),
                });
            }
        }
        out
    }
}

fn string_field(obj: &Value, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Operation-level parameters replace path-level ones declared for the same slot.
fn merge_parameters(base: Vec<ParameterSpec>, overrides: Vec<ParameterSpec>) -> Vec<ParameterSpec> {
    let mut merged = base;
    for p in overrides {
        if let Some(slot) = merged.iter_mut().find(|existing| existing.same_slot(&p)) {
            *slot = p;
        } else {
            merged.push(p);
        }
    }
    merged
}

fn parameter_list<'a>(converter: &SchemaConverter<'a>, raw: Option<&'a Value>) -> Vec<ParameterSpec> {
    raw.and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|p| parameter_spec(converter, p))
        .collect()
}

fn parameter_spec<'a>(converter: &SchemaConverter<'a>, raw: &'a Value) -> Option<ParameterSpec> {
    let (_, param) = match converter.resolver().deref_as::<RawParameter>(raw) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "skipping parameter");
            return None;
        }
    };

    let location = match param.location.as_str() {
        "path" => ParamLocation::Path,
        "query" => ParamLocation::Query,
        "header" => ParamLocation::Header,
        "cookie" => return None,
        other => {
            tracing::warn!(parameter = %param.name, location = %other, "skipping parameter with unknown location");
            return None;
        }
    };

    let raw_schema = param.schema.as_ref().or_else(|| {
        param
            .content
            .as_ref()
            .and_then(|c| c.values().next())
            .and_then(|media| media.get("schema"))
    });
    let mut schema = raw_schema.map_or_else(
        || SchemaNode::primitive(PrimitiveKind::String),
        |s| converter.to_schema_node(s),
    );
    if schema.meta.description.is_none() {
        schema.meta.description.clone_from(&param.description);
    }

    Some(ParameterSpec {
        name: param.name,
        location,
        required: param.required,
        schema,
        description: param.description,
    })
}

fn request_body<'a>(converter: &SchemaConverter<'a>, raw: &'a Value, path: &str) -> Option<RequestBodySpec> {
    let (_, body) = match converter.resolver().deref_as::<RawRequestBody>(raw) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "ignoring request body");
            return None;
        }
    };

    // Prefer JSON media types; otherwise the first declared one.
    let media = body
        .content
        .iter()
        .find(|(ct, _)| ContentKind::from_content_type(Some(ct.as_str())) == ContentKind::Json)
        .or_else(|| body.content.iter().next());

    let (content_type, schema) = match media {
        Some((ct, m)) => (
            Some(ct.clone()),
            m.get("schema")
                .map_or_else(SchemaNode::any, |s| converter.to_schema_node(s)),
        ),
        None => (None, SchemaNode::any()),
    };

    Some(RequestBodySpec {
        schema,
        required: body.required,
        content_type,
    })
}

/// The base URL: the override if given, else the first server with its variables
/// substituted by their defaults. Relative URLs are resolved against an `http(s)`
/// document location.
fn resolve_base_url(
    override_url: Option<&str>,
    servers: &[openapiv3::Server],
    location: &str,
) -> Result<String> {
    let declared = match override_url {
        Some(u) => u.to_string(),
        None => {
            let server = servers.first().ok_or_else(|| {
                OpenApiToolsError::Config(
                    "API document declares no servers (set baseUrl explicitly)".to_string(),
                )
            })?;
            substitute_server_variables(server)
        }
    };

    let url = match Url::parse(&declared) {
        Ok(u) => u,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let doc_url = Url::parse(location)
                .ok()
                .filter(|u| matches!(u.scheme(), "http" | "https"))
                .ok_or_else(|| {
                    OpenApiToolsError::Config(format!(
                        "Invalid baseUrl '{declared}': relative server URLs need an http(s) document location (set baseUrl explicitly)"
                    ))
                })?;
            doc_url.join(&declared).map_err(|e| {
                OpenApiToolsError::Config(format!("Invalid baseUrl '{declared}': {e}"))
            })?
        }
        Err(e) => {
            return Err(OpenApiToolsError::Config(format!(
                "Invalid baseUrl '{declared}': {e}"
            )));
        }
    };

    if !matches!(url.scheme(), "http" | "https") {
        return Err(OpenApiToolsError::Config(format!(
            "Invalid baseUrl '{declared}': must be an http(s) URL"
        )));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn substitute_server_variables(server: &openapiv3::Server) -> String {
    let mut url = server.url.clone();
    if let Some(vars) = &server.variables {
        for (name, var) in vars {
            url = url.replace(&format!("{{{name}}}"), &var.default);
        }
    }
    url
}
