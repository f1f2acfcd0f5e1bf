//! Per-operation parameter extraction.

use crate::document::{Operation, ParamLocation, ParameterSpec};
use crate::schema::{PrimitiveKind, SchemaNode};
use regex::Regex;
use std::sync::LazyLock;

static PATH_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^}]+)\}").expect("valid path token regex"));

/// `{token}` names of a path template, in order, without duplicates.
#[must_use]
pub fn path_tokens(template: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for cap in PATH_TOKEN.captures_iter(template) {
        let name = &cap[1];
        if !tokens.iter().any(|t| t == name) {
            tokens.push(name.to_string());
        }
    }
    tokens
}

/// Path parameters: declared ones first (with their schemas), then a required string for
/// every template token nobody declared. Every token in the template is required.
#[must_use]
pub fn path_parameters(operation: &Operation) -> Vec<ParameterSpec> {
    let tokens = path_tokens(&operation.path);

    let mut params: Vec<ParameterSpec> = declared(operation, ParamLocation::Path)
        .map(|p| {
            let mut p = p.clone();
            p.required |= tokens.contains(&p.name);
            p
        })
        .collect();

    for token in tokens {
        if params.iter().any(|p| p.name == token) {
            continue;
        }
        let description = format!("Path parameter {token}");
        params.push(ParameterSpec {
            schema: SchemaNode::primitive(PrimitiveKind::String).with_description(&description),
            name: token,
            location: ParamLocation::Path,
            required: true,
            description: Some(description),
        });
    }
    params
}

#[must_use]
pub fn query_parameters(operation: &Operation) -> Vec<ParameterSpec> {
    declared(operation, ParamLocation::Query).cloned().collect()
}

#[must_use]
pub fn header_parameters(operation: &Operation) -> Vec<ParameterSpec> {
    declared(operation, ParamLocation::Header).cloned().collect()
}

/// Names of the declared header parameters marked required.
#[must_use]
pub fn required_headers(operation: &Operation) -> Vec<String> {
    declared(operation, ParamLocation::Header)
        .filter(|p| p.required)
        .map(|p| p.name.clone())
        .collect()
}

fn declared(operation: &Operation, location: ParamLocation) -> impl Iterator<Item = &ParameterSpec> {
    operation
        .parameters
        .iter()
        .filter(move |p| p.location == location)
}

/// All parameters of one operation, grouped by location.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    pub path: Vec<ParameterSpec>,
    pub query: Vec<ParameterSpec>,
    pub headers: Vec<ParameterSpec>,
}

impl ParameterSet {
    #[must_use]
    pub fn extract(operation: &Operation) -> Self {
        Self {
            path: path_parameters(operation),
            query: query_parameters(operation),
            headers: header_parameters(operation),
        }
    }

    #[must_use]
    pub fn in_location(&self, location: ParamLocation) -> &[ParameterSpec] {
        match location {
            ParamLocation::Path => &self.path,
            ParamLocation::Query => &self.query,
            ParamLocation::Header => &self.headers,
        }
    }
}
