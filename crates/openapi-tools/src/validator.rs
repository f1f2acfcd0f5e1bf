//! Pre-flight argument checks. Every violation is collected; a non-empty list means the
//! call is not dispatched.

use crate::catalog::CatalogEntry;
use crate::dispatch::CallParameters;
use crate::document::ParameterSpec;
use crate::error::{OpenApiToolsError, Result};
use crate::schema::{PrimitiveKind, SchemaKind, SchemaNode};
use serde_json::{Map, Value};

/// # Errors
///
/// Returns [`OpenApiToolsError::Validation`] with every violation found.
pub fn validate(entry: &CatalogEntry, params: &CallParameters) -> Result<()> {
    let violations = violations(entry, params);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(OpenApiToolsError::Validation(violations))
    }
}

#[must_use]
pub fn violations(entry: &CatalogEntry, params: &CallParameters) -> Vec<String> {
    let mut out = Vec::new();
    let declared = &entry.parameters;

    for p in declared.path.iter().filter(|p| p.required) {
        if supplied(&params.path, &p.name).is_none() {
            out.push(format!("Missing required path parameter: {}", p.name));
        }
    }
    for p in declared.query.iter().filter(|p| p.required) {
        if supplied(&params.query, &p.name).is_none() {
            out.push(format!("Missing required query parameter: {}", p.name));
        }
    }
    if entry.operation.request_body.is_some() && params.body.is_none() {
        out.push("Missing request body".to_string());
    }
    for p in declared.headers.iter().filter(|p| p.required) {
        if supplied_header(&params.headers, &p.name).is_none() {
            out.push(format!("Missing required header: {}", p.name));
        }
    }

    for p in &declared.path {
        if let Some(v) = supplied(&params.path, &p.name) {
            check_parameter(p, v, &mut out);
        }
    }
    for p in &declared.query {
        if let Some(v) = supplied(&params.query, &p.name) {
            check_parameter(p, v, &mut out);
        }
    }
    for p in &declared.headers {
        if let Some(v) = supplied_header(&params.headers, &p.name) {
            check_parameter(p, v, &mut out);
        }
    }

    if let (Some(body), Some(validator)) = (&params.body, &entry.body_validator) {
        out.extend(
            validator
                .violations(body)
                .into_iter()
                .map(|v| format!("Invalid request body: {v}")),
        );
    }
    out
}

/// A present, non-null value.
fn supplied<'a>(values: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    values.get(name).filter(|v| !v.is_null())
}

fn supplied_header<'a>(values: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    values
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
        .filter(|v| !v.is_null())
}

fn check_parameter(param: &ParameterSpec, value: &Value, out: &mut Vec<String>) {
    let label = format!("{} parameter {}", param.location.as_str(), param.name);
    check_value(&label, &param.schema, value, out);
}

fn check_value(label: &str, schema: &SchemaNode, value: &Value, out: &mut Vec<String>) {
    match &schema.kind {
        SchemaKind::Enum { values, .. } => {
            if !values.iter().any(|allowed| enum_matches(allowed, value)) {
                let allowed: Vec<String> = values.iter().map(scalar_text).collect();
                out.push(format!(
                    "Invalid value for {label}: {} is not one of [{}]",
                    scalar_text(value),
                    allowed.join(", ")
                ));
            }
        }
        SchemaKind::Primitive(kind) => {
            if !primitive_compatible(*kind, value) {
                out.push(format!(
                    "Invalid type for {label}: expected {}, got {}",
                    kind.as_str(),
                    json_type(value)
                ));
            }
        }
        SchemaKind::Array { items } => {
            let Some(items) = items else { return };
            match value {
                Value::Array(elements) => {
                    for (i, element) in elements.iter().enumerate() {
                        check_value(&format!("{label}[{i}]"), items, element, out);
                    }
                }
                // A lone value is sent as a one-element list.
                scalar => check_value(label, items, scalar, out),
            }
        }
        SchemaKind::Object { .. } | SchemaKind::Any => {}
    }
}

fn enum_matches(allowed: &Value, value: &Value) -> bool {
    allowed == value || (is_scalar(allowed) && is_scalar(value) && scalar_text(allowed) == scalar_text(value))
}

/// Numbers and booleans may arrive in string form; strings accept any scalar.
fn primitive_compatible(kind: PrimitiveKind, value: &Value) -> bool {
    match (kind, value) {
        (PrimitiveKind::String, v) => is_scalar(v),
        (PrimitiveKind::Boolean, Value::Bool(_)) => true,
        (PrimitiveKind::Boolean, Value::String(s)) => matches!(s.as_str(), "true" | "false"),
        (PrimitiveKind::Number, Value::Number(_)) => true,
        (PrimitiveKind::Number, Value::String(s)) => s.trim().parse::<f64>().is_ok_and(f64::is_finite),
        (PrimitiveKind::Integer, Value::Number(n)) => {
            n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
        }
        (PrimitiveKind::Integer, Value::String(s)) => s.trim().parse::<i64>().is_ok(),
        _ => false,
    }
}

fn is_scalar(v: &Value) -> bool {
    matches!(v, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

fn scalar_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
