//! [`SchemaNode`] → runtime validation schema.
//!
//! The validation rendering differs from [`SchemaNode::to_json_schema`]: it only encodes
//! the checks the engine enforces (shape, primitive kind, enum membership, required keys).
//! Formats, bounds and patterns stay documentation.

use crate::schema::{SchemaKind, SchemaNode};
use serde_json::{Map, Value, json};

/// Render a node as the JSON Schema that is compiled for validation.
#[must_use]
pub fn to_validation_schema(node: &SchemaNode) -> Value {
    let mut out = Map::new();
    match &node.kind {
        // Enum wins over the declared type.
        SchemaKind::Enum { values, .. } => {
            out.insert("enum".into(), Value::Array(values.clone()));
        }
        SchemaKind::Object {
            properties,
            required,
        } => {
            out.insert("type".into(), json!("object"));
            let props: Map<String, Value> = properties
                .iter()
                .map(|(k, v)| (k.clone(), to_validation_schema(v)))
                .collect();
            out.insert("properties".into(), Value::Object(props));
            if !required.is_empty() {
                out.insert("required".into(), json!(required));
            }
        }
        SchemaKind::Array { items } => {
            out.insert("type".into(), json!("array"));
            if let Some(items) = items {
                out.insert("items".into(), to_validation_schema(items));
            }
        }
        SchemaKind::Primitive(kind) => {
            out.insert("type".into(), json!(kind.as_str()));
        }
        SchemaKind::Any => {}
    }
    if let Some(d) = &node.meta.description {
        out.insert("description".into(), json!(d));
    }
    Value::Object(out)
}

/// A compiled validation schema.
pub struct ValidationSchema {
    schema: Value,
    validator: jsonschema::Validator,
}

impl std::fmt::Debug for ValidationSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationSchema")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl ValidationSchema {
    /// Compile the validation rendering of `node`.
    ///
    /// # Errors
    ///
    /// Returns the compiler's message if the rendered schema is rejected (e.g. an invalid
    /// regex would be, were patterns enforced).
    pub fn compile(node: &SchemaNode) -> Result<Self, String> {
        let schema = to_validation_schema(node);
        let validator = jsonschema::validator_for(&schema).map_err(|e| e.to_string())?;
        Ok(Self { schema, validator })
    }

    #[must_use]
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    #[must_use]
    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validator.is_valid(instance)
    }

    /// Every violation, as `<instance path>: <message>` (the path is omitted at the root).
    #[must_use]
    pub fn violations(&self, instance: &Value) -> Vec<String> {
        self.validator
            .iter_errors(instance)
            .map(|e| {
                let path = e.instance_path().to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{path}: {e}")
                }
            })
            .collect()
    }
}
