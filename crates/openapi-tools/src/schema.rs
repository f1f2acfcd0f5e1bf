//! Normalized schema model and the `OpenAPI` schema → [`SchemaNode`] converter.
//!
//! A [`SchemaNode`] never contains a `$ref`: references are resolved during conversion, and a
//! reference that cannot be resolved (missing target, external document, cycle) becomes the
//! generic empty-object node so that catalog construction is total.

use crate::resolver::{SchemaResolver, ref_target};
use serde_json::{Map, Number, Value, json};
use indexmap::IndexMap;
use std::cell::RefCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    String,
    Number,
    Integer,
    Boolean,
}

impl PrimitiveKind {
    #[must_use]
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "integer" => Some(Self::Integer),
            "boolean" => Some(Self::Boolean),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }
}

/// Documentation and constraint attributes any node may carry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaMeta {
    pub description: Option<String>,
    pub format: Option<String>,
    pub minimum: Option<Number>,
    pub maximum: Option<Number>,
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaKind {
    Object {
        /// In declaration order.
        properties: IndexMap<String, SchemaNode>,
        /// Always present; empty when nothing is required.
        required: Vec<String>,
    },
    Array {
        items: Option<Box<SchemaNode>>,
    },
    Primitive(PrimitiveKind),
    /// Closed set of literal values. `kind` is the declared type, if any.
    Enum {
        values: Vec<Value>,
        kind: Option<PrimitiveKind>,
    },
    /// No (recognized) type: accepts anything.
    Any,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub kind: SchemaKind,
    pub meta: SchemaMeta,
}

impl SchemaNode {
    #[must_use]
    pub fn new(kind: SchemaKind) -> Self {
        Self {
            kind,
            meta: SchemaMeta::default(),
        }
    }

    /// The fallback for anything that cannot be resolved.
    #[must_use]
    pub fn generic_object() -> Self {
        Self::object(IndexMap::new(), Vec::new())
    }

    #[must_use]
    pub fn object(properties: IndexMap<String, SchemaNode>, required: Vec<String>) -> Self {
        Self::new(SchemaKind::Object {
            properties,
            required,
        })
    }

    #[must_use]
    pub fn primitive(kind: PrimitiveKind) -> Self {
        Self::new(SchemaKind::Primitive(kind))
    }

    #[must_use]
    pub fn any() -> Self {
        Self::new(SchemaKind::Any)
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.meta.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn is_object(&self) -> bool {
        matches!(self.kind, SchemaKind::Object { .. })
    }

    /// Required property names (empty for non-objects).
    #[must_use]
    pub fn required(&self) -> &[String] {
        match &self.kind {
            SchemaKind::Object { required, .. } => required,
            _ => &[],
        }
    }

    /// JSON Schema rendering used for tool input schemas (documentation-oriented: keeps
    /// format/bounds/pattern).
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        let mut out = Map::new();
        match &self.kind {
            SchemaKind::Object {
                properties,
                required,
            } => {
                out.insert("type".into(), json!("object"));
                let props: Map<String, Value> = properties
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json_schema()))
                    .collect();
                out.insert("properties".into(), Value::Object(props));
                out.insert("required".into(), json!(required));
            }
            SchemaKind::Array { items } => {
                out.insert("type".into(), json!("array"));
                if let Some(items) = items {
                    out.insert("items".into(), items.to_json_schema());
                }
            }
            SchemaKind::Primitive(kind) => {
                out.insert("type".into(), json!(kind.as_str()));
            }
            SchemaKind::Enum { values, kind } => {
                if let Some(kind) = kind {
                    out.insert("type".into(), json!(kind.as_str()));
                }
                out.insert("enum".into(), Value::Array(values.clone()));
            }
            SchemaKind::Any => {}
        }

        let meta = &self.meta;
        if let Some(d) = &meta.description {
            out.insert("description".into(), json!(d));
        }
        if let Some(f) = &meta.format {
            out.insert("format".into(), json!(f));
        }
        if let Some(n) = &meta.minimum {
            out.insert("minimum".into(), Value::Number(n.clone()));
        }
        if let Some(n) = &meta.maximum {
            out.insert("maximum".into(), Value::Number(n.clone()));
        }
        if let Some(p) = &meta.pattern {
            out.insert("pattern".into(), json!(p));
        }
        Value::Object(out)
    }
}

/// Converts raw `OpenAPI` schema values into [`SchemaNode`]s.
///
/// Holds the stack of references currently being expanded so that recursive schemas
/// terminate: re-entering a reference yields the generic object node.
#[derive(Debug)]
pub struct SchemaConverter<'a> {
    resolver: SchemaResolver<'a>,
    expanding: RefCell<Vec<String>>,
}

impl<'a> SchemaConverter<'a> {
    #[must_use]
    pub fn new(resolver: SchemaResolver<'a>) -> Self {
        Self {
            resolver,
            expanding: RefCell::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn resolver(&self) -> SchemaResolver<'a> {
        self.resolver
    }

    /// Resolve a `#/...` pointer and convert its target. Never fails: a pointer that is not
    /// rooted at the document, points nowhere, or is already being expanded yields the
    /// generic object node.
    #[must_use]
    pub fn resolve_reference(&self, pointer: &str) -> SchemaNode {
        if self.expanding.borrow().iter().any(|p| p == pointer) {
            tracing::warn!(reference = %pointer, "cyclic $ref, using a generic object schema");
            return SchemaNode::generic_object();
        }
        let Some(raw) = self.resolver.lookup(pointer) else {
            tracing::warn!(reference = %pointer, "unresolved $ref, using a generic object schema");
            return SchemaNode::generic_object();
        };

        self.expanding.borrow_mut().push(pointer.to_string());
        let node = self.to_schema_node(raw);
        self.expanding.borrow_mut().pop();
        node
    }

    /// Convert one raw schema value.
    #[must_use]
    pub fn to_schema_node(&self, raw: &Value) -> SchemaNode {
        if let Some(reference) = ref_target(raw) {
            return self.resolve_reference(reference);
        }
        let Some(obj) = raw.as_object() else {
            return SchemaNode::any();
        };

        let mut merged = self.partial_from_raw(obj);
        if let Some(branches) = obj.get("allOf").and_then(Value::as_array) {
            for branch in branches {
                merged.absorb(Partial::from_node(self.to_schema_node(branch)));
            }
        }
        merged.finish()
    }

    fn partial_from_raw(&self, obj: &Map<String, Value>) -> Partial {
        let type_name = match obj.get("type") {
            Some(Value::String(t)) => Some(t.clone()),
            // OpenAPI 3.1 style `type: [string, "null"]`.
            Some(Value::Array(types)) => types
                .iter()
                .filter_map(Value::as_str)
                .find(|t| *t != "null")
                .map(str::to_string),
            _ => None,
        };

        let string_attr = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);
        let number_attr = |key: &str| obj.get(key).and_then(Value::as_number).cloned();

        let meta = SchemaMeta {
            description: string_attr("description"),
            format: string_attr("format"),
            minimum: number_attr("minimum"),
            maximum: number_attr("maximum"),
            pattern: string_attr("pattern"),
        };

        let enum_values = obj
            .get("enum")
            .and_then(Value::as_array)
            .filter(|v| !v.is_empty())
            .cloned();

        let items = obj.get("items").map(|i| self.to_schema_node(i));

        let properties = obj
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(name, schema)| (name.clone(), self.to_schema_node(schema)))
                    .collect()
            })
            .unwrap_or_default();

        let mut required = Vec::new();
        for name in obj
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
        {
            push_unique(&mut required, name);
        }

        Partial {
            type_name,
            meta,
            enum_values,
            items,
            properties,
            required,
        }
    }
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_string());
    }
}

/// A schema under construction. `allOf` branches are folded into it with
/// [`Partial::absorb`].
#[derive(Debug, Default)]
struct Partial {
    type_name: Option<String>,
    meta: SchemaMeta,
    enum_values: Option<Vec<Value>>,
    items: Option<SchemaNode>,
    properties: IndexMap<String, SchemaNode>,
    required: Vec<String>,
}

impl Partial {
    fn from_node(node: SchemaNode) -> Self {
        let mut p = Partial {
            meta: node.meta,
            ..Partial::default()
        };
        match node.kind {
            SchemaKind::Object {
                properties,
                required,
            } => {
                p.type_name = Some("object".to_string());
                p.properties = properties;
                p.required = required;
            }
            SchemaKind::Array { items } => {
                p.type_name = Some("array".to_string());
                p.items = items.map(|b| *b);
            }
            SchemaKind::Primitive(kind) => {
                p.type_name = Some(kind.as_str().to_string());
            }
            SchemaKind::Enum { values, kind } => {
                p.type_name = kind.map(|k| k.as_str().to_string());
                p.enum_values = Some(values);
            }
            SchemaKind::Any => {}
        }
        p
    }

    /// Merge a later `allOf` branch into `self`.
    ///
    /// Scalars (type, description, enum, format, bounds, pattern, items) only fill gaps.
    /// Properties are unioned; a later definition replaces an earlier one unless both are
    /// objects, in which case they are merged recursively. Required names are unioned.
    fn absorb(&mut self, other: Partial) {
        fill(&mut self.type_name, other.type_name);
        fill(&mut self.meta.description, other.meta.description);
        fill(&mut self.meta.format, other.meta.format);
        fill(&mut self.meta.minimum, other.meta.minimum);
        fill(&mut self.meta.maximum, other.meta.maximum);
        fill(&mut self.meta.pattern, other.meta.pattern);
        fill(&mut self.enum_values, other.enum_values);
        fill(&mut self.items, other.items);

        // A property redefined by a later branch keeps its first position.
        for (name, incoming) in other.properties {
            match self.properties.get_mut(&name) {
                Some(existing) if existing.is_object() && incoming.is_object() => {
                    let mut p =
                        Partial::from_node(std::mem::replace(existing, SchemaNode::any()));
                    p.absorb(Partial::from_node(incoming));
                    *existing = p.finish();
                }
                Some(existing) => *existing = incoming,
                None => {
                    self.properties.insert(name, incoming);
                }
            }
        }

        for name in &other.required {
            push_unique(&mut self.required, name);
        }
    }

    fn finish(self) -> SchemaNode {
        let primitive = self
            .type_name
            .as_deref()
            .and_then(PrimitiveKind::from_type_name);

        let kind = if let Some(values) = self.enum_values {
            SchemaKind::Enum {
                values,
                kind: primitive,
            }
        } else {
            match self.type_name.as_deref() {
                Some("object") => SchemaKind::Object {
                    properties: self.properties,
                    required: self.required,
                },
                Some("array") => SchemaKind::Array {
                    items: self.items.map(Box::new),
                },
                Some(_) => primitive.map_or(SchemaKind::Any, SchemaKind::Primitive),
                None if !self.properties.is_empty() || !self.required.is_empty() => {
                    SchemaKind::Object {
                        properties: self.properties,
                        required: self.required,
                    }
                }
                None => match self.items {
                    Some(items) => SchemaKind::Array {
                        items: Some(Box::new(items)),
                    },
                    None => SchemaKind::Any,
                },
            }
        };

        SchemaNode {
            kind,
            meta: self.meta,
        }
    }
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(doc: &Value, schema: &Value) -> SchemaNode {
        SchemaConverter::new(SchemaResolver::new(doc)).to_schema_node(schema)
    }

    fn props(node: &SchemaNode) -> &IndexMap<String, SchemaNode> {
        match &node.kind {
            SchemaKind::Object { properties, .. } => properties,
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn plain_schema_copies_attributes() {
        let doc = json!({});
        let node = convert(
            &doc,
            &json!({
                "type": "object",
                "description": "a pet",
                "required": ["name"],
                "properties": {
                    "name": { "type": "string", "pattern": "^[a-z]+$" },
                    "age": { "type": "integer", "minimum": 0, "maximum": 40 },
                    "tags": { "type": "array", "items": { "type": "string" } },
                    "kind": { "type": "string", "enum": ["cat", "dog"], "format": "kind" }
                }
            }),
        );

        assert_eq!(node.meta.description.as_deref(), Some("a pet"));
        assert_eq!(node.required(), ["name".to_string()]);
        let p = props(&node);
        assert_eq!(p["name"].meta.pattern.as_deref(), Some("^[a-z]+$"));
        assert_eq!(p["age"].kind, SchemaKind::Primitive(PrimitiveKind::Integer));
        assert_eq!(p["age"].meta.minimum, Some(Number::from(0)));
        assert_eq!(p["age"].meta.maximum, Some(Number::from(40)));
        assert_eq!(
            p["tags"].kind,
            SchemaKind::Array {
                items: Some(Box::new(SchemaNode::primitive(PrimitiveKind::String)))
            }
        );
        assert_eq!(
            p["kind"].kind,
            SchemaKind::Enum {
                values: vec![json!("cat"), json!("dog")],
                kind: Some(PrimitiveKind::String)
            }
        );
        assert_eq!(p["kind"].meta.format.as_deref(), Some("kind"));
    }

    #[test]
    fn objects_always_carry_required() {
        let doc = json!({});
        let node = convert(&doc, &json!({ "type": "object" }));
        assert_eq!(node, SchemaNode::generic_object());
        assert_eq!(node.to_json_schema()["required"], json!([]));
    }

    #[test]
    fn missing_type_is_inferred_or_any() {
        let doc = json!({});
        assert!(convert(&doc, &json!({ "properties": { "a": {} } })).is_object());
        assert!(matches!(
            convert(&doc, &json!({ "items": { "type": "string" } })).kind,
            SchemaKind::Array { .. }
        ));
        assert_eq!(convert(&doc, &json!({ "description": "x" })).kind, SchemaKind::Any);
        assert_eq!(convert(&doc, &json!({ "type": "null" })).kind, SchemaKind::Any);
        assert_eq!(
            convert(&doc, &json!({ "type": ["null", "integer"] })).kind,
            SchemaKind::Primitive(PrimitiveKind::Integer)
        );
    }

    #[test]
    fn resolve_reference_on_missing_pointer_returns_generic_object() {
        let doc = json!({ "components": { "schemas": {} } });
        let c = SchemaConverter::new(SchemaResolver::new(&doc));
        assert_eq!(
            c.resolve_reference("#/components/schemas/Nope"),
            SchemaNode::generic_object()
        );
        assert_eq!(
            c.resolve_reference("components/schemas/Nope"),
            SchemaNode::generic_object()
        );
        assert_eq!(
            c.resolve_reference("https://example.com/x.json#/Pet"),
            SchemaNode::generic_object()
        );
    }

    #[test]
    fn references_are_resolved_inline() {
        let doc = json!({
            "components": { "schemas": {
                "Id": { "type": "string", "format": "uuid" },
                "Pet": { "type": "object", "properties": { "id": { "$ref": "#/components/schemas/Id" } } }
            }}
        });
        let node = convert(&doc, &json!({ "$ref": "#/components/schemas/Pet" }));
        let id = &props(&node)["id"];
        assert_eq!(id.kind, SchemaKind::Primitive(PrimitiveKind::String));
        assert_eq!(id.meta.format.as_deref(), Some("uuid"));
    }

    #[test]
    fn recursive_schemas_terminate() {
        let doc = json!({
            "components": { "schemas": {
                "Node": {
                    "type": "object",
                    "properties": {
                        "value": { "type": "string" },
                        "next": { "$ref": "#/components/schemas/Node" }
                    }
                }
            }}
        });
        let node = convert(&doc, &json!({ "$ref": "#/components/schemas/Node" }));
        let next = &props(&node)["next"];
        assert_eq!(*next, SchemaNode::generic_object());
    }

    #[test]
    fn sibling_references_to_the_same_schema_are_both_expanded() {
        let doc = json!({
            "components": { "schemas": { "Id": { "type": "integer" } } }
        });
        let node = convert(
            &doc,
            &json!({
                "type": "object",
                "properties": {
                    "a": { "$ref": "#/components/schemas/Id" },
                    "b": { "$ref": "#/components/schemas/Id" }
                }
            }),
        );
        let p = props(&node);
        assert_eq!(p["a"].kind, SchemaKind::Primitive(PrimitiveKind::Integer));
        assert_eq!(p["b"].kind, SchemaKind::Primitive(PrimitiveKind::Integer));
    }

    #[test]
    fn all_of_unions_disjoint_properties() {
        let doc = json!({
            "components": { "schemas": {
                "Base": { "type": "object", "required": ["id"], "properties": { "id": { "type": "string" } } }
            }}
        });
        let node = convert(
            &doc,
            &json!({
                "allOf": [
                    { "$ref": "#/components/schemas/Base" },
                    { "type": "object", "required": ["name", "id"], "properties": { "name": { "type": "string" } } }
                ]
            }),
        );
        let p = props(&node);
        assert!(p.contains_key("id"));
        assert!(p.contains_key("name"));
        assert_eq!(node.required(), ["id".to_string(), "name".to_string()]);
    }

    #[test]
    fn all_of_keeps_scalar_from_the_only_branch_defining_it() {
        let doc = json!({});
        let node = convert(
            &doc,
            &json!({ "allOf": [ { "type": "string" }, { "pattern": "^x" } ] }),
        );
        assert_eq!(node.kind, SchemaKind::Primitive(PrimitiveKind::String));
        assert_eq!(node.meta.pattern.as_deref(), Some("^x"));
    }

    #[test]
    fn all_of_first_branch_wins_for_scalars() {
        let doc = json!({});
        let node = convert(
            &doc,
            &json!({ "allOf": [
                { "type": "string", "pattern": "^first", "format": "a" },
                { "type": "integer", "pattern": "^second", "format": "b", "minimum": 3 }
            ] }),
        );
        assert_eq!(node.kind, SchemaKind::Primitive(PrimitiveKind::String));
        assert_eq!(node.meta.pattern.as_deref(), Some("^first"));
        assert_eq!(node.meta.format.as_deref(), Some("a"));
        assert_eq!(node.meta.minimum, Some(Number::from(3)));
    }

    #[test]
    fn all_of_own_type_and_description_take_precedence() {
        let doc = json!({});
        let node = convert(
            &doc,
            &json!({
                "type": "object",
                "description": "combined",
                "allOf": [
                    { "description": "first", "properties": { "a": { "type": "string" } } }
                ]
            }),
        );
        assert_eq!(node.meta.description.as_deref(), Some("combined"));
        assert!(props(&node).contains_key("a"));

        let inherited = convert(
            &doc,
            &json!({ "allOf": [ { "description": "first" }, { "description": "second" } ] }),
        );
        assert_eq!(inherited.meta.description.as_deref(), Some("first"));
    }

    #[test]
    fn all_of_merges_nested_objects_and_replaces_leaves() {
        let doc = json!({});
        let node = convert(
            &doc,
            &json!({ "allOf": [
                { "type": "object", "properties": {
                    "settings": { "type": "object", "properties": { "a": { "type": "string" } } },
                    "mode": { "type": "string" }
                } },
                { "type": "object", "properties": {
                    "settings": { "type": "object", "required": ["b"], "properties": { "b": { "type": "boolean" } } },
                    "mode": { "type": "integer" }
                } }
            ] }),
        );
        let p = props(&node);
        let settings = props(&p["settings"]);
        assert!(settings.contains_key("a"));
        assert!(settings.contains_key("b"));
        assert_eq!(p["settings"].required(), ["b".to_string()]);
        assert_eq!(p["mode"].kind, SchemaKind::Primitive(PrimitiveKind::Integer));
    }

    #[test]
    fn properties_keep_declaration_order() {
        let doc = json!({});
        let node = convert(
            &doc,
            &json!({ "allOf": [
                { "type": "object", "properties": {
                    "zeta": { "type": "string" },
                    "alpha": { "type": "object", "properties": { "y": {}, "b": {} } },
                    "mid": { "type": "integer" }
                } },
                { "type": "object", "properties": {
                    "alpha": { "type": "object", "properties": { "a": {} } },
                    "beta": { "type": "boolean" }
                } }
            ] }),
        );
        let names: Vec<&str> = props(&node).keys().map(String::as_str).collect();
        assert_eq!(names, ["zeta", "alpha", "mid", "beta"]);

        let rendered = node.to_json_schema();
        let keys: Vec<&str> = rendered["properties"]
            .as_object()
            .expect("properties")
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, ["zeta", "alpha", "mid", "beta"]);
        let nested: Vec<&str> = rendered["properties"]["alpha"]["properties"]
            .as_object()
            .expect("nested properties")
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(nested, ["y", "b", "a"]);
    }

    #[test]
    fn json_schema_rendering_keeps_documentation() {
        let doc = json!({});
        let node = convert(
            &doc,
            &json!({ "type": "integer", "description": "page", "minimum": 1, "format": "int32" }),
        );
        assert_eq!(
            node.to_json_schema(),
            json!({ "type": "integer", "description": "page", "minimum": 1, "format": "int32" })
        );

        let e = convert(&doc, &json!({ "enum": [1, 2] }));
        assert_eq!(e.to_json_schema(), json!({ "enum": [1, 2] }));
    }
}
