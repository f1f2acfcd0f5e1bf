//! Tool catalog: one tool per operation, with a name registry used for dispatch.

use crate::document::{ApiDocument, HttpVerb, Operation, ParameterSpec};
use crate::params::ParameterSet;
use crate::validation::ValidationSchema;
use apibridge_http_tools::semantics::annotations_for_method;
use regex::Regex;
use rmcp::model::{JsonObject, Tool};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

const MAX_TOOL_NAME_LEN: usize = 64;

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("valid separator regex"));

/// `<verb>_<path>` with `{}` dropped, non-alphanumeric runs collapsed to `_`, trimmed and
/// capped at 64 characters. `GET /browser/{id}` → `get_browser_id`.
#[must_use]
pub fn canonical_tool_name(verb: HttpVerb, path: &str) -> String {
    let raw = format!("{}_{}", verb.as_str(), path.replace(['{', '}'], ""));
    let name = NON_ALPHANUMERIC.replace_all(&raw, "_");

    let mut name = name.trim_matches('_').to_string();
    // Only ASCII remains, so byte truncation is safe.
    name.truncate(MAX_TOOL_NAME_LEN);
    name.trim_end_matches('_').to_string()
}

/// The operation identifier when present and non-empty, else [`canonical_tool_name`].
#[must_use]
pub fn derive_tool_name(operation: &Operation) -> String {
    match operation.operation_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => canonical_tool_name(operation.verb, &operation.path),
    }
}

/// `*` matches any run of characters, `?` exactly one; everything else is literal.
#[must_use]
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    let (mut pi, mut ni) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while ni < n.len() {
        match p.get(pi) {
            Some('*') => {
                backtrack = Some((pi, ni));
                pi += 1;
            }
            Some(c) if *c == '?' || *c == n[ni] => {
                pi += 1;
                ni += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    pi = star + 1;
                    ni = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}

/// What a client sees for one tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// Composite object schema with optional `path`, `query`, `headers` and `body`
    /// sections.
    pub input_schema: Value,
    pub verb: HttpVerb,
}

impl ToolDescriptor {
    #[must_use]
    pub fn to_mcp_tool(&self) -> Tool {
        let schema: JsonObject = self
            .input_schema
            .as_object()
            .cloned()
            .unwrap_or_else(JsonObject::new);
        let mut tool = Tool::new(self.name.clone(), self.description.clone(), Arc::new(schema));
        tool.annotations = Some(annotations_for_method(&self.verb.method()));
        tool
    }
}

/// A registered tool: descriptor, the operation it invokes, and everything needed to
/// validate a call without touching the document again.
#[derive(Debug)]
pub struct CatalogEntry {
    pub descriptor: ToolDescriptor,
    pub operation: Operation,
    pub parameters: ParameterSet,
    /// `None` when the operation has no body or its schema failed to compile.
    pub body_validator: Option<ValidationSchema>,
}

/// Two operations derived the same tool name; the later one was renamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameCollision {
    pub derived: String,
    pub assigned: String,
    pub operation: String,
}

/// Immutable snapshot of all tools of one document.
#[derive(Debug)]
pub struct LoadedCatalog {
    base_url: String,
    title: String,
    entries: Vec<CatalogEntry>,
    by_name: HashMap<String, usize>,
    collisions: Vec<NameCollision>,
    excluded: Vec<String>,
}

impl LoadedCatalog {
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&CatalogEntry> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    #[must_use]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn collisions(&self) -> &[NameCollision] {
        &self.collisions
    }

    /// Derived names that matched the exclusion list.
    #[must_use]
    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolCatalogBuilder {
    exclude: Vec<String>,
}

impl ToolCatalogBuilder {
    #[must_use]
    pub fn new(exclude: Vec<String>) -> Self {
        Self { exclude }
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.exclude.iter().any(|pattern| {
            if pattern.contains(['*', '?']) {
                glob_match(pattern, name)
            } else {
                pattern == name
            }
        })
    }

    #[must_use]
    pub fn build(&self, doc: &ApiDocument) -> LoadedCatalog {
        let mut catalog = LoadedCatalog {
            base_url: doc.base_url().to_string(),
            title: doc.title().to_string(),
            entries: Vec::new(),
            by_name: HashMap::new(),
            collisions: Vec::new(),
            excluded: Vec::new(),
        };

        for operation in doc.operations() {
            let derived = derive_tool_name(&operation);
            if self.is_excluded(&derived) {
                tracing::debug!(tool = %derived, operation = %operation.label(), "excluded");
                catalog.excluded.push(derived);
                continue;
            }

            let name = reserve_name(&catalog.by_name, &derived);
            if name != derived {
                tracing::warn!(
                    tool = %derived,
                    renamed = %name,
                    operation = %operation.label(),
                    "tool name collision"
                );
                catalog.collisions.push(NameCollision {
                    derived: derived.clone(),
                    assigned: name.clone(),
                    operation: operation.label(),
                });
            }

            let entry = build_entry(name, operation);
            catalog
                .by_name
                .insert(entry.descriptor.name.clone(), catalog.entries.len());
            catalog.entries.push(entry);
        }

        tracing::info!(
            tools = catalog.entries.len(),
            excluded = catalog.excluded.len(),
            collisions = catalog.collisions.len(),
            "built tool catalog"
        );
        catalog
    }
}

/// `base`, or the first free `base_<n>`.
fn reserve_name(taken: &HashMap<String, usize>, base: &str) -> String {
    if !taken.contains_key(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{base}_{n}"))
        .find(|candidate| !taken.contains_key(candidate))
        .unwrap_or_else(|| base.to_string())
}

fn build_entry(name: String, operation: Operation) -> CatalogEntry {
    let parameters = ParameterSet::extract(&operation);

    let mut properties = Map::new();
    let mut required: Vec<&str> = Vec::new();
    for (section, params) in [
        ("path", &parameters.path),
        ("query", &parameters.query),
        ("headers", &parameters.headers),
    ] {
        if params.is_empty() {
            continue;
        }
        let (schema, has_required) = parameter_section(params);
        properties.insert(section.to_string(), schema);
        if has_required {
            required.push(section);
        }
    }

    let mut body_validator = None;
    if let Some(body) = &operation.request_body {
        properties.insert("body".to_string(), body.schema.to_json_schema());
        if body.required || !body.schema.required().is_empty() {
            required.push("body");
        }
        body_validator = match ValidationSchema::compile(&body.schema) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "body schema not enforceable");
                None
            }
        };
    }

    let description = [&operation.summary, &operation.description]
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .map_or_else(|| format!("Calls {}", operation.label()), str::to_string);

    CatalogEntry {
        descriptor: ToolDescriptor {
            name,
            description,
            input_schema: json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
            verb: operation.verb,
        },
        operation,
        parameters,
        body_validator,
    }
}

fn parameter_section(params: &[ParameterSpec]) -> (Value, bool) {
    let properties: Map<String, Value> = params
        .iter()
        .map(|p| (p.name.clone(), p.schema.to_json_schema()))
        .collect();
    let required: Vec<&str> = params
        .iter()
        .filter(|p| p.required)
        .map(|p| p.name.as_str())
        .collect();
    let has_required = !required.is_empty();
    (
        json!({ "type": "object", "properties": properties, "required": required }),
        has_required,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog(paths: Value, exclude: &[&str]) -> LoadedCatalog {
        let raw = json!({
            "openapi": "3.0.3",
            "info": { "title": "Test API", "version": "1" },
            "servers": [{ "url": "https://api.example.com/v1" }],
            "paths": paths
        });
        let doc = ApiDocument::from_value("test.json", raw, None).expect("document");
        ToolCatalogBuilder::new(exclude.iter().map(|s| (*s).to_string()).collect()).build(&doc)
    }

    #[test]
    fn canonical_names() {
        assert_eq!(canonical_tool_name(HttpVerb::Get, "/browser/{id}"), "get_browser_id");
        assert_eq!(
            canonical_tool_name(HttpVerb::Post, "/v1/users/{user-id}/avatar.png"),
            "post_v1_users_user_id_avatar_png"
        );
        assert_eq!(
            canonical_tool_name(HttpVerb::Get, "/héllo--wörld/{a}.{b}"),
            "get_h_llo_w_rld_a_b"
        );
        assert_eq!(canonical_tool_name(HttpVerb::Delete, "/"), "delete");

        let long = format!("/{}", "segment/".repeat(20));
        let name = canonical_tool_name(HttpVerb::Get, &long);
        assert!(name.len() <= 64);
        assert!(!name.ends_with('_'));
    }

    #[test]
    fn operation_id_wins_unless_blank() {
        let cat = catalog(
            json!({
                "/a": { "get": { "operationId": "listA" } },
                "/b": { "get": { "operationId": "  " } }
            }),
            &[],
        );
        let names: Vec<&str> = cat.descriptors().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["listA", "get_b"]);
    }

    #[test]
    fn glob_patterns() {
        assert!(glob_match("internal_*", "internal_reset"));
        assert!(glob_match("*_v?", "create_v2"));
        assert!(glob_match("*", ""));
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(!glob_match("a*b*c", "aXXbYY"));
        assert!(!glob_match("get_?", "get_ab"));
    }

    #[test]
    fn colliding_names_are_suffixed_and_recorded() {
        let cat = catalog(
            json!({
                "/a": { "get": { "operationId": "dup" } },
                "/b": { "get": { "operationId": "dup" } },
                "/c": { "get": { "operationId": "dup" } }
            }),
            &[],
        );
        let names: Vec<&str> = cat.descriptors().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["dup", "dup_1", "dup_2"]);
        assert_eq!(cat.collisions().len(), 2);
        assert_eq!(cat.collisions()[0].operation, "GET /b");

        assert_eq!(cat.lookup("dup").expect("dup").operation.path, "/a");
        assert_eq!(cat.lookup("dup_2").expect("dup_2").operation.path, "/c");
    }

    #[test]
    fn exclusions_skip_operations() {
        let cat = catalog(
            json!({
                "/items": {
                    "get": { "operationId": "listItems" },
                    "post": { "operationId": "legacyCreateItem" }
                },
                "/internal/reset": { "post": {} }
            }),
            &["legacyCreateItem", "post_internal_*"],
        );
        let names: Vec<&str> = cat.descriptors().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["listItems"]);
        assert_eq!(cat.excluded(), ["legacyCreateItem", "post_internal_reset"]);
    }

    #[test]
    fn input_schema_has_sections_only_when_needed() {
        let cat = catalog(
            json!({
                "/items/{id}": {
                    "put": {
                        "summary": "Replace an item",
                        "parameters": [
                            { "name": "dryRun", "in": "query", "schema": { "type": "boolean" } },
                            { "name": "X-Key", "in": "header", "required": true, "schema": { "type": "string" } }
                        ],
                        "requestBody": {
                            "content": { "application/json": { "schema": {
                                "type": "object", "required": ["name"],
                                "properties": { "name": { "type": "string" } }
                            } } }
                        }
                    }
                },
                "/health": { "get": {} }
            }),
            &[],
        );

        let put = cat.lookup("put_items_id").expect("put");
        assert_eq!(put.descriptor.description, "Replace an item");
        let schema = &put.descriptor.input_schema;
        assert_eq!(schema["required"], json!(["path", "headers", "body"]));
        assert_eq!(schema["properties"]["path"]["required"], json!(["id"]));
        assert_eq!(schema["properties"]["query"]["required"], json!([]));
        assert_eq!(schema["properties"]["body"]["required"], json!(["name"]));
        assert!(put.body_validator.is_some());

        let health = cat.lookup("get_health").expect("health");
        assert_eq!(health.descriptor.description, "Calls GET /health");
        assert_eq!(
            health.descriptor.input_schema,
            json!({ "type": "object", "properties": {}, "required": [] })
        );
    }

    #[test]
    fn mcp_tools_carry_method_annotations() {
        let cat = catalog(json!({ "/items": { "get": {}, "delete": {} } }), &[]);
        let get = cat.lookup("get_items").expect("get").descriptor.to_mcp_tool();
        assert_eq!(get.name, "get_items");
        let ann = get.annotations.expect("annotations");
        assert_eq!(ann.read_only_hint, Some(true));

        let del = cat.lookup("delete_items").expect("delete").descriptor.to_mcp_tool();
        assert_eq!(del.annotations.expect("annotations").destructive_hint, Some(true));
        assert_eq!(cat.title(), "Test API");
        assert_eq!(cat.base_url(), "https://api.example.com/v1");
    }
}
