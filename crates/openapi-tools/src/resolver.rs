//! `OpenAPI` `$ref` resolution.
//!
//! Only references into the loaded document itself (`#/...`) are followed. Anything else
//! (other files, URLs) fails closed: the caller gets `None`/[`RefError::NotLocal`] and decides
//! on a fallback. Schema references never surface as errors, see
//! [`crate::schema::SchemaConverter::resolve_reference`].

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RefError {
    #[error("unsupported $ref '{0}' (only '#/...' pointers into this document are resolved)")]
    NotLocal(String),
    #[error("unresolved $ref '{0}'")]
    Missing(String),
    #[error("cyclic $ref '{0}'")]
    Cycle(String),
    #[error("$ref '{reference}' does not point at the expected object: {message}")]
    Shape { reference: String, message: String },
}

/// The `$ref` target of a value, if the value is a reference object.
#[must_use]
pub fn ref_target(value: &Value) -> Option<&str> {
    value.get("$ref").and_then(Value::as_str)
}

#[derive(Debug, Clone, Copy)]
pub struct SchemaResolver<'a> {
    root: &'a Value,
}

impl<'a> SchemaResolver<'a> {
    #[must_use]
    pub fn new(root: &'a Value) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &'a Value {
        self.root
    }

    /// Walk a `#/a/b/c` pointer. `None` if the pointer is not rooted at this document or
    /// any segment is missing.
    #[must_use]
    pub fn lookup(&self, reference: &str) -> Option<&'a Value> {
        let fragment = reference.strip_prefix('#')?;
        if fragment.is_empty() {
            return Some(self.root);
        }
        if !fragment.starts_with('/') {
            return None;
        }
        // `Value::pointer` handles the `~0` / `~1` escapes.
        self.root.pointer(fragment)
    }

    /// Follow a chain of `$ref`s until a concrete value.
    ///
    /// # Errors
    ///
    /// Returns a [`RefError`] when a reference is not local, is missing, or loops.
    pub fn deref(&self, value: &'a Value) -> Result<&'a Value, RefError> {
        let mut seen: HashSet<&'a str> = HashSet::new();
        let mut cur = value;
        while let Some(reference) = ref_target(cur) {
            if !seen.insert(reference) {
                return Err(RefError::Cycle(reference.to_string()));
            }
            if !reference.starts_with('#') {
                return Err(RefError::NotLocal(reference.to_string()));
            }
            cur = self
                .lookup(reference)
                .ok_or_else(|| RefError::Missing(reference.to_string()))?;
        }
        Ok(cur)
    }

    /// [`Self::deref`] and deserialize the target, keeping
    /// the raw value alongside it.
    ///
    /// # Errors
    ///
    /// Returns a [`RefError`] when dereferencing fails or the target has the wrong shape.
    pub fn deref_as<T: DeserializeOwned>(&self, value: &'a Value) -> Result<(&'a Value, T), RefError> {
        let raw = self.deref(value)?;
        let typed = serde_json::from_value(raw.clone()).map_err(|e| RefError::Shape {
            reference: ref_target(value).unwrap_or("<inline>").to_string(),
            message: e.to_string(),
        })?;
        Ok((raw, typed))
    }
}
