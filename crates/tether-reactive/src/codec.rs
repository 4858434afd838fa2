#![forbid(unsafe_code)]

//! JSON ingestion with a structural type-tag registry.
//!
//! Incoming data may carry a structural type tag (`"__type"`) identifying
//! which registered constructor should produce the model for that object.
//! The registry is an explicit instance handed to the ingestion call — there
//! is no process-global table.
//!
//! Untagged objects become plain models; tagged objects whose tag has no
//! registered constructor are a fatal error, propagated synchronously to the
//! caller of the mutating set. Conversion happens before any mutation, so a
//! failing ingest leaves the model untouched.
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | Tag with no registered constructor | `Err(UnknownTypeTag)`, no mutation |
//! | Non-object payload to `set_from_json` | `Err(NotAnObject)`, no mutation |
//! | Nested failure inside arrays/objects | Propagates outward |

use core::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use serde_json::Value as Json;

use crate::event::SetOptions;
use crate::model::Model;
use crate::value::Value;

/// Field carrying the structural type tag.
pub const TYPE_TAG: &str = "__type";

/// Errors from JSON ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A tagged object referenced a type with no registered constructor.
    UnknownTypeTag(String),
    /// `set_from_json` was handed something other than a JSON object.
    NotAnObject,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTypeTag(tag) => {
                write!(f, "no constructor registered for type tag '{tag}'")
            }
            Self::NotAnObject => write!(f, "expected a JSON object"),
        }
    }
}

impl std::error::Error for CodecError {}

/// Constructor producing the model shell for one type tag. Attributes from
/// the payload are applied afterward.
pub type ModelConstructor = Rc<dyn Fn() -> Model>;

/// Explicit tag-to-constructor registry.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    constructors: AHashMap<String, ModelConstructor>,
}

impl TypeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for `tag`, replacing any previous one.
    pub fn register(&mut self, tag: impl Into<String>, constructor: ModelConstructor) -> &mut Self {
        self.constructors.insert(tag.into(), constructor);
        self
    }

    /// The constructor for `tag`, if registered.
    #[must_use]
    pub fn constructor(&self, tag: &str) -> Option<&ModelConstructor> {
        self.constructors.get(tag)
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("tags", &self.constructors.len())
            .finish()
    }
}

/// Convert JSON into a [`Value`], resolving tagged objects through
/// `registry`.
pub fn value_from_json(json: &Json, registry: &TypeRegistry) -> Result<Value, CodecError> {
    match json {
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => Ok(Value::Number(n.as_f64().unwrap_or(f64::NAN))),
        Json::String(s) => Ok(Value::Text(s.clone())),
        Json::Array(items) => {
            let mut converted = Vec::with_capacity(items.len());
            for item in items {
                converted.push(value_from_json(item, registry)?);
            }
            Ok(Value::Collection(crate::collection::Collection::from_items(
                converted,
            )))
        }
        Json::Object(fields) => {
            let model = match fields.get(TYPE_TAG).and_then(Json::as_str) {
                Some(tag) => {
                    let constructor = registry
                        .constructor(tag)
                        .ok_or_else(|| CodecError::UnknownTypeTag(tag.to_owned()))?;
                    constructor()
                }
                None => Model::new(),
            };
            let mut attrs = Vec::with_capacity(fields.len());
            for (key, field) in fields {
                if key == TYPE_TAG {
                    continue;
                }
                attrs.push((key.clone(), value_from_json(field, registry)?));
            }
            model.set(attrs, &SetOptions::silent());
            Ok(Value::Model(model))
        }
    }
}

impl Model {
    /// Mutating set from a JSON object. Every field converts (resolving
    /// type tags through `registry`) before anything is applied, so a
    /// failure propagates to the caller with the model untouched.
    pub fn set_from_json(
        &self,
        json: &Json,
        registry: &TypeRegistry,
        options: &SetOptions,
    ) -> Result<&Self, CodecError> {
        let Json::Object(fields) = json else {
            return Err(CodecError::NotAnObject);
        };
        let mut attrs = Vec::with_capacity(fields.len());
        for (key, field) in fields {
            if key == TYPE_TAG {
                continue;
            }
            attrs.push((key.clone(), value_from_json(field, registry)?));
        }
        Ok(self.set(attrs, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_convert() {
        let registry = TypeRegistry::new();
        assert_eq!(
            value_from_json(&json!(null), &registry).unwrap(),
            Value::Null
        );
        assert_eq!(
            value_from_json(&json!(true), &registry).unwrap(),
            Value::from(true)
        );
        assert_eq!(
            value_from_json(&json!(2.5), &registry).unwrap(),
            Value::from(2.5)
        );
        assert_eq!(
            value_from_json(&json!("hi"), &registry).unwrap(),
            Value::from("hi")
        );
    }

    #[test]
    fn untagged_object_becomes_plain_model() {
        let registry = TypeRegistry::new();
        let value = value_from_json(&json!({"name": "Ada"}), &registry).unwrap();
        let model = value.as_model().expect("model");
        assert_eq!(model.get("name"), Value::from("Ada"));
    }

    #[test]
    fn unknown_tag_is_fatal() {
        let registry = TypeRegistry::new();
        let result = value_from_json(&json!({"__type": "todo"}), &registry);
        assert_eq!(result.unwrap_err(), CodecError::UnknownTypeTag("todo".into()));
    }
}
