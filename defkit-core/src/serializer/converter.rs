//! Converter chain entries
//!
//! A converter claims field kinds through [`Converter::can_convert`] and moves
//! values of those kinds between [`Value`] and [`Document`]. The serializer
//! asks converters in registration order; the first claim wins.

use std::sync::Arc;

use serde_json::{Map, Number};

use super::{document_kind, CacheMode, Context, Document, ParsedDefinition, SerializeError, Serializer};
use crate::catalog::DefinitionLookup;
use crate::definition::{keys, TYPE_KEY};
use crate::value::{FieldKind, PropertyMap, Reference, Value};

pub trait Converter: Send + Sync {
    fn name(&self) -> &str;

    fn can_convert(&self, kind: &FieldKind) -> bool;

    fn write(&self, value: &Value, kind: &FieldKind, serializer: &Serializer, ctx: &Context<'_>) -> Result<Document, SerializeError>;

    fn read(&self, doc: &Document, kind: &FieldKind, serializer: &Serializer, ctx: &Context<'_>) -> Result<Value, SerializeError>;
}

fn expected(kind: &FieldKind, doc: &Document) -> SerializeError {
    SerializeError::Expected {
        expected: kind.to_string(),
        found: document_kind(doc).to_string(),
    }
}

fn mismatched(kind: &FieldKind, value: &Value) -> SerializeError {
    SerializeError::Expected {
        expected: kind.to_string(),
        found: value.type_name().to_string(),
    }
}

fn number(value: f64) -> Result<Document, SerializeError> {
    Number::from_f64(value)
        .map(Document::Number)
        .ok_or_else(|| SerializeError::Invalid(format!("{value} is not a finite number")))
}

/// Booleans, integers, floats and strings. Null is accepted for each.
#[derive(Debug, Default)]
pub struct ScalarConverter;

impl Converter for ScalarConverter {
    fn name(&self) -> &str {
        "scalar"
    }

    fn can_convert(&self, kind: &FieldKind) -> bool {
        matches!(kind, FieldKind::Bool | FieldKind::Int | FieldKind::Float | FieldKind::String)
    }

    fn write(&self, value: &Value, kind: &FieldKind, _: &Serializer, _: &Context<'_>) -> Result<Document, SerializeError> {
        match (kind, value) {
            (_, Value::Null) => Ok(Document::Null),
            (FieldKind::Bool, Value::Bool(b)) => Ok(Document::Bool(*b)),
            (FieldKind::Int, Value::Int(n)) => Ok(Document::from(*n)),
            (FieldKind::Float, Value::Float(n)) => number(*n),
            (FieldKind::Float, Value::Int(n)) => Ok(Document::from(*n)),
            (FieldKind::String, Value::String(s)) => Ok(Document::String(s.clone())),
            _ => Err(mismatched(kind, value)),
        }
    }

    fn read(&self, doc: &Document, kind: &FieldKind, _: &Serializer, _: &Context<'_>) -> Result<Value, SerializeError> {
        match (kind, doc) {
            (_, Document::Null) => Ok(Value::Null),
            (FieldKind::Bool, Document::Bool(b)) => Ok(Value::Bool(*b)),
            (FieldKind::Int, Document::Number(n)) => n.as_i64().map(Value::Int).ok_or_else(|| expected(kind, doc)),
            (FieldKind::Float, Document::Number(n)) => n.as_f64().map(Value::Float).ok_or_else(|| expected(kind, doc)),
            (FieldKind::String, Document::String(s)) => Ok(Value::String(s.clone())),
            _ => Err(expected(kind, doc)),
        }
    }
}

/// Lists, converting each item with the element kind
#[derive(Debug, Default)]
pub struct ListConverter;

impl Converter for ListConverter {
    fn name(&self) -> &str {
        "list"
    }

    fn can_convert(&self, kind: &FieldKind) -> bool {
        matches!(kind, FieldKind::List(_))
    }

    fn write(&self, value: &Value, kind: &FieldKind, serializer: &Serializer, ctx: &Context<'_>) -> Result<Document, SerializeError> {
        let FieldKind::List(inner) = kind else {
            return Err(mismatched(kind, value));
        };
        match value {
            Value::Null => Ok(Document::Null),
            Value::List(items) => items
                .iter()
                .map(|item| serializer.write_value(item, inner, ctx))
                .collect::<Result<Vec<_>, _>>()
                .map(Document::Array),
            _ => Err(mismatched(kind, value)),
        }
    }

    fn read(&self, doc: &Document, kind: &FieldKind, serializer: &Serializer, ctx: &Context<'_>) -> Result<Value, SerializeError> {
        let FieldKind::List(inner) = kind else {
            return Err(expected(kind, doc));
        };
        match doc {
            Document::Null => Ok(Value::Null),
            Document::Array(items) => items
                .iter()
                .map(|item| serializer.read_value(item, inner, ctx))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            _ => Err(expected(kind, doc)),
        }
    }
}

/// String-keyed maps, converting each value with the value kind
#[derive(Debug, Default)]
pub struct MapConverter;

impl Converter for MapConverter {
    fn name(&self) -> &str {
        "map"
    }

    fn can_convert(&self, kind: &FieldKind) -> bool {
        matches!(kind, FieldKind::Map(_))
    }

    fn write(&self, value: &Value, kind: &FieldKind, serializer: &Serializer, ctx: &Context<'_>) -> Result<Document, SerializeError> {
        let FieldKind::Map(inner) = kind else {
            return Err(mismatched(kind, value));
        };
        match value {
            Value::Null => Ok(Document::Null),
            Value::Map(map) => {
                let mut out = Map::new();
                for (key, item) in map.iter() {
                    out.insert(key.to_string(), serializer.write_value(item, inner, ctx)?);
                }
                Ok(Document::Object(out))
            }
            _ => Err(mismatched(kind, value)),
        }
    }

    fn read(&self, doc: &Document, kind: &FieldKind, serializer: &Serializer, ctx: &Context<'_>) -> Result<Value, SerializeError> {
        let FieldKind::Map(inner) = kind else {
            return Err(expected(kind, doc));
        };
        match doc {
            Document::Null => Ok(Value::Null),
            Document::Object(map) => {
                let mut out = PropertyMap::new();
                for (key, item) in map {
                    out.insert(key.clone(), serializer.read_value(item, inner, ctx)?);
                }
                Ok(Value::Map(out))
            }
            _ => Err(expected(kind, doc)),
        }
    }
}

/// Named definitions
///
/// With cache mode on a definition is written as its bare name and a name is
/// read back through the context's lookup. With cache mode off the definition
/// is expanded inline as a full document carrying `$type`.
#[derive(Debug, Default)]
pub struct ReferenceConverter;

impl Converter for ReferenceConverter {
    fn name(&self) -> &str {
        "reference"
    }

    fn can_convert(&self, kind: &FieldKind) -> bool {
        matches!(kind, FieldKind::Reference)
    }

    fn write(&self, value: &Value, kind: &FieldKind, serializer: &Serializer, ctx: &Context<'_>) -> Result<Document, SerializeError> {
        match (value, ctx.cache) {
            (Value::Null, _) => Ok(Document::Null),
            (Value::Reference(Reference::Shared(definition)), CacheMode::Off) => serializer.write_definition(definition, ctx),
            (Value::Reference(reference), _) => Ok(Document::String(reference.name().to_string())),
            _ => Err(mismatched(kind, value)),
        }
    }

    fn read(&self, doc: &Document, kind: &FieldKind, serializer: &Serializer, ctx: &Context<'_>) -> Result<Value, SerializeError> {
        match doc {
            Document::Null => Ok(Value::Null),
            Document::String(name) => ctx.resolve(name).map(Value::Reference),
            Document::Object(map) if map.contains_key(TYPE_KEY) => {
                let ParsedDefinition {
                    mut definition,
                    pending_properties,
                    ..
                } = serializer.read_definition(doc, ctx)?;
                if let Some(raw) = pending_properties {
                    // inline definitions skip the load pipeline; type through the base when it resolves
                    let target = definition
                        .base()
                        .and_then(|base| ctx.lookup.and_then(|lookup| lookup.lookup(base)))
                        .and_then(|base| base.target_type().map(str::to_string));
                    let properties = match target {
                        Some(target) => serializer.read_properties(&raw, &target, ctx)?,
                        None => serializer.read_untyped_properties(&raw, ctx)?,
                    };
                    definition.set_field(keys::PROPERTIES, Value::Map(properties))?;
                }
                Ok(Value::Reference(Reference::Shared(Arc::new(definition))))
            }
            _ => Err(expected(kind, doc)),
        }
    }
}

/// Structural conversion for anything no other converter claims
///
/// Reads numbers as integers when they fit, objects carrying a registered
/// `$type` as nested definitions, and everything else as plain data.
#[derive(Debug, Default)]
pub struct DocumentConverter;

impl Converter for DocumentConverter {
    fn name(&self) -> &str {
        "document"
    }

    fn can_convert(&self, _: &FieldKind) -> bool {
        true
    }

    fn write(&self, value: &Value, _: &FieldKind, serializer: &Serializer, ctx: &Context<'_>) -> Result<Document, SerializeError> {
        match value {
            Value::Null => Ok(Document::Null),
            Value::Bool(b) => Ok(Document::Bool(*b)),
            Value::Int(n) => Ok(Document::from(*n)),
            Value::Float(n) => number(*n),
            Value::String(s) => Ok(Document::String(s.clone())),
            Value::List(items) => items
                .iter()
                .map(|item| serializer.write_value(item, &FieldKind::Any, ctx))
                .collect::<Result<Vec<_>, _>>()
                .map(Document::Array),
            Value::Map(map) => {
                let mut out = Map::new();
                for (key, item) in map.iter() {
                    out.insert(key.to_string(), serializer.write_value(item, &FieldKind::Any, ctx)?);
                }
                Ok(Document::Object(out))
            }
            Value::Reference(_) => serializer.write_value(value, &FieldKind::Reference, ctx),
        }
    }

    fn read(&self, doc: &Document, _: &FieldKind, serializer: &Serializer, ctx: &Context<'_>) -> Result<Value, SerializeError> {
        match doc {
            Document::Null => Ok(Value::Null),
            Document::Bool(b) => Ok(Value::Bool(*b)),
            Document::Number(n) => Ok(n.as_i64().map(Value::Int).unwrap_or_else(|| Value::Float(n.as_f64().unwrap_or(f64::NAN)))),
            Document::String(s) => Ok(Value::String(s.clone())),
            Document::Array(items) => items
                .iter()
                .map(|item| serializer.read_value(item, &FieldKind::Any, ctx))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Document::Object(map) => match map.get(TYPE_KEY).and_then(Document::as_str) {
                Some(kind) if ctx.kinds.contains(kind) => serializer.read_value(doc, &FieldKind::Reference, ctx),
                _ => {
                    let mut out = PropertyMap::new();
                    for (key, item) in map {
                        out.insert(key.clone(), serializer.read_value(item, &FieldKind::Any, ctx)?);
                    }
                    Ok(Value::Map(out))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::KindRegistry;
    use crate::target::TargetRegistry;
    use serde_json::json;

    #[test]
    fn test_scalar_rejects_wrong_shape() {
        let kinds = KindRegistry::new();
        let targets = TargetRegistry::new();
        let ctx = Context::new(&kinds, &targets);
        let serializer = Serializer::new();

        let err = ScalarConverter
            .read(&json!("ten"), &FieldKind::Int, &serializer, &ctx)
            .unwrap_err();
        assert_eq!(
            err,
            SerializeError::Expected {
                expected: "int".into(),
                found: "string".into()
            }
        );
        assert_eq!(
            ScalarConverter.read(&json!(2), &FieldKind::Float, &serializer, &ctx),
            Ok(Value::Float(2.0))
        );
    }

    #[test]
    fn test_document_fallback_reads_plain_data() {
        let kinds = KindRegistry::new();
        let targets = TargetRegistry::new();
        let ctx = Context::new(&kinds, &targets);
        let serializer = Serializer::new();

        let value = DocumentConverter
            .read(&json!({"a": [1, 2.5, "x"], "b": null}), &FieldKind::Any, &serializer, &ctx)
            .unwrap();
        let Value::Map(map) = value else {
            panic!("expected a map");
        };
        assert_eq!(
            map.get("a"),
            Some(&Value::List(vec![Value::Int(1), Value::Float(2.5), Value::from("x")]))
        );
        assert_eq!(map.get("b"), Some(&Value::Null));
    }
}
