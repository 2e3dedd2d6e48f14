//! In-memory property values
//!
//! Definitions and target objects exchange data through [`Value`]. Named
//! definitions appear as [`Reference`]s, which either hold a name awaiting
//! resolution or share the committed definition by identity.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::definition::Definition;

/// Shape a field expects its value to have
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Any,
    Bool,
    Int,
    Float,
    String,
    List(Box<FieldKind>),
    Map(Box<FieldKind>),
    /// A named definition, shared by identity
    Reference,
    /// A value handled by a pluggable converter, e.g. `Vector2`
    Leaf(String),
}

impl FieldKind {
    pub fn list_of(inner: FieldKind) -> Self {
        FieldKind::List(Box::new(inner))
    }

    pub fn map_of(inner: FieldKind) -> Self {
        FieldKind::Map(Box::new(inner))
    }

    pub fn leaf(name: impl Into<String>) -> Self {
        FieldKind::Leaf(name.into())
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Any => write!(f, "any"),
            FieldKind::Bool => write!(f, "bool"),
            FieldKind::Int => write!(f, "int"),
            FieldKind::Float => write!(f, "float"),
            FieldKind::String => write!(f, "string"),
            FieldKind::List(inner) => write!(f, "list<{inner}>"),
            FieldKind::Map(inner) => write!(f, "map<{inner}>"),
            FieldKind::Reference => write!(f, "definition"),
            FieldKind::Leaf(name) => write!(f, "{name}"),
        }
    }
}

/// How [`Value::deep_clone`] treats referenced definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClonePolicy {
    /// Share referenced definitions by identity
    Reference,
    /// Copy referenced definitions inline
    Expand,
}

/// Reference to a named definition
#[derive(Clone)]
pub enum Reference {
    /// Parsed but not yet looked up in a catalog
    Named(String),
    Shared(Arc<Definition>),
}

impl Reference {
    pub fn name(&self) -> &str {
        match self {
            Reference::Named(name) => name,
            Reference::Shared(definition) => definition.name(),
        }
    }

    pub fn definition(&self) -> Option<&Arc<Definition>> {
        match self {
            Reference::Named(_) => None,
            Reference::Shared(definition) => Some(definition),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Reference::Shared(_))
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Reference::Shared(a), Reference::Shared(b)) if Arc::ptr_eq(a, b) => true,
            _ => self.name() == other.name(),
        }
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Named(name) => write!(f, "Named({name:?})"),
            Reference::Shared(definition) => write!(f, "Shared({:?})", definition.name()),
        }
    }
}

/// Insertion-ordered map of field names to values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyMap {
    entries: Vec<(String, Value)>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Insert or replace in place, keeping the original position
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        match self.get_mut(&key) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let position = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(position).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Value)> {
        self.entries.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn deep_clone(&self, policy: ClonePolicy) -> Self {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.deep_clone(policy)))
            .collect()
    }
}

impl FromIterator<(String, Value)> for PropertyMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut map = PropertyMap::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl IntoIterator for PropertyMap {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(PropertyMap),
    Reference(Reference),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Reference(_) => "definition",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Copy this value so no container is shared with the original
    ///
    /// Under [`ClonePolicy::Reference`] resolved definitions stay shared;
    /// under [`ClonePolicy::Expand`] each one is copied as well.
    pub fn deep_clone(&self, policy: ClonePolicy) -> Value {
        match self {
            Value::List(items) => Value::List(items.iter().map(|item| item.deep_clone(policy)).collect()),
            Value::Map(map) => Value::Map(map.deep_clone(policy)),
            Value::Reference(Reference::Shared(definition)) if policy == ClonePolicy::Expand => {
                Value::Reference(Reference::Shared(Arc::new(definition.deep_clone(policy))))
            }
            other => other.clone(),
        }
    }

    /// Replace every [`Reference::Named`] with the definition `lookup` returns
    ///
    /// Returns the first name `lookup` could not find.
    pub fn resolve_references<F>(&mut self, lookup: &F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<Arc<Definition>>,
    {
        match self {
            Value::Reference(reference) => {
                if let Reference::Named(name) = reference {
                    let definition = lookup(name).ok_or_else(|| name.clone())?;
                    *reference = Reference::Shared(definition);
                }
                Ok(())
            }
            Value::List(items) => items.iter_mut().try_for_each(|item| item.resolve_references(lookup)),
            Value::Map(map) => map.iter_mut().try_for_each(|(_, item)| item.resolve_references(lookup)),
            _ => Ok(()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

/// Conversion failure between a [`Value`] and a Rust field type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    #[error("expected {expected} but found {found}")]
    TypeMismatch { expected: FieldKind, found: &'static str },

    #[error("{0}")]
    Invalid(String),
}

impl ValueError {
    pub fn mismatch(expected: FieldKind, found: &Value) -> Self {
        ValueError::TypeMismatch {
            expected,
            found: found.type_name(),
        }
    }
}

/// Failure to read or write a named field
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PropertyError {
    #[error("`{type_ref}` has no field `{field}`")]
    UnknownField { type_ref: String, field: String },

    #[error("field `{field}` on `{type_ref}` is read-only")]
    ReadOnly { type_ref: String, field: String },

    #[error("field `{field}` on `{type_ref}`: {source}")]
    Mismatch {
        type_ref: String,
        field: String,
        #[source]
        source: ValueError,
    },
}

/// Rust types that can be read out of a [`Value`]
pub trait FromValue: Sized {
    fn kind() -> FieldKind;
    fn from_value(value: Value) -> Result<Self, ValueError>;
}

/// Rust types that can be written into a [`Value`]
pub trait ToValue {
    fn to_value(&self) -> Value;
}

/// Field kind of a struct field, for use where only the field is in scope
pub fn field_kind_of<T: FromValue>(_: &T) -> FieldKind {
    T::kind()
}

impl FromValue for Value {
    fn kind() -> FieldKind {
        FieldKind::Any
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        Ok(value)
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FromValue for bool {
    fn kind() -> FieldKind {
        FieldKind::Bool
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(ValueError::mismatch(Self::kind(), &other)),
        }
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

macro_rules! impl_integer {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn kind() -> FieldKind {
                    FieldKind::Int
                }

                fn from_value(value: Value) -> Result<Self, ValueError> {
                    match value {
                        Value::Int(n) => <$ty>::try_from(n)
                            .map_err(|_| ValueError::Invalid(format!("{n} is out of range for {}", stringify!($ty)))),
                        other => Err(ValueError::mismatch(Self::kind(), &other)),
                    }
                }
            }

            impl ToValue for $ty {
                fn to_value(&self) -> Value {
                    Value::Int(*self as i64)
                }
            }
        )*
    };
}

impl_integer!(i32, i64, u8, u16, u32);

macro_rules! impl_float {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn kind() -> FieldKind {
                    FieldKind::Float
                }

                fn from_value(value: Value) -> Result<Self, ValueError> {
                    match value {
                        Value::Float(n) => Ok(n as $ty),
                        Value::Int(n) => Ok(n as $ty),
                        other => Err(ValueError::mismatch(Self::kind(), &other)),
                    }
                }
            }

            impl ToValue for $ty {
                fn to_value(&self) -> Value {
                    Value::Float(*self as f64)
                }
            }
        )*
    };
}

impl_float!(f32, f64);

impl FromValue for String {
    fn kind() -> FieldKind {
        FieldKind::String
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(ValueError::mismatch(Self::kind(), &other)),
        }
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn kind() -> FieldKind {
        T::kind()
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(inner) => inner.to_value(),
            None => Value::Null,
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn kind() -> FieldKind {
        FieldKind::list_of(T::kind())
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(ValueError::mismatch(Self::kind(), &other)),
        }
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: FromValue> FromValue for BTreeMap<String, T> {
    fn kind() -> FieldKind {
        FieldKind::map_of(T::kind())
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Map(map) => map
                .into_iter()
                .map(|(k, v)| T::from_value(v).map(|v| (k, v)))
                .collect(),
            other => Err(ValueError::mismatch(Self::kind(), &other)),
        }
    }
}

impl<T: ToValue> ToValue for BTreeMap<String, T> {
    fn to_value(&self) -> Value {
        Value::Map(self.iter().map(|(k, v)| (k.clone(), v.to_value())).collect())
    }
}

impl FromValue for PropertyMap {
    fn kind() -> FieldKind {
        FieldKind::map_of(FieldKind::Any)
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Map(map) => Ok(map),
            Value::Null => Ok(PropertyMap::new()),
            other => Err(ValueError::mismatch(Self::kind(), &other)),
        }
    }
}

impl ToValue for PropertyMap {
    fn to_value(&self) -> Value {
        Value::Map(self.clone())
    }
}

impl FromValue for Reference {
    fn kind() -> FieldKind {
        FieldKind::Reference
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Reference(reference) => Ok(reference),
            other => Err(ValueError::mismatch(Self::kind(), &other)),
        }
    }
}

impl ToValue for Reference {
    fn to_value(&self) -> Value {
        Value::Reference(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_map_keeps_insertion_order() {
        let mut map = PropertyMap::new();
        map.insert("Zeta", Value::Int(1));
        map.insert("Alpha", Value::Int(2));
        map.insert("Zeta", Value::Int(3));

        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["Zeta", "Alpha"]);
        assert_eq!(map.get("Zeta"), Some(&Value::Int(3)));
        assert_eq!(map.remove("Zeta"), Some(Value::Int(3)));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_deep_clone_does_not_alias_containers() {
        let original = Value::List(vec![Value::from("a"), Value::Map(PropertyMap::new())]);
        let mut copy = original.deep_clone(ClonePolicy::Reference);
        if let Value::List(items) = &mut copy {
            items.push(Value::Int(7));
        }
        assert_eq!(original, Value::List(vec![Value::from("a"), Value::Map(PropertyMap::new())]));
        assert_ne!(original, copy);
    }

    #[test]
    fn test_resolve_reports_missing_name() {
        let mut value = Value::List(vec![Value::Reference(Reference::Named("Sword".into()))]);
        let err = value.resolve_references(&|_| None).unwrap_err();
        assert_eq!(err, "Sword");
    }

    #[test]
    fn test_primitive_conversions() {
        assert_eq!(i32::from_value(Value::Int(12)), Ok(12));
        assert!(u8::from_value(Value::Int(300)).is_err());
        assert_eq!(f32::from_value(Value::Int(2)), Ok(2.0));
        assert_eq!(Option::<String>::from_value(Value::Null), Ok(None));
        assert_eq!(
            Vec::<String>::from_value(Value::List(vec![Value::from("x")])),
            Ok(vec!["x".to_string()])
        );
        assert!(matches!(
            bool::from_value(Value::from("yes")),
            Err(ValueError::TypeMismatch { expected: FieldKind::Bool, found: "string" })
        ));
    }

    #[test]
    fn test_field_kinds_describe_nesting() {
        assert_eq!(Vec::<Option<i64>>::kind(), FieldKind::list_of(FieldKind::Int));
        assert_eq!(FieldKind::map_of(FieldKind::Reference).to_string(), "map<definition>");
    }
}
