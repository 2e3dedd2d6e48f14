//! Target types: the live objects instance definitions produce
//!
//! A target exposes its fields by name so properties can be applied without
//! runtime reflection. Most types get their impl from [`impl_target!`]; the
//! [`TargetRegistry`] maps type names to constructors and field lists.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::value::{FieldKind, PropertyError, Value};

/// Name a target type is registered under, e.g. `"Character"`
pub type TypeRef = String;

/// Description of a single field on a target type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: &'static str,
    pub kind: FieldKind,
    pub writable: bool,
}

impl FieldInfo {
    pub fn writable(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind, writable: true }
    }

    pub fn read_only(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind, writable: false }
    }
}

/// Object that can be produced from an instance definition
pub trait Target: Any + Send + Sync + fmt::Debug {
    /// Registered type name of this object
    fn type_ref(&self) -> &str;

    fn fields(&self) -> Vec<FieldInfo>;

    fn get(&self, field: &str) -> Option<Value>;

    fn set(&mut self, field: &str, value: Value) -> Result<(), PropertyError>;

    /// Called with the definition name after construction. Types with a
    /// `Definition` field receive it there.
    fn set_definition(&mut self, name: &str) {
        if let Err(err) = self.set("Definition", Value::String(name.to_string())) {
            debug!(type_ref = self.type_ref(), error = %err, "definition name not stored");
        }
    }

    /// Called by template definitions to name the produced object
    fn set_name(&mut self, name: &str) {
        if let Err(err) = self.set("Name", Value::String(name.to_string())) {
            debug!(type_ref = self.type_ref(), error = %err, "object name not stored");
        }
    }

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

/// Static type information for typed queries and downcasts
pub trait TargetType: Target + Sized {
    const TYPE_REF: &'static str;

    /// Direct parent type names this type is assignable to
    fn extends() -> &'static [&'static str] {
        &[]
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConstructError {
    #[error("invalid constructor arguments for `{type_ref}`: {reason}")]
    InvalidArguments { type_ref: String, reason: String },

    #[error("`{0}` cannot be constructed directly")]
    NotConstructible(String),
}

/// Constructor taking the caller-supplied instantiation arguments
pub type Constructor = fn(&[Value]) -> Result<Box<dyn Target>, ConstructError>;

/// Registered target type
pub struct TargetDescriptor {
    type_ref: TypeRef,
    extends: Vec<TypeRef>,
    fields: Vec<FieldInfo>,
    constructor: Constructor,
    default_instance: OnceCell<Option<Box<dyn Target>>>,
}

impl TargetDescriptor {
    pub fn type_ref(&self) -> &str {
        &self.type_ref
    }

    pub fn extends(&self) -> &[TypeRef] {
        &self.extends
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn construct(&self, args: &[Value]) -> Result<Box<dyn Target>, ConstructError> {
        (self.constructor)(args)
    }

    /// Instance built with no arguments, created on first use
    ///
    /// Used to diff serialized objects against their defaults. `None` when
    /// the type cannot be built without arguments.
    pub fn default_instance(&self) -> Option<&dyn Target> {
        self.default_instance
            .get_or_init(|| match (self.constructor)(&[]) {
                Ok(instance) => Some(instance),
                Err(err) => {
                    warn!(type_ref = %self.type_ref, error = %err, "no default instance, serializing every field");
                    None
                }
            })
            .as_deref()
    }
}

impl fmt::Debug for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetDescriptor")
            .field("type_ref", &self.type_ref)
            .field("extends", &self.extends)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Lookup table of target types by name
#[derive(Debug, Default)]
pub struct TargetRegistry {
    descriptors: HashMap<TypeRef, TargetDescriptor>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T`, constructed through its `Default` impl
    pub fn register<T: TargetType + Default>(&mut self) {
        fn construct<T: TargetType + Default>(_: &[Value]) -> Result<Box<dyn Target>, ConstructError> {
            Ok(Box::new(T::default()))
        }
        self.register_with::<T>(construct::<T>, T::default().fields());
    }

    /// Register `T` with a custom constructor and its field list
    pub fn register_with<T: TargetType>(&mut self, constructor: Constructor, fields: Vec<FieldInfo>) {
        if self.descriptors.contains_key(T::TYPE_REF) {
            warn!(type_ref = T::TYPE_REF, "overriding existing target registration");
        }
        self.descriptors.insert(
            T::TYPE_REF.to_string(),
            TargetDescriptor {
                type_ref: T::TYPE_REF.to_string(),
                extends: T::extends().iter().map(|parent| parent.to_string()).collect(),
                fields,
                constructor,
                default_instance: OnceCell::new(),
            },
        );
    }

    pub fn get(&self, type_ref: &str) -> Option<&TargetDescriptor> {
        self.descriptors.get(type_ref)
    }

    pub fn contains(&self, type_ref: &str) -> bool {
        self.descriptors.contains_key(type_ref)
    }

    pub fn type_refs(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.descriptors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Whether objects of type `from` can be used where `to` is expected
    ///
    /// Follows `extends` chains through registered descriptors. Parents that
    /// are not registered still count, they just end the chain.
    pub fn is_assignable(&self, from: &str, to: &str) -> bool {
        let mut pending = vec![from];
        let mut seen = Vec::new();
        while let Some(current) = pending.pop() {
            if current == to {
                return true;
            }
            if seen.contains(&current) {
                continue;
            }
            seen.push(current);
            if let Some(descriptor) = self.descriptors.get(current) {
                pending.extend(descriptor.extends.iter().map(String::as_str));
            }
        }
        false
    }
}

/// Implement [`Target`] and [`TargetType`] for a struct with named fields
///
/// Every listed field becomes a writable property under the given key. Field
/// types must implement [`FromValue`](crate::value::FromValue) and
/// [`ToValue`](crate::value::ToValue).
///
/// # Example
///
/// ```rust
/// use defkit_core::impl_target;
///
/// #[derive(Debug, Default)]
/// struct Torch {
///     definition: Option<String>,
///     radius: f64,
/// }
///
/// impl_target!(Torch as "Torch" extends ["Light"] {
///     definition => "Definition",
///     radius => "Radius",
/// });
/// ```
#[macro_export]
macro_rules! impl_target {
    (
        $ty:ty as $type_ref:literal
        $(extends [$($parent:literal),* $(,)?])?
        { $($field:ident => $key:literal),* $(,)? }
    ) => {
        impl $crate::target::Target for $ty {
            fn type_ref(&self) -> &str {
                $type_ref
            }

            fn fields(&self) -> ::std::vec::Vec<$crate::target::FieldInfo> {
                ::std::vec![
                    $($crate::target::FieldInfo::writable($key, $crate::value::field_kind_of(&self.$field)),)*
                ]
            }

            fn get(&self, field: &str) -> ::std::option::Option<$crate::value::Value> {
                match field {
                    $($key => ::std::option::Option::Some($crate::value::ToValue::to_value(&self.$field)),)*
                    _ => ::std::option::Option::None,
                }
            }

            fn set(
                &mut self,
                field: &str,
                value: $crate::value::Value,
            ) -> ::std::result::Result<(), $crate::value::PropertyError> {
                match field {
                    $(
                        $key => {
                            self.$field = $crate::value::FromValue::from_value(value).map_err(|source| {
                                $crate::value::PropertyError::Mismatch {
                                    type_ref: $type_ref.to_string(),
                                    field: field.to_string(),
                                    source,
                                }
                            })?;
                            ::std::result::Result::Ok(())
                        }
                    )*
                    _ => ::std::result::Result::Err($crate::value::PropertyError::UnknownField {
                        type_ref: $type_ref.to_string(),
                        field: field.to_string(),
                    }),
                }
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn into_any(self: ::std::boxed::Box<Self>) -> ::std::boxed::Box<dyn ::std::any::Any> {
                self
            }
        }

        impl $crate::target::TargetType for $ty {
            const TYPE_REF: &'static str = $type_ref;

            fn extends() -> &'static [&'static str] {
                &[$($($parent),*)?]
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueError;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Lamp {
        definition: Option<String>,
        brightness: f64,
        tags: Vec<String>,
    }

    crate::impl_target!(Lamp as "Lamp" extends ["Light"] {
        definition => "Definition",
        brightness => "Brightness",
        tags => "Tags",
    });

    #[derive(Debug, Default)]
    struct Light;

    crate::impl_target!(Light as "Light" extends ["Node"] {});

    #[test]
    fn test_macro_exposes_fields() {
        let mut lamp = Lamp::default();
        assert_eq!(lamp.type_ref(), "Lamp");
        assert_eq!(
            lamp.fields(),
            vec![
                FieldInfo::writable("Definition", FieldKind::String),
                FieldInfo::writable("Brightness", FieldKind::Float),
                FieldInfo::writable("Tags", FieldKind::list_of(FieldKind::String)),
            ]
        );

        lamp.set("Brightness", Value::Float(0.5)).unwrap();
        lamp.set_definition("DeskLamp");
        assert_eq!(lamp.get("Brightness"), Some(Value::Float(0.5)));
        assert_eq!(lamp.definition.as_deref(), Some("DeskLamp"));
    }

    #[test]
    fn test_naming_hooks_skip_missing_fields() {
        let mut light = Light;
        light.set_definition("Porch");
        light.set_name("Porch");
        assert_eq!(light.get("Definition"), None);
        assert_eq!(light.get("Name"), None);

        let mut lamp = Lamp::default();
        lamp.set_name("DeskLamp");
        assert_eq!(lamp, Lamp::default());
    }

    #[test]
    fn test_set_reports_unknown_and_mismatched_fields() {
        let mut lamp = Lamp::default();
        assert_eq!(
            lamp.set("Color", Value::Null),
            Err(PropertyError::UnknownField {
                type_ref: "Lamp".into(),
                field: "Color".into()
            })
        );
        let err = lamp.set("Tags", Value::Int(3)).unwrap_err();
        assert!(matches!(
            err,
            PropertyError::Mismatch { source: ValueError::TypeMismatch { found: "int", .. }, .. }
        ));
        assert!(lamp.tags.is_empty());
    }

    #[test]
    fn test_registry_constructs_and_downcasts() {
        let mut registry = TargetRegistry::new();
        registry.register::<Lamp>();

        let descriptor = registry.get("Lamp").unwrap();
        assert_eq!(descriptor.field("Tags").map(|f| f.writable), Some(true));
        let object = descriptor.construct(&[]).unwrap();
        let lamp = object.into_any().downcast::<Lamp>().unwrap();
        assert_eq!(*lamp, Lamp::default());
        assert!(descriptor.default_instance().is_some());
    }

    #[test]
    fn test_assignability_follows_extends() {
        let mut registry = TargetRegistry::new();
        registry.register::<Lamp>();
        registry.register::<Light>();

        assert!(registry.is_assignable("Lamp", "Lamp"));
        assert!(registry.is_assignable("Lamp", "Light"));
        assert!(registry.is_assignable("Lamp", "Node"));
        assert!(!registry.is_assignable("Light", "Lamp"));
        assert!(!registry.is_assignable("Unknown", "Light"));
    }
}
