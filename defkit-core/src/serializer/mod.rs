//! Polymorphic serializer between in-memory values and structured documents
//!
//! Documents are `serde_json` values with insertion-ordered maps. Definitions
//! and objects carry their type in a `$type` key. Values are dispatched to
//! the first registered [`Converter`] that claims their field kind, falling
//! back to a structural converter only when nothing else does.

pub mod converter;

use serde_json::Map;
use tracing::warn;

pub use converter::{Converter, DocumentConverter, ListConverter, MapConverter, ReferenceConverter, ScalarConverter};

use crate::catalog::DefinitionLookup;
use crate::definition::{keys, Definition, InstanceDefinition, KindRegistry, Shape, TYPE_KEY};
use crate::target::{ConstructError, Target, TargetRegistry};
use crate::value::{FieldKind, PropertyError, PropertyMap, Reference, Value};

/// Structured document model
pub type Document = serde_json::Value;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SerializeError {
    #[error("document has no \"$type\" discriminator")]
    MissingTypeTag,

    #[error("definition document has no \"Name\"")]
    MissingName,

    #[error("unknown definition type \"{0}\"")]
    UnknownKind(String),

    #[error("unknown target type \"{0}\"")]
    UnknownTargetType(String),

    #[error("the definition \"{0}\" does not exist")]
    UnknownDefinition(String),

    #[error("expected {expected} but found {found}")]
    Expected { expected: String, found: String },

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Property(#[from] PropertyError),

    #[error(transparent)]
    Construct(#[from] ConstructError),
}

/// Whether named definitions are written as names or expanded inline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    #[default]
    On,
    Off,
}

/// Registries and lookup a conversion runs against
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub kinds: &'a KindRegistry,
    pub targets: &'a TargetRegistry,
    /// Catalog names resolve through. Without one, names stay unresolved.
    pub lookup: Option<&'a dyn DefinitionLookup>,
    pub cache: CacheMode,
}

impl<'a> Context<'a> {
    pub fn new(kinds: &'a KindRegistry, targets: &'a TargetRegistry) -> Self {
        Self {
            kinds,
            targets,
            lookup: None,
            cache: CacheMode::On,
        }
    }

    pub fn with_lookup(mut self, lookup: &'a dyn DefinitionLookup) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_cache(mut self, cache: CacheMode) -> Self {
        self.cache = cache;
        self
    }

    /// Turn a name read from a document into a reference
    pub fn resolve(&self, name: &str) -> Result<Reference, SerializeError> {
        match self.lookup {
            Some(lookup) => lookup
                .lookup(name)
                .map(Reference::Shared)
                .ok_or_else(|| SerializeError::UnknownDefinition(name.to_string())),
            None => Ok(Reference::Named(name.to_string())),
        }
    }
}

/// Result of reading a definition document
#[derive(Debug, Clone)]
pub struct ParsedDefinition {
    pub definition: Definition,
    /// Keys written in the document itself, which inheritance must not touch
    pub explicit_keys: Vec<String>,
    /// Properties that could not be typed yet because the target type is
    /// inherited from a base
    pub pending_properties: Option<Map<String, Document>>,
}

pub(crate) fn document_kind(doc: &Document) -> &'static str {
    match doc {
        Document::Null => "null",
        Document::Bool(_) => "bool",
        Document::Number(_) => "number",
        Document::String(_) => "string",
        Document::Array(_) => "list",
        Document::Object(_) => "map",
    }
}

pub struct Serializer {
    converters: Vec<Box<dyn Converter>>,
    fallback: Box<dyn Converter>,
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer {
    /// Serializer with the built-in scalar, list, map and reference converters
    pub fn new() -> Self {
        let mut serializer = Self::empty();
        serializer.register(ScalarConverter);
        serializer.register(ListConverter);
        serializer.register(MapConverter);
        serializer.register(ReferenceConverter);
        serializer
    }

    /// Serializer with only the structural fallback
    pub fn empty() -> Self {
        Self {
            converters: Vec::new(),
            fallback: Box::new(DocumentConverter),
        }
    }

    /// Append a converter to the chain
    pub fn register<C: Converter + 'static>(&mut self, converter: C) {
        self.converters.push(Box::new(converter));
    }

    pub fn converter_names(&self) -> Vec<&str> {
        self.converters.iter().map(|converter| converter.name()).collect()
    }

    /// First converter claiming `kind`, or the fallback if none does
    pub fn converter_for(&self, kind: &FieldKind) -> &dyn Converter {
        self.converters
            .iter()
            .find(|converter| converter.can_convert(kind))
            .map(|converter| converter.as_ref())
            .unwrap_or(self.fallback.as_ref())
    }

    pub fn write_value(&self, value: &Value, kind: &FieldKind, ctx: &Context<'_>) -> Result<Document, SerializeError> {
        self.converter_for(kind).write(value, kind, self, ctx)
    }

    pub fn read_value(&self, doc: &Document, kind: &FieldKind, ctx: &Context<'_>) -> Result<Value, SerializeError> {
        self.converter_for(kind).read(doc, kind, self, ctx)
    }

    /// Write a definition as a document
    ///
    /// Fields equal to the schema default are left out, except `Name`.
    /// Nested definitions follow the context's cache mode.
    pub fn write_definition(&self, definition: &Definition, ctx: &Context<'_>) -> Result<Document, SerializeError> {
        let schema = ctx
            .kinds
            .get(definition.kind())
            .ok_or_else(|| SerializeError::UnknownKind(definition.kind().to_string()))?;

        let mut map = Map::new();
        map.insert(TYPE_KEY.to_string(), Document::String(schema.id().to_string()));
        for spec in schema.descriptor() {
            let Some(value) = definition.field(&spec.name) else {
                continue;
            };
            if spec.name != keys::NAME && value == spec.default {
                continue;
            }
            let doc = match (spec.name.as_str(), definition.as_instance()) {
                (keys::PROPERTIES, Some(instance)) => self.write_properties(instance, ctx)?,
                _ => self.write_value(&value, &spec.kind, ctx)?,
            };
            map.insert(spec.name.clone(), doc);
        }
        Ok(Document::Object(map))
    }

    /// Read a definition document
    ///
    /// Unknown fields are logged and ignored. Properties are typed against the
    /// target type when the document names one; otherwise they are returned
    /// as [`ParsedDefinition::pending_properties`].
    pub fn read_definition(&self, doc: &Document, ctx: &Context<'_>) -> Result<ParsedDefinition, SerializeError> {
        let Document::Object(map) = doc else {
            return Err(SerializeError::Expected {
                expected: "definition".to_string(),
                found: document_kind(doc).to_string(),
            });
        };
        let kind = map
            .get(TYPE_KEY)
            .and_then(Document::as_str)
            .ok_or(SerializeError::MissingTypeTag)?;
        let schema = ctx
            .kinds
            .get(kind)
            .ok_or_else(|| SerializeError::UnknownKind(kind.to_string()))?;
        let name = map
            .get(keys::NAME)
            .and_then(Document::as_str)
            .filter(|name| !name.is_empty())
            .ok_or(SerializeError::MissingName)?;

        let mut definition = schema.blank(name);
        let mut explicit_keys = Vec::new();
        let mut raw_properties = None;

        for (key, item) in map {
            if key == TYPE_KEY {
                continue;
            }
            if key == keys::PROPERTIES && schema.shape() != Shape::Custom {
                explicit_keys.push(key.clone());
                raw_properties = Some(item);
                continue;
            }
            let Some(spec) = schema.descriptor_field(key) else {
                warn!(definition = %name, field = %key, "unknown definition field, ignoring");
                continue;
            };
            explicit_keys.push(key.clone());
            let value = self.read_value(item, &spec.kind, ctx)?;
            definition.set_field(key, value)?;
        }

        let mut pending_properties = None;
        if let Some(raw) = raw_properties {
            let raw = match raw {
                Document::Object(raw) => raw,
                Document::Null => return Ok(ParsedDefinition { definition, explicit_keys, pending_properties }),
                other => {
                    return Err(SerializeError::Expected {
                        expected: "properties map".to_string(),
                        found: document_kind(other).to_string(),
                    })
                }
            };
            match definition.target_type().map(str::to_string) {
                Some(target) => {
                    let properties = self.read_properties(raw, &target, ctx)?;
                    definition.set_field(keys::PROPERTIES, Value::Map(properties))?;
                }
                None => pending_properties = Some(raw.clone()),
            }
        }

        Ok(ParsedDefinition {
            definition,
            explicit_keys,
            pending_properties,
        })
    }

    /// Type a raw property map against the fields of `target`
    ///
    /// Properties the target does not have, or whose value does not fit the
    /// field, are logged and skipped. A reference to a definition missing from
    /// the attached catalog is still an error.
    pub fn read_properties(&self, raw: &Map<String, Document>, target: &str, ctx: &Context<'_>) -> Result<PropertyMap, SerializeError> {
        let descriptor = ctx
            .targets
            .get(target)
            .ok_or_else(|| SerializeError::UnknownTargetType(target.to_string()))?;

        let mut properties = PropertyMap::new();
        for (key, item) in raw {
            let Some(field) = descriptor.field(key) else {
                warn!(target_type = target, property = %key, "target type has no such field, skipping property");
                continue;
            };
            if !field.writable {
                warn!(target_type = target, property = %key, "field is read-only, skipping property");
                continue;
            }
            match self.read_value(item, &field.kind, ctx) {
                Ok(value) => {
                    properties.insert(key.clone(), value);
                }
                Err(err @ SerializeError::UnknownDefinition(_)) => return Err(err),
                Err(err) => warn!(target_type = target, property = %key, error = %err, "property does not fit its field, skipping"),
            }
        }
        Ok(properties)
    }

    /// Read properties structurally, for definitions without a target type
    pub fn read_untyped_properties(&self, raw: &Map<String, Document>, ctx: &Context<'_>) -> Result<PropertyMap, SerializeError> {
        let mut properties = PropertyMap::new();
        for (key, item) in raw {
            properties.insert(key.clone(), self.read_value(item, &FieldKind::Any, ctx)?);
        }
        Ok(properties)
    }

    fn write_properties(&self, instance: &InstanceDefinition, ctx: &Context<'_>) -> Result<Document, SerializeError> {
        let descriptor = instance.target_type.as_deref().and_then(|target| ctx.targets.get(target));
        let mut map = Map::new();
        for (key, value) in instance.properties.iter() {
            let kind = descriptor
                .and_then(|descriptor| descriptor.field(key))
                .map(|field| field.kind.clone())
                .unwrap_or(FieldKind::Any);
            map.insert(key.to_string(), self.write_value(value, &kind, ctx)?);
        }
        Ok(Document::Object(map))
    }

    /// Write a live object, skipping fields that match its type's default
    /// instance and fields that are not writable
    pub fn write_object(&self, object: &dyn Target, ctx: &Context<'_>) -> Result<Document, SerializeError> {
        let descriptor = ctx
            .targets
            .get(object.type_ref())
            .ok_or_else(|| SerializeError::UnknownTargetType(object.type_ref().to_string()))?;
        let defaults = descriptor.default_instance();

        let mut map = Map::new();
        map.insert(TYPE_KEY.to_string(), Document::String(object.type_ref().to_string()));
        for field in object.fields() {
            if !field.writable {
                continue;
            }
            let Some(value) = object.get(field.name) else {
                continue;
            };
            if defaults.and_then(|default| default.get(field.name)).as_ref() == Some(&value) {
                continue;
            }
            map.insert(field.name.to_string(), self.write_value(&value, &field.kind, ctx)?);
        }
        Ok(Document::Object(map))
    }

    /// Build a live object from a document carrying `$type`
    pub fn read_object(&self, doc: &Document, args: &[Value], ctx: &Context<'_>) -> Result<Box<dyn Target>, SerializeError> {
        let Document::Object(map) = doc else {
            return Err(SerializeError::Expected {
                expected: "object".to_string(),
                found: document_kind(doc).to_string(),
            });
        };
        let type_ref = map
            .get(TYPE_KEY)
            .and_then(Document::as_str)
            .ok_or(SerializeError::MissingTypeTag)?;
        let descriptor = ctx
            .targets
            .get(type_ref)
            .ok_or_else(|| SerializeError::UnknownTargetType(type_ref.to_string()))?;

        let mut object = descriptor.construct(args)?;
        for (key, item) in map {
            if key == TYPE_KEY {
                continue;
            }
            let Some(field) = descriptor.field(key) else {
                warn!(type_ref, field = %key, "unknown field, ignoring");
                continue;
            };
            let value = self.read_value(item, &field.kind, ctx)?;
            if let Err(err) = object.set(key, value) {
                warn!(type_ref, field = %key, error = %err, "field not applied");
            }
        }
        Ok(object)
    }

    /// Copy a definition by writing it out and reading it back
    ///
    /// Nested definitions follow the context's cache mode, so with cache mode
    /// on they come back shared from the attached catalog.
    pub fn duplicate(&self, definition: &Definition, ctx: &Context<'_>) -> Result<Definition, SerializeError> {
        let doc = self.write_definition(definition, ctx)?;
        let mut copy = self.read_definition(&doc, ctx)?.definition;
        copy.core_mut().owner = definition.core().owner.clone();
        Ok(copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::definition::KindSchema;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct Crate {
        label: String,
        weight: f64,
        contents: Vec<Reference>,
        sealed: bool,
    }

    impl Default for Crate {
        fn default() -> Self {
            Self {
                label: String::new(),
                weight: 1.0,
                contents: Vec::new(),
                sealed: false,
            }
        }
    }

    crate::impl_target!(Crate as "Crate" {
        label => "Label",
        weight => "Weight",
        contents => "Contents",
        sealed => "Sealed",
    });

    struct Fixture {
        kinds: KindRegistry,
        targets: TargetRegistry,
        catalog: Catalog,
        serializer: Serializer,
    }

    impl Fixture {
        fn new() -> Self {
            let mut targets = TargetRegistry::new();
            targets.register::<Crate>();
            let mut catalog = Catalog::new();
            let mut apple = KindSchema::instance().blank("Apple");
            apple.set_field(keys::TARGET_TYPE, Value::from("Crate")).unwrap();
            catalog.commit(apple).unwrap();
            Self {
                kinds: KindRegistry::new(),
                targets,
                catalog,
                serializer: Serializer::new(),
            }
        }

        fn ctx(&self) -> Context<'_> {
            Context::new(&self.kinds, &self.targets).with_lookup(&self.catalog)
        }
    }

    #[test]
    fn test_cache_mode_writes_bare_name() {
        let fixture = Fixture::new();
        let apple = Value::Reference(Reference::Shared(Arc::clone(fixture.catalog.get("Apple").unwrap())));

        let cached = fixture
            .serializer
            .write_value(&apple, &FieldKind::Reference, &fixture.ctx())
            .unwrap();
        assert_eq!(cached, json!("Apple"));

        let expanded = fixture
            .serializer
            .write_value(&apple, &FieldKind::Reference, &fixture.ctx().with_cache(CacheMode::Off))
            .unwrap();
        assert_eq!(
            expanded,
            json!({"$type": "InstanceDefinition", "Name": "Apple", "TargetType": "Crate"})
        );
    }

    #[test]
    fn test_cache_mode_reads_from_catalog() {
        let fixture = Fixture::new();
        let value = fixture
            .serializer
            .read_value(&json!("Apple"), &FieldKind::Reference, &fixture.ctx())
            .unwrap();
        let Value::Reference(reference) = value else {
            panic!("expected a reference");
        };
        assert!(Arc::ptr_eq(reference.definition().unwrap(), fixture.catalog.get("Apple").unwrap()));

        let err = fixture
            .serializer
            .read_value(&json!("Pear"), &FieldKind::Reference, &fixture.ctx())
            .unwrap_err();
        assert_eq!(err, SerializeError::UnknownDefinition("Pear".into()));
    }

    #[test]
    fn test_expanded_reference_reads_back_inline() {
        let fixture = Fixture::new();
        let doc = json!({"$type": "InstanceDefinition", "Name": "Loose", "TargetType": "Crate"});
        let value = fixture
            .serializer
            .read_value(&doc, &FieldKind::Reference, &fixture.ctx())
            .unwrap();
        let Value::Reference(reference) = value else {
            panic!("expected a reference");
        };
        assert_eq!(reference.name(), "Loose");
        assert!(!fixture.catalog.contains("Loose"));
    }

    #[test]
    fn test_inline_reference_keeps_properties_through_base() {
        let fixture = Fixture::new();
        let doc = json!({"$type": "InstanceDefinition", "Name": "Loose", "Base": "Apple", "Properties": {"Weight": 2}});

        let properties = |ctx: &Context<'_>| {
            let value = fixture.serializer.read_value(&doc, &FieldKind::Reference, ctx).unwrap();
            let Value::Reference(reference) = value else {
                panic!("expected a reference");
            };
            let definition = reference.definition().unwrap();
            definition.as_instance().unwrap().properties.clone()
        };

        // base resolves, so the target's field kinds apply
        assert_eq!(properties(&fixture.ctx()).get("Weight"), Some(&Value::Float(2.0)));
        // no lookup, so the value is read as plain data
        let untyped = properties(&Context::new(&fixture.kinds, &fixture.targets));
        assert_eq!(untyped.get("Weight"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_read_definition_types_properties() {
        let fixture = Fixture::new();
        let doc = json!({
            "$type": "InstanceDefinition",
            "Name": "Pantry",
            "TargetType": "Crate",
            "Properties": {
                "Label": "pantry",
                "Weight": 3,
                "Contents": ["Apple"],
                "Colour": "red",
                "Sealed": "nope"
            },
            "Unknown": 1
        });
        let parsed = fixture.serializer.read_definition(&doc, &Context::new(&fixture.kinds, &fixture.targets)).unwrap();
        let instance = parsed.definition.as_instance().unwrap();

        assert_eq!(instance.properties.keys().collect::<Vec<_>>(), vec!["Label", "Weight", "Contents"]);
        assert_eq!(instance.properties.get("Weight"), Some(&Value::Float(3.0)));
        assert_eq!(
            instance.properties.get("Contents"),
            Some(&Value::List(vec![Value::Reference(Reference::Named("Apple".into()))]))
        );
        assert_eq!(parsed.explicit_keys, vec!["Name", "TargetType", "Properties"]);
        assert!(parsed.pending_properties.is_none());
    }

    #[test]
    fn test_read_definition_defers_properties_without_target() {
        let fixture = Fixture::new();
        let doc = json!({"$type": "InstanceDefinition", "Name": "Child", "Base": "Apple", "Properties": {"Weight": 2}});
        let parsed = fixture.serializer.read_definition(&doc, &fixture.ctx()).unwrap();
        assert_eq!(parsed.pending_properties, Some(json!({"Weight": 2}).as_object().unwrap().clone()));
        assert_eq!(parsed.definition.base(), Some("Apple"));
    }

    #[test]
    fn test_read_definition_rejects_unknown_types() {
        let fixture = Fixture::new();
        let ctx = fixture.ctx();
        assert_eq!(
            fixture.serializer.read_definition(&json!({"Name": "x"}), &ctx).unwrap_err(),
            SerializeError::MissingTypeTag
        );
        assert_eq!(
            fixture
                .serializer
                .read_definition(&json!({"$type": "Nope", "Name": "x"}), &ctx)
                .unwrap_err(),
            SerializeError::UnknownKind("Nope".into())
        );
        assert_eq!(
            fixture
                .serializer
                .read_definition(
                    &json!({"$type": "InstanceDefinition", "Name": "x", "TargetType": "Ghost", "Properties": {}}),
                    &ctx
                )
                .unwrap_err(),
            SerializeError::UnknownTargetType("Ghost".into())
        );
    }

    #[test]
    fn test_definition_round_trip_skips_defaults() {
        let fixture = Fixture::new();
        let doc = json!({
            "$type": "InstanceDefinition",
            "Name": "Pantry",
            "TargetType": "Crate",
            "Properties": {"Contents": ["Apple"]}
        });
        let parsed = fixture.serializer.read_definition(&doc, &fixture.ctx()).unwrap();
        let written = fixture.serializer.write_definition(&parsed.definition, &fixture.ctx()).unwrap();
        assert_eq!(written, doc);
    }

    #[test]
    fn test_duplicate_copies_containers_and_shares_references() {
        let fixture = Fixture::new();
        let doc = json!({
            "$type": "InstanceDefinition",
            "Name": "Pantry",
            "TargetType": "Crate",
            "Properties": {"Contents": ["Apple"], "Label": "shelf"}
        });
        let original = fixture.serializer.read_definition(&doc, &fixture.ctx()).unwrap().definition;
        let copy = fixture.serializer.duplicate(&original, &fixture.ctx()).unwrap();

        assert_eq!(copy, original);
        let contents = |definition: &Definition| match definition.as_instance().unwrap().properties.get("Contents") {
            Some(Value::List(items)) => match &items[0] {
                Value::Reference(reference) => Arc::clone(reference.definition().unwrap()),
                _ => panic!("expected a reference"),
            },
            _ => panic!("expected a list"),
        };
        assert!(Arc::ptr_eq(&contents(&copy), &contents(&original)));
    }

    #[test]
    fn test_write_object_diffs_against_default() {
        let fixture = Fixture::new();
        let object = Crate {
            label: "spare".into(),
            weight: 1.0,
            contents: vec![Reference::Shared(Arc::clone(fixture.catalog.get("Apple").unwrap()))],
            sealed: false,
        };
        let doc = fixture.serializer.write_object(&object, &fixture.ctx()).unwrap();
        assert_eq!(doc, json!({"$type": "Crate", "Label": "spare", "Contents": ["Apple"]}));

        let back = fixture.serializer.read_object(&doc, &[], &fixture.ctx()).unwrap();
        let back = back.into_any().downcast::<Crate>().unwrap();
        assert_eq!(*back, object);
    }

    #[test]
    fn test_specialized_converter_wins_over_fallback() {
        struct Shouting;

        impl Converter for Shouting {
            fn name(&self) -> &str {
                "shouting"
            }

            fn can_convert(&self, kind: &FieldKind) -> bool {
                *kind == FieldKind::leaf("Shout")
            }

            fn write(&self, value: &Value, _: &FieldKind, _: &Serializer, _: &Context<'_>) -> Result<Document, SerializeError> {
                Ok(Document::String(value.as_str().unwrap_or_default().to_uppercase()))
            }

            fn read(&self, doc: &Document, _: &FieldKind, _: &Serializer, _: &Context<'_>) -> Result<Value, SerializeError> {
                Ok(Value::from(doc.as_str().unwrap_or_default().to_lowercase()))
            }
        }

        let fixture = Fixture::new();
        let mut serializer = Serializer::new();
        assert_eq!(serializer.converter_for(&FieldKind::leaf("Shout")).name(), "document");
        serializer.register(Shouting);
        assert_eq!(serializer.converter_for(&FieldKind::leaf("Shout")).name(), "shouting");
        assert_eq!(serializer.converter_for(&FieldKind::Int).name(), "scalar");

        let doc = serializer
            .write_value(&Value::from("hey"), &FieldKind::leaf("Shout"), &fixture.ctx())
            .unwrap();
        assert_eq!(doc, json!("HEY"));
    }
}
