//! Definition model
//!
//! A definition is a named data template. Three shapes exist:
//! - [`CustomDefinition`]: plain data described entirely by its kind schema
//! - [`InstanceDefinition`]: adds a target type and a property bag applied to
//!   new objects of that type
//! - [`TemplateDefinition`]: an instance definition that may also name a
//!   prefab and a behavior to compose
//!
//! Each `$type` is described by a [`KindSchema`], whose descriptor lists every
//! field with its default. The serializer diffs against those defaults and
//! inheritance copies fields by walking the base's descriptor.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::target::TypeRef;
use crate::value::{ClonePolicy, FieldKind, FromValue, PropertyError, PropertyMap, Reference, Value, ValueError};

/// Document key carrying the type discriminator
pub const TYPE_KEY: &str = "$type";

/// Field names shared by every definition document
pub mod keys {
    pub const NAME: &str = "Name";
    pub const BASE: &str = "Base";
    pub const ABSTRACT: &str = "Abstract";
    pub const TARGET_TYPE: &str = "TargetType";
    pub const PROPERTIES: &str = "Properties";
    pub const PREFAB: &str = "Prefab";
    pub const BEHAVIOR: &str = "Behavior";
}

/// Kind id of the built-in instance definition
pub const INSTANCE_KIND: &str = "InstanceDefinition";
/// Kind id of the built-in template definition
pub const TEMPLATE_KIND: &str = "TemplateDefinition";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Custom,
    Instance,
    Template,
}

impl Shape {
    pub fn is_instance(self) -> bool {
        matches!(self, Shape::Instance | Shape::Template)
    }
}

/// A field of a kind schema together with its default value
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub default: Value,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind, default: Value) -> Self {
        Self {
            name: name.into(),
            kind,
            default,
        }
    }
}

/// Schema for one definition `$type`
#[derive(Debug, Clone, PartialEq)]
pub struct KindSchema {
    id: String,
    shape: Shape,
    fields: Vec<FieldSpec>,
}

impl KindSchema {
    pub fn new(id: impl Into<String>, shape: Shape) -> Self {
        Self {
            id: id.into(),
            shape,
            fields: Vec::new(),
        }
    }

    /// Built-in schema for plain instance definitions
    pub fn instance() -> Self {
        Self::new(INSTANCE_KIND, Shape::Instance)
    }

    /// Built-in schema for template definitions
    pub fn template() -> Self {
        Self::new(TEMPLATE_KIND, Shape::Template)
    }

    /// Add a kind-specific field
    pub fn with_field(mut self, name: impl Into<String>, kind: FieldKind, default: Value) -> Self {
        self.fields.push(FieldSpec::new(name, kind, default));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Every field a definition of this kind carries, shared fields first
    pub fn descriptor(&self) -> Vec<FieldSpec> {
        let mut fields = vec![
            FieldSpec::new(keys::NAME, FieldKind::String, Value::String(String::new())),
            FieldSpec::new(keys::BASE, FieldKind::String, Value::Null),
            FieldSpec::new(keys::ABSTRACT, FieldKind::Bool, Value::Bool(false)),
        ];
        if self.shape.is_instance() {
            fields.push(FieldSpec::new(keys::TARGET_TYPE, FieldKind::String, Value::Null));
            fields.push(FieldSpec::new(
                keys::PROPERTIES,
                FieldKind::map_of(FieldKind::Any),
                Value::Map(PropertyMap::new()),
            ));
        }
        if self.shape == Shape::Template {
            fields.push(FieldSpec::new(keys::PREFAB, FieldKind::String, Value::Null));
            fields.push(FieldSpec::new(keys::BEHAVIOR, FieldKind::String, Value::Null));
        }
        fields.extend(self.fields.iter().cloned());
        fields
    }

    pub fn descriptor_field(&self, name: &str) -> Option<FieldSpec> {
        self.descriptor().into_iter().find(|spec| spec.name == name)
    }

    /// Definition of this kind with every field at its default
    pub fn blank(&self, name: impl Into<String>) -> Definition {
        let core = DefinitionCore {
            kind: self.id.clone(),
            name: name.into(),
            base: None,
            is_abstract: false,
            owner: None,
            fields: self
                .fields
                .iter()
                .map(|spec| (spec.name.clone(), spec.default.clone()))
                .collect(),
        };
        let instance = |core| InstanceDefinition {
            core,
            target_type: None,
            properties: PropertyMap::new(),
        };
        match self.shape {
            Shape::Custom => Definition::Custom(CustomDefinition { core }),
            Shape::Instance => Definition::Instance(instance(core)),
            Shape::Template => Definition::Template(TemplateDefinition {
                instance: instance(core),
                prefab: None,
                behavior: None,
            }),
        }
    }
}

/// Registered definition kinds, keyed by `$type`
#[derive(Debug, Clone)]
pub struct KindRegistry {
    kinds: HashMap<String, KindSchema>,
}

impl Default for KindRegistry {
    fn default() -> Self {
        let mut registry = Self { kinds: HashMap::new() };
        registry.register(KindSchema::instance());
        registry.register(KindSchema::template());
        registry
    }
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: KindSchema) {
        self.kinds.insert(schema.id.clone(), schema);
    }

    pub fn get(&self, id: &str) -> Option<&KindSchema> {
        self.kinds.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.kinds.contains_key(id)
    }
}

/// Fields every definition carries
#[derive(Debug, Clone, PartialEq)]
pub struct DefinitionCore {
    pub kind: String,
    pub name: String,
    pub base: Option<String>,
    pub is_abstract: bool,
    /// Id of the package that loaded this definition. Never serialized.
    pub owner: Option<String>,
    /// Kind-specific fields declared by the schema
    pub fields: PropertyMap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceDefinition {
    pub core: DefinitionCore,
    pub target_type: Option<TypeRef>,
    pub properties: PropertyMap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDefinition {
    pub instance: InstanceDefinition,
    pub prefab: Option<String>,
    pub behavior: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomDefinition {
    pub core: DefinitionCore,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    Instance(InstanceDefinition),
    Template(TemplateDefinition),
    Custom(CustomDefinition),
}

impl Definition {
    pub fn core(&self) -> &DefinitionCore {
        match self {
            Definition::Instance(instance) => &instance.core,
            Definition::Template(template) => &template.instance.core,
            Definition::Custom(custom) => &custom.core,
        }
    }

    pub fn core_mut(&mut self) -> &mut DefinitionCore {
        match self {
            Definition::Instance(instance) => &mut instance.core,
            Definition::Template(template) => &mut template.instance.core,
            Definition::Custom(custom) => &mut custom.core,
        }
    }

    pub fn name(&self) -> &str {
        &self.core().name
    }

    pub fn kind(&self) -> &str {
        &self.core().kind
    }

    pub fn base(&self) -> Option<&str> {
        self.core().base.as_deref()
    }

    pub fn is_abstract(&self) -> bool {
        self.core().is_abstract
    }

    pub fn owner(&self) -> Option<&str> {
        self.core().owner.as_deref()
    }

    pub fn shape(&self) -> Shape {
        match self {
            Definition::Instance(_) => Shape::Instance,
            Definition::Template(_) => Shape::Template,
            Definition::Custom(_) => Shape::Custom,
        }
    }

    /// Instance part of instance and template definitions
    pub fn as_instance(&self) -> Option<&InstanceDefinition> {
        match self {
            Definition::Instance(instance) => Some(instance),
            Definition::Template(template) => Some(&template.instance),
            Definition::Custom(_) => None,
        }
    }

    pub fn as_instance_mut(&mut self) -> Option<&mut InstanceDefinition> {
        match self {
            Definition::Instance(instance) => Some(instance),
            Definition::Template(template) => Some(&mut template.instance),
            Definition::Custom(_) => None,
        }
    }

    pub fn as_template(&self) -> Option<&TemplateDefinition> {
        match self {
            Definition::Template(template) => Some(template),
            _ => None,
        }
    }

    pub fn target_type(&self) -> Option<&str> {
        self.as_instance().and_then(|instance| instance.target_type.as_deref())
    }

    /// Read a descriptor field by document name
    pub fn field(&self, name: &str) -> Option<Value> {
        let core = self.core();
        let optional = |value: &Option<String>| value.clone().map(Value::String).unwrap_or(Value::Null);
        match (name, self) {
            (keys::NAME, _) => Some(Value::String(core.name.clone())),
            (keys::BASE, _) => Some(optional(&core.base)),
            (keys::ABSTRACT, _) => Some(Value::Bool(core.is_abstract)),
            (keys::TARGET_TYPE, Definition::Instance(_) | Definition::Template(_)) => {
                self.as_instance().map(|instance| optional(&instance.target_type))
            }
            (keys::PROPERTIES, Definition::Instance(_) | Definition::Template(_)) => {
                self.as_instance().map(|instance| Value::Map(instance.properties.clone()))
            }
            (keys::PREFAB, Definition::Template(template)) => Some(optional(&template.prefab)),
            (keys::BEHAVIOR, Definition::Template(template)) => Some(optional(&template.behavior)),
            _ => core.fields.get(name).cloned(),
        }
    }

    /// Write a descriptor field by document name
    pub fn set_field(&mut self, name: &str, value: Value) -> Result<(), PropertyError> {
        let kind = self.kind().to_string();
        let mismatch = |source: ValueError| PropertyError::Mismatch {
            type_ref: kind.clone(),
            field: name.to_string(),
            source,
        };
        match (name, &mut *self) {
            (keys::NAME, definition) => definition.core_mut().name = String::from_value(value).map_err(mismatch)?,
            (keys::BASE, definition) => definition.core_mut().base = Option::from_value(value).map_err(mismatch)?,
            (keys::ABSTRACT, definition) => definition.core_mut().is_abstract = bool::from_value(value).map_err(mismatch)?,
            (keys::TARGET_TYPE, Definition::Instance(instance))
            | (keys::TARGET_TYPE, Definition::Template(TemplateDefinition { instance, .. })) => {
                instance.target_type = Option::from_value(value).map_err(mismatch)?
            }
            (keys::PROPERTIES, Definition::Instance(instance))
            | (keys::PROPERTIES, Definition::Template(TemplateDefinition { instance, .. })) => {
                instance.properties = PropertyMap::from_value(value).map_err(mismatch)?
            }
            (keys::PREFAB, Definition::Template(template)) => template.prefab = Option::from_value(value).map_err(mismatch)?,
            (keys::BEHAVIOR, Definition::Template(template)) => {
                template.behavior = Option::from_value(value).map_err(mismatch)?
            }
            (_, definition) => {
                let core = definition.core_mut();
                match core.fields.get_mut(name) {
                    Some(slot) => *slot = value,
                    None => {
                        return Err(PropertyError::UnknownField {
                            type_ref: kind.clone(),
                            field: name.to_string(),
                        })
                    }
                }
            }
        }
        Ok(())
    }

    /// Copy inherited fields from `base`
    ///
    /// Every field on the base's descriptor that this definition's kind also
    /// declares is copied, unless it appears in `explicit` (fields written in
    /// this definition's own document). `Name`, `Base` and `Abstract` are
    /// never inherited.
    pub fn inherit_from(&mut self, base: &Definition, own: &KindSchema, base_schema: &KindSchema, explicit: &[String]) {
        for spec in base_schema.descriptor() {
            let name = spec.name.as_str();
            if matches!(name, keys::NAME | keys::BASE | keys::ABSTRACT) {
                continue;
            }
            if explicit.iter().any(|key| key == name) || own.descriptor_field(name).is_none() {
                continue;
            }
            let Some(value) = base.field(name) else {
                continue;
            };
            if let Err(err) = self.set_field(name, value.deep_clone(ClonePolicy::Reference)) {
                debug!(definition = %self.name(), base = %base.name(), error = %err, "field not inherited");
            }
        }
    }

    /// Copy this definition so that no container is shared with the original
    pub fn deep_clone(&self, policy: ClonePolicy) -> Definition {
        let mut copy = self.clone();
        let core = copy.core_mut();
        core.fields = core.fields.deep_clone(policy);
        if let Some(instance) = copy.as_instance_mut() {
            instance.properties = instance.properties.deep_clone(policy);
        }
        copy
    }

    /// Replace named references with committed definitions from `lookup`
    ///
    /// Returns the first name that could not be resolved.
    pub fn resolve_references<F>(&mut self, lookup: &F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<Arc<Definition>>,
    {
        self.core_mut()
            .fields
            .iter_mut()
            .try_for_each(|(_, value)| value.resolve_references(lookup))?;
        if let Some(instance) = self.as_instance_mut() {
            instance
                .properties
                .iter_mut()
                .try_for_each(|(_, value)| value.resolve_references(lookup))?;
        }
        Ok(())
    }
}

/// Names of the definitions something depends on
///
/// The load pipeline turns these into ordering edges, so a definition is only
/// merged after everything it names has been committed.
pub trait ReferencesDefinitions {
    fn referenced_definitions(&self) -> Vec<String>;
}

fn collect_references(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Reference(reference) => {
            let name = reference.name();
            if !out.iter().any(|seen| seen == name) {
                out.push(name.to_string());
            }
        }
        Value::List(items) => items.iter().for_each(|item| collect_references(item, out)),
        Value::Map(map) => map.iter().for_each(|(_, item)| collect_references(item, out)),
        _ => {}
    }
}

impl ReferencesDefinitions for Value {
    fn referenced_definitions(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_references(self, &mut out);
        out
    }
}

impl ReferencesDefinitions for PropertyMap {
    fn referenced_definitions(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.iter().for_each(|(_, value)| collect_references(value, &mut out));
        out
    }
}

impl ReferencesDefinitions for Definition {
    fn referenced_definitions(&self) -> Vec<String> {
        let mut out: Vec<String> = self.base().map(str::to_string).into_iter().collect();
        self.core()
            .fields
            .iter()
            .for_each(|(_, value)| collect_references(value, &mut out));
        if let Some(instance) = self.as_instance() {
            instance
                .properties
                .iter()
                .for_each(|(_, value)| collect_references(value, &mut out));
        }
        out
    }
}

impl From<Arc<Definition>> for Reference {
    fn from(definition: Arc<Definition>) -> Self {
        Reference::Shared(definition)
    }
}

/// Typed view of a [`Definition`]
pub trait DefinitionView {
    fn view(definition: &Definition) -> Option<&Self>;
}

impl DefinitionView for Definition {
    fn view(definition: &Definition) -> Option<&Self> {
        Some(definition)
    }
}

impl DefinitionView for InstanceDefinition {
    fn view(definition: &Definition) -> Option<&Self> {
        definition.as_instance()
    }
}

impl DefinitionView for TemplateDefinition {
    fn view(definition: &Definition) -> Option<&Self> {
        definition.as_template()
    }
}

impl DefinitionView for CustomDefinition {
    fn view(definition: &Definition) -> Option<&Self> {
        match definition {
            Definition::Custom(custom) => Some(custom),
            _ => None,
        }
    }
}
