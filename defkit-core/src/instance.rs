//! Turning instance definitions into live objects
//!
//! Every call works on a fresh deep copy of the definition, so objects never
//! share containers with the template or with each other. Referenced
//! definitions stay shared by identity.

use std::error::Error as StdError;

use tracing::{debug, warn};

use crate::definition::Definition;
use crate::error::InstantiateError;
use crate::target::{Target, TargetRegistry};
use crate::value::{ClonePolicy, Value};

/// Error type returned by external collaborators
pub type HostError = Box<dyn StdError + Send + Sync>;

/// Scene-side object construction for template definitions
pub trait PrefabHost: Send + Sync {
    /// Build the object a prefab describes
    fn instantiate(&self, prefab: &str) -> Result<Box<dyn Target>, HostError>;

    /// Build a prefab and attach a behavior to it
    fn compose(&self, prefab: &str, behavior: &str) -> Result<Box<dyn Target>, HostError>;
}

/// What instantiation needs besides the definition itself
#[derive(Clone, Copy)]
pub struct Instantiator<'a> {
    pub targets: &'a TargetRegistry,
    pub prefabs: Option<&'a dyn PrefabHost>,
}

impl<'a> Instantiator<'a> {
    pub fn new(targets: &'a TargetRegistry) -> Self {
        Self { targets, prefabs: None }
    }

    pub fn with_prefabs(mut self, prefabs: &'a dyn PrefabHost) -> Self {
        self.prefabs = Some(prefabs);
        self
    }

    /// Build a new object from `definition`
    ///
    /// Template definitions compose their prefab and behavior when both are
    /// set, instantiate the prefab when only it is set, and otherwise fall
    /// back to constructing the target type like any instance definition.
    /// Properties are then applied field by field. A property the object
    /// rejects is logged and skipped.
    pub fn instantiate(&self, definition: &Definition, args: &[Value]) -> Result<Box<dyn Target>, InstantiateError> {
        let name = definition.name();
        let copy = definition.deep_clone(ClonePolicy::Reference);
        let instance = copy
            .as_instance()
            .ok_or_else(|| InstantiateError::NotInstantiable(name.to_string()))?;

        let mut object = match &copy {
            Definition::Template(template) => match (&template.prefab, &template.behavior) {
                (Some(prefab), Some(behavior)) => self.prefab_host()?.compose(prefab, behavior).map_err(|source| {
                    InstantiateError::Prefab {
                        prefab: prefab.clone(),
                        source,
                    }
                })?,
                (Some(prefab), None) => self
                    .prefab_host()?
                    .instantiate(prefab)
                    .map_err(|source| InstantiateError::Prefab {
                        prefab: prefab.clone(),
                        source,
                    })?,
                _ => self.construct(&copy, args)?,
            },
            _ => self.construct(&copy, args)?,
        };

        object.set_definition(name);
        for (field, value) in instance.properties.clone() {
            if let Err(err) = object.set(&field, value) {
                warn!(definition = %name, error = %err, "property skipped");
            }
        }
        if copy.as_template().is_some() {
            object.set_name(name);
        }
        debug!(definition = %name, type_ref = object.type_ref(), "instantiated");
        Ok(object)
    }

    /// Build a new object and layer the writable fields of `base` on top
    pub fn instantiate_with_base(
        &self,
        definition: &Definition,
        base: &dyn Target,
        args: &[Value],
    ) -> Result<Box<dyn Target>, InstantiateError> {
        let mut object = self.instantiate(definition, args)?;
        for field in base.fields().into_iter().filter(|field| field.writable) {
            let Some(value) = base.get(field.name) else {
                continue;
            };
            if let Err(err) = object.set(field.name, value.deep_clone(ClonePolicy::Reference)) {
                debug!(definition = %definition.name(), error = %err, "base field not copied");
            }
        }
        Ok(object)
    }

    fn prefab_host(&self) -> Result<&'a dyn PrefabHost, InstantiateError> {
        self.prefabs.ok_or(InstantiateError::PrefabHostMissing)
    }

    fn construct(&self, definition: &Definition, args: &[Value]) -> Result<Box<dyn Target>, InstantiateError> {
        let type_ref = definition
            .target_type()
            .ok_or_else(|| InstantiateError::MissingTargetType(definition.name().to_string()))?;
        let descriptor = self
            .targets
            .get(type_ref)
            .ok_or_else(|| InstantiateError::UnknownTargetType(type_ref.to_string()))?;
        Ok(descriptor.construct(args)?)
    }
}
