//! Definition registry and the package load pipeline
//!
//! The [`Registry`] owns the kind and target registries, the serializer and
//! the catalog of committed definitions. Packages are loaded in passes: every
//! document of every selected package is parsed, ordered by dependency,
//! merged with its base, resolved and committed to a staging catalog that
//! only replaces the live one once the whole pass has succeeded.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalog::{Catalog, CatalogError, DefinitionLookup};
use crate::compat::{self, CompatReport, WorkingSet};
use crate::definition::{keys, Definition, DefinitionView, KindRegistry, KindSchema, ReferencesDefinitions};
use crate::error::{InstantiateError, LoadError};
use crate::extension::{self, ExtensionFailure, ExtensionHost};
use crate::graph::DependencyGraph;
use crate::instance::{HostError, Instantiator, PrefabHost};
use crate::package::Package;
use crate::serializer::{Context, Converter, Document, ParsedDefinition, SerializeError, Serializer};
use crate::target::{Constructor, FieldInfo, Target, TargetRegistry, TargetType, TypeRef};
use crate::value::Value;
use crate::version::Version;

/// Progress callbacks for a load pass
pub trait LoadListener {
    /// A definition is about to be merged and committed
    fn loading(&self, _name: &str) {}

    fn progress(&self, _loaded: usize, _total: usize) {}

    /// Every definition of the pass has been committed
    fn complete(&self) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl LoadListener for NoopListener {}

/// Source of package metadata and definition documents
pub trait PackageStore: Send + Sync {
    /// Ids of every package the store can provide, in load order
    fn available(&self) -> Vec<String>;

    fn metadata(&self, id: &str) -> Result<Package, HostError>;

    /// Definition documents of `package` found under `folders`
    fn documents(&self, package: &Package, folders: &[&str]) -> Result<Vec<Document>, HostError>;
}

/// Package store held entirely in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    packages: Vec<Package>,
    documents: HashMap<String, Vec<(String, Document)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package, replacing any earlier package with the same id
    pub fn add_package(&mut self, package: Package) -> &mut Self {
        self.packages.retain(|existing| existing.id != package.id);
        self.packages.push(package);
        self
    }

    /// Add definition documents to a package's `folder`
    pub fn add_documents(&mut self, id: &str, folder: &str, documents: impl IntoIterator<Item = Document>) -> &mut Self {
        self.documents
            .entry(id.to_string())
            .or_default()
            .extend(documents.into_iter().map(|doc| (folder.to_string(), doc)));
        self
    }
}

impl PackageStore for MemoryStore {
    fn available(&self) -> Vec<String> {
        self.packages.iter().map(|package| package.id.clone()).collect()
    }

    fn metadata(&self, id: &str) -> Result<Package, HostError> {
        self.packages
            .iter()
            .find(|package| package.id == id)
            .cloned()
            .ok_or_else(|| format!("package \"{id}\" not found").into())
    }

    fn documents(&self, package: &Package, folders: &[&str]) -> Result<Vec<Document>, HostError> {
        let Some(documents) = self.documents.get(&package.id) else {
            return Ok(Vec::new());
        };
        Ok(folders
            .iter()
            .flat_map(|folder| {
                documents
                    .iter()
                    .filter(move |(owner, _)| owner == folder)
                    .map(|(_, doc)| doc.clone())
            })
            .collect())
    }
}

/// Outcome of a successful load pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Packages that became active, in load order
    pub packages: Vec<String>,
    /// Committed definitions in commit order, without pruned ones
    pub committed: Vec<String>,
    /// Abstract definitions dropped after the pass
    pub pruned: Vec<String>,
    pub extension_failures: Vec<ExtensionFailure>,
}

struct Staged {
    package: usize,
    parsed: ParsedDefinition,
}

/// Target type a definition inherits through its base chain
///
/// Bases parsed in the same pass are searched first, then the catalog.
fn inherited_target(staged: &[Staged], index: &HashMap<String, usize>, catalog: &Catalog, start: usize) -> Option<TypeRef> {
    let mut current = staged[start].parsed.definition.base().map(str::to_string);
    for _ in 0..=staged.len() {
        let name = current?;
        let Some(&position) = index.get(&name) else {
            return catalog
                .get(&name)
                .and_then(|definition| definition.target_type().map(str::to_string));
        };
        let definition = &staged[position].parsed.definition;
        if let Some(target) = definition.target_type() {
            return Some(target.to_string());
        }
        current = definition.base().map(str::to_string);
    }
    // base chain loops back on itself; ordering reports the cycle
    None
}

pub struct Registry {
    host_version: Version,
    kinds: KindRegistry,
    targets: TargetRegistry,
    serializer: Serializer,
    catalog: Catalog,
    packages: Vec<Package>,
    extensions: Option<Box<dyn ExtensionHost>>,
    prefabs: Option<Box<dyn PrefabHost>>,
}

impl Registry {
    /// Empty registry with the built-in definition kinds and converters
    pub fn new(host_version: Version) -> Self {
        Self {
            host_version,
            kinds: KindRegistry::new(),
            targets: TargetRegistry::new(),
            serializer: Serializer::new(),
            catalog: Catalog::new(),
            packages: Vec::new(),
            extensions: None,
            prefabs: None,
        }
    }

    pub fn host_version(&self) -> &Version {
        &self.host_version
    }

    pub fn register_kind(&mut self, schema: KindSchema) {
        debug!(kind = schema.id(), "registering definition kind");
        self.kinds.register(schema);
    }

    pub fn register_target<T: TargetType + Default>(&mut self) {
        debug!(type_ref = T::TYPE_REF, "registering target type");
        self.targets.register::<T>();
    }

    pub fn register_target_with<T: TargetType>(&mut self, constructor: Constructor, fields: Vec<FieldInfo>) {
        debug!(type_ref = T::TYPE_REF, "registering target type");
        self.targets.register_with::<T>(constructor, fields);
    }

    /// Append a converter; it is consulted after the ones already registered
    pub fn register_converter<C: Converter + 'static>(&mut self, converter: C) {
        self.serializer.register(converter);
    }

    pub fn set_extension_host(&mut self, host: impl ExtensionHost + 'static) {
        self.extensions = Some(Box::new(host));
    }

    pub fn set_prefab_host(&mut self, host: impl PrefabHost + 'static) {
        self.prefabs = Some(Box::new(host));
    }

    pub fn kinds(&self) -> &KindRegistry {
        &self.kinds
    }

    pub fn targets(&self) -> &TargetRegistry {
        &self.targets
    }

    pub fn serializer(&self) -> &Serializer {
        &self.serializer
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Active packages in load order
    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn package(&self, id: &str) -> Option<&Package> {
        self.packages.iter().find(|package| package.id == id)
    }

    pub fn is_loaded(&self, id: &str) -> bool {
        self.package(id).is_some()
    }

    /// Serialization context resolving names against the live catalog
    pub fn context(&self) -> Context<'_> {
        Context::new(&self.kinds, &self.targets).with_lookup(&self.catalog)
    }

    /// Load a set of packages in one pass
    ///
    /// # Arguments
    ///
    /// * `store` - Where package metadata and documents come from
    /// * `ids` - Packages to load; every package the store offers when empty
    /// * `folders` - Folders inside each package holding definition documents
    /// * `listener` - Receives per-definition progress
    ///
    /// # Returns
    ///
    /// A report of what was committed. On error nothing from the pass is
    /// committed and no package becomes active.
    pub fn load(
        &mut self,
        store: &dyn PackageStore,
        ids: &[&str],
        folders: &[&str],
        listener: &dyn LoadListener,
    ) -> Result<LoadReport, LoadError> {
        let ids: Vec<String> = if ids.is_empty() {
            store.available()
        } else {
            ids.iter().map(|id| id.to_string()).collect()
        };

        let mut incoming: Vec<Package> = Vec::new();
        for id in &ids {
            let package = store.metadata(id).map_err(|source| LoadError::Store {
                package: id.clone(),
                source,
            })?;
            if self.is_loaded(&package.id) || incoming.iter().any(|active| active.id == package.id) {
                warn!(package = %package.id, "package is already active, skipping");
                continue;
            }
            incoming.push(package);
        }
        info!(packages = incoming.len(), "loading packages");

        let ctx = Context::new(&self.kinds, &self.targets);
        let mut staged: Vec<Staged> = Vec::new();
        for (position, package) in incoming.iter().enumerate() {
            let documents = store.documents(package, folders).map_err(|source| LoadError::Store {
                package: package.id.clone(),
                source,
            })?;
            debug!(package = %package.id, documents = documents.len(), "parsing definitions");
            for doc in &documents {
                let mut parsed = self
                    .serializer
                    .read_definition(doc, &ctx)
                    .map_err(|source| LoadError::Parse {
                        package: package.id.clone(),
                        source,
                    })?;
                parsed.definition.core_mut().owner = Some(package.id.clone());
                staged.push(Staged {
                    package: position,
                    parsed,
                });
            }
        }

        let mut index = HashMap::with_capacity(staged.len());
        for (position, entry) in staged.iter().enumerate() {
            let name = entry.parsed.definition.name();
            if self.catalog.contains(name) || index.insert(name.to_string(), position).is_some() {
                return Err(CatalogError::DuplicateName(name.to_string()).into());
            }
        }

        for position in 0..staged.len() {
            let Some(raw) = staged[position].parsed.pending_properties.take() else {
                continue;
            };
            let package = &incoming[staged[position].package].id;
            let parse_error = |source: SerializeError| LoadError::Parse {
                package: package.clone(),
                source,
            };
            let properties = match inherited_target(&staged, &index, &self.catalog, position) {
                Some(target) => self.serializer.read_properties(&raw, &target, &ctx),
                None => self.serializer.read_untyped_properties(&raw, &ctx),
            }
            .map_err(parse_error)?;
            staged[position]
                .parsed
                .definition
                .set_field(keys::PROPERTIES, Value::Map(properties))
                .map_err(|err| parse_error(err.into()))?;
        }

        let mut graph = DependencyGraph::new();
        let mut edges = Vec::with_capacity(staged.len());
        for entry in staged {
            let name = entry.parsed.definition.name().to_string();
            edges.push((name.clone(), entry.parsed.definition.referenced_definitions()));
            graph.add_node(name, entry);
        }
        for (name, dependencies) in edges {
            for dependency in dependencies {
                graph.add_dependency(&name, dependency)?;
            }
        }
        let ordered = graph.into_data_order()?;

        let mut staging = self.catalog.clone();
        let total = ordered.len();
        let mut committed = Vec::with_capacity(total);
        for (loaded, entry) in ordered.into_iter().enumerate() {
            let ParsedDefinition {
                mut definition,
                explicit_keys,
                ..
            } = entry.parsed;
            let name = definition.name().to_string();
            listener.loading(&name);

            if let Some(base_name) = definition.base().map(str::to_string) {
                let base = staging.get(&base_name).cloned().ok_or_else(|| LoadError::MissingBase {
                    definition: name.clone(),
                    base: base_name.clone(),
                })?;
                let unknown_kind = |kind: &str| LoadError::UnknownKind {
                    definition: name.clone(),
                    kind: kind.to_string(),
                };
                let own = self.kinds.get(definition.kind()).ok_or_else(|| unknown_kind(definition.kind()))?;
                let inherited = self.kinds.get(base.kind()).ok_or_else(|| unknown_kind(base.kind()))?;
                definition.inherit_from(&base, own, inherited, &explicit_keys);
            }

            if definition.shape().is_instance() && !definition.is_abstract() {
                let target = definition
                    .target_type()
                    .ok_or_else(|| LoadError::MissingTargetType(name.clone()))?;
                if !self.targets.contains(target) {
                    return Err(LoadError::UnknownTargetType {
                        definition: name,
                        target: target.to_string(),
                    });
                }
            }

            definition
                .resolve_references(&|reference: &str| staging.lookup(reference))
                .map_err(|reference| LoadError::UnresolvedReference {
                    definition: name.clone(),
                    reference,
                })?;
            staging.commit(definition)?;
            incoming[entry.package].definitions.push(name.clone());
            debug!(definition = %name, package = %incoming[entry.package].id, "committed");
            committed.push(name);
            listener.progress(loaded + 1, total);
        }

        let pruned = staging.prune_abstract();
        staging.prune_empty();
        if !pruned.is_empty() {
            debug!(count = pruned.len(), "pruned abstract definitions");
            committed.retain(|name| !pruned.contains(name));
            for package in &mut incoming {
                package.definitions.retain(|name| !pruned.contains(name));
            }
        }

        self.catalog = staging;
        listener.complete();
        info!(definitions = committed.len(), "load pass committed");

        let mut extension_failures = Vec::new();
        if let Some(host) = self.extensions.as_deref() {
            for package in &mut incoming {
                extension_failures.extend(extension::activate(host, package));
            }
        }

        let packages = incoming.iter().map(|package| package.id.clone()).collect();
        self.packages.extend(incoming);
        Ok(LoadReport {
            packages,
            committed,
            pruned,
            extension_failures,
        })
    }

    /// Remove packages and every definition they committed
    ///
    /// Returns the names of the removed definitions. Ids that are not active
    /// are logged and ignored.
    pub fn unload(&mut self, ids: &[&str]) -> Vec<String> {
        let mut removed = Vec::new();
        for id in ids {
            let Some(position) = self.packages.iter().position(|package| package.id == *id) else {
                warn!(package = %id, "package is not active, nothing to unload");
                continue;
            };
            let package = self.packages.remove(position);
            for name in &package.definitions {
                if self.catalog.remove(name).is_some() {
                    removed.push(name.clone());
                }
            }
            info!(package = %package.id, definitions = package.definitions.len(), "unloaded package");
        }
        self.catalog.prune_empty();
        removed
    }

    pub fn unload_all(&mut self) {
        info!(packages = self.packages.len(), "unloading every package");
        self.packages.clear();
        self.catalog = Catalog::new();
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Definition>> {
        self.catalog.get(name)
    }

    /// Definition `name`, if it has the shape `T`
    pub fn get_as<T: DefinitionView>(&self, name: &str) -> Option<&T> {
        self.catalog.get(name).and_then(|definition| T::view(definition))
    }

    /// Every committed definition of `kind`, in commit order
    pub fn get_all(&self, kind: &str) -> &[Arc<Definition>] {
        self.catalog.of_kind(kind)
    }

    /// Every committed definition with the shape `T`, in commit order
    pub fn get_all_as<T: DefinitionView>(&self) -> Vec<&T> {
        self.catalog.iter().filter_map(|definition| T::view(definition)).collect()
    }

    /// Instance definitions whose target type can be used as a `T`
    pub fn instance_definitions<T: TargetType>(&self) -> Vec<&Arc<Definition>> {
        self.catalog
            .iter()
            .filter(|definition| self.produces::<T>(definition))
            .collect()
    }

    /// Definition `name` viewed as `I`, if it produces objects usable as `T`
    pub fn get_instance_definition<I: DefinitionView, T: TargetType>(&self, name: &str) -> Option<&I> {
        self.catalog
            .get(name)
            .filter(|definition| self.produces::<T>(definition))
            .and_then(|definition| I::view(definition))
    }

    fn produces<T: TargetType>(&self, definition: &Definition) -> bool {
        definition
            .target_type()
            .is_some_and(|target| self.targets.is_assignable(target, T::TYPE_REF))
    }

    pub fn instantiator(&self) -> Instantiator<'_> {
        let instantiator = Instantiator::new(&self.targets);
        match self.prefabs.as_deref() {
            Some(prefabs) => instantiator.with_prefabs(prefabs),
            None => instantiator,
        }
    }

    /// Build a new object from definition `name`
    pub fn instantiate(&self, name: &str, args: &[Value]) -> Result<Box<dyn Target>, InstantiateError> {
        let definition = self
            .catalog
            .get(name)
            .ok_or_else(|| InstantiateError::NotFound(name.to_string()))?;
        self.instantiator().instantiate(definition, args)
    }

    /// Build a `T` from definition `name`
    ///
    /// Definitions whose target type is not assignable to `T` are treated as
    /// missing.
    pub fn create<T: TargetType>(&self, name: &str, args: &[Value]) -> Result<T, InstantiateError> {
        let definition = self.typed_definition::<T>(name)?;
        downcast(self.instantiator().instantiate(definition, args)?)
    }

    /// Build a `T` from definition `name`, then copy `base`'s writable fields
    /// onto it
    pub fn create_with_base<T: TargetType>(&self, name: &str, base: &T, args: &[Value]) -> Result<T, InstantiateError> {
        let definition = self.typed_definition::<T>(name)?;
        downcast(self.instantiator().instantiate_with_base(definition, base, args)?)
    }

    fn typed_definition<T: TargetType>(&self, name: &str) -> Result<&Arc<Definition>, InstantiateError> {
        self.catalog
            .get(name)
            .filter(|definition| self.produces::<T>(definition))
            .ok_or_else(|| InstantiateError::NotFound(name.to_string()))
    }

    /// Write a live object as a document
    pub fn save_object(&self, object: &dyn Target) -> Result<Document, SerializeError> {
        self.serializer.write_object(object, &self.context())
    }

    /// Rebuild a live object written by [`Registry::save_object`]
    pub fn restore_object(&self, doc: &Document, args: &[Value]) -> Result<Box<dyn Target>, SerializeError> {
        self.serializer.read_object(doc, args, &self.context())
    }

    /// Write a committed definition back out as a document
    pub fn save_definition(&self, name: &str) -> Option<Result<Document, SerializeError>> {
        self.catalog
            .get(name)
            .map(|definition| self.serializer.write_definition(definition, &self.context()))
    }

    /// Check the active packages together with `disabled` ones
    pub fn check_compatibility(&self, disabled: &[Package]) -> Vec<CompatReport> {
        compat::check(&WorkingSet::new(&self.packages, disabled), &self.host_version)
    }
}

fn downcast<T: TargetType>(object: Box<dyn Target>) -> Result<T, InstantiateError> {
    let found = object.type_ref().to_string();
    object
        .into_any()
        .downcast::<T>()
        .map(|object| *object)
        .map_err(|_| InstantiateError::TypeMismatch {
            expected: T::TYPE_REF.to_string(),
            found,
        })
}
