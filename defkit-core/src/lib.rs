//! Core types for the defkit content registry
//!
//! This crate loads declarative definitions from independently authored
//! packages and turns them into live objects:
//! - `DependencyGraph`: Deterministic ordering of definitions by what they reference
//! - `Definition`: Instance, template and custom definitions with single inheritance
//! - `Serializer`: Converter chain between values and `$type`-tagged documents
//! - `Registry`: Transactional load pipeline, typed queries and instantiation
//! - `compat`: Dependency and incompatibility checks over a set of packages

pub mod catalog;
pub mod compat;
pub mod definition;
pub mod error;
pub mod extension;
pub mod graph;
pub mod instance;
pub mod package;
pub mod registry;
pub mod serializer;
pub mod target;
pub mod value;
pub mod version;

// Re-export main types for convenience
pub use catalog::{Catalog, DefinitionLookup};
pub use compat::{CompatReport, Severity, WorkingSet};
pub use definition::{
    CustomDefinition, Definition, DefinitionView, InstanceDefinition, KindRegistry, KindSchema, Shape,
    TemplateDefinition,
};
pub use error::{InstantiateError, LoadError};
pub use extension::{EntryPoint, ExtensionFailure, ExtensionHost, ExtensionModule};
pub use graph::{DependencyGraph, GraphError};
pub use instance::{HostError, Instantiator, PrefabHost};
pub use package::{Package, PackageDependency};
pub use registry::{LoadListener, LoadReport, MemoryStore, NoopListener, PackageStore, Registry};
pub use serializer::{CacheMode, Context, Converter, Document, SerializeError, Serializer};
pub use target::{Target, TargetRegistry, TargetType, TypeRef};
pub use value::{ClonePolicy, FieldKind, PropertyMap, Reference, Value};
pub use version::Version;
