//! Pipeline-level errors
//!
//! Errors from a single module (graph, serializer, catalog, values) live next
//! to that module. This module holds the errors callers of the registry see.

use crate::catalog::CatalogError;
use crate::graph::GraphError;
use crate::instance::HostError;
use crate::serializer::SerializeError;
use crate::target::ConstructError;

/// Failure that aborts a whole load pass
///
/// Nothing from the failed pass is committed.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read package \"{package}\": {source}")]
    Store {
        package: String,
        #[source]
        source: HostError,
    },

    #[error("error loading definition from package \"{package}\": {source}")]
    Parse {
        package: String,
        #[source]
        source: SerializeError,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("definition \"{definition}\" extends \"{base}\", which is not loaded")]
    MissingBase { definition: String, base: String },

    #[error("definition \"{definition}\" references \"{reference}\", which is not loaded")]
    UnresolvedReference { definition: String, reference: String },

    #[error("instance definition \"{0}\" has no target type")]
    MissingTargetType(String),

    #[error("definition \"{definition}\" targets unknown type \"{target}\"")]
    UnknownTargetType { definition: String, target: String },

    #[error("unknown definition type \"{kind}\" for \"{definition}\"")]
    UnknownKind { definition: String, kind: String },
}

/// Failure to produce an object from a definition
#[derive(Debug, thiserror::Error)]
pub enum InstantiateError {
    #[error("no definition named \"{0}\" is loaded")]
    NotFound(String),

    #[error("definition \"{0}\" does not produce objects")]
    NotInstantiable(String),

    #[error("instance definition \"{0}\" has no target type")]
    MissingTargetType(String),

    #[error("unknown target type \"{0}\"")]
    UnknownTargetType(String),

    #[error(transparent)]
    Construct(#[from] ConstructError),

    #[error("prefab \"{prefab}\" could not be instantiated: {source}")]
    Prefab {
        prefab: String,
        #[source]
        source: HostError,
    },

    #[error("definition needs a prefab host but none is installed")]
    PrefabHostMissing,

    #[error("expected an object of type `{expected}` but built `{found}`")]
    TypeMismatch { expected: String, found: String },
}
