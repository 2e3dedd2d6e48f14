//! Committed definitions indexed by name and by kind

use std::collections::HashMap;
use std::sync::Arc;

use crate::definition::Definition;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("a definition named \"{0}\" is already loaded")]
    DuplicateName(String),
}

/// Name lookup the serializer resolves references through
pub trait DefinitionLookup {
    fn lookup(&self, name: &str) -> Option<Arc<Definition>>;
}

/// Queryable set of committed definitions
///
/// Every definition in `by_name` sits in exactly one `by_type` bucket, the one
/// for its kind. Cloning is cheap: definitions are shared.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    by_name: HashMap<String, Arc<Definition>>,
    by_type: HashMap<String, Vec<Arc<Definition>>>,
    order: Vec<String>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Definition>> {
        self.by_name.get(name)
    }

    /// Definitions of one kind in commit order
    pub fn of_kind(&self, kind: &str) -> &[Arc<Definition>] {
        self.by_type.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Kinds with at least one definition, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.by_type.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// All definitions in commit order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Definition>> {
        self.order.iter().filter_map(|name| self.by_name.get(name))
    }

    pub fn commit(&mut self, definition: Definition) -> Result<Arc<Definition>, CatalogError> {
        let name = definition.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(CatalogError::DuplicateName(name));
        }
        let definition = Arc::new(definition);
        self.by_type
            .entry(definition.kind().to_string())
            .or_default()
            .push(Arc::clone(&definition));
        self.by_name.insert(name.clone(), Arc::clone(&definition));
        self.order.push(name);
        Ok(definition)
    }

    /// Remove a definition from both indices. Empty buckets are left for
    /// [`prune_empty`](Self::prune_empty).
    pub fn remove(&mut self, name: &str) -> Option<Arc<Definition>> {
        let definition = self.by_name.remove(name)?;
        if let Some(bucket) = self.by_type.get_mut(definition.kind()) {
            bucket.retain(|entry| !Arc::ptr_eq(entry, &definition));
        }
        self.order.retain(|entry| entry != name);
        Some(definition)
    }

    /// Drop every abstract definition and return their names
    pub fn prune_abstract(&mut self) -> Vec<String> {
        let names: Vec<String> = self
            .iter()
            .filter(|definition| definition.is_abstract())
            .map(|definition| definition.name().to_string())
            .collect();
        for name in &names {
            self.remove(name);
        }
        names
    }

    pub fn prune_empty(&mut self) {
        self.by_type.retain(|_, bucket| !bucket.is_empty());
    }

    /// Check that both indices agree
    pub fn is_consistent(&self) -> bool {
        let bucketed: usize = self.by_type.values().map(Vec::len).sum();
        bucketed == self.by_name.len()
            && self.order.len() == self.by_name.len()
            && self.by_name.values().all(|definition| {
                self.of_kind(definition.kind())
                    .iter()
                    .filter(|entry| Arc::ptr_eq(entry, definition))
                    .count()
                    == 1
            })
    }
}

impl DefinitionLookup for Catalog {
    fn lookup(&self, name: &str) -> Option<Arc<Definition>> {
        self.by_name.get(name).cloned()
    }
}
