//! Registry of recordable, replayable collections.
//!
//! Populated once at startup. Ledger rows name collections by string; the
//! registry turns those names back into live handles.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::validate_collection_name;
use crate::traits::{DocumentCollection, ReplayTarget};

#[derive(Clone)]
struct Registered {
    collection: Arc<dyn DocumentCollection>,
    target: Arc<dyn ReplayTarget>,
}

/// Map from collection name to its store handle and replay capability.
#[derive(Clone, Default)]
pub struct CollectionRegistry {
    entries: BTreeMap<String, Registered>,
}

impl CollectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collection under its own name.
    ///
    /// Registering the same name twice replaces the earlier handle.
    pub fn register<C>(&mut self, collection: Arc<C>) -> Result<()>
    where
        C: DocumentCollection + 'static,
    {
        let name = collection.name().to_string();
        validate_collection_name(&name)?;
        let target: Arc<dyn ReplayTarget> = collection.clone();
        let collection: Arc<dyn DocumentCollection> = collection;
        self.entries.insert(name, Registered { collection, target });
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<C>(mut self, collection: Arc<C>) -> Result<Self>
    where
        C: DocumentCollection + 'static,
    {
        self.register(collection)?;
        Ok(self)
    }

    /// Replay capability for a collection name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ReplayTarget>> {
        self.entries
            .get(name)
            .map(|entry| entry.target.clone())
            .ok_or_else(|| {
                Error::ReplayConfiguration(format!("no replay target registered for '{name}'"))
            })
    }

    /// Store handle for a collection name.
    pub fn collection(&self, name: &str) -> Option<Arc<dyn DocumentCollection>> {
        self.entries.get(name).map(|entry| entry.collection.clone())
    }

    /// Store handle for a collection name, or `Internal` if missing.
    pub fn require(&self, name: &str) -> Result<Arc<dyn DocumentCollection>> {
        self.collection(name)
            .ok_or_else(|| Error::Internal(format!("collection '{name}' is not registered")))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in ascending order.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for CollectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionRegistry")
            .field("collections", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCollection;

    #[test]
    fn test_register_and_resolve() {
        let registry = CollectionRegistry::new()
            .with(Arc::new(MemoryCollection::new("annotation")))
            .unwrap()
            .with(Arc::new(MemoryCollection::new("annotation_connection")))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("annotation"));
        assert!(registry.resolve("annotation_connection").is_ok());
        assert_eq!(
            registry.names(),
            vec!["annotation".to_string(), "annotation_connection".to_string()]
        );
        assert_eq!(registry.require("annotation").unwrap().name(), "annotation");
    }

    #[test]
    fn test_unknown_name_is_replay_configuration_error() {
        let registry = CollectionRegistry::new();
        assert!(registry.is_empty());
        match registry.resolve("widget") {
            Err(Error::ReplayConfiguration(msg)) => assert!(msg.contains("widget")),
            _ => panic!("Expected ReplayConfiguration error"),
        }
        assert!(registry.collection("widget").is_none());
        assert!(matches!(registry.require("widget"), Err(Error::Internal(_))));
    }

    #[test]
    fn test_invalid_name_rejected() {
        let mut registry = CollectionRegistry::new();
        let err = registry
            .register(Arc::new(MemoryCollection::new("bad name")))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
