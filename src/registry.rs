//! Name-keyed registries for backend login constructors and collectors.
//!
//! A registry is built once in `main`, filled by explicit `register` calls and
//! then shared read-only (behind an `Arc`) with every worker. Lookups take a
//! read lock, so concurrent workers never contend with each other.

use crate::error::RegistryError;
use std::collections::HashMap;
use std::sync::RwLock;

/// A process-wide mapping from a plain name to a cloneable entry.
#[derive(Debug)]
pub struct Registry<T: Clone> {
    kind: &'static str,
    entries: RwLock<HashMap<String, T>>,
}

impl<T: Clone> Registry<T> {
    /// Create an empty registry. `kind` only appears in error messages.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register `entry` under `name`, replacing any earlier registration.
    pub fn register(&self, name: impl Into<String>, entry: T) {
        let name = name.into();
        tracing::debug!(kind = self.kind, %name, "Registered");
        // A poisoned lock only means a writer panicked mid-insert; the map itself is intact.
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(name, entry);
    }

    /// Look up `name`. An unknown name is [`RegistryError::Unregistered`].
    pub fn get(&self, name: &str) -> Result<T, RegistryError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::Unregistered {
                kind: self.kind,
                name: name.to_string(),
            })
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = entries.keys().cloned().collect();
        names.sort();
        names
    }
}
