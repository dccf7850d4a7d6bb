//! Concurrent endpoint registry.
//!
//! Per-key atomicity comes from the sharded map; unrelated endpoints are
//! never serialized behind one lock.

use crate::error::{Error, Result};
use crate::proxy::Proxy;

use dashmap::DashMap;
use std::sync::Arc;

/// Concurrent store of endpoint -> proxy entries.
pub struct Registry {
    entries: DashMap<String, Arc<Proxy>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Create-or-return the entry for `endpoint`. Inserting an endpoint that
    /// already exists returns the live entry untouched.
    pub fn add(&self, endpoint: &str) -> Arc<Proxy> {
        let entry = self
            .entries
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(Proxy::new(endpoint.to_string())));
        Arc::clone(entry.value())
    }

    /// Look up an endpoint.
    pub fn get(&self, endpoint: &str) -> Option<Arc<Proxy>> {
        self.entries.get(endpoint).map(|e| Arc::clone(e.value()))
    }

    /// Remove an endpoint. Fails with `NotFound` if it is absent.
    pub fn delete(&self, endpoint: &str) -> Result<()> {
        self.entries
            .remove(endpoint)
            .map(|_| ())
            .ok_or(Error::NotFound)
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all current entries, for recycling.
    pub(crate) fn snapshot(&self) -> Vec<Arc<Proxy>> {
        self.entries.iter().map(|e| Arc::clone(e.value())).collect()
    }
}
