//! Flat service namespace.
//!
//! The first protocol generation addresses services by a single name with no
//! hierarchy. [`FlatView`] serves that namespace from any [`TreeStore`] by
//! mapping every name to a depth-1 path. Names are used verbatim, so a name
//! containing `/` is one service, not a path.

use std::sync::Arc;

use crate::path::ServicePath;
use crate::store::{StoreError, TreeStore};

/// Name-addressed operations over the roots of a [`TreeStore`].
#[derive(Clone)]
pub struct FlatView {
    store: Arc<dyn TreeStore>,
}

impl FlatView {
    #[must_use]
    pub fn new(store: Arc<dyn TreeStore>) -> Self {
        Self { store }
    }

    fn path(name: &str) -> Result<ServicePath, StoreError> {
        if name.is_empty() {
            return Err(StoreError::EmptyPath);
        }
        Ok(ServicePath::root(name))
    }

    /// Whether a service named `name` exists. Empty names never exist.
    pub fn exists(&self, name: &str) -> Result<bool, StoreError> {
        match Self::path(name) {
            Ok(path) => self.store.exists(&path),
            Err(_) => Ok(false),
        }
    }

    /// The counter of service `name`.
    pub fn time(&self, name: &str) -> Result<u64, StoreError> {
        self.store.counter(&Self::path(name)?)
    }

    pub fn create(&self, name: &str) -> Result<(), StoreError> {
        self.store.create(&Self::path(name)?)
    }

    pub fn rename(&self, name: &str, new_name: &str) -> Result<(), StoreError> {
        self.store.rename(&Self::path(name)?, new_name)
    }

    pub fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.store.delete(&Self::path(name)?)
    }

    pub fn increment(&self, name: &str) -> Result<(), StoreError> {
        self.store.increment(&Self::path(name)?)
    }
}

impl std::fmt::Debug for FlatView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatView").finish_non_exhaustive()
    }
}
