//! Service tree storage.
//!
//! The [`TreeStore`] trait is the single interface the HTTP and WebSocket
//! layers use to reach the service forest. Two interchangeable backends
//! implement it:
//!
//! - [`ForestStore`]: an id-keyed node arena, either purely in memory or
//!   persisted as a JSON snapshot file.
//! - [`SqliteTreeStore`]: an adjacency table in `SQLite`.
//!
//! # Invariants
//!
//! - Sibling names are unique, so a path resolves to at most one node.
//! - A node's parent always exists; deleting a node removes its whole subtree.
//! - Incrementing a node increments every node on the path from its root,
//!   inclusive, as one atomic update.
//! - Renaming changes one node's name only. Descendants keep their names and
//!   are re-addressed through the new prefix.
//! - Subtree membership is decided structurally (by node id), never by string
//!   prefix, so `app1` never captures its sibling `app10`.
//!
//! # Concurrency
//!
//! Implementations take `&self` and serialize mutations internally. A reader
//! never observes a half-applied increment, rename, or cascade.

mod forest;
mod sqlite;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub use forest::{ForestStore, ServiceForest};
pub use sqlite::SqliteTreeStore;

use crate::path::ServicePath;

/// Errors returned by [`TreeStore`] operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The operation needs a non-empty path.
    #[error("service path is empty")]
    EmptyPath,

    /// Rename was given an empty name.
    #[error("new service name is empty")]
    EmptyName,

    /// No node exists at the path.
    #[error("service {path} does not exist")]
    NotFound {
        /// The unresolved path.
        path: ServicePath,
    },

    /// Create was asked for a node whose parent does not exist.
    #[error("parent of service {path} does not exist")]
    ParentMissing {
        /// The path that could not be created.
        path: ServicePath,
    },

    /// A node already exists at the target path.
    #[error("service {path} already exists")]
    AlreadyExists {
        /// The occupied path.
        path: ServicePath,
    },

    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error reading or writing the snapshot file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot file could not be encoded or decoded.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// Stored data violates a tree invariant.
    #[error("corrupt store: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether this is a backend fault rather than an expected,
    /// request-scoped outcome.
    #[must_use]
    pub const fn is_fault(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Io(_) | Self::Snapshot(_) | Self::Corrupt(_)
        )
    }

    pub(crate) fn not_found(path: &ServicePath) -> Self {
        Self::NotFound { path: path.clone() }
    }
}

/// Read-only snapshot of a node and its whole subtree.
///
/// Serializes as `{"service": .., "time": "<decimal>", "children": [..]}`.
/// The counter is written as a string, not a JSON number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceNode {
    /// The node's own name (last path segment).
    pub service: String,

    /// Observed time through this node or any descendant.
    #[serde(serialize_with = "time_to_string", deserialize_with = "time_from_string")]
    pub time: u64,

    /// Child snapshots, ordered by name.
    pub children: Vec<ServiceNode>,
}

impl ServiceNode {
    /// Finds a direct child by name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.service == name)
    }
}

fn time_to_string<S: Serializer>(time: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(time)
}

fn time_from_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

/// Path-addressed operations over the service forest.
pub trait TreeStore: Send + Sync {
    /// Whether a node exists at `path`. The empty path never exists.
    fn exists(&self, path: &ServicePath) -> Result<bool, StoreError>;

    /// The counter of the node at `path`.
    fn counter(&self, path: &ServicePath) -> Result<u64, StoreError>;

    /// Snapshots of every root with nested children, ordered by name.
    fn full_tree(&self) -> Result<Vec<ServiceNode>, StoreError>;

    /// Snapshot of the node at `path` and all its descendants.
    ///
    /// The empty path is `NotFound`; use [`TreeStore::full_tree`] for the
    /// whole forest.
    fn subtree(&self, path: &ServicePath) -> Result<ServiceNode, StoreError>;

    /// Creates a node with counter 0 at `path`.
    ///
    /// Depth-1 paths create roots. Deeper paths require the parent to exist.
    fn create(&self, path: &ServicePath) -> Result<(), StoreError>;

    /// Renames the node at `path` to `new_name`, keeping its parent, counter
    /// and children.
    ///
    /// Fails with `AlreadyExists` if a sibling already uses `new_name`.
    fn rename(&self, path: &ServicePath, new_name: &str) -> Result<(), StoreError>;

    /// Removes the node at `path` and its entire subtree.
    fn delete(&self, path: &ServicePath) -> Result<(), StoreError>;

    /// Adds one to the node at `path` and to every ancestor.
    ///
    /// The whole path must resolve; otherwise nothing is changed and
    /// `NotFound` is returned.
    fn increment(&self, path: &ServicePath) -> Result<(), StoreError>;
}

/// Checks shared by every backend before a rename touches storage.
pub(crate) fn validate_rename(path: &ServicePath, new_name: &str) -> Result<(), StoreError> {
    if path.is_empty() {
        return Err(StoreError::EmptyPath);
    }
    if new_name.is_empty() {
        return Err(StoreError::EmptyName);
    }
    Ok(())
}
