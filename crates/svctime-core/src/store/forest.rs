//! Arena-backed service forest.
//!
//! [`ServiceForest`] keeps every node in an id-keyed arena. Each node records
//! its parent id and a name index of its children; roots are indexed by name.
//! Paths are resolved by walking the name indexes one segment at a time, and
//! subtree operations walk child ids, so no string prefix is ever compared.
//!
//! [`ForestStore`] shares one forest between threads behind an `RwLock`. It can
//! run purely in memory or persist the forest to a JSON snapshot file that is
//! rewritten atomically after every successful mutation.
//!
//! Snapshot cost is linear in the size of the forest and includes an fsync,
//! and it is paid on every increment as well. The snapshot mode suits small
//! trees and light tracking traffic. Busy deployments should use the SQLite
//! backend, which updates only the affected ancestor rows.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ServiceNode, StoreError, TreeStore, validate_rename};
use crate::path::ServicePath;

/// Current version of the snapshot file format.
pub const SNAPSHOT_VERSION: u32 = 1;

type NodeId = u64;

#[derive(Debug, Clone)]
struct NodeEntry {
    name: String,
    counter: u64,
    parent: Option<NodeId>,
    children: BTreeMap<String, NodeId>,
}

/// An owned forest of service nodes.
///
/// Every mutating method validates all of its preconditions before touching
/// the arena, so an `Err` always leaves the forest unchanged.
#[derive(Debug, Clone, Default)]
pub struct ServiceForest {
    nodes: HashMap<NodeId, NodeEntry>,
    roots: BTreeMap<String, NodeId>,
    next_id: NodeId,
}

impl ServiceForest {
    /// Creates an empty forest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes across all trees.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Rebuilds a forest from root snapshots.
    ///
    /// # Errors
    ///
    /// Returns `Corrupt` if a name is empty or two siblings share a name.
    pub fn from_roots(roots: &[ServiceNode]) -> Result<Self, StoreError> {
        let mut forest = Self::new();
        for root in roots {
            forest.insert_snapshot(None, root)?;
        }
        Ok(forest)
    }

    fn insert_snapshot(
        &mut self,
        parent: Option<NodeId>,
        node: &ServiceNode,
    ) -> Result<(), StoreError> {
        if node.service.is_empty() {
            return Err(StoreError::Corrupt("empty service name".into()));
        }
        if self.sibling_index(parent).contains_key(&node.service) {
            return Err(StoreError::Corrupt(format!(
                "duplicate sibling name {:?}",
                node.service
            )));
        }
        let id = self.insert(parent, node.service.clone(), node.time);
        for child in &node.children {
            self.insert_snapshot(Some(id), child)?;
        }
        Ok(())
    }

    fn insert(&mut self, parent: Option<NodeId>, name: String, counter: u64) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        self.sibling_index_mut(parent).insert(name.clone(), id);
        self.nodes.insert(
            id,
            NodeEntry {
                name,
                counter,
                parent,
                children: BTreeMap::new(),
            },
        );
        id
    }

    fn sibling_index(&self, parent: Option<NodeId>) -> &BTreeMap<String, NodeId> {
        match parent.and_then(|id| self.nodes.get(&id)) {
            Some(entry) => &entry.children,
            None => &self.roots,
        }
    }

    fn sibling_index_mut(&mut self, parent: Option<NodeId>) -> &mut BTreeMap<String, NodeId> {
        match parent {
            Some(id) => match self.nodes.get_mut(&id) {
                Some(entry) => &mut entry.children,
                None => &mut self.roots,
            },
            None => &mut self.roots,
        }
    }

    /// Resolves each prefix of `path` to a node id, stopping at the first
    /// segment that does not resolve.
    fn resolve_chain(&self, path: &ServicePath) -> Vec<NodeId> {
        let mut chain = Vec::with_capacity(path.depth());
        let mut index = &self.roots;
        for segment in path.segments() {
            let Some(&id) = index.get(segment) else {
                break;
            };
            chain.push(id);
            match self.nodes.get(&id) {
                Some(entry) => index = &entry.children,
                None => break,
            }
        }
        chain
    }

    fn resolve(&self, path: &ServicePath) -> Option<NodeId> {
        if path.is_empty() {
            return None;
        }
        let chain = self.resolve_chain(path);
        if chain.len() == path.depth() {
            chain.last().copied()
        } else {
            None
        }
    }

    fn snapshot(&self, id: NodeId) -> Option<ServiceNode> {
        let entry = self.nodes.get(&id)?;
        Some(ServiceNode {
            service: entry.name.clone(),
            time: entry.counter,
            children: entry
                .children
                .values()
                .filter_map(|&child| self.snapshot(child))
                .collect(),
        })
    }

    /// Ids of `id` and all of its descendants.
    fn subtree_ids(&self, id: NodeId) -> Vec<NodeId> {
        let mut ids = vec![id];
        let mut cursor = 0;
        while let Some(&current) = ids.get(cursor) {
            if let Some(entry) = self.nodes.get(&current) {
                ids.extend(entry.children.values().copied());
            }
            cursor += 1;
        }
        ids
    }

    #[must_use]
    pub fn exists(&self, path: &ServicePath) -> bool {
        self.resolve(path).is_some()
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the path does not resolve.
    pub fn counter(&self, path: &ServicePath) -> Result<u64, StoreError> {
        self.resolve(path)
            .and_then(|id| self.nodes.get(&id))
            .map(|entry| entry.counter)
            .ok_or_else(|| StoreError::not_found(path))
    }

    #[must_use]
    pub fn full_tree(&self) -> Vec<ServiceNode> {
        self.roots
            .values()
            .filter_map(|&id| self.snapshot(id))
            .collect()
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the path is empty or does not resolve.
    pub fn subtree(&self, path: &ServicePath) -> Result<ServiceNode, StoreError> {
        self.resolve(path)
            .and_then(|id| self.snapshot(id))
            .ok_or_else(|| StoreError::not_found(path))
    }

    /// # Errors
    ///
    /// `EmptyPath`, `ParentMissing` or `AlreadyExists`.
    pub fn create(&mut self, path: &ServicePath) -> Result<(), StoreError> {
        let Some(name) = path.leaf() else {
            return Err(StoreError::EmptyPath);
        };
        let parent = match path.parent() {
            Some(parent_path) => match self.resolve(&parent_path) {
                Some(id) => Some(id),
                None => return Err(StoreError::ParentMissing { path: path.clone() }),
            },
            None => None,
        };
        if self.sibling_index(parent).contains_key(name) {
            return Err(StoreError::AlreadyExists { path: path.clone() });
        }
        self.insert(parent, name.to_owned(), 0);
        Ok(())
    }

    /// # Errors
    ///
    /// `EmptyPath`, `EmptyName`, `NotFound`, or `AlreadyExists` when a sibling
    /// already uses `new_name`.
    pub fn rename(&mut self, path: &ServicePath, new_name: &str) -> Result<(), StoreError> {
        validate_rename(path, new_name)?;
        let id = self
            .resolve(path)
            .ok_or_else(|| StoreError::not_found(path))?;
        let (old_name, parent) = match self.nodes.get(&id) {
            Some(entry) => (entry.name.clone(), entry.parent),
            None => return Err(StoreError::not_found(path)),
        };
        if old_name == new_name {
            return Ok(());
        }
        if self.sibling_index(parent).contains_key(new_name) {
            let taken = path.with_leaf(new_name).unwrap_or_default();
            return Err(StoreError::AlreadyExists { path: taken });
        }

        let siblings = self.sibling_index_mut(parent);
        siblings.remove(&old_name);
        siblings.insert(new_name.to_owned(), id);
        if let Some(entry) = self.nodes.get_mut(&id) {
            entry.name = new_name.to_owned();
        }
        Ok(())
    }

    /// # Errors
    ///
    /// `EmptyPath` or `NotFound`.
    pub fn delete(&mut self, path: &ServicePath) -> Result<(), StoreError> {
        if path.is_empty() {
            return Err(StoreError::EmptyPath);
        }
        let id = self
            .resolve(path)
            .ok_or_else(|| StoreError::not_found(path))?;
        let parent = self.nodes.get(&id).and_then(|entry| entry.parent);
        if let Some(name) = path.leaf() {
            self.sibling_index_mut(parent).remove(name);
        }
        for doomed in self.subtree_ids(id) {
            self.nodes.remove(&doomed);
        }
        Ok(())
    }

    /// # Errors
    ///
    /// `EmptyPath`, or `NotFound` if any segment of the path fails to resolve.
    pub fn increment(&mut self, path: &ServicePath) -> Result<(), StoreError> {
        if path.is_empty() {
            return Err(StoreError::EmptyPath);
        }
        let chain = self.resolve_chain(path);
        if chain.len() != path.depth() {
            return Err(StoreError::not_found(path));
        }
        for id in chain {
            if let Some(entry) = self.nodes.get_mut(&id) {
                entry.counter = entry.counter.saturating_add(1);
            }
        }
        Ok(())
    }
}

/// On-disk snapshot layout.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    services: Vec<ServiceNode>,
}

/// Thread-safe [`TreeStore`] over a [`ServiceForest`].
pub struct ForestStore {
    forest: RwLock<ServiceForest>,
    snapshot_path: Option<PathBuf>,
}

impl ForestStore {
    /// Creates an empty store that lives only in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            forest: RwLock::new(ServiceForest::new()),
            snapshot_path: None,
        }
    }

    /// Opens a store persisted at `path`, loading the snapshot if the file
    /// exists and writing an empty one otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or created, or if
    /// the snapshot violates a tree invariant.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let forest = if path.exists() {
            let content = fs::read_to_string(path)?;
            let snapshot: SnapshotFile = serde_json::from_str(&content)?;
            if snapshot.version != SNAPSHOT_VERSION {
                return Err(StoreError::Corrupt(format!(
                    "unsupported snapshot version {}",
                    snapshot.version
                )));
            }
            ServiceForest::from_roots(&snapshot.services)?
        } else {
            let forest = ServiceForest::new();
            write_snapshot(path, &forest)?;
            forest
        };
        info!(path = %path.display(), services = forest.len(), "opened snapshot store");

        Ok(Self {
            forest: RwLock::new(forest),
            snapshot_path: Some(path.to_path_buf()),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, ServiceForest> {
        self.forest.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `op` under the write lock.
    ///
    /// With a snapshot file, `op` runs against a copy that only replaces the
    /// live forest once the snapshot has been written.
    fn mutate<F>(&self, op: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut ServiceForest) -> Result<(), StoreError>,
    {
        let mut forest = self.forest.write().unwrap_or_else(PoisonError::into_inner);
        match &self.snapshot_path {
            None => op(&mut *forest),
            Some(path) => {
                let mut next = forest.clone();
                op(&mut next)?;
                write_snapshot(path, &next)?;
                *forest = next;
                Ok(())
            },
        }
    }
}

/// Writes the forest to `path` via a temp file in the same directory,
/// fsync, then rename.
fn write_snapshot(path: &Path, forest: &ServiceForest) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let snapshot = SnapshotFile {
        version: SNAPSHOT_VERSION,
        services: forest.full_tree(),
    };
    let bytes = serde_json::to_vec_pretty(&snapshot)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.as_file_mut().write_all(&bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

impl TreeStore for ForestStore {
    fn exists(&self, path: &ServicePath) -> Result<bool, StoreError> {
        Ok(self.read().exists(path))
    }

    fn counter(&self, path: &ServicePath) -> Result<u64, StoreError> {
        self.read().counter(path)
    }

    fn full_tree(&self) -> Result<Vec<ServiceNode>, StoreError> {
        Ok(self.read().full_tree())
    }

    fn subtree(&self, path: &ServicePath) -> Result<ServiceNode, StoreError> {
        self.read().subtree(path)
    }

    fn create(&self, path: &ServicePath) -> Result<(), StoreError> {
        self.mutate(|forest| forest.create(path))?;
        debug!(path = %path, "service created");
        Ok(())
    }

    fn rename(&self, path: &ServicePath, new_name: &str) -> Result<(), StoreError> {
        self.mutate(|forest| forest.rename(path, new_name))?;
        debug!(path = %path, new_name, "service renamed");
        Ok(())
    }

    fn delete(&self, path: &ServicePath) -> Result<(), StoreError> {
        self.mutate(|forest| forest.delete(path))?;
        debug!(path = %path, "service deleted");
        Ok(())
    }

    fn increment(&self, path: &ServicePath) -> Result<(), StoreError> {
        self.mutate(|forest| forest.increment(path))
    }
}
