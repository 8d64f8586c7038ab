//! `SQLite`-backed service tree.
//!
//! Nodes live in a single adjacency table (see `schema.sql`). A path is
//! resolved one segment at a time with `parent_id IS ? AND name = ?`, and
//! subtrees are collected with a recursive CTE over ids. Every mutation runs
//! inside one transaction, so a multi-row increment or cascade is either fully
//! applied or not at all.

// SQLite stores counters as i64; the schema CHECK keeps them non-negative.
#![allow(clippy::cast_sign_loss)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info};

use super::{ServiceNode, StoreError, TreeStore, validate_rename};
use crate::path::ServicePath;

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// One row of the `services` table.
#[derive(Debug)]
struct ServiceRow {
    id: i64,
    parent_id: Option<i64>,
    name: String,
    time: i64,
}

/// Service tree stored in `SQLite`.
pub struct SqliteTreeStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteTreeStore {
    /// Opens or creates a database at `path` in WAL mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Self::initialize_connection(&conn)?;
        info!(path = %path.display(), "opened sqlite store");

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Creates an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_connection(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    fn initialize_connection(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    /// Database file path, `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Total number of stored nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn service_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM services", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resolves each prefix of `path` to a row id, stopping at the first segment
/// that does not resolve.
fn resolve_chain(conn: &Connection, path: &ServicePath) -> Result<Vec<i64>, StoreError> {
    let mut stmt =
        conn.prepare_cached("SELECT id FROM services WHERE parent_id IS ?1 AND name = ?2")?;
    let mut chain = Vec::with_capacity(path.depth());
    let mut parent: Option<i64> = None;
    for segment in path.segments() {
        let Some(id) = stmt
            .query_row(params![parent, segment], |row| row.get::<_, i64>(0))
            .optional()?
        else {
            break;
        };
        chain.push(id);
        parent = Some(id);
    }
    Ok(chain)
}

/// Resolves the full path to a row id.
fn resolve(conn: &Connection, path: &ServicePath) -> Result<Option<i64>, StoreError> {
    if path.is_empty() {
        return Ok(None);
    }
    let chain = resolve_chain(conn, path)?;
    Ok(if chain.len() == path.depth() {
        chain.last().copied()
    } else {
        None
    })
}

fn sibling_exists(conn: &Connection, parent: Option<i64>, name: &str) -> Result<bool, StoreError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM services WHERE parent_id IS ?1 AND name = ?2",
            params![parent, name],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn read_rows(
    stmt: &mut rusqlite::Statement<'_>,
    args: impl rusqlite::Params,
) -> Result<Vec<ServiceRow>, StoreError> {
    let rows = stmt
        .query_map(args, |row| {
            Ok(ServiceRow {
                id: row.get(0)?,
                parent_id: row.get(1)?,
                name: row.get(2)?,
                time: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Groups rows by parent and rebuilds nested snapshots under `parent`.
///
/// Rows must arrive ordered by name; grouping preserves that order.
fn assemble(
    by_parent: &HashMap<Option<i64>, Vec<&ServiceRow>>,
    parent: Option<i64>,
) -> Vec<ServiceNode> {
    by_parent
        .get(&parent)
        .map(|rows| {
            rows.iter()
                .map(|row| ServiceNode {
                    service: row.name.clone(),
                    time: row.time as u64,
                    children: assemble(by_parent, Some(row.id)),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn group_by_parent(rows: &[ServiceRow]) -> HashMap<Option<i64>, Vec<&ServiceRow>> {
    let mut by_parent: HashMap<Option<i64>, Vec<&ServiceRow>> = HashMap::new();
    for row in rows {
        by_parent.entry(row.parent_id).or_default().push(row);
    }
    by_parent
}

impl TreeStore for SqliteTreeStore {
    fn exists(&self, path: &ServicePath) -> Result<bool, StoreError> {
        let conn = self.conn();
        Ok(resolve(&conn, path)?.is_some())
    }

    fn counter(&self, path: &ServicePath) -> Result<u64, StoreError> {
        let conn = self.conn();
        let id = resolve(&conn, path)?.ok_or_else(|| StoreError::not_found(path))?;
        let time: i64 =
            conn.query_row("SELECT time FROM services WHERE id = ?1", params![id], |row| {
                row.get(0)
            })?;
        Ok(time as u64)
    }

    fn full_tree(&self) -> Result<Vec<ServiceNode>, StoreError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare_cached("SELECT id, parent_id, name, time FROM services ORDER BY name")?;
        let rows = read_rows(&mut stmt, [])?;
        Ok(assemble(&group_by_parent(&rows), None))
    }

    fn subtree(&self, path: &ServicePath) -> Result<ServiceNode, StoreError> {
        let conn = self.conn();
        let root_id = resolve(&conn, path)?.ok_or_else(|| StoreError::not_found(path))?;
        let mut stmt = conn.prepare_cached(
            "WITH RECURSIVE subtree(id) AS (
                 SELECT ?1
                 UNION ALL
                 SELECT s.id FROM services s JOIN subtree t ON s.parent_id = t.id
             )
             SELECT s.id, s.parent_id, s.name, s.time
             FROM services s JOIN subtree USING (id)
             ORDER BY s.name",
        )?;
        let rows = read_rows(&mut stmt, params![root_id])?;
        let root = rows
            .iter()
            .find(|row| row.id == root_id)
            .ok_or_else(|| StoreError::Corrupt(format!("row {root_id} vanished during read")))?;
        let by_parent = group_by_parent(&rows);

        Ok(ServiceNode {
            service: root.name.clone(),
            time: root.time as u64,
            children: assemble(&by_parent, Some(root_id)),
        })
    }

    fn create(&self, path: &ServicePath) -> Result<(), StoreError> {
        let Some(name) = path.leaf() else {
            return Err(StoreError::EmptyPath);
        };
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let parent = match path.parent() {
            Some(parent_path) => match resolve(&tx, &parent_path)? {
                Some(id) => Some(id),
                None => return Err(StoreError::ParentMissing { path: path.clone() }),
            },
            None => None,
        };
        if sibling_exists(&tx, parent, name)? {
            return Err(StoreError::AlreadyExists { path: path.clone() });
        }
        tx.execute(
            "INSERT INTO services (parent_id, name, time) VALUES (?1, ?2, 0)",
            params![parent, name],
        )?;
        tx.commit()?;

        debug!(path = %path, "service created");
        Ok(())
    }

    fn rename(&self, path: &ServicePath, new_name: &str) -> Result<(), StoreError> {
        validate_rename(path, new_name)?;
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let id = resolve(&tx, path)?.ok_or_else(|| StoreError::not_found(path))?;
        if path.leaf() == Some(new_name) {
            return Ok(());
        }
        let parent: Option<i64> =
            tx.query_row("SELECT parent_id FROM services WHERE id = ?1", params![id], |row| {
                row.get(0)
            })?;
        if sibling_exists(&tx, parent, new_name)? {
            let taken = path.with_leaf(new_name).unwrap_or_default();
            return Err(StoreError::AlreadyExists { path: taken });
        }
        tx.execute(
            "UPDATE services SET name = ?1 WHERE id = ?2",
            params![new_name, id],
        )?;
        tx.commit()?;

        debug!(path = %path, new_name, "service renamed");
        Ok(())
    }

    fn delete(&self, path: &ServicePath) -> Result<(), StoreError> {
        if path.is_empty() {
            return Err(StoreError::EmptyPath);
        }
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let id = resolve(&tx, path)?.ok_or_else(|| StoreError::not_found(path))?;
        let removed = tx.execute(
            "DELETE FROM services WHERE id IN (
                 WITH RECURSIVE subtree(id) AS (
                     SELECT ?1
                     UNION ALL
                     SELECT s.id FROM services s JOIN subtree t ON s.parent_id = t.id
                 )
                 SELECT id FROM subtree
             )",
            params![id],
        )?;
        tx.commit()?;

        debug!(path = %path, removed, "service deleted");
        Ok(())
    }

    fn increment(&self, path: &ServicePath) -> Result<(), StoreError> {
        if path.is_empty() {
            return Err(StoreError::EmptyPath);
        }
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let chain = resolve_chain(&tx, path)?;
        if chain.len() != path.depth() {
            return Err(StoreError::not_found(path));
        }
        {
            let mut stmt = tx.prepare_cached("UPDATE services SET time = time + 1 WHERE id = ?1")?;
            for id in &chain {
                stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_removes_descendant_rows() {
        let store = SqliteTreeStore::in_memory().unwrap();
        for path in ["a", "a/b", "a/b/c", "a/d", "e"] {
            store.create(&ServicePath::parse(path)).unwrap();
        }
        assert_eq!(store.service_count().unwrap(), 5);

        store.delete(&ServicePath::parse("a")).unwrap();
        assert_eq!(store.service_count().unwrap(), 1);
    }

    #[test]
    fn root_names_are_unique_at_the_schema_level() {
        let store = SqliteTreeStore::in_memory().unwrap();
        let conn = store.conn();
        conn.execute("INSERT INTO services (parent_id, name) VALUES (NULL, 'x')", [])
            .unwrap();
        let dup = conn.execute("INSERT INTO services (parent_id, name) VALUES (NULL, 'x')", []);
        assert!(dup.is_err());
    }

    #[test]
    fn in_memory_store_has_no_path() {
        let store = SqliteTreeStore::in_memory().unwrap();
        assert!(store.path().is_none());
    }
}
