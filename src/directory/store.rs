//! Directory mapping tables and snapshot persistence
//!
//! The three persisted tables of one dimension's directory:
//!
//! ```text
//! primary    primary key          → key semaphores (owning nodes)
//! rows       resource, row id     → primary key
//! secondary  resource, index, key → row ids
//! ```
//!
//! The tables are a plain serializable value; all locking and invariant
//! enforcement lives in [`super::Directory`]. Snapshots are bincode files
//! under the hive's base directory, one per dimension.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::semaphore::KeySemaphore;
use crate::meta::KeyValue;

/// Snapshot file prefix; the dimension name completes it
pub(crate) const SNAPSHOT_PREFIX: &str = "directory_";

// ============================================================================
// Tables
// ============================================================================

/// The mapping tables of one dimension's directory
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct DirectoryTables {
    /// primary key → semaphores
    pub primary: HashMap<KeyValue, Vec<KeySemaphore>>,
    /// resource name → (row id → primary key)
    pub rows: HashMap<String, HashMap<KeyValue, KeyValue>>,
    /// (resource name, index name) → (secondary key → row ids)
    pub secondary: HashMap<(String, String), HashMap<KeyValue, HashSet<KeyValue>>>,
}

impl DirectoryTables {
    /// Row table of a resource, if any rows were ever inserted
    pub fn rows_of(&self, resource: &str) -> Option<&HashMap<KeyValue, KeyValue>> {
        self.rows.get(resource)
    }

    /// Row table of a resource, created on first use
    pub fn rows_mut(&mut self, resource: &str) -> &mut HashMap<KeyValue, KeyValue> {
        self.rows.entry(resource.to_string()).or_default()
    }

    /// Secondary entry table of one index, if any entries were ever inserted
    pub fn secondary_of(
        &self,
        resource: &str,
        index: &str,
    ) -> Option<&HashMap<KeyValue, HashSet<KeyValue>>> {
        self.secondary.get(&(resource.to_string(), index.to_string()))
    }

    /// Secondary entry table of one index, created on first use
    pub fn secondary_mut(
        &mut self,
        resource: &str,
        index: &str,
    ) -> &mut HashMap<KeyValue, HashSet<KeyValue>> {
        self.secondary
            .entry((resource.to_string(), index.to_string()))
            .or_default()
    }

    /// Remove every secondary entry of one index that references any of the
    /// given row ids, dropping secondary keys whose reference set empties out
    pub fn purge_secondary_references(
        &mut self,
        resource: &str,
        index: &str,
        row_ids: &HashSet<KeyValue>,
    ) {
        if let Some(entries) = self
            .secondary
            .get_mut(&(resource.to_string(), index.to_string()))
        {
            for ids in entries.values_mut() {
                ids.retain(|id| !row_ids.contains(id));
            }
            entries.retain(|_, ids| !ids.is_empty());
        }
    }
}

// ============================================================================
// Snapshot I/O
// ============================================================================

/// Load a dimension's directory tables from its snapshot file
///
/// A missing file yields empty tables; a fresh dimension has no snapshot
/// until its first save.
pub(crate) fn load_tables(base_dir: &Path, dimension: &str) -> io::Result<DirectoryTables> {
    let path = snapshot_path(base_dir, dimension);
    if !path.exists() {
        return Ok(DirectoryTables::default());
    }
    let data = std::fs::read(&path)?;
    bincode::deserialize(&data)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

/// Write a dimension's directory tables to its snapshot file
pub(crate) fn save_tables(
    base_dir: &Path,
    dimension: &str,
    tables: &DirectoryTables,
) -> io::Result<()> {
    std::fs::create_dir_all(base_dir)?;
    let data = bincode::serialize(tables)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    std::fs::write(snapshot_path(base_dir, dimension), &data)
}

/// Remove a dimension's snapshot file, if one was ever written
pub(crate) fn delete_snapshot(base_dir: &Path, dimension: &str) -> io::Result<()> {
    let path = snapshot_path(base_dir, dimension);
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

fn snapshot_path(base_dir: &Path, dimension: &str) -> std::path::PathBuf {
    base_dir.join(format!("{}{}.bin", SNAPSHOT_PREFIX, dimension))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_snapshot_yields_empty_tables() {
        let dir = tempfile::tempdir().unwrap();
        let tables = load_tables(dir.path(), "customer").unwrap();
        assert!(tables.primary.is_empty());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();

        let mut tables = DirectoryTables::default();
        tables.primary.insert(
            KeyValue::Int(7),
            vec![KeySemaphore::new(KeyValue::Int(7), 1)],
        );
        tables
            .rows_mut("orders")
            .insert(KeyValue::Int(100), KeyValue::Int(7));
        tables
            .secondary_mut("orders", "email")
            .entry(KeyValue::from("a@b.c"))
            .or_default()
            .insert(KeyValue::Int(100));
        save_tables(dir.path(), "customer", &tables).unwrap();

        let loaded = load_tables(dir.path(), "customer").unwrap();
        assert_eq!(loaded.primary.len(), 1);
        assert_eq!(
            loaded.rows_of("orders").unwrap().get(&KeyValue::Int(100)),
            Some(&KeyValue::Int(7))
        );
        assert!(loaded
            .secondary_of("orders", "email")
            .unwrap()
            .get(&KeyValue::from("a@b.c"))
            .unwrap()
            .contains(&KeyValue::Int(100)));
    }

    #[test]
    fn test_purge_secondary_references() {
        let mut tables = DirectoryTables::default();
        let entries = tables.secondary_mut("orders", "email");
        entries
            .entry(KeyValue::from("a@b.c"))
            .or_default()
            .extend([KeyValue::Int(1), KeyValue::Int(2)]);
        entries
            .entry(KeyValue::from("d@e.f"))
            .or_default()
            .insert(KeyValue::Int(2));

        let gone: HashSet<KeyValue> = [KeyValue::Int(2)].into_iter().collect();
        tables.purge_secondary_references("orders", "email", &gone);

        let entries = tables.secondary_of("orders", "email").unwrap();
        assert_eq!(
            entries.get(&KeyValue::from("a@b.c")).unwrap().len(),
            1,
            "surviving row id should remain"
        );
        assert!(
            entries.get(&KeyValue::from("d@e.f")).is_none(),
            "emptied secondary key should be dropped"
        );
    }
}
