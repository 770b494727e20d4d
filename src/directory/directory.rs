//! The directory engine
//!
//! Single authority for key→node resolution and for all mutations of one
//! dimension's mapping tables. Every mutating operation evaluates the
//! read-only gate inside the critical section that performs the mutation:
//! the hive metadata read guard is held across the table write, so a
//! concurrent hive-level read-only flip linearizes against in-flight
//! mutations instead of racing them. Cascading deletes run entirely under
//! one table write guard, so no reader observes a partially-cascaded state.
//!
//! Resolution for a secondary key always walks
//! secondary key → row ids → primary keys → nodes, computed fresh on every
//! call. Re-parenting a row to a different primary key therefore changes
//! what its secondary keys resolve to without touching the secondary
//! entries themselves.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::semaphore::KeySemaphore;
use super::store::{self, DirectoryTables};
use crate::assigner::Assigner;
use crate::hive::HiveMeta;
use crate::meta::{KeyType, KeyValue, PartitionDimension, Resource};
use crate::{HiveError, Result};

// ============================================================================
// Directory
// ============================================================================

/// Key→node resolution and mapping-table mutation for one dimension
pub struct Directory {
    /// The owning dimension's name
    dimension: String,
    /// Shared hive metadata; also carries the hive-level read-only gate
    meta: Arc<RwLock<HiveMeta>>,
    /// Shared assignment strategy (consulted only on first key insert)
    assigner: Arc<RwLock<Box<dyn Assigner>>>,
    /// The mapping tables
    state: RwLock<DirectoryTables>,
    /// Snapshot location
    base_dir: std::path::PathBuf,
    /// Whether the tables changed since the last save
    dirty: AtomicBool,
}

impl Directory {
    /// Open the directory of a dimension, loading its snapshot if present
    pub(crate) fn open(
        dimension: impl Into<String>,
        meta: Arc<RwLock<HiveMeta>>,
        assigner: Arc<RwLock<Box<dyn Assigner>>>,
        base_dir: &Path,
    ) -> Result<Self> {
        let dimension = dimension.into();
        let tables = store::load_tables(base_dir, &dimension)?;
        Ok(Self {
            dimension,
            meta,
            assigner,
            state: RwLock::new(tables),
            base_dir: base_dir.to_path_buf(),
            dirty: AtomicBool::new(false),
        })
    }

    /// The owning dimension's name
    pub fn dimension(&self) -> &str {
        &self.dimension
    }

    /// Persist the mapping tables if they changed since the last save
    pub fn save(&self) -> Result<()> {
        if !self.dirty.load(Ordering::Acquire) {
            return Ok(());
        }
        let state = self.state.read();
        store::save_tables(&self.base_dir, &self.dimension, &state)?;
        self.dirty.store(false, Ordering::Release);
        Ok(())
    }

    // ========================================================================
    // Primary Index Keys
    // ========================================================================

    /// Bind a new primary key to its owning node(s)
    ///
    /// Consults the assigner exactly once; the persisted semaphores are the
    /// authority for every later resolution of this key.
    pub fn insert_primary_index_key(&self, key: KeyValue) -> Result<Vec<KeySemaphore>> {
        let meta = self.meta.read();
        self.check_hive_writable(&meta)?;
        let dim = self.dim(&meta)?;
        check_key_type(dim.key_type, &key)?;

        let nodes = dim.node_group().nodes();
        if nodes.is_empty() {
            return Err(HiveError::NoNodesAvailable(self.dimension.clone()));
        }

        let mut state = self.state.write();
        if state.primary.contains_key(&key) {
            return Err(HiveError::AlreadyExists(format!("primary index key {}", key)));
        }

        let owners = self.assigner.read().choose_nodes(&nodes, &key);
        if owners.is_empty() {
            return Err(HiveError::NoNodesAvailable(self.dimension.clone()));
        }
        let semaphores: Vec<KeySemaphore> = owners
            .into_iter()
            .map(|node_id| KeySemaphore::new(key.clone(), node_id))
            .collect();
        state.primary.insert(key, semaphores.clone());
        self.dirty.store(true, Ordering::Release);
        Ok(semaphores)
    }

    pub fn does_primary_index_key_exist(&self, key: &KeyValue) -> bool {
        self.state.read().primary.contains_key(key)
    }

    /// The persisted node bindings of a primary key; empty if the key is
    /// unknown. More than one semaphore means the assigner replicated the key.
    pub fn get_key_semaphores_of_primary_index_key(&self, key: &KeyValue) -> Vec<KeySemaphore> {
        self.state
            .read()
            .primary
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Key-level read-only flag of a primary key
    pub fn get_read_only_of_primary_index_key(&self, key: &KeyValue) -> Result<bool> {
        let state = self.state.read();
        let semaphores = state
            .primary
            .get(key)
            .ok_or_else(|| HiveError::NotFound(format!("primary index key {}", key)))?;
        Ok(semaphores.iter().any(|s| s.read_only))
    }

    /// Toggle the key-level read-only flag; the node-level flag is untouched
    pub fn update_primary_index_key_read_only(&self, key: &KeyValue, read_only: bool) -> Result<()> {
        let meta = self.meta.read();
        self.check_hive_writable(&meta)?;

        let mut state = self.state.write();
        let semaphores = state
            .primary
            .get_mut(key)
            .ok_or_else(|| HiveError::NotFound(format!("primary index key {}", key)))?;
        for semaphore in semaphores.iter_mut() {
            semaphore.read_only = read_only;
        }
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Delete a primary key and everything that references it
    ///
    /// Cascades through every resource of the dimension: rows parented to
    /// the key, then every secondary entry referencing those rows, then the
    /// key's semaphores. The whole cascade runs under one write guard.
    pub fn delete_primary_index_key(&self, key: &KeyValue) -> Result<()> {
        let meta = self.meta.read();
        self.check_hive_writable(&meta)?;
        let dim = self.dim(&meta)?;

        let mut state = self.state.write();
        if !state.primary.contains_key(key) {
            return Err(HiveError::NotFound(format!("primary index key {}", key)));
        }
        check_key_writable(&state, key)?;

        for resource in dim.resources() {
            if resource.is_partitioning {
                // Secondary indexes of the partitioning resource reference
                // primary keys directly
                let gone: HashSet<KeyValue> = [key.clone()].into_iter().collect();
                for index in resource.secondary_indexes() {
                    state.purge_secondary_references(&resource.name, &index.name, &gone);
                }
            } else {
                let row_ids: HashSet<KeyValue> = state
                    .rows_of(&resource.name)
                    .map(|rows| {
                        rows.iter()
                            .filter(|(_, primary)| *primary == key)
                            .map(|(id, _)| id.clone())
                            .collect()
                    })
                    .unwrap_or_default();
                if row_ids.is_empty() {
                    continue;
                }
                for index in resource.secondary_indexes() {
                    state.purge_secondary_references(&resource.name, &index.name, &row_ids);
                }
                if let Some(rows) = state.rows.get_mut(&resource.name) {
                    rows.retain(|id, _| !row_ids.contains(id));
                }
            }
        }

        state.primary.remove(key);
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    // ========================================================================
    // Resource Rows
    // ========================================================================

    /// Insert a resource row parented to an existing primary key
    pub fn insert_resource_id(
        &self,
        resource: &str,
        id: KeyValue,
        primary_key: KeyValue,
    ) -> Result<()> {
        let meta = self.meta.read();
        self.check_hive_writable(&meta)?;
        let dim = self.dim(&meta)?;
        let res = self.resource(dim, resource)?;
        check_key_type(res.key_type, &id)?;
        check_key_type(dim.key_type, &primary_key)?;

        if res.is_partitioning {
            // The partitioning resource's id space is the primary key space
            if id != primary_key {
                return Err(HiveError::ConfigMismatch(format!(
                    "row id of partitioning resource {} must equal its primary key",
                    resource
                )));
            }
            let state = self.state.read();
            if !state.primary.contains_key(&primary_key) {
                return Err(HiveError::NotFound(format!("primary index key {}", primary_key)));
            }
            return Ok(());
        }

        let mut state = self.state.write();
        if !state.primary.contains_key(&primary_key) {
            return Err(HiveError::NotFound(format!("primary index key {}", primary_key)));
        }
        check_key_writable(&state, &primary_key)?;
        let rows = state.rows_mut(resource);
        if rows.contains_key(&id) {
            return Err(HiveError::AlreadyExists(format!("resource {} id {}", resource, id)));
        }
        rows.insert(id, primary_key);
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    pub fn does_resource_id_exist(&self, resource: &str, id: &KeyValue) -> Result<bool> {
        let meta = self.meta.read();
        let dim = self.dim(&meta)?;
        let res = self.resource(dim, resource)?;
        let state = self.state.read();
        if res.is_partitioning {
            return Ok(state.primary.contains_key(id));
        }
        Ok(state
            .rows_of(resource)
            .map(|rows| rows.contains_key(id))
            .unwrap_or(false))
    }

    /// The primary key a resource row is parented to
    pub fn get_primary_index_key_of_resource_id(
        &self,
        resource: &str,
        id: &KeyValue,
    ) -> Result<KeyValue> {
        let meta = self.meta.read();
        let dim = self.dim(&meta)?;
        let res = self.resource(dim, resource)?;
        let state = self.state.read();
        if res.is_partitioning {
            if state.primary.contains_key(id) {
                return Ok(id.clone());
            }
            return Err(HiveError::NotFound(format!("primary index key {}", id)));
        }
        state
            .rows_of(resource)
            .and_then(|rows| rows.get(id).cloned())
            .ok_or_else(|| HiveError::NotFound(format!("resource {} id {}", resource, id)))
    }

    /// All rows of a resource parented to the given primary key
    pub fn get_resource_ids_of_primary_index_key(
        &self,
        resource: &str,
        key: &KeyValue,
    ) -> Result<Vec<KeyValue>> {
        let meta = self.meta.read();
        let dim = self.dim(&meta)?;
        let res = self.resource(dim, resource)?;
        let state = self.state.read();
        if res.is_partitioning {
            if state.primary.contains_key(key) {
                return Ok(vec![key.clone()]);
            }
            return Ok(Vec::new());
        }
        Ok(state
            .rows_of(resource)
            .map(|rows| {
                rows.iter()
                    .filter(|(_, primary)| *primary == key)
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Re-parent a resource row to a different primary key
    ///
    /// The row's secondary entries are untouched: they reference the row id,
    /// so their resolution follows the new primary key automatically.
    pub fn update_primary_index_key_of_resource_id(
        &self,
        resource: &str,
        id: &KeyValue,
        new_primary_key: KeyValue,
    ) -> Result<()> {
        let meta = self.meta.read();
        self.check_hive_writable(&meta)?;
        let dim = self.dim(&meta)?;
        let res = self.resource(dim, resource)?;
        if res.is_partitioning {
            return Err(HiveError::ConfigMismatch(format!(
                "rows of partitioning resource {} cannot be re-parented",
                resource
            )));
        }
        check_key_type(dim.key_type, &new_primary_key)?;

        let mut state = self.state.write();
        if !state.primary.contains_key(&new_primary_key) {
            return Err(HiveError::NotFound(format!(
                "primary index key {}",
                new_primary_key
            )));
        }
        let old_primary = state
            .rows_of(resource)
            .and_then(|rows| rows.get(id).cloned())
            .ok_or_else(|| HiveError::NotFound(format!("resource {} id {}", resource, id)))?;
        check_key_writable(&state, &old_primary)?;
        check_key_writable(&state, &new_primary_key)?;
        state.rows_mut(resource).insert(id.clone(), new_primary_key);
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Delete a resource row and its secondary entries
    pub fn delete_resource_id(&self, resource: &str, id: &KeyValue) -> Result<()> {
        let meta = self.meta.read();
        self.check_hive_writable(&meta)?;
        let dim = self.dim(&meta)?;
        let res = self.resource(dim, resource)?;
        if res.is_partitioning {
            return Err(HiveError::ConfigMismatch(format!(
                "rows of partitioning resource {} are deleted through their primary key",
                resource
            )));
        }

        let mut state = self.state.write();
        let primary = state
            .rows_of(resource)
            .and_then(|rows| rows.get(id).cloned())
            .ok_or_else(|| HiveError::NotFound(format!("resource {} id {}", resource, id)))?;
        check_key_writable(&state, &primary)?;

        let gone: HashSet<KeyValue> = [id.clone()].into_iter().collect();
        for index in res.secondary_indexes() {
            state.purge_secondary_references(resource, &index.name, &gone);
        }
        if let Some(rows) = state.rows.get_mut(resource) {
            rows.remove(id);
        }
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    // ========================================================================
    // Secondary Index Keys
    // ========================================================================

    /// Insert a secondary key entry referencing an existing resource row
    pub fn insert_secondary_index_key(
        &self,
        resource: &str,
        index: &str,
        secondary_key: KeyValue,
        resource_id: KeyValue,
    ) -> Result<()> {
        let meta = self.meta.read();
        self.check_hive_writable(&meta)?;
        let dim = self.dim(&meta)?;
        let res = self.resource(dim, resource)?;
        let idx = self.index(res, index)?;
        check_key_type(idx.key_type, &secondary_key)?;
        check_key_type(res.key_type, &resource_id)?;

        let mut state = self.state.write();
        let primary = resolve_row(&state, res, &resource_id)?;
        check_key_writable(&state, &primary)?;

        let entries = state.secondary_mut(resource, index);
        let ids = entries.entry(secondary_key.clone()).or_default();
        if !ids.insert(resource_id.clone()) {
            return Err(HiveError::AlreadyExists(format!(
                "secondary key {} for resource {} id {}",
                secondary_key, resource, resource_id
            )));
        }
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Delete one secondary key entry
    pub fn delete_secondary_index_key(
        &self,
        resource: &str,
        index: &str,
        secondary_key: &KeyValue,
        resource_id: &KeyValue,
    ) -> Result<()> {
        let meta = self.meta.read();
        self.check_hive_writable(&meta)?;
        let dim = self.dim(&meta)?;
        let res = self.resource(dim, resource)?;
        self.index(res, index)?;

        let mut state = self.state.write();
        if let Ok(primary) = resolve_row(&state, res, resource_id) {
            check_key_writable(&state, &primary)?;
        }
        let entries = state.secondary_mut(resource, index);
        let removed = entries
            .get_mut(secondary_key)
            .map(|ids| ids.remove(resource_id))
            .unwrap_or(false);
        if !removed {
            return Err(HiveError::NotFound(format!(
                "secondary key {} for resource {} id {}",
                secondary_key, resource, resource_id
            )));
        }
        entries.retain(|_, ids| !ids.is_empty());
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    pub fn does_secondary_index_key_exist(
        &self,
        resource: &str,
        index: &str,
        secondary_key: &KeyValue,
    ) -> Result<bool> {
        let meta = self.meta.read();
        let dim = self.dim(&meta)?;
        let res = self.resource(dim, resource)?;
        self.index(res, index)?;
        let state = self.state.read();
        Ok(state
            .secondary_of(resource, index)
            .and_then(|entries| entries.get(secondary_key))
            .map(|ids| !ids.is_empty())
            .unwrap_or(false))
    }

    /// All secondary keys of one index referencing the given row
    pub fn get_secondary_index_keys_of_resource_id(
        &self,
        resource: &str,
        index: &str,
        resource_id: &KeyValue,
    ) -> Result<Vec<KeyValue>> {
        let meta = self.meta.read();
        let dim = self.dim(&meta)?;
        let res = self.resource(dim, resource)?;
        self.index(res, index)?;
        let state = self.state.read();
        Ok(state
            .secondary_of(resource, index)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(_, ids)| ids.contains(resource_id))
                    .map(|(key, _)| key.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    /// The rows a secondary key references
    pub fn get_resource_ids_of_secondary_index_key(
        &self,
        resource: &str,
        index: &str,
        secondary_key: &KeyValue,
    ) -> Result<Vec<KeyValue>> {
        let meta = self.meta.read();
        let dim = self.dim(&meta)?;
        let res = self.resource(dim, resource)?;
        self.index(res, index)?;
        let state = self.state.read();
        Ok(state
            .secondary_of(resource, index)
            .and_then(|entries| entries.get(secondary_key))
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Two-hop resolution: secondary key → row ids → primary keys
    ///
    /// Always computed from the current row parenting, never cached on the
    /// secondary entry.
    pub fn get_primary_index_keys_of_secondary_index_key(
        &self,
        resource: &str,
        index: &str,
        secondary_key: &KeyValue,
    ) -> Result<Vec<KeyValue>> {
        let meta = self.meta.read();
        let dim = self.dim(&meta)?;
        let res = self.resource(dim, resource)?;
        self.index(res, index)?;
        let state = self.state.read();
        Ok(resolve_primary_keys(&state, res, secondary_key, index))
    }

    /// Three-hop resolution: secondary key → row ids → primary keys → nodes
    pub fn get_key_semaphores_of_secondary_index_key(
        &self,
        resource: &str,
        index: &str,
        secondary_key: &KeyValue,
    ) -> Result<Vec<KeySemaphore>> {
        let meta = self.meta.read();
        let dim = self.dim(&meta)?;
        let res = self.resource(dim, resource)?;
        self.index(res, index)?;
        let state = self.state.read();
        let semaphores = resolve_primary_keys(&state, res, secondary_key, index)
            .into_iter()
            .flat_map(|primary| state.primary.get(&primary).cloned().unwrap_or_default())
            .collect();
        Ok(semaphores)
    }

    /// Row → node resolution, used when issuing connections for a dependent
    /// resource row
    pub fn get_key_semaphores_of_resource_id(
        &self,
        resource: &str,
        id: &KeyValue,
    ) -> Result<Vec<KeySemaphore>> {
        let primary = self.get_primary_index_key_of_resource_id(resource, id)?;
        Ok(self.get_key_semaphores_of_primary_index_key(&primary))
    }

    // ========================================================================
    // Administrative Purges
    // ========================================================================

    /// Drop every mapping of a removed resource
    pub(crate) fn purge_resource(&self, resource: &str) {
        let mut state = self.state.write();
        state.rows.remove(resource);
        state.secondary.retain(|(res, _), _| res != resource);
        self.dirty.store(true, Ordering::Release);
    }

    /// Drop every entry of a removed secondary index
    pub(crate) fn purge_secondary_index(&self, resource: &str, index: &str) {
        let mut state = self.state.write();
        state
            .secondary
            .remove(&(resource.to_string(), index.to_string()));
        self.dirty.store(true, Ordering::Release);
    }

    /// Remove the on-disk snapshot when the owning dimension is dropped, so
    /// a later dimension of the same name starts empty
    pub(crate) fn delete_snapshot(&self) -> Result<()> {
        store::delete_snapshot(&self.base_dir, &self.dimension)?;
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn check_hive_writable(&self, meta: &HiveMeta) -> Result<()> {
        if meta.read_only {
            return Err(HiveError::ReadOnlyViolation("hive is read-only".to_string()));
        }
        Ok(())
    }

    fn dim<'a>(&self, meta: &'a HiveMeta) -> Result<&'a PartitionDimension> {
        meta.dimensions
            .get(&self.dimension)
            .ok_or_else(|| HiveError::NotFound(format!("partition dimension {}", self.dimension)))
    }

    fn resource<'a>(&self, dim: &'a PartitionDimension, name: &str) -> Result<&'a Resource> {
        dim.get_resource(name)
            .ok_or_else(|| HiveError::NotFound(format!("resource {}", name)))
    }

    fn index<'a>(
        &self,
        resource: &'a Resource,
        name: &str,
    ) -> Result<&'a crate::meta::SecondaryIndex> {
        resource.get_secondary_index(name).ok_or_else(|| {
            HiveError::NotFound(format!("secondary index {} on resource {}", name, resource.name))
        })
    }
}

/// Row id → primary key under the partitioning-resource delegation rule
fn resolve_row(state: &DirectoryTables, res: &Resource, id: &KeyValue) -> Result<KeyValue> {
    if res.is_partitioning {
        if state.primary.contains_key(id) {
            return Ok(id.clone());
        }
        return Err(HiveError::NotFound(format!("primary index key {}", id)));
    }
    state
        .rows_of(&res.name)
        .and_then(|rows| rows.get(id).cloned())
        .ok_or_else(|| HiveError::NotFound(format!("resource {} id {}", res.name, id)))
}

/// Current primary keys behind a secondary key, deduplicated
fn resolve_primary_keys(
    state: &DirectoryTables,
    res: &Resource,
    secondary_key: &KeyValue,
    index: &str,
) -> Vec<KeyValue> {
    let Some(ids) = state
        .secondary_of(&res.name, index)
        .and_then(|entries| entries.get(secondary_key))
    else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for id in ids {
        let primary = if res.is_partitioning {
            id.clone()
        } else {
            match state.rows_of(&res.name).and_then(|rows| rows.get(id)) {
                Some(primary) => primary.clone(),
                None => continue,
            }
        };
        if seen.insert(primary.clone()) {
            keys.push(primary);
        }
    }
    keys
}

fn check_key_type(expected: KeyType, value: &KeyValue) -> Result<()> {
    if value.kind() != expected {
        return Err(HiveError::TypeMismatch {
            expected,
            actual: value.kind(),
        });
    }
    Ok(())
}

/// Key-level read-only check, evaluated under the table write guard
fn check_key_writable(state: &DirectoryTables, key: &KeyValue) -> Result<()> {
    if let Some(semaphores) = state.primary.get(key) {
        if semaphores.iter().any(|s| s.read_only) {
            return Err(HiveError::ReadOnlyViolation(format!(
                "primary index key {} is read-only",
                key
            )));
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assigner::HashAssigner;
    use crate::meta::{KeyType, Node, PartitionDimension, Resource, SecondaryIndex};

    fn test_node(id: u32, name: &str) -> Node {
        let mut n = Node::new(name, format!("db://{}", name));
        n.id = id;
        n
    }

    struct Fixture {
        meta: Arc<RwLock<HiveMeta>>,
        directory: Directory,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let mut dim = PartitionDimension::new("customer", KeyType::Integer);
        dim.node_group_mut().add_node(test_node(1, "alpha")).unwrap();
        dim.node_group_mut().add_node(test_node(2, "beta")).unwrap();
        dim.add_resource(
            Resource::new("orders", KeyType::Integer, false)
                .with_secondary_index(SecondaryIndex::new("email", KeyType::String)),
        )
        .unwrap();
        dim.add_resource(Resource::new("customer", KeyType::Integer, true))
            .unwrap();

        let mut meta = HiveMeta::new();
        meta.dimensions.insert("customer".to_string(), dim);
        let meta = Arc::new(RwLock::new(meta));

        let assigner: Arc<RwLock<Box<dyn Assigner>>> =
            Arc::new(RwLock::new(Box::new(HashAssigner::new())));
        let dir = tempfile::tempdir().unwrap();
        let directory =
            Directory::open("customer", meta.clone(), assigner, dir.path()).unwrap();
        Fixture {
            meta,
            directory,
            _dir: dir,
        }
    }

    #[test]
    fn test_insert_primary_persists_binding() {
        let f = fixture();
        let semaphores = f.directory.insert_primary_index_key(KeyValue::Int(1)).unwrap();
        assert_eq!(semaphores.len(), 1);
        assert!(f.directory.does_primary_index_key_exist(&KeyValue::Int(1)));

        let resolved = f
            .directory
            .get_key_semaphores_of_primary_index_key(&KeyValue::Int(1));
        assert_eq!(resolved, semaphores);
    }

    #[test]
    fn test_insert_primary_twice_fails() {
        let f = fixture();
        f.directory.insert_primary_index_key(KeyValue::Int(1)).unwrap();
        let err = f.directory.insert_primary_index_key(KeyValue::Int(1)).unwrap_err();
        assert!(matches!(err, HiveError::AlreadyExists(_)));
    }

    #[test]
    fn test_insert_primary_wrong_type_fails() {
        let f = fixture();
        let err = f
            .directory
            .insert_primary_index_key(KeyValue::from("not-an-int"))
            .unwrap_err();
        assert!(matches!(err, HiveError::TypeMismatch { .. }));
    }

    #[test]
    fn test_insert_primary_no_nodes_fails() {
        let f = fixture();
        {
            let mut meta = f.meta.write();
            let dim = meta.dimensions.get_mut("customer").unwrap();
            dim.node_group_mut().remove_node(1).unwrap();
            dim.node_group_mut().remove_node(2).unwrap();
        }
        let err = f.directory.insert_primary_index_key(KeyValue::Int(1)).unwrap_err();
        assert!(matches!(err, HiveError::NoNodesAvailable(_)));
    }

    #[test]
    fn test_key_read_only_toggle() {
        let f = fixture();
        f.directory.insert_primary_index_key(KeyValue::Int(1)).unwrap();
        assert!(!f
            .directory
            .get_read_only_of_primary_index_key(&KeyValue::Int(1))
            .unwrap());

        f.directory
            .update_primary_index_key_read_only(&KeyValue::Int(1), true)
            .unwrap();
        assert!(f
            .directory
            .get_read_only_of_primary_index_key(&KeyValue::Int(1))
            .unwrap());

        // A read-only key rejects dependent mutations
        let err = f
            .directory
            .insert_resource_id("orders", KeyValue::Int(10), KeyValue::Int(1))
            .unwrap_err();
        assert!(matches!(err, HiveError::ReadOnlyViolation(_)));

        f.directory
            .update_primary_index_key_read_only(&KeyValue::Int(1), false)
            .unwrap();
        f.directory
            .insert_resource_id("orders", KeyValue::Int(10), KeyValue::Int(1))
            .unwrap();
    }

    #[test]
    fn test_update_read_only_of_missing_key_fails() {
        let f = fixture();
        let err = f
            .directory
            .update_primary_index_key_read_only(&KeyValue::Int(404), true)
            .unwrap_err();
        assert!(matches!(err, HiveError::NotFound(_)));
    }

    #[test]
    fn test_hive_read_only_gate_blocks_mutation() {
        let f = fixture();
        f.meta.write().read_only = true;
        let err = f.directory.insert_primary_index_key(KeyValue::Int(1)).unwrap_err();
        assert!(matches!(err, HiveError::ReadOnlyViolation(_)));

        f.meta.write().read_only = false;
        f.directory.insert_primary_index_key(KeyValue::Int(1)).unwrap();
    }

    #[test]
    fn test_resource_id_referential_integrity() {
        let f = fixture();
        let err = f
            .directory
            .insert_resource_id("orders", KeyValue::Int(10), KeyValue::Int(99))
            .unwrap_err();
        assert!(matches!(err, HiveError::NotFound(_)));
    }

    #[test]
    fn test_resource_id_round_trip() {
        let f = fixture();
        f.directory.insert_primary_index_key(KeyValue::Int(1)).unwrap();
        f.directory
            .insert_resource_id("orders", KeyValue::Int(10), KeyValue::Int(1))
            .unwrap();

        assert!(f
            .directory
            .does_resource_id_exist("orders", &KeyValue::Int(10))
            .unwrap());
        assert_eq!(
            f.directory
                .get_primary_index_key_of_resource_id("orders", &KeyValue::Int(10))
                .unwrap(),
            KeyValue::Int(1)
        );
        assert_eq!(
            f.directory
                .get_resource_ids_of_primary_index_key("orders", &KeyValue::Int(1))
                .unwrap(),
            vec![KeyValue::Int(10)]
        );
    }

    #[test]
    fn test_update_primary_of_resource_id() {
        let f = fixture();
        f.directory.insert_primary_index_key(KeyValue::Int(1)).unwrap();
        f.directory.insert_primary_index_key(KeyValue::Int(2)).unwrap();
        f.directory
            .insert_resource_id("orders", KeyValue::Int(10), KeyValue::Int(1))
            .unwrap();

        f.directory
            .update_primary_index_key_of_resource_id("orders", &KeyValue::Int(10), KeyValue::Int(2))
            .unwrap();
        assert_eq!(
            f.directory
                .get_primary_index_key_of_resource_id("orders", &KeyValue::Int(10))
                .unwrap(),
            KeyValue::Int(2)
        );

        // Re-parenting to an unknown key is rejected
        let err = f
            .directory
            .update_primary_index_key_of_resource_id("orders", &KeyValue::Int(10), KeyValue::Int(9))
            .unwrap_err();
        assert!(matches!(err, HiveError::NotFound(_)));
    }

    #[test]
    fn test_secondary_key_resolution_follows_reparenting() {
        let f = fixture();
        f.directory.insert_primary_index_key(KeyValue::Int(1)).unwrap();
        f.directory.insert_primary_index_key(KeyValue::Int(2)).unwrap();
        f.directory
            .insert_resource_id("orders", KeyValue::Int(10), KeyValue::Int(1))
            .unwrap();
        f.directory
            .insert_secondary_index_key("orders", "email", KeyValue::from("foo"), KeyValue::Int(10))
            .unwrap();

        let n1 = f
            .directory
            .get_key_semaphores_of_primary_index_key(&KeyValue::Int(1))[0]
            .node_id;
        let n2 = f
            .directory
            .get_key_semaphores_of_primary_index_key(&KeyValue::Int(2))[0]
            .node_id;

        let resolved = f
            .directory
            .get_key_semaphores_of_secondary_index_key("orders", "email", &KeyValue::from("foo"))
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].node_id, n1);

        // Re-parent the row; the same secondary key must now resolve to the
        // new owner without the entry being re-inserted
        f.directory
            .update_primary_index_key_of_resource_id("orders", &KeyValue::Int(10), KeyValue::Int(2))
            .unwrap();
        let resolved = f
            .directory
            .get_key_semaphores_of_secondary_index_key("orders", "email", &KeyValue::from("foo"))
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].node_id, n2);
    }

    #[test]
    fn test_secondary_key_requires_existing_row() {
        let f = fixture();
        f.directory.insert_primary_index_key(KeyValue::Int(1)).unwrap();
        let err = f
            .directory
            .insert_secondary_index_key("orders", "email", KeyValue::from("foo"), KeyValue::Int(10))
            .unwrap_err();
        assert!(matches!(err, HiveError::NotFound(_)));
    }

    #[test]
    fn test_secondary_key_lookups() {
        let f = fixture();
        f.directory.insert_primary_index_key(KeyValue::Int(1)).unwrap();
        f.directory
            .insert_resource_id("orders", KeyValue::Int(10), KeyValue::Int(1))
            .unwrap();
        f.directory
            .insert_resource_id("orders", KeyValue::Int(11), KeyValue::Int(1))
            .unwrap();
        f.directory
            .insert_secondary_index_key("orders", "email", KeyValue::from("foo"), KeyValue::Int(10))
            .unwrap();
        f.directory
            .insert_secondary_index_key("orders", "email", KeyValue::from("foo"), KeyValue::Int(11))
            .unwrap();

        assert!(f
            .directory
            .does_secondary_index_key_exist("orders", "email", &KeyValue::from("foo"))
            .unwrap());
        let mut ids = f
            .directory
            .get_resource_ids_of_secondary_index_key("orders", "email", &KeyValue::from("foo"))
            .unwrap();
        ids.sort_by_key(|id| match id {
            KeyValue::Int(v) => *v,
            _ => 0,
        });
        assert_eq!(ids, vec![KeyValue::Int(10), KeyValue::Int(11)]);

        // Both rows share one parent, so the two-hop resolve deduplicates
        let primaries = f
            .directory
            .get_primary_index_keys_of_secondary_index_key("orders", "email", &KeyValue::from("foo"))
            .unwrap();
        assert_eq!(primaries, vec![KeyValue::Int(1)]);

        let keys = f
            .directory
            .get_secondary_index_keys_of_resource_id("orders", "email", &KeyValue::Int(10))
            .unwrap();
        assert_eq!(keys, vec![KeyValue::from("foo")]);
    }

    #[test]
    fn test_duplicate_secondary_pairing_fails() {
        let f = fixture();
        f.directory.insert_primary_index_key(KeyValue::Int(1)).unwrap();
        f.directory
            .insert_resource_id("orders", KeyValue::Int(10), KeyValue::Int(1))
            .unwrap();
        f.directory
            .insert_secondary_index_key("orders", "email", KeyValue::from("foo"), KeyValue::Int(10))
            .unwrap();
        let err = f
            .directory
            .insert_secondary_index_key("orders", "email", KeyValue::from("foo"), KeyValue::Int(10))
            .unwrap_err();
        assert!(matches!(err, HiveError::AlreadyExists(_)));
    }

    #[test]
    fn test_cascade_delete_completeness() {
        let f = fixture();
        f.directory.insert_primary_index_key(KeyValue::Int(1)).unwrap();
        f.directory
            .insert_resource_id("orders", KeyValue::Int(10), KeyValue::Int(1))
            .unwrap();
        f.directory
            .insert_secondary_index_key("orders", "email", KeyValue::from("foo"), KeyValue::Int(10))
            .unwrap();

        f.directory.delete_primary_index_key(&KeyValue::Int(1)).unwrap();

        assert!(!f.directory.does_primary_index_key_exist(&KeyValue::Int(1)));
        assert!(!f
            .directory
            .does_resource_id_exist("orders", &KeyValue::Int(10))
            .unwrap());
        assert!(!f
            .directory
            .does_secondary_index_key_exist("orders", "email", &KeyValue::from("foo"))
            .unwrap());
    }

    #[test]
    fn test_cascade_leaves_other_keys_alone() {
        let f = fixture();
        f.directory.insert_primary_index_key(KeyValue::Int(1)).unwrap();
        f.directory.insert_primary_index_key(KeyValue::Int(2)).unwrap();
        f.directory
            .insert_resource_id("orders", KeyValue::Int(10), KeyValue::Int(1))
            .unwrap();
        f.directory
            .insert_resource_id("orders", KeyValue::Int(20), KeyValue::Int(2))
            .unwrap();
        f.directory
            .insert_secondary_index_key("orders", "email", KeyValue::from("foo"), KeyValue::Int(10))
            .unwrap();
        f.directory
            .insert_secondary_index_key("orders", "email", KeyValue::from("foo"), KeyValue::Int(20))
            .unwrap();

        f.directory.delete_primary_index_key(&KeyValue::Int(1)).unwrap();

        assert!(f
            .directory
            .does_resource_id_exist("orders", &KeyValue::Int(20))
            .unwrap());
        let primaries = f
            .directory
            .get_primary_index_keys_of_secondary_index_key("orders", "email", &KeyValue::from("foo"))
            .unwrap();
        assert_eq!(primaries, vec![KeyValue::Int(2)]);
    }

    #[test]
    fn test_delete_missing_primary_fails() {
        let f = fixture();
        let err = f.directory.delete_primary_index_key(&KeyValue::Int(404)).unwrap_err();
        assert!(matches!(err, HiveError::NotFound(_)));
    }

    #[test]
    fn test_delete_resource_id_removes_secondary_entries() {
        let f = fixture();
        f.directory.insert_primary_index_key(KeyValue::Int(1)).unwrap();
        f.directory
            .insert_resource_id("orders", KeyValue::Int(10), KeyValue::Int(1))
            .unwrap();
        f.directory
            .insert_secondary_index_key("orders", "email", KeyValue::from("foo"), KeyValue::Int(10))
            .unwrap();

        f.directory.delete_resource_id("orders", &KeyValue::Int(10)).unwrap();
        assert!(!f
            .directory
            .does_secondary_index_key_exist("orders", "email", &KeyValue::from("foo"))
            .unwrap());
    }

    #[test]
    fn test_partitioning_resource_delegates_to_primary() {
        let f = fixture();
        f.directory.insert_primary_index_key(KeyValue::Int(1)).unwrap();

        assert!(f
            .directory
            .does_resource_id_exist("customer", &KeyValue::Int(1))
            .unwrap());
        assert_eq!(
            f.directory
                .get_primary_index_key_of_resource_id("customer", &KeyValue::Int(1))
                .unwrap(),
            KeyValue::Int(1)
        );
        // Row id must equal the primary key
        let err = f
            .directory
            .insert_resource_id("customer", KeyValue::Int(5), KeyValue::Int(1))
            .unwrap_err();
        assert!(matches!(err, HiveError::ConfigMismatch(_)));
    }

    #[test]
    fn test_snapshot_save_and_reopen() {
        let mut dim = PartitionDimension::new("customer", KeyType::Integer);
        dim.node_group_mut().add_node(test_node(1, "alpha")).unwrap();
        dim.add_resource(Resource::new("orders", KeyType::Integer, false))
            .unwrap();
        let mut meta = HiveMeta::new();
        meta.dimensions.insert("customer".to_string(), dim);
        let meta = Arc::new(RwLock::new(meta));
        let assigner: Arc<RwLock<Box<dyn Assigner>>> =
            Arc::new(RwLock::new(Box::new(HashAssigner::new())));
        let dir = tempfile::tempdir().unwrap();

        {
            let directory =
                Directory::open("customer", meta.clone(), assigner.clone(), dir.path()).unwrap();
            directory.insert_primary_index_key(KeyValue::Int(1)).unwrap();
            directory
                .insert_resource_id("orders", KeyValue::Int(10), KeyValue::Int(1))
                .unwrap();
            directory.save().unwrap();
        }

        let directory = Directory::open("customer", meta, assigner, dir.path()).unwrap();
        assert!(directory.does_primary_index_key_exist(&KeyValue::Int(1)));
        assert_eq!(
            directory
                .get_primary_index_key_of_resource_id("orders", &KeyValue::Int(10))
                .unwrap(),
            KeyValue::Int(1)
        );
    }
}
