//! The hive facade
//!
//! Owns the partition dimensions, the monotonic revision counter, the
//! hive-wide read-only switch, and connection issuance. All metadata and the
//! revision counter live under one lock: every committed metadata mutation
//! increments the revision inside its own write guard, so revisions form a
//! total order over metadata changes and the read-only gate can never race a
//! mutation it is supposed to block.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::assigner::{Assigner, HashAssigner};
use crate::connection::{AccessType, Connection, ConnectionProvider, HiveStats, LocalConnectionProvider};
use crate::directory::Directory;
use crate::meta::{IdAllocator, KeyValue, Node, NodeId, PartitionDimension, Resource, SecondaryIndex};
use crate::{HiveError, Result};

/// Metadata snapshot file name under the hive's base directory
const META_SNAPSHOT: &str = "hive_meta.bin";

// ============================================================================
// Hive Metadata
// ============================================================================

/// The shared metadata root: dimensions, revision, read-only gate
///
/// Directory instances hold this behind the same lock; data mutations pin
/// the gate open with a read guard while metadata mutations and the
/// read-only flip take the write guard.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct HiveMeta {
    pub dimensions: HashMap<String, PartitionDimension>,
    pub revision: u64,
    pub read_only: bool,
    pub ids: IdAllocator,
}

impl HiveMeta {
    pub(crate) fn new() -> Self {
        Self {
            dimensions: HashMap::new(),
            revision: 0,
            read_only: false,
            ids: IdAllocator::new(),
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(HiveError::ReadOnlyViolation("hive is read-only".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// Hive
// ============================================================================

/// Top-level facade over the directory and partition metadata engine
pub struct Hive {
    base_dir: PathBuf,
    meta: Arc<RwLock<HiveMeta>>,
    directories: RwLock<HashMap<String, Arc<Directory>>>,
    assigner: Arc<RwLock<Box<dyn Assigner>>>,
    provider: Arc<dyn ConnectionProvider>,
    stats: Arc<HiveStats>,
    /// Round-robin cursor for read connections against replicated keys
    read_cursor: AtomicUsize,
    meta_dirty: AtomicBool,
}

impl Hive {
    /// Create an empty hive rooted at the given base directory
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            meta: Arc::new(RwLock::new(HiveMeta::new())),
            directories: RwLock::new(HashMap::new()),
            assigner: Arc::new(RwLock::new(Box::new(HashAssigner::new()))),
            provider: Arc::new(LocalConnectionProvider),
            stats: Arc::new(HiveStats::new()),
            read_cursor: AtomicUsize::new(0),
            meta_dirty: AtomicBool::new(false),
        }
    }

    /// Load a hive from its persisted snapshots, or start empty
    pub fn load(base_dir: impl AsRef<Path>) -> Result<Self> {
        let hive = Self::new(base_dir);
        let meta_path = hive.base_dir.join(META_SNAPSHOT);
        if meta_path.exists() {
            let data = std::fs::read(&meta_path)?;
            let loaded: HiveMeta = bincode::deserialize(&data)
                .map_err(|e| HiveError::Serialization(e.to_string()))?;
            *hive.meta.write() = loaded;
        }

        let dimension_names: Vec<String> = hive.meta.read().dimensions.keys().cloned().collect();
        for name in dimension_names {
            hive.open_directory(&name)?;
        }
        log::info!(
            "hive loaded from {}: revision {}",
            hive.base_dir.display(),
            hive.get_revision()
        );
        Ok(hive)
    }

    /// Replace the connection provider collaborator
    pub fn with_connection_provider(mut self, provider: Arc<dyn ConnectionProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Swap the key assignment strategy
    ///
    /// Only affects keys inserted afterwards; persisted bindings stand.
    pub fn set_assigner(&self, assigner: Box<dyn Assigner>) {
        *self.assigner.write() = assigner;
    }

    /// Connection counters of this instance
    pub fn stats(&self) -> &HiveStats {
        &self.stats
    }

    /// Persist the metadata and every dimension's directory tables
    pub fn save(&self) -> Result<()> {
        if self.meta_dirty.load(Ordering::Acquire) {
            std::fs::create_dir_all(&self.base_dir)?;
            let data = {
                let meta = self.meta.read();
                bincode::serialize(&*meta).map_err(|e| HiveError::Serialization(e.to_string()))?
            };
            std::fs::write(self.base_dir.join(META_SNAPSHOT), &data)?;
            self.meta_dirty.store(false, Ordering::Release);
        }
        for directory in self.directories.read().values() {
            directory.save()?;
        }
        Ok(())
    }

    // ========================================================================
    // Metadata Mutation
    // ========================================================================

    /// Register a new partition dimension
    ///
    /// Resources declared on the dimension get their ids assigned here.
    /// Nodes are registered separately through [`Hive::add_node`].
    pub fn add_partition_dimension(&self, mut dimension: PartitionDimension) -> Result<()> {
        let mut meta = self.meta.write();
        meta.check_writable()?;
        if meta.dimensions.contains_key(&dimension.name) {
            return Err(HiveError::AlreadyExists(format!(
                "partition dimension {}",
                dimension.name
            )));
        }
        let partitioning = dimension
            .resources()
            .iter()
            .filter(|r| r.is_partitioning)
            .count();
        if partitioning > 1 {
            return Err(HiveError::ConfigMismatch(format!(
                "partition dimension {} declares {} partitioning resources",
                dimension.name, partitioning
            )));
        }

        dimension.id = meta.ids.allocate();
        for resource in dimension.resources_mut() {
            resource.id = meta.ids.allocate();
            for index in resource.secondary_indexes_mut() {
                index.id = meta.ids.allocate();
            }
        }
        let name = dimension.name.clone();
        meta.dimensions.insert(name.clone(), dimension);
        meta.revision += 1;
        self.meta_dirty.store(true, Ordering::Release);
        drop(meta);

        self.open_directory(&name)?;
        log::info!("added partition dimension {}", name);
        Ok(())
    }

    /// Drop a partition dimension and its directory
    pub fn remove_partition_dimension(&self, name: &str) -> Result<()> {
        let mut meta = self.meta.write();
        meta.check_writable()?;
        meta.dimensions
            .remove(name)
            .ok_or_else(|| HiveError::NotFound(format!("partition dimension {}", name)))?;
        meta.revision += 1;
        self.meta_dirty.store(true, Ordering::Release);
        drop(meta);

        if let Some(directory) = self.directories.write().remove(name) {
            directory.delete_snapshot()?;
        }
        log::info!("removed partition dimension {}", name);
        Ok(())
    }

    /// Register a data node with a dimension; returns its assigned id
    pub fn add_node(&self, dimension: &str, mut node: Node) -> Result<NodeId> {
        let mut meta = self.meta.write();
        meta.check_writable()?;
        if !meta.dimensions.contains_key(dimension) {
            return Err(HiveError::NotFound(format!("partition dimension {}", dimension)));
        }
        node.id = meta.ids.allocate();
        let node_id = node.id;
        let name = node.name.clone();
        let dim = dim_mut(&mut meta, dimension)?;
        dim.node_group_mut().add_node(node)?;
        dim.touch();
        meta.revision += 1;
        self.meta_dirty.store(true, Ordering::Release);
        log::info!("added node {} to dimension {}", name, dimension);
        Ok(node_id)
    }

    /// Replace a registered node (matched by id); flips like read-only or
    /// capacity changes commit here
    pub fn update_node(&self, dimension: &str, mut node: Node) -> Result<()> {
        let mut meta = self.meta.write();
        meta.check_writable()?;
        node.modified_at = chrono::Utc::now().timestamp();
        let dim = dim_mut(&mut meta, dimension)?;
        dim.node_group_mut().update_node(node)?;
        dim.touch();
        meta.revision += 1;
        self.meta_dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Remove a node from a dimension
    pub fn remove_node(&self, dimension: &str, node_id: NodeId) -> Result<Node> {
        let mut meta = self.meta.write();
        meta.check_writable()?;
        let dim = dim_mut(&mut meta, dimension)?;
        let node = dim.node_group_mut().remove_node(node_id)?;
        dim.touch();
        meta.revision += 1;
        self.meta_dirty.store(true, Ordering::Release);
        log::info!("removed node {} from dimension {}", node.name, dimension);
        Ok(node)
    }

    /// Register a resource with a dimension
    pub fn add_resource(&self, dimension: &str, mut resource: Resource) -> Result<()> {
        let mut meta = self.meta.write();
        meta.check_writable()?;
        let dim = meta
            .dimensions
            .get(dimension)
            .ok_or_else(|| HiveError::NotFound(format!("partition dimension {}", dimension)))?;
        if resource.is_partitioning && dim.resources().iter().any(|r| r.is_partitioning) {
            return Err(HiveError::ConfigMismatch(format!(
                "partition dimension {} already has a partitioning resource",
                dimension
            )));
        }

        resource.id = meta.ids.allocate();
        for index in resource.secondary_indexes_mut() {
            index.id = meta.ids.allocate();
        }
        let name = resource.name.clone();
        let dim = dim_mut(&mut meta, dimension)?;
        dim.add_resource(resource)?;
        meta.revision += 1;
        self.meta_dirty.store(true, Ordering::Release);
        log::info!("added resource {} to dimension {}", name, dimension);
        Ok(())
    }

    /// Drop a resource and purge its directory rows and secondary entries
    pub fn remove_resource(&self, dimension: &str, resource: &str) -> Result<Resource> {
        let mut meta = self.meta.write();
        meta.check_writable()?;
        let dim = dim_mut(&mut meta, dimension)?;
        let removed = dim.remove_resource(resource)?;
        meta.revision += 1;
        self.meta_dirty.store(true, Ordering::Release);
        drop(meta);

        if let Some(directory) = self.directories.read().get(dimension) {
            directory.purge_resource(resource);
        }
        log::info!("removed resource {} from dimension {}", resource, dimension);
        Ok(removed)
    }

    /// Register a secondary index on a resource
    pub fn add_secondary_index(
        &self,
        dimension: &str,
        resource: &str,
        mut index: SecondaryIndex,
    ) -> Result<()> {
        let mut meta = self.meta.write();
        meta.check_writable()?;
        let dim = meta
            .dimensions
            .get(dimension)
            .ok_or_else(|| HiveError::NotFound(format!("partition dimension {}", dimension)))?;
        if dim.get_resource(resource).is_none() {
            return Err(HiveError::NotFound(format!("resource {}", resource)));
        }

        index.id = meta.ids.allocate();
        let name = index.name.clone();
        let dim = dim_mut(&mut meta, dimension)?;
        let res = dim
            .get_resource_mut(resource)
            .ok_or_else(|| HiveError::NotFound(format!("resource {}", resource)))?;
        res.add_secondary_index(index)?;
        dim.touch();
        meta.revision += 1;
        self.meta_dirty.store(true, Ordering::Release);
        log::info!("added secondary index {} to resource {}", name, resource);
        Ok(())
    }

    /// Drop a secondary index and purge its directory entries
    pub fn remove_secondary_index(
        &self,
        dimension: &str,
        resource: &str,
        index: &str,
    ) -> Result<SecondaryIndex> {
        let mut meta = self.meta.write();
        meta.check_writable()?;
        let dim = dim_mut(&mut meta, dimension)?;
        let res = dim
            .get_resource_mut(resource)
            .ok_or_else(|| HiveError::NotFound(format!("resource {}", resource)))?;
        let removed = res.remove_secondary_index(index)?;
        dim.touch();
        meta.revision += 1;
        self.meta_dirty.store(true, Ordering::Release);
        drop(meta);

        if let Some(directory) = self.directories.read().get(dimension) {
            directory.purge_secondary_index(resource, index);
        }
        Ok(removed)
    }

    // ========================================================================
    // Read-only Gate / Revision
    // ========================================================================

    /// Flip the hive-wide read-only switch
    ///
    /// The toggle itself is exempt from the gate it controls; it waits for
    /// in-flight mutations to drain, then commits as a metadata mutation.
    pub fn update_hive_read_only(&self, read_only: bool) {
        let mut meta = self.meta.write();
        if meta.read_only == read_only {
            return;
        }
        meta.read_only = read_only;
        meta.revision += 1;
        self.meta_dirty.store(true, Ordering::Release);
        log::info!("hive read-only set to {}", read_only);
    }

    pub fn is_read_only(&self) -> bool {
        self.meta.read().read_only
    }

    /// Current revision of the metadata
    pub fn get_revision(&self) -> u64 {
        self.meta.read().revision
    }

    // ========================================================================
    // Metadata Lookup
    // ========================================================================

    pub fn get_partition_dimension(&self, name: &str) -> Result<PartitionDimension> {
        self.meta
            .read()
            .dimensions
            .get(name)
            .cloned()
            .ok_or_else(|| HiveError::NotFound(format!("partition dimension {}", name)))
    }

    /// All dimensions, ordered by name
    pub fn get_partition_dimensions(&self) -> Vec<PartitionDimension> {
        let meta = self.meta.read();
        let mut dimensions: Vec<PartitionDimension> = meta.dimensions.values().cloned().collect();
        dimensions.sort_by(|a, b| a.name.cmp(&b.name));
        dimensions
    }

    /// The directory of a dimension
    pub fn directory(&self, dimension: &str) -> Result<Arc<Directory>> {
        self.directories
            .read()
            .get(dimension)
            .cloned()
            .ok_or_else(|| HiveError::NotFound(format!("partition dimension {}", dimension)))
    }

    // ========================================================================
    // Connection Issuance
    // ========================================================================

    /// Resolve a primary key and check out a connection to an owning node
    ///
    /// Reads rotate over the key's owners; writes go to the first owner and
    /// require the hive, the key, and the node to be writable. Every
    /// acquisition outcome is counted before the result propagates.
    pub fn get_connection(
        &self,
        dimension: &str,
        key: &KeyValue,
        access: AccessType,
    ) -> Result<Connection> {
        let owners = self.resolve_owners(dimension, key, access)?;
        let node = match access {
            AccessType::Read => {
                let cursor = self.read_cursor.fetch_add(1, Ordering::Relaxed);
                owners[cursor % owners.len()].clone()
            }
            AccessType::ReadWrite => owners[0].clone(),
        };
        self.acquire_counted(&node, access)
    }

    /// Write fan-out: one connection per owning node of a replicated key
    pub fn get_connections(
        &self,
        dimension: &str,
        key: &KeyValue,
        access: AccessType,
    ) -> Result<Vec<Connection>> {
        let owners = self.resolve_owners(dimension, key, access)?;
        owners
            .iter()
            .map(|node| self.acquire_counted(node, access))
            .collect()
    }

    /// The owning nodes of a key, gate-checked for the requested access
    fn resolve_owners(
        &self,
        dimension: &str,
        key: &KeyValue,
        access: AccessType,
    ) -> Result<Vec<Node>> {
        let directory = self.directory(dimension)?;
        let semaphores = directory.get_key_semaphores_of_primary_index_key(key);
        if semaphores.is_empty() {
            return Err(HiveError::NotFound(format!("primary index key {}", key)));
        }

        let meta = self.meta.read();
        if access == AccessType::ReadWrite {
            meta.check_writable()?;
            if semaphores.iter().any(|s| s.read_only) {
                return Err(HiveError::ReadOnlyViolation(format!(
                    "primary index key {} is read-only",
                    key
                )));
            }
        }
        let dim = meta
            .dimensions
            .get(dimension)
            .ok_or_else(|| HiveError::NotFound(format!("partition dimension {}", dimension)))?;

        let mut owners = Vec::with_capacity(semaphores.len());
        for semaphore in &semaphores {
            let node = dim
                .node_group()
                .get_node(semaphore.node_id)
                .ok_or_else(|| HiveError::NotFound(format!("node id {}", semaphore.node_id)))?;
            if access == AccessType::ReadWrite && node.read_only {
                return Err(HiveError::ReadOnlyViolation(format!(
                    "node {} is read-only",
                    node.name
                )));
            }
            owners.push(node.clone());
        }
        Ok(owners)
    }

    fn acquire_counted(&self, node: &Node, access: AccessType) -> Result<Connection> {
        match self.provider.acquire(node, access) {
            Ok(connection) => {
                self.stats.record_connection_success(access);
                Ok(connection)
            }
            Err(e) => {
                self.stats.record_connection_failure();
                log::warn!("connection to node {} failed: {}", node.name, e);
                Err(e)
            }
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn open_directory(&self, dimension: &str) -> Result<()> {
        let directory = Directory::open(
            dimension,
            self.meta.clone(),
            self.assigner.clone(),
            &self.base_dir,
        )?;
        self.directories
            .write()
            .insert(dimension.to_string(), Arc::new(directory));
        Ok(())
    }
}

fn dim_mut<'a>(meta: &'a mut HiveMeta, name: &str) -> Result<&'a mut PartitionDimension> {
    meta.dimensions
        .get_mut(name)
        .ok_or_else(|| HiveError::NotFound(format!("partition dimension {}", name)))
}

// ============================================================================
// Tests
// ============================================================================
