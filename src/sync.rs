//! Additive metadata synchronization
//!
//! Brings a hive instance's metadata up to date with a reference
//! configuration. The reconciliation is additive only: entities the
//! reference omits are left alone, never deleted. A diff is computed fresh
//! for every attempt, and applying it goes through the ordinary hive
//! mutation methods, so a lost race against a concurrent syncer surfaces as
//! `AlreadyExists` instead of corrupting state.
//!
//! The daemon form runs the same reconciliation on a timer from one
//! background thread; cycles run back to back on that thread, so a slow
//! cycle delays the next one but can never overlap it.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::entity::EntityConfig;
use crate::hive::Hive;
use crate::meta::{KeyType, Node, PartitionDimension, Resource, SecondaryIndex};
use crate::{HiveError, Result};

// ============================================================================
// Reference Configuration
// ============================================================================

/// The declared metadata of one partition dimension, used as the reference
/// side of a diff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiveConfig {
    /// Dimension name
    pub dimension: String,
    /// Declared primary key type
    pub key_type: KeyType,
    /// Revision of the instance the reference was taken from
    pub revision: u64,
    /// Declared data nodes
    pub nodes: Vec<Node>,
    /// Declared resources, each carrying its secondary indexes
    pub resources: Vec<Resource>,
}

impl HiveConfig {
    pub fn new(dimension: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            dimension: dimension.into(),
            key_type,
            revision: 0,
            nodes: Vec::new(),
            resources: Vec::new(),
        }
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    /// Capture the current metadata of a live hive's dimension
    ///
    /// The revision is read before the dimension, so a concurrent mutation
    /// can only make the captured revision stale, never ahead of the
    /// captured content.
    pub fn from_hive(hive: &Hive, dimension: &str) -> Result<Self> {
        let revision = hive.get_revision();
        let dim = hive.get_partition_dimension(dimension)?;
        Ok(Self {
            dimension: dim.name.clone(),
            key_type: dim.key_type,
            revision,
            nodes: dim.node_group().nodes(),
            resources: dim.resources().into_iter().cloned().collect(),
        })
    }

    /// Build a reference from entity declarations
    ///
    /// Entities mapped to other dimensions are skipped.
    pub fn from_entity_configs(
        dimension: impl Into<String>,
        key_type: KeyType,
        entities: &[EntityConfig],
    ) -> Self {
        let dimension = dimension.into();
        let resources = entities
            .iter()
            .filter(|e| e.dimension_name == dimension)
            .map(|e| e.to_resource())
            .collect();
        Self {
            dimension,
            key_type,
            revision: 0,
            nodes: Vec::new(),
            resources,
        }
    }
}

// ============================================================================
// Config Sources
// ============================================================================

/// Where the daemon obtains its reference configuration each cycle
pub trait ConfigSource: Send + Sync {
    fn load_config(&self) -> Result<HiveConfig>;
}

/// A fixed reference configuration is its own source
impl ConfigSource for HiveConfig {
    fn load_config(&self) -> Result<HiveConfig> {
        Ok(self.clone())
    }
}

/// Reference taken from a live authority hive in the same process
pub struct HiveConfigSource {
    hive: Arc<Hive>,
    dimension: String,
}

impl HiveConfigSource {
    pub fn new(hive: Arc<Hive>, dimension: impl Into<String>) -> Self {
        Self {
            hive,
            dimension: dimension.into(),
        }
    }
}

impl ConfigSource for HiveConfigSource {
    fn load_config(&self) -> Result<HiveConfig> {
        HiveConfig::from_hive(&self.hive, &self.dimension)
    }
}

/// Reference re-read each cycle from another instance's persisted snapshots
///
/// This is how independently-loaded processes converge: each follower points
/// at the metadata store it originally loaded from and picks up whatever the
/// authority committed since.
pub struct SnapshotConfigSource {
    base_dir: PathBuf,
    dimension: String,
}

impl SnapshotConfigSource {
    pub fn new(base_dir: impl Into<PathBuf>, dimension: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            dimension: dimension.into(),
        }
    }
}

impl ConfigSource for SnapshotConfigSource {
    fn load_config(&self) -> Result<HiveConfig> {
        let reference = Hive::load(&self.base_dir)?;
        HiveConfig::from_hive(&reference, &self.dimension)
    }
}

// ============================================================================
// Diff
// ============================================================================

/// What the reference declares that the live hive lacks
#[derive(Debug, Default)]
pub struct HiveDiff {
    /// The dimension itself is absent from the live hive
    pub missing_dimension: bool,
    /// Declared nodes absent from the live node group
    pub missing_nodes: Vec<Node>,
    /// Declared resources absent from the live dimension, carrying their
    /// declared secondary indexes
    pub missing_resources: Vec<Resource>,
    /// Declared indexes absent from resources that do exist:
    /// (resource name, missing indexes)
    pub missing_secondary_indexes: Vec<(String, Vec<SecondaryIndex>)>,
}

impl HiveDiff {
    pub fn is_empty(&self) -> bool {
        !self.missing_dimension
            && self.missing_nodes.is_empty()
            && self.missing_resources.is_empty()
            && self.missing_secondary_indexes.is_empty()
    }
}

// ============================================================================
// Syncer
// ============================================================================

/// Computes and applies additive diffs against one live hive
pub struct HiveSyncer {
    hive: Arc<Hive>,
}

impl HiveSyncer {
    pub fn new(hive: Arc<Hive>) -> Self {
        Self { hive }
    }

    /// What the reference declares that the live hive lacks
    ///
    /// Never marks anything for removal. A declared entity whose type
    /// conflicts with an existing same-named entity fails with
    /// `ConfigMismatch` instead of being coerced.
    pub fn diff(&self, config: &HiveConfig) -> Result<HiveDiff> {
        let mut diff = HiveDiff::default();

        let dim = match self.hive.get_partition_dimension(&config.dimension) {
            Ok(dim) => dim,
            Err(HiveError::NotFound(_)) => {
                diff.missing_dimension = true;
                diff.missing_nodes = config.nodes.clone();
                diff.missing_resources = config.resources.clone();
                return Ok(diff);
            }
            Err(e) => return Err(e),
        };
        if dim.key_type != config.key_type {
            return Err(HiveError::ConfigMismatch(format!(
                "dimension {} declares key type {} but exists with {}",
                config.dimension, config.key_type, dim.key_type
            )));
        }

        for node in &config.nodes {
            match dim.node_group().get_node_by_name(&node.name) {
                None => diff.missing_nodes.push(node.clone()),
                Some(live) if live.uri != node.uri => {
                    return Err(HiveError::ConfigMismatch(format!(
                        "node {} declares uri {} but exists with {}",
                        node.name, node.uri, live.uri
                    )));
                }
                Some(_) => {}
            }
        }

        for resource in &config.resources {
            let Some(live) = dim.get_resource(&resource.name) else {
                diff.missing_resources.push(resource.clone());
                continue;
            };
            if live.key_type != resource.key_type || live.is_partitioning != resource.is_partitioning
            {
                return Err(HiveError::ConfigMismatch(format!(
                    "resource {} declaration conflicts with the existing resource",
                    resource.name
                )));
            }
            let mut missing = Vec::new();
            for index in resource.secondary_indexes() {
                match live.get_secondary_index(&index.name) {
                    None => missing.push(index.clone()),
                    Some(existing) if existing.key_type != index.key_type => {
                        return Err(HiveError::ConfigMismatch(format!(
                            "secondary index {} on resource {} declares key type {} but exists with {}",
                            index.name, resource.name, index.key_type, existing.key_type
                        )));
                    }
                    Some(_) => {}
                }
            }
            if !missing.is_empty() {
                diff.missing_secondary_indexes
                    .push((resource.name.clone(), missing));
            }
        }

        Ok(diff)
    }

    /// Apply everything the live hive lacks, in dependency order
    ///
    /// Dimension before nodes, nodes before resources, resources before
    /// their indexes. Idempotent: a second run with the same reference is a
    /// no-op.
    pub fn sync(&self, config: &HiveConfig) -> Result<HiveDiff> {
        let diff = self.diff(config)?;
        if diff.is_empty() {
            log::debug!("sync: dimension {} already up to date", config.dimension);
            return Ok(diff);
        }

        if diff.missing_dimension {
            self.hive
                .add_partition_dimension(PartitionDimension::new(
                    config.dimension.clone(),
                    config.key_type,
                ))?;
        }
        for node in &diff.missing_nodes {
            self.hive.add_node(&config.dimension, node.clone())?;
        }
        for resource in &diff.missing_resources {
            self.hive.add_resource(&config.dimension, resource.clone())?;
        }
        for (resource, indexes) in &diff.missing_secondary_indexes {
            for index in indexes {
                self.hive
                    .add_secondary_index(&config.dimension, resource, index.clone())?;
            }
        }

        log::info!(
            "synced dimension {}: {} nodes, {} resources, {} indexes added",
            config.dimension,
            diff.missing_nodes.len(),
            diff.missing_resources.len(),
            diff.missing_secondary_indexes
                .iter()
                .map(|(_, v)| v.len())
                .sum::<usize>()
        );
        Ok(diff)
    }
}

// ============================================================================
// Sync Daemon
// ============================================================================

/// Daemon settings
#[derive(Debug, Clone)]
pub struct SyncDaemonConfig {
    /// Time between reconciliation cycles
    pub interval: Duration,
}

impl Default for SyncDaemonConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

struct DaemonShared {
    hive: Arc<Hive>,
    source: Arc<dyn ConfigSource>,
    stop: Mutex<bool>,
    wake: Condvar,
    /// Highest reference revision this daemon has reconciled against
    last_synced: std::sync::atomic::AtomicU64,
}

/// Periodic reconciliation against a reference configuration source
///
/// Each cycle re-reads the reference and skips reconciliation when its
/// revision has already been reconciled against; a reference with revision 0
/// is treated as unversioned and reconciled every cycle. A cycle failure is
/// logged and retried from scratch on the next cycle; the daemon never
/// takes the process down.
pub struct HiveSyncDaemon {
    shared: Arc<DaemonShared>,
    handle: Option<JoinHandle<()>>,
}

impl HiveSyncDaemon {
    /// Spawn the daemon thread
    pub fn start(
        hive: Arc<Hive>,
        source: Arc<dyn ConfigSource>,
        config: SyncDaemonConfig,
    ) -> Self {
        let shared = Arc::new(DaemonShared {
            hive,
            source,
            stop: Mutex::new(false),
            wake: Condvar::new(),
            last_synced: std::sync::atomic::AtomicU64::new(0),
        });

        let thread_shared = shared.clone();
        let interval = config.interval;
        let handle = std::thread::spawn(move || {
            log::info!("sync daemon started, interval {:?}", interval);
            loop {
                {
                    let mut stopped = thread_shared.stop.lock();
                    if !*stopped {
                        let _ = thread_shared.wake.wait_for(&mut stopped, interval);
                    }
                    if *stopped {
                        break;
                    }
                }
                if let Err(e) = Self::run_cycle(&thread_shared) {
                    log::warn!("sync cycle failed: {}", e);
                }
            }
            log::info!("sync daemon stopped");
        });

        Self {
            shared,
            handle: Some(handle),
        }
    }

    fn run_cycle(shared: &DaemonShared) -> Result<()> {
        use std::sync::atomic::Ordering;

        let config = shared.source.load_config()?;
        let last = shared.last_synced.load(Ordering::Acquire);
        if config.revision != 0 && config.revision <= last {
            log::debug!(
                "sync cycle: reference revision {} already reconciled, skipping",
                config.revision
            );
            return Ok(());
        }
        HiveSyncer::new(shared.hive.clone()).sync(&config)?;
        shared.last_synced.store(config.revision, Ordering::Release);
        Ok(())
    }

    /// Force one reconciliation now, regardless of revisions
    pub fn synchronize(&self) -> Result<HiveDiff> {
        let config = self.shared.source.load_config()?;
        HiveSyncer::new(self.shared.hive.clone()).sync(&config)
    }

    /// Signal the daemon and wait for it to exit
    pub fn stop(mut self) {
        self.signal_stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn signal_stop(&self) {
        *self.shared.stop.lock() = true;
        self.shared.wake.notify_all();
    }
}

impl Drop for HiveSyncDaemon {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

// ============================================================================
// Tests
// ============================================================================
