//! HiveShard Directory & Partition-Metadata Engine
//!
//! Horizontal-partitioning middleware: clients address rows by a business key
//! instead of a physical storage node. The engine resolves keys to owning
//! nodes through a persisted directory, maintains secondary-index lookups
//! that chain back to the owning node, and keeps independently-loaded
//! instances of the metadata eventually consistent through additive
//! synchronization.

pub mod meta;
pub mod directory;
pub mod assigner;
pub mod connection;
pub mod entity;
pub mod hive;
pub mod sync;

// Re-export main types
pub use meta::{KeyType, KeyValue, Node, NodeGroup, NodeId, PartitionDimension, Resource, SecondaryIndex};
pub use directory::{Directory, KeySemaphore};
pub use assigner::{Assigner, HashAssigner, ReplicatingAssigner};
pub use connection::{
    AccessType, Connection, ConnectionProvider, HiveStats, HiveStatsSnapshot,
    LocalConnectionProvider,
};
pub use entity::{EntityConfig, EntityIndexConfig, EntityRecord};
pub use hive::Hive;
pub use sync::{
    ConfigSource, HiveConfig, HiveConfigSource, HiveDiff, HiveSyncDaemon, HiveSyncer,
    SnapshotConfigSource, SyncDaemonConfig,
};

/// Engine error type
#[derive(Debug, thiserror::Error)]
pub enum HiveError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Read-only violation: {0}")]
    ReadOnlyViolation(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Config mismatch: {0}")]
    ConfigMismatch(String),

    #[error("Key type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: meta::KeyType,
        actual: meta::KeyType,
    },

    #[error("No nodes available in partition dimension: {0}")]
    NoNodesAvailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, HiveError>;
