//! Connection issuance contracts and connection statistics
//!
//! The hive does not own pooled-connection internals; it consumes a
//! [`ConnectionProvider`] collaborator that turns a resolved node into a
//! checked-out connection handle. Every acquisition outcome is counted in
//! [`HiveStats`] before the result propagates.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::meta::{Node, NodeId};
use crate::{HiveError, Result};

// ============================================================================
// Access Type
// ============================================================================

/// Intent declared when requesting a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessType {
    Read,
    ReadWrite,
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessType::Read => write!(f, "read"),
            AccessType::ReadWrite => write!(f, "read-write"),
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// A checked-out connection handle to one node
///
/// Opaque to the engine: the provider decides what sits behind it. Handles
/// are not shared across concurrent operations once checked out.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    /// The node this connection reaches
    pub node_id: NodeId,
    /// The node's connection URI
    pub uri: String,
    /// The access intent the connection was issued for
    pub access: AccessType,
}

// ============================================================================
// Connection Provider
// ============================================================================

/// Pooled-connection collaborator contract
///
/// `acquire` must fail fast on an unreachable node or an exhausted pool
/// rather than block indefinitely; the hive counts the failure and
/// propagates it as [`HiveError::ConnectionError`].
pub trait ConnectionProvider: Send + Sync {
    fn acquire(&self, node: &Node, access: AccessType) -> Result<Connection>;
}

/// Trivial provider for tests and embedded use: hands out a handle for any
/// node without pooling or reachability checks
#[derive(Debug, Default)]
pub struct LocalConnectionProvider;

impl ConnectionProvider for LocalConnectionProvider {
    fn acquire(&self, node: &Node, access: AccessType) -> Result<Connection> {
        if node.uri.is_empty() {
            return Err(HiveError::ConnectionError(format!(
                "node {} has no uri",
                node.name
            )));
        }
        Ok(Connection {
            node_id: node.id,
            uri: node.uri.clone(),
            access,
        })
    }
}

// ============================================================================
// Hive Stats
// ============================================================================

/// Connection counters, owned by the hive instance
///
/// Lock-free: counters are atomics, snapshots are consistent enough for
/// monitoring.
#[derive(Debug, Default)]
pub struct HiveStats {
    read_connections: AtomicU64,
    write_connections: AtomicU64,
    connection_failures: AtomicU64,
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HiveStatsSnapshot {
    pub read_connections: u64,
    pub write_connections: u64,
    pub connection_failures: u64,
}

impl HiveStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_connection_success(&self, access: AccessType) {
        match access {
            AccessType::Read => self.read_connections.fetch_add(1, Ordering::Relaxed),
            AccessType::ReadWrite => self.write_connections.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_connection_failure(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HiveStatsSnapshot {
        HiveStatsSnapshot {
            read_connections: self.read_connections.load(Ordering::Relaxed),
            write_connections: self.write_connections.load(Ordering::Relaxed),
            connection_failures: self.connection_failures.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
