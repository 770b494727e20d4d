//! Key semaphores
//!
//! The persisted record binding a key to its owning node and read-only
//! status. Semaphores are what the directory hands back for routing
//! decisions; the binding is created once by the assigner and never
//! recomputed.

use serde::{Deserialize, Serialize};

use crate::meta::{KeyValue, NodeId};

/// Binds one primary index key to one owning node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeySemaphore {
    /// The primary index key
    pub key: KeyValue,
    /// The owning node
    pub node_id: NodeId,
    /// Key-level read-only flag, independent of the node-level flag
    pub read_only: bool,
}

impl KeySemaphore {
    pub fn new(key: KeyValue, node_id: NodeId) -> Self {
        Self {
            key,
            node_id,
            read_only: false,
        }
    }

    /// Whether writes targeting this key are allowed at key level
    pub fn is_writable(&self) -> bool {
        !self.read_only
    }
}
