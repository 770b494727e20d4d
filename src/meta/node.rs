//! Data nodes and the node group of a partition dimension
//!
//! A node is a physical storage endpoint holding a subset of keys. The node
//! group is the set of nodes belonging to one partition dimension, looked up
//! by id or by name. Membership changes are administrative operations routed
//! through the hive so they commit under the metadata lock.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{HiveError, Result};

/// Unique node identifier
pub type NodeId = u32;

// ============================================================================
// Node
// ============================================================================

/// A physical storage endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique node id within its node group; assigned when registered
    pub id: NodeId,
    /// Human-readable name, unique within the node group
    pub name: String,
    /// Connection URI (host, database, credentials)
    pub uri: String,
    /// Node-level read-only flag; blocks write connections to this node
    pub read_only: bool,
    /// Relative capacity weight for key assignment (default weight 1)
    pub capacity: Option<u32>,
    /// Creation timestamp (epoch seconds)
    pub created_at: i64,
    /// Last modified timestamp
    pub modified_at: i64,
}

impl Node {
    /// Create a new node; the id is assigned when the node is added to a hive
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: 0,
            name: name.into(),
            uri: uri.into(),
            read_only: false,
            capacity: None,
            created_at: now,
            modified_at: now,
        }
    }

    /// Set the read-only flag
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Set the capacity weight
    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Whether the node accepts write connections
    pub fn is_writable(&self) -> bool {
        !self.read_only
    }

    /// Capacity weight used by weighted assigners
    pub fn weight(&self) -> u32 {
        self.capacity.unwrap_or(1).max(1)
    }
}

// ============================================================================
// Node Group
// ============================================================================

/// The set of nodes belonging to one partition dimension
///
/// Keys can only be inserted once the group holds at least one node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeGroup {
    /// All nodes: node_id → Node
    nodes: HashMap<NodeId, Node>,
    /// Name → node_id lookup
    by_name: HashMap<String, NodeId>,
}

impl NodeGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; the node must already carry its assigned id
    pub fn add_node(&mut self, node: Node) -> Result<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(HiveError::AlreadyExists(format!("node id {}", node.id)));
        }
        if self.by_name.contains_key(&node.name) {
            return Err(HiveError::AlreadyExists(format!("node {}", node.name)));
        }
        if node.uri.is_empty() {
            return Err(HiveError::ConfigMismatch(format!(
                "node {} has an empty uri",
                node.name
            )));
        }
        self.by_name.insert(node.name.clone(), node.id);
        self.nodes.insert(node.id, node);
        Ok(())
    }

    /// Replace an existing node (matched by id)
    pub fn update_node(&mut self, node: Node) -> Result<()> {
        let existing = self
            .nodes
            .get(&node.id)
            .ok_or_else(|| HiveError::NotFound(format!("node id {}", node.id)))?;
        if existing.name != node.name {
            // Renames must keep the name index consistent
            if self.by_name.contains_key(&node.name) {
                return Err(HiveError::AlreadyExists(format!("node {}", node.name)));
            }
            self.by_name.remove(&existing.name);
            self.by_name.insert(node.name.clone(), node.id);
        }
        self.nodes.insert(node.id, node);
        Ok(())
    }

    /// Remove a node by id
    pub fn remove_node(&mut self, node_id: NodeId) -> Result<Node> {
        let node = self
            .nodes
            .remove(&node_id)
            .ok_or_else(|| HiveError::NotFound(format!("node id {}", node_id)))?;
        self.by_name.remove(&node.name);
        Ok(node)
    }

    /// Get a node by id
    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a node by name
    pub fn get_node_by_name(&self, name: &str) -> Option<&Node> {
        self.by_name.get(name).and_then(|id| self.nodes.get(id))
    }

    /// All nodes, ordered by id for deterministic iteration
    pub fn nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.nodes.values().cloned().collect();
        nodes.sort_by_key(|n| n.id);
        nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: NodeId, name: &str) -> Node {
        let mut n = Node::new(name, format!("db://{}", name));
        n.id = id;
        n
    }

    #[test]
    fn test_add_and_lookup() {
        let mut group = NodeGroup::new();
        group.add_node(node(1, "alpha")).unwrap();
        group.add_node(node(2, "beta")).unwrap();

        assert_eq!(group.len(), 2);
        assert_eq!(group.get_node(1).unwrap().name, "alpha");
        assert_eq!(group.get_node_by_name("beta").unwrap().id, 2);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut group = NodeGroup::new();
        group.add_node(node(1, "alpha")).unwrap();
        let err = group.add_node(node(2, "alpha")).unwrap_err();
        assert!(matches!(err, HiveError::AlreadyExists(_)));
    }

    #[test]
    fn test_empty_uri_rejected() {
        let mut group = NodeGroup::new();
        let mut n = node(1, "alpha");
        n.uri = String::new();
        assert!(group.add_node(n).is_err());
    }

    #[test]
    fn test_update_node_rename() {
        let mut group = NodeGroup::new();
        group.add_node(node(1, "alpha")).unwrap();

        let mut renamed = node(1, "gamma");
        renamed.read_only = true;
        group.update_node(renamed).unwrap();

        assert!(group.get_node_by_name("alpha").is_none());
        let n = group.get_node_by_name("gamma").unwrap();
        assert!(n.read_only);
    }

    #[test]
    fn test_remove_node() {
        let mut group = NodeGroup::new();
        group.add_node(node(1, "alpha")).unwrap();
        group.remove_node(1).unwrap();
        assert!(group.is_empty());
        assert!(matches!(group.remove_node(1), Err(HiveError::NotFound(_))));
    }

    #[test]
    fn test_nodes_ordered_by_id() {
        let mut group = NodeGroup::new();
        group.add_node(node(3, "c")).unwrap();
        group.add_node(node(1, "a")).unwrap();
        group.add_node(node(2, "b")).unwrap();
        let ids: Vec<NodeId> = group.nodes().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
