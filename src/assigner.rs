//! Node assignment strategies
//!
//! An assigner chooses the node (or nodes, for replicated dimensions) that a
//! brand-new primary key is bound to. The choice is made exactly once per
//! key: the directory persists the resulting semaphores and answers every
//! later resolution from the persisted binding. Moving a key to a different
//! node is an explicit administrative operation, never an assigner side
//! effect.

use crate::meta::{KeyValue, Node, NodeId};

// ============================================================================
// Assigner Trait
// ============================================================================

/// Strategy choosing the owning node(s) for a new primary key
///
/// Implementations must be deterministic for a given candidate list and key;
/// the candidate list is handed over sorted by node id.
pub trait Assigner: Send + Sync {
    /// Choose a single owning node; `None` only when `nodes` is empty
    fn choose_node(&self, nodes: &[Node], key: &KeyValue) -> Option<NodeId>;

    /// Choose the full owning set for the key; default is the single node
    fn choose_nodes(&self, nodes: &[Node], key: &KeyValue) -> Vec<NodeId> {
        self.choose_node(nodes, key).into_iter().collect()
    }

    /// Name of this strategy (for diagnostics)
    fn name(&self) -> &str;
}

// ============================================================================
// Hash Assigner
// ============================================================================

/// Capacity-weighted deterministic hash assignment
///
/// Each node contributes `weight()` slots to a slot table; the key's hash
/// picks a slot. A node with twice the capacity receives roughly twice the
/// keys. Distribution shifts when group membership changes, which only
/// affects keys inserted afterwards; existing bindings are persisted.
#[derive(Debug, Clone, Default)]
pub struct HashAssigner;

impl HashAssigner {
    pub fn new() -> Self {
        Self
    }
}

impl Assigner for HashAssigner {
    fn choose_node(&self, nodes: &[Node], key: &KeyValue) -> Option<NodeId> {
        if nodes.is_empty() {
            return None;
        }
        let total: u64 = nodes.iter().map(|n| n.weight() as u64).sum();
        let mut slot = key.hash_value() % total;
        for node in nodes {
            let weight = node.weight() as u64;
            if slot < weight {
                return Some(node.id);
            }
            slot -= weight;
        }
        // slot < total, so the walk lands inside a node's range above
        nodes.last().map(|n| n.id)
    }

    fn name(&self) -> &str {
        "hash"
    }
}

// ============================================================================
// Replicating Assigner
// ============================================================================

/// Redundancy wrapper: binds each key to `factor` distinct nodes
///
/// The first owner is the wrapped strategy's choice; the remaining owners
/// are the following nodes in id order, wrapping around. Every owning node
/// holds the key: writes fan out to all of them, reads may use any.
pub struct ReplicatingAssigner {
    inner: Box<dyn Assigner>,
    factor: usize,
}

impl ReplicatingAssigner {
    pub fn new(inner: Box<dyn Assigner>, factor: usize) -> Self {
        Self {
            inner,
            factor: factor.max(1),
        }
    }

    /// Hash assignment replicated `factor` ways
    pub fn hash(factor: usize) -> Self {
        Self::new(Box::new(HashAssigner::new()), factor)
    }
}

impl Assigner for ReplicatingAssigner {
    fn choose_node(&self, nodes: &[Node], key: &KeyValue) -> Option<NodeId> {
        self.inner.choose_node(nodes, key)
    }

    fn choose_nodes(&self, nodes: &[Node], key: &KeyValue) -> Vec<NodeId> {
        let Some(primary) = self.inner.choose_node(nodes, key) else {
            return Vec::new();
        };
        let start = nodes
            .iter()
            .position(|n| n.id == primary)
            .unwrap_or(0);
        let count = self.factor.min(nodes.len());
        (0..count)
            .map(|offset| nodes[(start + offset) % nodes.len()].id)
            .collect()
    }

    fn name(&self) -> &str {
        "replicating"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(weights: &[(NodeId, u32)]) -> Vec<Node> {
        weights
            .iter()
            .map(|(id, capacity)| {
                let mut n = Node::new(format!("node{}", id), format!("db://node{}", id))
                    .with_capacity(*capacity);
                n.id = *id;
                n
            })
            .collect()
    }

    #[test]
    fn test_hash_assigner_deterministic() {
        let assigner = HashAssigner::new();
        let group = nodes(&[(1, 1), (2, 1), (3, 1)]);
        let key = KeyValue::from("customer-42");
        assert_eq!(
            assigner.choose_node(&group, &key),
            assigner.choose_node(&group, &key)
        );
    }

    #[test]
    fn test_hash_assigner_empty_group() {
        let assigner = HashAssigner::new();
        assert_eq!(assigner.choose_node(&[], &KeyValue::Int(1)), None);
        assert!(assigner.choose_nodes(&[], &KeyValue::Int(1)).is_empty());
    }

    #[test]
    fn test_hash_assigner_spreads_keys() {
        let assigner = HashAssigner::new();
        let group = nodes(&[(1, 1), (2, 1), (3, 1), (4, 1)]);
        let mut counts = [0u32; 4];
        for i in 0..10_000 {
            let node = assigner.choose_node(&group, &KeyValue::Int(i)).unwrap();
            counts[(node - 1) as usize] += 1;
        }
        for &c in &counts {
            assert!(c > 1500 && c < 3500, "unbalanced distribution: {:?}", counts);
        }
    }

    #[test]
    fn test_hash_assigner_respects_capacity() {
        let assigner = HashAssigner::new();
        let group = nodes(&[(1, 3), (2, 1)]);
        let mut heavy = 0u32;
        for i in 0..10_000 {
            if assigner.choose_node(&group, &KeyValue::Int(i)) == Some(1) {
                heavy += 1;
            }
        }
        // Node 1 carries 3 of 4 slots
        assert!(heavy > 6500, "capacity weighting ignored: {}", heavy);
    }

    #[test]
    fn test_replicating_assigner_distinct_nodes() {
        let assigner = ReplicatingAssigner::hash(2);
        let group = nodes(&[(1, 1), (2, 1), (3, 1)]);
        let owners = assigner.choose_nodes(&group, &KeyValue::from("customer-7"));
        assert_eq!(owners.len(), 2);
        assert_ne!(owners[0], owners[1]);
    }

    #[test]
    fn test_replicating_assigner_caps_at_group_size() {
        let assigner = ReplicatingAssigner::hash(5);
        let group = nodes(&[(1, 1), (2, 1)]);
        let owners = assigner.choose_nodes(&group, &KeyValue::Int(9));
        assert_eq!(owners.len(), 2);
    }
}
