//! Resources and secondary indexes
//!
//! A resource is a partitionable entity type within a dimension. The
//! partitioning resource of a dimension shares the dimension's primary key
//! space and has no independent row mapping; dependent resources keep a row
//! id → primary key mapping in the directory and may expose any number of
//! secondary indexes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::types::KeyType;
use crate::{HiveError, Result};

// ============================================================================
// Secondary Index
// ============================================================================

/// A named alternate-key definition on a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryIndex {
    /// Unique index id; assigned when registered with a hive
    pub id: u32,
    /// Index name, unique within the owning resource
    pub name: String,
    /// Semantic type of the secondary key column
    pub key_type: KeyType,
}

impl SecondaryIndex {
    pub fn new(name: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            id: 0,
            name: name.into(),
            key_type,
        }
    }
}

// ============================================================================
// Resource
// ============================================================================

/// A partitionable entity type within a dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Unique resource id; assigned when registered with a hive
    pub id: u32,
    /// Resource name, unique within the owning dimension
    pub name: String,
    /// Semantic type of the resource's row id column
    pub key_type: KeyType,
    /// Whether this resource is the partitioning resource of its dimension
    pub is_partitioning: bool,
    /// Secondary indexes by name
    secondary_indexes: HashMap<String, SecondaryIndex>,
}

impl Resource {
    pub fn new(name: impl Into<String>, key_type: KeyType, is_partitioning: bool) -> Self {
        Self {
            id: 0,
            name: name.into(),
            key_type,
            is_partitioning,
            secondary_indexes: HashMap::new(),
        }
    }

    /// Attach a secondary index (builder form, used when declaring resources)
    pub fn with_secondary_index(mut self, index: SecondaryIndex) -> Self {
        self.secondary_indexes.insert(index.name.clone(), index);
        self
    }

    /// Add a secondary index definition
    pub fn add_secondary_index(&mut self, index: SecondaryIndex) -> Result<()> {
        if self.secondary_indexes.contains_key(&index.name) {
            return Err(HiveError::AlreadyExists(format!(
                "secondary index {} on resource {}",
                index.name, self.name
            )));
        }
        self.secondary_indexes.insert(index.name.clone(), index);
        Ok(())
    }

    /// Remove a secondary index definition
    pub fn remove_secondary_index(&mut self, name: &str) -> Result<SecondaryIndex> {
        self.secondary_indexes.remove(name).ok_or_else(|| {
            HiveError::NotFound(format!("secondary index {} on resource {}", name, self.name))
        })
    }

    /// Get a secondary index by name
    pub fn get_secondary_index(&self, name: &str) -> Option<&SecondaryIndex> {
        self.secondary_indexes.get(name)
    }

    /// Mutable view of all indexes, for id assignment at registration
    pub(crate) fn secondary_indexes_mut(&mut self) -> impl Iterator<Item = &mut SecondaryIndex> {
        self.secondary_indexes.values_mut()
    }

    /// All secondary indexes, ordered by name for deterministic iteration
    pub fn secondary_indexes(&self) -> Vec<&SecondaryIndex> {
        let mut indexes: Vec<&SecondaryIndex> = self.secondary_indexes.values().collect();
        indexes.sort_by(|a, b| a.name.cmp(&b.name));
        indexes
    }
}

// ============================================================================
// Tests
// ============================================================================
