//! Entity configuration contracts
//!
//! Collaborators (ORM adapters, ingestion layers) describe the entity types
//! they shard through plain descriptors: which resource a type maps to,
//! which dimension it partitions along, and which of its attributes feed the
//! primary and secondary indexes. Records are plain data-transfer structs
//! implementing [`EntityRecord`]; no runtime code generation is involved.

use serde::{Deserialize, Serialize};

use crate::meta::{KeyType, KeyValue, Resource, SecondaryIndex};

// ============================================================================
// Entity Descriptors
// ============================================================================

/// Declares one secondary index an entity type exposes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityIndexConfig {
    /// Index name, unique within the entity's resource
    pub name: String,
    /// Semantic type of the indexed attribute
    pub key_type: KeyType,
}

impl EntityIndexConfig {
    pub fn new(name: impl Into<String>, key_type: KeyType) -> Self {
        Self {
            name: name.into(),
            key_type,
        }
    }
}

/// Declares how one entity type maps onto the hive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    /// The dimension the entity partitions along
    pub dimension_name: String,
    /// The resource its rows live in
    pub resource_name: String,
    /// Semantic type of the entity's row id
    pub id_type: KeyType,
    /// Whether the entity is the partitioning resource of its dimension
    pub is_partitioning: bool,
    /// Declared secondary indexes
    pub indexes: Vec<EntityIndexConfig>,
}

impl EntityConfig {
    pub fn new(
        dimension_name: impl Into<String>,
        resource_name: impl Into<String>,
        id_type: KeyType,
    ) -> Self {
        Self {
            dimension_name: dimension_name.into(),
            resource_name: resource_name.into(),
            id_type,
            is_partitioning: false,
            indexes: Vec::new(),
        }
    }

    pub fn partitioning(mut self) -> Self {
        self.is_partitioning = true;
        self
    }

    pub fn with_index(mut self, index: EntityIndexConfig) -> Self {
        self.indexes.push(index);
        self
    }

    /// The resource declaration this entity induces
    pub fn to_resource(&self) -> Resource {
        let mut resource = Resource::new(
            self.resource_name.clone(),
            self.id_type,
            self.is_partitioning,
        );
        for index in &self.indexes {
            resource = resource
                .with_secondary_index(SecondaryIndex::new(index.name.clone(), index.key_type));
        }
        resource
    }
}

// ============================================================================
// Entity Records
// ============================================================================

/// Capability contract for a shardable record
///
/// Implemented by plain structs. The accessors hand the directory the keys
/// it needs: the row id, the partitioning key the row is parented to, and
/// the value of each declared secondary index.
pub trait EntityRecord {
    /// The record's row id
    fn id(&self) -> KeyValue;

    /// The primary index key the record is parented to
    fn primary_index_key(&self) -> KeyValue;

    /// The record's value for a declared secondary index, if it has one
    fn secondary_index_key(&self, index_name: &str) -> Option<KeyValue>;
}

// ============================================================================
// Tests
// ============================================================================
