//! Partition dimensions
//!
//! A partition dimension is the unit of sharding: a named axis with its own
//! primary key type, one node group, and the resources partitioned along it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::node::NodeGroup;
use super::resource::Resource;
use super::types::KeyType;
use crate::{HiveError, Result};

/// The unit of sharding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionDimension {
    /// Unique dimension id; assigned when registered with a hive
    pub id: u32,
    /// Dimension name, unique within a hive
    pub name: String,
    /// Semantic type of the primary index key
    pub key_type: KeyType,
    /// Location hint for the dimension's directory snapshot
    pub index_uri: Option<String>,
    /// The dimension's node pool
    node_group: NodeGroup,
    /// Resources by name
    resources: HashMap<String, Resource>,
    /// Creation timestamp (epoch seconds)
    pub created_at: i64,
    /// Last modified timestamp
    pub modified_at: i64,
}

impl PartitionDimension {
    pub fn new(name: impl Into<String>, key_type: KeyType) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: 0,
            name: name.into(),
            key_type,
            index_uri: None,
            node_group: NodeGroup::new(),
            resources: HashMap::new(),
            created_at: now,
            modified_at: now,
        }
    }

    /// Set the directory location hint
    pub fn with_index_uri(mut self, uri: impl Into<String>) -> Self {
        self.index_uri = Some(uri.into());
        self
    }

    /// Declare a resource (builder form, used before registering with a hive)
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resources.insert(resource.name.clone(), resource);
        self
    }

    pub fn node_group(&self) -> &NodeGroup {
        &self.node_group
    }

    pub fn node_group_mut(&mut self) -> &mut NodeGroup {
        &mut self.node_group
    }

    /// Add a resource
    pub fn add_resource(&mut self, resource: Resource) -> Result<()> {
        if self.resources.contains_key(&resource.name) {
            return Err(HiveError::AlreadyExists(format!("resource {}", resource.name)));
        }
        self.resources.insert(resource.name.clone(), resource);
        self.touch();
        Ok(())
    }

    /// Remove a resource by name
    pub fn remove_resource(&mut self, name: &str) -> Result<Resource> {
        let resource = self
            .resources
            .remove(name)
            .ok_or_else(|| HiveError::NotFound(format!("resource {}", name)))?;
        self.touch();
        Ok(resource)
    }

    /// Get a resource by name
    pub fn get_resource(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    pub fn get_resource_mut(&mut self, name: &str) -> Option<&mut Resource> {
        self.resources.get_mut(name)
    }

    /// All resources, ordered by name for deterministic iteration
    pub fn resources(&self) -> Vec<&Resource> {
        let mut resources: Vec<&Resource> = self.resources.values().collect();
        resources.sort_by(|a, b| a.name.cmp(&b.name));
        resources
    }

    /// Mutable view of all resources, for id assignment at registration
    pub(crate) fn resources_mut(&mut self) -> impl Iterator<Item = &mut Resource> {
        self.resources.values_mut()
    }

    pub(crate) fn touch(&mut self) {
        self.modified_at = chrono::Utc::now().timestamp();
    }
}

// ============================================================================
// Tests
// ============================================================================
