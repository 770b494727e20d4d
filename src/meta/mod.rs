//! Partition Metadata Model
//!
//! The administrative data model of the hive: what is sharded, over which
//! nodes, and under which key types.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  PartitionDimension                                       │
//! │  - named axis of sharding, one primary key type          │
//! │  - exactly one NodeGroup                                 │
//! ├──────────────────────────────────────────────────────────┤
//! │  NodeGroup / Node                                         │
//! │  - physical endpoints holding subsets of keys            │
//! │  - node-level read-only flag, capacity weight            │
//! ├──────────────────────────────────────────────────────────┤
//! │  Resource                                                 │
//! │  - partitionable entity type within a dimension          │
//! │  - the partitioning resource shares the primary key space│
//! ├──────────────────────────────────────────────────────────┤
//! │  SecondaryIndex                                           │
//! │  - alternate-key lookup resolving back to the owner      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! All entities here are created administratively, never by data operations,
//! and are additive-only under synchronization.

pub mod dimension;
pub mod node;
pub mod resource;
pub mod types;

pub use dimension::PartitionDimension;
pub use node::{Node, NodeGroup, NodeId};
pub use resource::{Resource, SecondaryIndex};
pub use types::{IdAllocator, KeyType, KeyValue};
