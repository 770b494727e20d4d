//! Semantic key types and dynamically typed key values
//!
//! Every partition dimension, resource, and secondary index declares the
//! semantic type of its key column. Key values carried through the directory
//! know their own type, and every directory operation checks the value
//! against the declared column type before any mapping is touched.

use std::fmt;
use std::hash::{Hash, Hasher};

use ahash::AHasher;
use serde::{Deserialize, Serialize};

// ============================================================================
// Key Type
// ============================================================================

/// Semantic type of a key column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    /// 64-bit signed integer keys
    Integer,
    /// UTF-8 string keys
    String,
    /// Date keys, stored as epoch seconds
    Date,
    /// Opaque binary keys
    Bytes,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyType::Integer => "integer",
            KeyType::String => "string",
            KeyType::Date => "date",
            KeyType::Bytes => "bytes",
        };
        write!(f, "{}", name)
    }
}

// ============================================================================
// Key Value
// ============================================================================

/// A key value flowing through the directory
///
/// Primary index keys, resource row ids, and secondary index keys are all
/// `KeyValue`s. Equality and hashing are by value, so a key can be used as a
/// map key in the directory tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyValue {
    Int(i64),
    Str(String),
    /// Epoch seconds
    Date(i64),
    Bytes(Vec<u8>),
}

impl KeyValue {
    /// The semantic type of this value
    pub fn kind(&self) -> KeyType {
        match self {
            KeyValue::Int(_) => KeyType::Integer,
            KeyValue::Str(_) => KeyType::String,
            KeyValue::Date(_) => KeyType::Date,
            KeyValue::Bytes(_) => KeyType::Bytes,
        }
    }

    /// Build a date key from a chrono timestamp
    pub fn from_datetime(dt: chrono::DateTime<chrono::Utc>) -> Self {
        KeyValue::Date(dt.timestamp())
    }

    /// Compute a stable hash of the key (for node assignment)
    pub fn hash_value(&self) -> u64 {
        let mut hasher = AHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(v) => write!(f, "{}", v),
            KeyValue::Str(s) => write!(f, "{}", s),
            KeyValue::Date(ts) => write!(f, "date:{}", ts),
            KeyValue::Bytes(b) => write!(f, "bytes:{}", b.len()),
        }
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        KeyValue::Int(v)
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::Str(v.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(v: String) -> Self {
        KeyValue::Str(v)
    }
}

// ============================================================================
// Id Allocation
// ============================================================================

/// Allocates ids for metadata entities within one hive instance
///
/// Ids are assigned when an entity is registered with the hive, under the
/// same lock that guards the metadata, and the high-water mark is persisted
/// with the hive snapshot so reloaded instances keep allocating above it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Hand out the next id
    pub fn allocate(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
