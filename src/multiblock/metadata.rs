//! Node metadata record.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Metadata stored under a node's own key.
///
/// Encoded with bincode's default (fixed-width, little-endian) configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// Key of the node
    pub key: Vec<u8>,
    /// Number of derived blocks currently allocated
    pub blocks: u64,
    /// Logical length in bytes
    pub size: u64,
}

impl NodeMetadata {
    /// Metadata of a freshly created, empty node.
    pub fn empty(key: &[u8]) -> Self {
        Self { key: key.to_vec(), blocks: 0, size: 0 }
    }

    /// Serialize the record.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize a record.
    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}
