//! Multiblock nodes.
//!
//! A node is a variable-length byte stream built from block store values:
//!
//! ```text
//! key                     -> NodeMetadata { key, blocks, size }
//! sha256(key || 0u32 LE)  -> block 0
//! sha256(key || 1u32 LE)  -> block 1
//! ...
//! ```
//!
//! Every derived block is stored at full block size. Bytes at or past the
//! node's logical size are kept zeroed, so growing a node always exposes
//! zeros.

mod handle;
pub mod metadata;

pub use handle::NodeHandle;
pub use metadata::NodeMetadata;

use std::path::Path;

use crate::config::Options;
use crate::error::{Error, Result};
use crate::hash::block_key;
use crate::lock::LockGuard;
use crate::store::BlockStore;

/// Node lifecycle operations over a [`BlockStore`].
///
/// Handles returned by [`open_handle`](Self::open_handle) borrow the store;
/// wrap it in an `Arc` to use nodes from several threads.
#[derive(Debug)]
pub struct MultiblockStore {
    store: BlockStore,
}

impl MultiblockStore {
    /// Opens the block store at `path` and layers nodes over it.
    pub fn open<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        Ok(Self::new(BlockStore::open(path, options)?))
    }

    /// Layers nodes over an already open block store.
    pub fn new(store: BlockStore) -> Self {
        Self { store }
    }

    /// The underlying block store.
    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    /// Acquire the store lock for a group of node operations.
    pub fn lock(&self) -> Result<LockGuard<'_>> {
        self.store.lock()
    }

    /// Creates an empty node at `key`.
    ///
    /// # Errors
    ///
    /// `NodeExists` if any value is already stored under `key`;
    /// `ValueTooLarge` if the key is too long for its metadata to fit in one
    /// block.
    pub fn create_node(&self, key: &[u8]) -> Result<()> {
        let _guard = self.store.lock()?;

        if self.store.exists(key)? {
            return Err(Error::node_exists(key));
        }
        self.write_metadata(&NodeMetadata::empty(key))?;

        log::debug!("Created node {}", hex::encode(key));
        Ok(())
    }

    /// Removes the node at `key` and all of its blocks.
    pub fn remove_node(&self, key: &[u8]) -> Result<()> {
        let _guard = self.store.lock()?;

        let meta = self.metadata(key)?;
        self.store.discard_value(key)?;
        for index in 0..meta.blocks {
            self.store.discard_value(&derived_key(key, index)?)?;
        }

        log::debug!("Removed node {} ({} blocks)", hex::encode(key), meta.blocks);
        Ok(())
    }

    /// Whether a node exists at `key`.
    pub fn node_exists(&self, key: &[u8]) -> Result<bool> {
        self.store.exists(key)
    }

    /// Opens a cursor on the node at `key`, positioned at 0.
    pub fn open_handle(&self, key: &[u8]) -> Result<NodeHandle<'_>> {
        if !self.node_exists(key)? {
            return Err(Error::node_does_not_exist(key));
        }
        Ok(NodeHandle::new(self, key))
    }

    /// Bytes per block of the underlying store.
    pub fn block_size(&self) -> usize {
        self.store.block_size()
    }

    pub(crate) fn metadata(&self, key: &[u8]) -> Result<NodeMetadata> {
        match self.store.read_value(key) {
            Ok(data) => NodeMetadata::decode(&data),
            Err(Error::KeyNotFound(_)) => Err(Error::node_does_not_exist(key)),
            Err(e) => Err(e),
        }
    }

    pub(crate) fn write_metadata(&self, meta: &NodeMetadata) -> Result<()> {
        self.store.write_value(&meta.key, &meta.encode()?)
    }
}

/// Storage key of block `index` of the node at `key`.
pub(crate) fn derived_key(key: &[u8], index: u64) -> Result<[u8; crate::hash::BLOCK_KEY_LEN]> {
    let index = u32::try_from(index).map_err(|_| {
        Error::invalid_argument(format!("Block index {} exceeds the 32-bit range", index))
    })?;
    Ok(block_key(key, index))
}
