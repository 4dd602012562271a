//! Typed values over nodes.
//!
//! A `Shelf` maps byte keys to any serde-serializable value. Each value is
//! bincode-encoded into its own node, so values are not limited by the block
//! size.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::Options;
use crate::error::Result;
use crate::multiblock::MultiblockStore;

/// Persistent map of typed values.
///
/// ```no_run
/// use yunyun::{Options, Shelf};
///
/// # fn main() -> yunyun::Result<()> {
/// let shelf = Shelf::open("./settings.db", Options::default())?;
/// shelf.set(b"retries", &3u32)?;
/// assert_eq!(shelf.get::<u32>(b"retries")?, Some(3));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Shelf {
    nodes: MultiblockStore,
}

impl Shelf {
    /// Opens the shelf backed by the file at `path`.
    pub fn open<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        Ok(Self::new(MultiblockStore::open(path, options)?))
    }

    /// Wraps an open node store.
    pub fn new(nodes: MultiblockStore) -> Self {
        Self { nodes }
    }

    /// The underlying node store.
    pub fn nodes(&self) -> &MultiblockStore {
        &self.nodes
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set<T: Serialize + ?Sized>(&self, key: &[u8], value: &T) -> Result<()> {
        let data = bincode::serialize(value)?;
        let _guard = self.nodes.lock()?;

        if !self.nodes.node_exists(key)? {
            self.nodes.create_node(key)?;
        }

        let mut handle = self.nodes.open_handle(key)?;
        handle.write(&data)?;
        handle.truncate(Some(data.len() as u64))
    }

    /// Loads the value stored under `key`.
    pub fn get<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        let _guard = self.nodes.lock()?;

        if !self.nodes.node_exists(key)? {
            return Ok(None);
        }

        let data = self.nodes.open_handle(key)?.read(None)?;
        Ok(Some(bincode::deserialize(&data)?))
    }

    /// Removes `key`. Returns whether it was present.
    pub fn remove(&self, key: &[u8]) -> Result<bool> {
        let _guard = self.nodes.lock()?;

        if !self.nodes.node_exists(key)? {
            return Ok(false);
        }
        self.nodes.remove_node(key)?;
        Ok(true)
    }

    /// Whether a value is stored under `key`.
    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        self.nodes.node_exists(key)
    }
}
