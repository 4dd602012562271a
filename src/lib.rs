//! # Yunyun - A Persistent Block Store with Transparent File Locking
//!
//! Yunyun keeps key-value data in a single file and makes it safe to share
//! between threads and between processes: every operation runs under a
//! reentrant advisory lock on `<path>.lock`.
//!
//! ## Architecture
//!
//! - **Block Store** ([`BlockStore`]): a chained on-disk index of
//!   hash-addressed cells, each pointing at one fixed-size block. Values are
//!   at most one block long. Freed cells keep their block for reuse.
//! - **Multiblock Layer** ([`MultiblockStore`], [`NodeHandle`]): variable
//!   length "nodes" stored as a metadata record plus a chain of derived
//!   blocks, exposed through a seekable cursor.
//! - **Shelf** ([`Shelf`]): serde values of any size stored as nodes.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::io::SeekFrom;
//! use yunyun::{MultiblockStore, Options};
//!
//! # fn main() -> Result<(), yunyun::Error> {
//! let nodes = MultiblockStore::open("./data.yun", Options::default())?;
//!
//! // Small values go straight into the block store
//! nodes.store().write_value(b"greeting", b"hi")?;
//! assert_eq!(nodes.store().read_value(b"greeting")?, b"hi");
//!
//! // Larger data lives in nodes
//! nodes.create_node(b"file1")?;
//! let mut handle = nodes.open_handle(b"file1")?;
//! handle.write(b"hello")?;
//! handle.seek(SeekFrom::Start(0))?;
//! assert_eq!(handle.read(Some(5))?, b"hello");
//! # Ok(())
//! # }
//! ```
//!
//! ## Limitations
//!
//! - Keys are identified by a 64-bit fingerprint only; two keys with equal
//!   fingerprints address the same value.
//! - Lookups scan the whole index, so their cost grows with the number of
//!   cells.
//! - Multi-block writes are not atomic: a crash mid-write can leave some
//!   blocks updated and others not.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod config;
pub mod error;
pub mod hash;
pub mod lock;
pub mod multiblock;
pub mod shelf;
pub mod store;

// Re-exports
pub use config::Options;
pub use error::{Error, Result};
pub use lock::{FileLock, LockGuard};
pub use multiblock::{MultiblockStore, NodeHandle, NodeMetadata};
pub use shelf::Shelf;
pub use store::{BlockStore, StoreStats};

/// Current version of Yunyun
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
