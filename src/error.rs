//! Error types for the Yunyun block store.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The result type used throughout Yunyun.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for Yunyun operations.
///
/// Variants that refer to a caller-supplied key carry it hex-encoded, since
/// keys are arbitrary bytes.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error occurred on the backing file or the lock file.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A value write exceeded the configured block size.
    #[error("Value too large for key {key}: {size} bytes exceeds block size {block_size}")]
    ValueTooLarge {
        /// Hex-encoded key.
        key: String,
        /// Length of the rejected value.
        size: usize,
        /// Block size of the store.
        block_size: usize,
    },

    /// A read or discard referenced a key that is not stored.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// A node was created under a key that already holds a value.
    #[error("Node already exists: {0}")]
    NodeExists(String),

    /// A node operation referenced a key that holds no node.
    #[error("Node does not exist: {0}")]
    NodeDoesNotExist(String),

    /// An end-relative seek was given a nonzero offset.
    #[error("Unsupported seek: end-relative offset must be 0, got {0}")]
    UnsupportedSeek(i64),

    /// The file lock could not be acquired within the configured timeout.
    #[error("Timed out after {waited:?} waiting for lock {path:?}")]
    LockTimeout {
        /// Path of the lock file.
        path: PathBuf,
        /// How long acquisition was attempted.
        waited: Duration,
    },

    /// The backing file contains data that cannot be a valid index.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Node metadata or a shelf value failed to (de)serialize.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a key-not-found error for `key`.
    pub fn key_not_found(key: &[u8]) -> Self {
        Error::KeyNotFound(hex::encode(key))
    }

    /// Creates a node-exists error for `key`.
    pub fn node_exists(key: &[u8]) -> Self {
        Error::NodeExists(hex::encode(key))
    }

    /// Creates a node-does-not-exist error for `key`.
    pub fn node_does_not_exist(key: &[u8]) -> Self {
        Error::NodeDoesNotExist(hex::encode(key))
    }

    /// Creates a value-too-large error for `key`.
    pub fn value_too_large(key: &[u8], size: usize, block_size: usize) -> Self {
        Error::ValueTooLarge { key: hex::encode(key), size, block_size }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match &err {
            Error::Io(e) => return io::Error::new(e.kind(), err),
            Error::KeyNotFound(_) | Error::NodeDoesNotExist(_) => io::ErrorKind::NotFound,
            Error::NodeExists(_) => io::ErrorKind::AlreadyExists,
            Error::UnsupportedSeek(_) | Error::InvalidArgument(_) => io::ErrorKind::InvalidInput,
            Error::ValueTooLarge { .. } => io::ErrorKind::InvalidInput,
            Error::LockTimeout { .. } => io::ErrorKind::TimedOut,
            Error::Corruption(_) | Error::Serialization(_) => io::ErrorKind::InvalidData,
        };
        io::Error::new(kind, err)
    }
}
