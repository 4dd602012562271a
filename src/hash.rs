//! Key hashing.
//!
//! Cells identify values only by a 64-bit xxHash of the key; the key bytes
//! themselves are never written to the index. Two keys with the same
//! fingerprint address the same cell.
//!
//! Node blocks are stored under a derived key: the SHA-256 digest of the node
//! key followed by the little-endian 32-bit block index.

use std::hash::Hasher;

use sha2::{Digest, Sha256};
use twox_hash::XxHash64;

/// Seed for key fingerprints. Changing it changes the on-disk identity of
/// every key.
const KEY_HASH_SEED: u64 = 0;

/// Length of a derived block key.
pub const BLOCK_KEY_LEN: usize = 32;

/// Computes the 64-bit fingerprint stored in an index cell.
pub fn key_hash(key: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(KEY_HASH_SEED);
    hasher.write(key);
    hasher.finish()
}

/// Derives the storage key for block `index` of the node stored at `key`.
pub fn block_key(key: &[u8], index: u32) -> [u8; BLOCK_KEY_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(key);
    hasher.update(index.to_le_bytes());
    hasher.finalize().into()
}
