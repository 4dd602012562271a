//! On-disk index format.
//!
//! All integers are little-endian and fields are packed without padding.
//!
//! ```text
//! Index Header: [has_continuation: u8][continuation_offset: u32][index_size: u16][block_size: u16]
//! Index Cell:   [occupied: u8][key_hash: u64][data_offset: u32][data_length: u16]
//! ```
//!
//! Widths are derived from the field types rather than written out by hand.

use std::mem::size_of;

use crate::error::{Error, Result};

/// Header at the start of every index segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexHeader {
    /// Whether another segment follows this one
    pub has_continuation: bool,
    /// File offset of the next segment (meaningful only with `has_continuation`)
    pub continuation_offset: u32,
    /// Bytes of cell storage per segment
    pub index_size: u16,
    /// Bytes per block
    pub block_size: u16,
}

impl IndexHeader {
    /// Encoded width of a header.
    pub const SIZE: usize = size_of::<u8>() + size_of::<u32>() + size_of::<u16>() + size_of::<u16>();

    /// Header of a segment that ends the chain.
    pub fn terminal(index_size: u16, block_size: u16) -> Self {
        Self { has_continuation: false, continuation_offset: 0, index_size, block_size }
    }

    /// Encode the header to bytes.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.has_continuation as u8;
        buf[1..5].copy_from_slice(&self.continuation_offset.to_le_bytes());
        buf[5..7].copy_from_slice(&self.index_size.to_le_bytes());
        buf[7..9].copy_from_slice(&self.block_size.to_le_bytes());
        buf
    }

    /// Decode a header from bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::corruption(format!(
                "Index header too short: expected {}, got {}",
                Self::SIZE,
                data.len()
            )));
        }

        Ok(Self {
            has_continuation: data[0] != 0,
            continuation_offset: u32::from_le_bytes([data[1], data[2], data[3], data[4]]),
            index_size: u16::from_le_bytes([data[5], data[6]]),
            block_size: u16::from_le_bytes([data[7], data[8]]),
        })
    }
}

/// One slot of an index segment.
///
/// A discarded cell keeps `data_offset` and `data_length` so its block can be
/// handed to the next key that lands in the cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexCell {
    /// Whether the cell currently holds a value
    pub occupied: bool,
    /// Fingerprint of the key
    pub key_hash: u64,
    /// File offset of the block (0 = never allocated)
    pub data_offset: u32,
    /// Valid prefix of the block
    pub data_length: u16,
}

impl IndexCell {
    /// Encoded width of a cell.
    pub const SIZE: usize = size_of::<u8>() + size_of::<u64>() + size_of::<u32>() + size_of::<u16>();

    /// Whether the cell has ever been given a block.
    pub fn has_block(&self) -> bool {
        self.data_offset != 0
    }

    /// Encode the cell to bytes.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.occupied as u8;
        buf[1..9].copy_from_slice(&self.key_hash.to_le_bytes());
        buf[9..13].copy_from_slice(&self.data_offset.to_le_bytes());
        buf[13..15].copy_from_slice(&self.data_length.to_le_bytes());
        buf
    }

    /// Decode a cell from bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::corruption(format!(
                "Index cell too short: expected {}, got {}",
                Self::SIZE,
                data.len()
            )));
        }

        let mut hash = [0u8; 8];
        hash.copy_from_slice(&data[1..9]);

        Ok(Self {
            occupied: data[0] != 0,
            key_hash: u64::from_le_bytes(hash),
            data_offset: u32::from_le_bytes([data[9], data[10], data[11], data[12]]),
            data_length: u16::from_le_bytes([data[13], data[14]]),
        })
    }
}

/// Number of cells in a segment with the given `index_size`.
pub fn cells_per_segment(index_size: u16) -> usize {
    index_size as usize / IndexCell::SIZE
}

/// Total encoded length of a segment (header plus cell array).
pub fn segment_len(index_size: u16) -> usize {
    IndexHeader::SIZE + cells_per_segment(index_size) * IndexCell::SIZE
}
