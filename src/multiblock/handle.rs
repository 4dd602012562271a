//! Seekable cursor over one node.

use std::io::{self, SeekFrom};

use crate::error::{Error, Result};

use super::{derived_key, MultiblockStore};

/// A cursor bound to one node.
///
/// The handle only owns its position. Length and block layout are re-read
/// from the node's metadata on every call, so several handles (in this or
/// other processes) can work on the same node. Every operation runs under the
/// store lock.
///
/// Reads past the logical length are zero-padded rather than short. The
/// [`io::Read`] implementation is stricter and stops at the logical length.
#[derive(Debug)]
pub struct NodeHandle<'a> {
    nodes: &'a MultiblockStore,
    key: Vec<u8>,
    position: u64,
}

impl<'a> NodeHandle<'a> {
    pub(super) fn new(nodes: &'a MultiblockStore, key: &[u8]) -> Self {
        Self { nodes, key: key.to_vec(), position: 0 }
    }

    /// Key of the node.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Current position.
    pub fn tell(&self) -> u64 {
        self.position
    }

    /// Moves the cursor and returns the new position.
    ///
    /// Positions past the end are allowed; the next write grows the node to
    /// reach them.
    ///
    /// # Errors
    ///
    /// `UnsupportedSeek` for `SeekFrom::End` with a nonzero offset, and
    /// `InvalidArgument` for a relative seek before position 0.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.position = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta).ok_or_else(|| {
                Error::invalid_argument(format!(
                    "Seek by {} from {} leaves the valid range",
                    delta, self.position
                ))
            })?,
            SeekFrom::End(0) => self.length()?,
            SeekFrom::End(offset) => return Err(Error::UnsupportedSeek(offset)),
        };
        Ok(self.position)
    }

    /// Logical length of the node.
    pub fn length(&self) -> Result<u64> {
        Ok(self.nodes.metadata(&self.key)?.size)
    }

    /// Resizes the node to `size` bytes, or to its current length if `None`.
    ///
    /// Growing allocates zero-filled blocks for the new range. Shrinking
    /// discards blocks past the new end and zeroes the unused tail of the new
    /// last block. The cursor is not moved.
    pub fn truncate(&self, size: Option<u64>) -> Result<()> {
        let nodes = self.nodes;
        let _guard = nodes.lock()?;
        let store = nodes.store();

        let mut meta = nodes.metadata(&self.key)?;
        let block_size = store.block_size() as u64;
        let size = size.unwrap_or(meta.size);

        let final_blocks = size.div_ceil(block_size);
        let current_blocks = meta.size.div_ceil(block_size);

        if final_blocks > current_blocks {
            let zeros = vec![0u8; block_size as usize];
            for index in current_blocks..final_blocks {
                store.write_value_with(&derived_key(&self.key, index)?, &zeros, true)?;
            }
        } else {
            for index in final_blocks..current_blocks {
                store.discard_value(&derived_key(&self.key, index)?)?;
            }
        }

        let tail = (size % block_size) as usize;
        if size < meta.size && tail != 0 {
            let last = derived_key(&self.key, final_blocks - 1)?;
            let mut block = store.read_value(&last)?;
            if let Some(rest) = block.get_mut(tail..) {
                rest.fill(0);
            }
            store.write_value_with(&last, &block, true)?;
        }

        log::trace!(
            "Truncated node {} from {} to {} bytes ({} -> {} blocks)",
            hex::encode(&self.key),
            meta.size,
            size,
            current_blocks,
            final_blocks
        );

        meta.size = size;
        meta.blocks = final_blocks;
        nodes.write_metadata(&meta)
    }

    /// Reads `size` bytes at the cursor (the rest of the node if `None`) and
    /// advances the cursor by `size`.
    ///
    /// Bytes past the logical length read as zeros.
    pub fn read(&mut self, size: Option<u64>) -> Result<Vec<u8>> {
        let nodes = self.nodes;
        let _guard = nodes.lock()?;

        let size = match size {
            Some(size) => size,
            None => self.length()?.saturating_sub(self.position),
        };
        let end = self.end_of(size)?;

        let data = self.read_range(self.position, end, true)?;
        self.position = end;
        Ok(data)
    }

    /// Writes `data` at the cursor, growing the node if needed, and advances
    /// the cursor. Returns the number of bytes written.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }

        let nodes = self.nodes;
        let _guard = nodes.lock()?;
        let store = nodes.store();
        let block_size = store.block_size();

        let end = self.end_of(data.len() as u64)?;
        if end > self.length()? {
            self.truncate(Some(end))?;
        }

        let first_block = self.position / block_size as u64;
        let mut span = self.read_range(self.position, end, false)?;
        let offset = (self.position - first_block * block_size as u64) as usize;
        span[offset..offset + data.len()].copy_from_slice(data);

        for (i, chunk) in span.chunks(block_size).enumerate() {
            let key = derived_key(&self.key, first_block + i as u64)?;
            store.write_value_with(&key, chunk, true)?;
        }

        self.position = end;
        Ok(data.len())
    }

    /// Reads the blocks covering `[start, end)`.
    ///
    /// With `pad`, returns exactly `end - start` bytes; without it, returns
    /// the whole block-aligned span. Blocks past the node's allocated range
    /// read as zeros.
    fn read_range(&self, start: u64, end: u64, pad: bool) -> Result<Vec<u8>> {
        if end <= start {
            return Ok(Vec::new());
        }

        let nodes = self.nodes;
        let _guard = nodes.lock()?;
        let store = nodes.store();

        let meta = nodes.metadata(&self.key)?;
        let block_size = store.block_size();
        let first_block = start / block_size as u64;
        let last_block = end.div_ceil(block_size as u64);

        let span = usize::try_from(last_block - first_block)
            .ok()
            .and_then(|blocks| blocks.checked_mul(block_size))
            .ok_or_else(|| {
                Error::invalid_argument(format!("Range {}..{} is too large to read", start, end))
            })?;
        let mut buf = Vec::new();
        buf.try_reserve(span).map_err(|e| {
            Error::invalid_argument(format!("Range {}..{} is too large to read: {}", start, end, e))
        })?;
        for index in first_block..last_block {
            if index < meta.blocks {
                buf.extend_from_slice(&store.read_value(&derived_key(&self.key, index)?)?);
            }
            buf.resize((index - first_block + 1) as usize * block_size, 0);
        }

        if pad {
            let skip = (start - first_block * block_size as u64) as usize;
            buf.truncate(skip + (end - start) as usize);
            buf.drain(..skip);
        }

        Ok(buf)
    }

    fn end_of(&self, len: u64) -> Result<u64> {
        self.position.checked_add(len).ok_or_else(|| {
            Error::invalid_argument(format!("Range of {} bytes at {} overflows", len, self.position))
        })
    }
}

impl io::Read for NodeHandle<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let nodes = self.nodes;
        let _guard = nodes.lock()?;

        let remaining = self.length()?.saturating_sub(self.position);
        let len = remaining.min(buf.len() as u64);
        if len == 0 {
            return Ok(0);
        }

        let data = NodeHandle::read(self, Some(len))?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }
}

impl io::Write for NodeHandle<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(NodeHandle::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.nodes.store().sync()?)
    }
}

impl io::Seek for NodeHandle<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(NodeHandle::seek(self, pos)?)
    }
}
