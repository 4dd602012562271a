//! Block store.
//!
//! A single backing file holds a chain of index segments and a flat region of
//! fixed-size blocks. Each value lives in one block, located through the cell
//! whose fingerprint matches the key.
//!
//! ## File Format
//!
//! ```text
//! offset 0: [Index Segment 0: Header | Cell x N]
//!           [Block] [Block] ...
//!           [Index Segment 1: Header | Cell x N]   <- appended by grow_index
//!           [Block] ...
//! ```
//!
//! Segments form a singly linked list through `continuation_offset`; the
//! first one always starts at offset 0, so no cell and no block can ever live
//! at offset 0. New segments and new blocks are appended at end of file and
//! nothing is ever compacted.
//!
//! ## Locking
//!
//! Every primitive read or write of the file takes the store's [`FileLock`],
//! and every compound operation holds it for its whole sequence of
//! primitives. Lookups rescan the full index on each call so that changes made
//! by other processes are always observed.

pub mod format;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::Options;
use crate::error::{Error, Result};
use crate::hash::key_hash;
use crate::lock::{FileLock, LockGuard};

use format::{cells_per_segment, IndexCell, IndexHeader};

/// Summary of the index and file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of index segments
    pub segments: usize,
    /// Total cells across all segments
    pub cells: usize,
    /// Cells currently holding a value
    pub occupied_cells: usize,
    /// Length of the backing file in bytes
    pub file_len: u64,
}

/// A persistent key-value store of fixed-size blocks in one file.
///
/// `BlockStore` is `Sync`: share it across threads with `Arc<BlockStore>`.
/// Separate processes may open the same path concurrently; they coordinate
/// through `<path>.lock`.
#[derive(Debug)]
pub struct BlockStore {
    /// Path to the backing file
    path: PathBuf,
    /// Backing file (all access happens under `lock`)
    file: File,
    /// Lock shared by every opener of `path`
    lock: FileLock,
    /// Bytes of cell storage per segment, from the first header
    index_size: u16,
    /// Bytes per block, from the first header
    block_size: u16,
    /// Options the store was opened with
    options: Options,
}

impl BlockStore {
    /// Opens the block store at `path`, creating it if needed.
    ///
    /// A missing or empty file is initialised with one empty index segment
    /// using `options.index_size` and `options.block_size`. An existing file
    /// keeps the geometry recorded in its first header.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `options` fails [`Options::validate`]. The check
    /// covers the geometry fields even when an existing file overrides them.
    pub fn open<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        options.validate()?;

        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(options.create_if_missing)
            .open(&path)?;
        let lock = FileLock::open(
            lock_path(&path),
            options.lock_timeout,
            options.lock_retry_interval,
        )?;

        let mut store = Self {
            path,
            file,
            lock,
            index_size: options.index_size as u16,
            block_size: options.block_size as u16,
            options,
        };

        let header = store.load_or_create()?;
        store.index_size = header.index_size;
        store.block_size = header.block_size;

        Ok(store)
    }

    /// Acquire the store lock.
    ///
    /// Operations called while the guard is alive run in the same critical
    /// section, so a sequence of calls is not interleaved with other threads
    /// or processes.
    pub fn lock(&self) -> Result<LockGuard<'_>> {
        self.lock.acquire()
    }

    /// Writes `value` under `key`, using the configured allocation mode for
    /// new blocks.
    pub fn write_value(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write_value_with(key, value, self.options.hard_allocate)
    }

    /// Writes `value` under `key`.
    ///
    /// A new key takes the first free cell (growing the index when all cells
    /// are occupied). If that cell has never had a block, one is appended to
    /// the file: zero-filled when `hard_allocate` is set, otherwise by
    /// extending the file length, which leaves a hole on filesystems with
    /// sparse file support. A cell freed by `discard_value` keeps its block,
    /// which is reused as is.
    ///
    /// # Errors
    ///
    /// `ValueTooLarge` if `value` is longer than the block size. Nothing is
    /// written in that case.
    pub fn write_value_with(&self, key: &[u8], value: &[u8], hard_allocate: bool) -> Result<()> {
        if value.len() > self.block_size as usize {
            return Err(Error::value_too_large(key, value.len(), self.block_size as usize));
        }

        let _guard = self.lock.acquire()?;
        let hash = key_hash(key);

        let (cell_offset, mut cell) = match self.find_cell(hash)? {
            Some(found) => found,
            None => {
                let (offset, mut cell) = self.allocate_cell()?;
                if !cell.has_block() {
                    cell.data_offset = self.allocate_block(hard_allocate)?;
                }
                cell.occupied = true;
                cell.key_hash = hash;
                (offset, cell)
            }
        };

        cell.data_length = value.len() as u16;
        self.write_bytes(cell.data_offset as u64, value)?;
        self.write_cell(cell_offset, &cell)?;

        if self.options.sync_writes {
            self.sync()?;
        }

        log::trace!(
            "Wrote {} bytes for key {} at offset {}",
            value.len(),
            hex::encode(key),
            cell.data_offset
        );
        Ok(())
    }

    /// Reads the value stored under `key`.
    pub fn read_value(&self, key: &[u8]) -> Result<Vec<u8>> {
        let _guard = self.lock.acquire()?;

        let (_, cell) = self.find_cell(key_hash(key))?.ok_or_else(|| Error::key_not_found(key))?;
        self.read_bytes(cell.data_offset as u64, cell.data_length as usize)
    }

    /// Removes `key`.
    ///
    /// The cell is only marked free; its block location and length stay
    /// recorded so the block is reused by the next key placed in the cell.
    pub fn discard_value(&self, key: &[u8]) -> Result<()> {
        let _guard = self.lock.acquire()?;

        let (offset, mut cell) =
            self.find_cell(key_hash(key))?.ok_or_else(|| Error::key_not_found(key))?;
        cell.occupied = false;
        self.write_cell(offset, &cell)?;

        if self.options.sync_writes {
            self.sync()?;
        }

        log::trace!("Discarded key {}", hex::encode(key));
        Ok(())
    }

    /// Whether a value is stored under `key`.
    pub fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.find_key(key)?.is_some())
    }

    /// Returns the file offset of the occupied cell for `key`, if any.
    ///
    /// The offset is never 0, since the first index header occupies that
    /// byte. Keys are matched by fingerprint only.
    pub fn find_key(&self, key: &[u8]) -> Result<Option<u64>> {
        Ok(self.find_cell(key_hash(key))?.map(|(offset, _)| offset))
    }

    /// Walks the segment chain from offset 0.
    ///
    /// Returns each segment's offset and header, in chain order.
    pub fn list_segments(&self) -> Result<Vec<(u64, IndexHeader)>> {
        let _guard = self.lock.acquire()?;

        let mut segments = Vec::new();
        let mut offset = 0u64;
        loop {
            let header = self.read_header(offset)?;
            segments.push((offset, header));

            if !header.has_continuation {
                return Ok(segments);
            }

            let next = header.continuation_offset as u64;
            if next <= offset {
                return Err(Error::corruption(format!(
                    "Index segment at {} continues backwards to {}",
                    offset, next
                )));
            }
            offset = next;
        }
    }

    /// Reads every cell of every segment, keyed by the cell's file offset.
    pub fn list_cells(&self) -> Result<BTreeMap<u64, IndexCell>> {
        let _guard = self.lock.acquire()?;

        let array_len = self.cells_per_segment() * IndexCell::SIZE;
        let mut cells = BTreeMap::new();

        for (segment_offset, _) in self.list_segments()? {
            let base = segment_offset + IndexHeader::SIZE as u64;
            let raw = self.read_bytes(base, array_len)?;

            for (i, chunk) in raw.chunks_exact(IndexCell::SIZE).enumerate() {
                let offset = base + (i * IndexCell::SIZE) as u64;
                cells.insert(offset, IndexCell::decode(chunk)?);
            }
        }

        Ok(cells)
    }

    /// Appends an empty index segment and links the current last segment to
    /// it. Returns the new segment's offset.
    pub fn grow_index(&self) -> Result<u64> {
        let _guard = self.lock.acquire()?;

        let segments = self.list_segments()?;
        let (last_offset, mut last_header) = match segments.last() {
            Some(last) => *last,
            None => return Err(Error::corruption("Index has no segments")),
        };

        let new_offset = self.file_len()?;
        let continuation_offset = to_file_offset(new_offset)?;
        self.write_segment(new_offset)?;

        last_header.has_continuation = true;
        last_header.continuation_offset = continuation_offset;
        self.write_header(last_offset, &last_header)?;

        log::debug!(
            "Grew index of {:?}: segment {} at offset {}",
            self.path,
            segments.len(),
            new_offset
        );
        Ok(new_offset)
    }

    /// Returns the offset of the first free cell, growing the index until one
    /// exists.
    pub fn allocate_free_cell(&self) -> Result<u64> {
        Ok(self.allocate_cell()?.0)
    }

    /// Flushes the backing file to disk.
    pub fn sync(&self) -> Result<()> {
        let _guard = self.lock.acquire()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Counts segments and cells.
    pub fn stats(&self) -> Result<StoreStats> {
        let _guard = self.lock.acquire()?;

        let segments = self.list_segments()?.len();
        let cells = self.list_cells()?;
        let occupied_cells = cells.values().filter(|cell| cell.occupied).count();

        Ok(StoreStats { segments, cells: cells.len(), occupied_cells, file_len: self.file_len()? })
    }

    /// Bytes per block.
    pub fn block_size(&self) -> usize {
        self.block_size as usize
    }

    /// Bytes of cell storage per index segment.
    pub fn index_size(&self) -> usize {
        self.index_size as usize
    }

    /// Number of cells in each index segment.
    pub fn cells_per_segment(&self) -> usize {
        cells_per_segment(self.index_size)
    }

    /// Path to the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Options the store was opened with.
    pub fn options(&self) -> &Options {
        &self.options
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Writes the first segment of an empty file or reads the existing one.
    fn load_or_create(&self) -> Result<IndexHeader> {
        let _guard = self.lock.acquire()?;

        if self.file_len()? == 0 {
            self.write_segment(0)?;
            log::info!(
                "Created block store {:?} (index_size={}, block_size={})",
                self.path,
                self.index_size,
                self.block_size
            );
            return self.read_header(0);
        }

        let header = self.read_header(0)?;
        if (header.index_size as usize) < IndexCell::SIZE || header.block_size == 0 {
            return Err(Error::corruption(format!(
                "Invalid geometry in {:?}: index_size={}, block_size={}",
                self.path, header.index_size, header.block_size
            )));
        }
        if header.index_size != self.index_size || header.block_size != self.block_size {
            log::debug!(
                "Using stored geometry for {:?}: index_size={}, block_size={}",
                self.path,
                header.index_size,
                header.block_size
            );
        }

        log::info!("Opened block store {:?}", self.path);
        Ok(header)
    }

    /// First-fit search for a free cell, growing the index when full.
    fn allocate_cell(&self) -> Result<(u64, IndexCell)> {
        let _guard = self.lock.acquire()?;

        loop {
            let free = self.list_cells()?.into_iter().find(|(_, cell)| !cell.occupied);
            if let Some(found) = free {
                return Ok(found);
            }
            self.grow_index()?;
        }
    }

    /// Appends a block at end of file and returns its offset.
    fn allocate_block(&self, hard_allocate: bool) -> Result<u32> {
        let _guard = self.lock.acquire()?;

        let offset = self.file_len()?;
        let data_offset = to_file_offset(offset)?;

        if hard_allocate {
            self.write_bytes(offset, &vec![0u8; self.block_size as usize])?;
        } else {
            self.file.set_len(offset + self.block_size as u64)?;
        }

        Ok(data_offset)
    }

    fn find_cell(&self, hash: u64) -> Result<Option<(u64, IndexCell)>> {
        Ok(self
            .list_cells()?
            .into_iter()
            .find(|(_, cell)| cell.occupied && cell.key_hash == hash))
    }

    /// Writes a terminal header followed by zeroed cells at `offset`.
    fn write_segment(&self, offset: u64) -> Result<()> {
        let header = IndexHeader::terminal(self.index_size, self.block_size);

        let mut buf = Vec::with_capacity(format::segment_len(self.index_size));
        buf.extend_from_slice(&header.encode());
        buf.resize(format::segment_len(self.index_size), 0);

        self.write_bytes(offset, &buf)
    }

    fn read_header(&self, offset: u64) -> Result<IndexHeader> {
        IndexHeader::decode(&self.read_bytes(offset, IndexHeader::SIZE)?)
    }

    fn write_header(&self, offset: u64, header: &IndexHeader) -> Result<()> {
        self.write_bytes(offset, &header.encode())
    }

    fn write_cell(&self, offset: u64, cell: &IndexCell) -> Result<()> {
        self.write_bytes(offset, &cell.encode())
    }

    fn read_bytes(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let _guard = self.lock.acquire()?;

        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write_bytes(&self, offset: u64, data: &[u8]) -> Result<()> {
        let _guard = self.lock.acquire()?;

        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        Ok(())
    }

    fn file_len(&self) -> Result<u64> {
        let _guard = self.lock.acquire()?;
        Ok(self.file.metadata()?.len())
    }
}

/// Lock file path for a backing file: `<path>.lock`.
pub fn lock_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

fn to_file_offset(offset: u64) -> Result<u32> {
    u32::try_from(offset).map_err(|_| {
        Error::invalid_argument(format!("File offset {} exceeds the 32-bit index range", offset))
    })
}
