//! Configuration options for the Yunyun block store.

use std::time::Duration;

use crate::store::format::IndexCell;

/// Configuration options for opening a block store.
///
/// `index_size` and `block_size` only apply when a new backing file is
/// created. Opening an existing file re-derives both from its first index
/// header.
#[derive(Debug, Clone)]
pub struct Options {
    /// Create the backing file if it doesn't exist.
    /// Default: true
    pub create_if_missing: bool,

    /// Bytes of cell storage per index segment.
    /// Each segment holds `index_size / cell width` cells.
    /// Default: 4KB
    pub index_size: usize,

    /// Bytes per block. Must fit the 16-bit length field of a cell.
    /// Default: 4KB
    pub block_size: usize,

    /// Zero-fill newly allocated blocks instead of extending the file sparsely.
    /// Default: false
    pub hard_allocate: bool,

    /// Sync the backing file after every value write or discard.
    /// Default: false
    pub sync_writes: bool,

    /// Upper bound on waiting for the file lock. `None` waits forever.
    /// Default: None
    pub lock_timeout: Option<Duration>,

    /// Polling interval while waiting for the lock with a timeout.
    /// Default: 10ms
    pub lock_retry_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            index_size: 4 * 1024, // 4KB
            block_size: 4 * 1024, // 4KB
            hard_allocate: false,
            sync_writes: false,
            lock_timeout: None,
            lock_retry_interval: Duration::from_millis(10),
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the backing file if it doesn't exist.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the index segment size used for new files.
    pub fn index_size(mut self, size: usize) -> Self {
        self.index_size = size;
        self
    }

    /// Sets the block size used for new files.
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Sets the default block allocation mode.
    pub fn hard_allocate(mut self, value: bool) -> Self {
        self.hard_allocate = value;
        self
    }

    /// Enables or disables syncing after each write.
    pub fn sync_writes(mut self, value: bool) -> Self {
        self.sync_writes = value;
        self
    }

    /// Sets the lock acquisition timeout.
    pub fn lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets the lock polling interval.
    pub fn lock_retry_interval(mut self, interval: Duration) -> Self {
        self.lock_retry_interval = interval;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.index_size < IndexCell::SIZE {
            return Err(crate::Error::invalid_argument(format!(
                "index_size must hold at least one cell ({} bytes)",
                IndexCell::SIZE
            )));
        }
        if self.index_size > u16::MAX as usize {
            return Err(crate::Error::invalid_argument("index_size must be <= 65535"));
        }
        if self.block_size == 0 {
            return Err(crate::Error::invalid_argument("block_size must be > 0"));
        }
        if self.block_size > u16::MAX as usize {
            return Err(crate::Error::invalid_argument("block_size must be <= 65535"));
        }
        if self.lock_timeout.is_some() && self.lock_retry_interval.is_zero() {
            return Err(crate::Error::invalid_argument(
                "lock_retry_interval must be > 0 when lock_timeout is set",
            ));
        }
        Ok(())
    }
}
