//! Reentrant advisory file lock.
//!
//! Every operation on a block store runs inside this lock, and compound
//! operations hold it across many primitive calls, so acquisition must be
//! reentrant:
//!
//! - Threads of one process are serialized by a `parking_lot::ReentrantMutex`
//!   that also tracks the nesting depth of the owning thread.
//! - Processes (and separate store instances on the same path) are serialized
//!   by an exclusive `flock` on the lock file, taken when the depth goes from
//!   0 to 1 and released when it returns to 0.
//!
//! Advisory locks only exclude cooperating openers: anything touching the
//! backing file without going through the lock file is not stopped.

use std::cell::Cell;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use crate::error::{Error, Result};

/// A lock file shared by every opener of one backing file.
pub struct FileLock {
    /// Open lock file (the flock target)
    file: File,
    /// Path to the lock file
    path: PathBuf,
    /// Nesting depth of the owning thread
    depth: ReentrantMutex<Cell<usize>>,
    /// Maximum wait for the OS lock (None = block)
    timeout: Option<Duration>,
    /// Polling interval when a timeout is configured
    retry_interval: Duration,
}

impl FileLock {
    /// Open or create the lock file at `path`.
    pub fn open<P: AsRef<Path>>(
        path: P,
        timeout: Option<Duration>,
        retry_interval: Duration,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).read(true).write(true).open(&path)?;

        #[cfg(not(unix))]
        log::warn!("Advisory file locking is unavailable; {:?} only excludes threads", path);

        Ok(Self {
            file,
            path,
            depth: ReentrantMutex::new(Cell::new(0)),
            timeout,
            retry_interval,
        })
    }

    /// Acquire the lock, blocking (or polling up to the timeout) as needed.
    ///
    /// Re-acquiring on a thread that already holds the lock returns
    /// immediately. The lock is released when the outermost guard drops.
    /// A configured timeout bounds the whole wait, covering both other
    /// threads of this process and other openers of the lock file.
    pub fn acquire(&self) -> Result<LockGuard<'_>> {
        let start = Instant::now();
        let depth = match self.timeout {
            None => self.depth.lock(),
            Some(timeout) => match self.depth.try_lock_for(timeout) {
                Some(depth) => depth,
                None => return Err(self.timed_out(start)),
            },
        };

        if depth.get() == 0 {
            self.lock_os(start)?;
        }
        depth.set(depth.get() + 1);

        Ok(LockGuard { lock: self, depth })
    }

    /// Whether the calling thread currently holds the lock.
    #[cfg(test)]
    fn is_held(&self) -> bool {
        match self.depth.try_lock() {
            Some(depth) => depth.get() > 0,
            None => false,
        }
    }

    /// Path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_os(&self, start: Instant) -> Result<()> {
        let timeout = match self.timeout {
            None => return flock(&self.file, true).map(|_| ()),
            Some(timeout) => timeout,
        };

        loop {
            if flock(&self.file, false)? {
                return Ok(());
            }

            let waited = start.elapsed();
            if waited >= timeout {
                return Err(self.timed_out(start));
            }
            std::thread::sleep(self.retry_interval.min(timeout - waited));
        }
    }

    fn timed_out(&self, start: Instant) -> Error {
        Error::LockTimeout { path: self.path.clone(), waited: start.elapsed() }
    }
}

impl std::fmt::Debug for FileLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLock")
            .field("path", &self.path)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Proof that the current thread holds a [`FileLock`].
pub struct LockGuard<'a> {
    lock: &'a FileLock,
    depth: ReentrantMutexGuard<'a, Cell<usize>>,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        let depth = self.depth.get() - 1;
        self.depth.set(depth);

        if depth == 0 {
            if let Err(e) = funlock(&self.lock.file) {
                log::error!("Failed to release lock {:?}: {}", self.lock.path, e);
            }
        }
    }
}

/// Take an exclusive flock. Returns `Ok(false)` if non-blocking and held
/// elsewhere.
#[cfg(unix)]
fn flock(file: &File, blocking: bool) -> Result<bool> {
    use std::os::unix::io::AsRawFd;

    let operation = if blocking { libc::LOCK_EX } else { libc::LOCK_EX | libc::LOCK_NB };

    loop {
        let result = unsafe { libc::flock(file.as_raw_fd(), operation) };
        if result == 0 {
            return Ok(true);
        }

        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) => continue,
            Some(libc::EWOULDBLOCK) if !blocking => return Ok(false),
            _ => return Err(Error::Io(err)),
        }
    }
}

#[cfg(unix)]
fn funlock(file: &File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn flock(_file: &File, _blocking: bool) -> Result<bool> {
    Ok(true)
}

#[cfg(not(unix))]
fn funlock(_file: &File) -> std::io::Result<()> {
    Ok(())
}
