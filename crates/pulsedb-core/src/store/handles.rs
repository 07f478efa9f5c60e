//! File handle management: lazy open, exclusive write locking with retry,
//! shared read access, deterministic release.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::StoreOptions;
use crate::error::{Error, Result};

/// Writer handle plus the lock that guards it. Field order keeps the lock
/// alive until the file handle is gone.
struct Writer {
    file: File,
    _lock: fslock::LockFile,
}

/// Lazily opened reader/writer pair for one storage file.
///
/// The writer is opened together with an exclusive advisory lock on a
/// sibling `<file>.lock`; the reader is a plain shared-access open, so
/// concurrent readers never block each other or the writer.
pub(crate) struct FileHandles {
    path: PathBuf,
    lock_path: PathBuf,
    retry_interval: Duration,
    lock_timeout: Duration,
    writer: Option<Writer>,
    reader: Option<File>,
}

impl FileHandles {
    pub(crate) fn new(path: &Path, options: &StoreOptions) -> Self {
        let mut lock_name = path.as_os_str().to_owned();
        lock_name.push(".lock");
        Self {
            path: path.to_path_buf(),
            lock_path: PathBuf::from(lock_name),
            retry_interval: Duration::from_millis(options.lock_retry_interval_ms),
            lock_timeout: Duration::from_millis(options.lock_timeout_ms),
            writer: None,
            reader: None,
        }
    }

    /// The write handle, opening the file (and taking the lock) on first
    /// use. Creates the file when it does not exist yet; the caller decides
    /// what to put in it.
    pub(crate) fn writer(&mut self) -> Result<&mut File> {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => {
                let lock = self.acquire_lock()?;
                debug!(path = %self.path.display(), "opening write handle");
                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(&self.path)?;
                Writer { file, _lock: lock }
            }
        };
        Ok(&mut self.writer.insert(writer).file)
    }

    /// The shared read handle, opened on first use.
    pub(crate) fn reader(&mut self) -> Result<&mut File> {
        let file = match self.reader.take() {
            Some(file) => file,
            None => {
                debug!(path = %self.path.display(), "opening read handle");
                File::open(&self.path)?
            }
        };
        Ok(self.reader.insert(file))
    }

    /// Whether a write handle is currently open.
    pub(crate) fn has_writer(&self) -> bool {
        self.writer.is_some()
    }

    /// Syncs the write handle to disk while keeping it (and the lock) open.
    pub(crate) fn flush(&mut self) -> Result<()> {
        if let Some(writer) = &self.writer {
            writer.file.sync_all()?;
        }
        Ok(())
    }

    /// Syncs and releases both handles. The next access reopens them.
    pub(crate) fn close(&mut self) -> Result<()> {
        self.reader = None;
        if let Some(writer) = self.writer.take() {
            writer.file.sync_all()?;
        }
        Ok(())
    }

    /// Drops both handles without syncing, for paths where the file itself
    /// is about to be deleted.
    pub(crate) fn release(&mut self) {
        self.reader = None;
        self.writer = None;
    }

    /// Takes the exclusive lock, retrying on the configured interval until
    /// the deadline passes.
    fn acquire_lock(&self) -> Result<fslock::LockFile> {
        let mut lock = fslock::LockFile::open(self.lock_path.as_os_str())?;
        let started = Instant::now();
        loop {
            if lock.try_lock()? {
                return Ok(lock);
            }
            let waited = started.elapsed();
            if waited >= self.lock_timeout {
                return Err(Error::LockTimeout {
                    path: self.lock_path.clone(),
                    waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                });
            }
            warn!(
                path = %self.lock_path.display(),
                waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                "storage file locked by another writer, retrying"
            );
            std::thread::sleep(self.retry_interval);
        }
    }
}
