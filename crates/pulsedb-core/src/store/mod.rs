//! Persistent minute-slot store.
//!
//! A [`MinuteStore`] owns one data file holding a fixed-size header followed
//! by one 26-byte slot per minute of the covered range. Files are created
//! lazily on the first write and grown in place when a write lands near the
//! end of the range; they are never truncated. Reads go through a small
//! sector cache, writes take an exclusive advisory lock on a sibling
//! `.lock` file.

mod growth;
mod handles;
mod reader;
mod sector;
mod writer;

#[cfg(feature = "async")]
mod async_api;

#[cfg(feature = "async")]
pub use async_api::AsyncMinuteStore;
pub use reader::ScanDirection;

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{error, warn};

use crate::config::StoreOptions;
use crate::error::Result;
use crate::layout::{Header, HEADER_LEN};
use crate::record::SlotRecord;
use crate::series::{SeriesUnit, TimeBucket};

use handles::FileHandles;
use sector::SectorCache;

/// A single minute-granular slot file plus the handles and cache it needs.
///
/// The store is cheap to construct: nothing touches the filesystem until
/// the first read or write. All methods take `&mut self`; wrap the store in
/// [`AsyncMinuteStore`] (or your own synchronisation) to share it.
pub struct MinuteStore {
    path: PathBuf,
    options: StoreOptions,
    handles: FileHandles,
    sector: SectorCache,
    header: Option<Header>,
}

impl MinuteStore {
    /// Opens a store over `path` without touching the filesystem.
    ///
    /// The file does not have to exist yet; it is created by the first
    /// successful [`set_value`](Self::set_value).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) when
    /// `options` fails validation.
    pub fn open(path: impl Into<PathBuf>, options: StoreOptions) -> Result<Self> {
        options.validate()?;
        let path = path.into();
        let handles = FileHandles::new(&path, &options);
        Ok(Self {
            path,
            options,
            handles,
            sector: SectorCache::new(),
            header: None,
        })
    }

    /// Path of the backing data file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Options this store was opened with.
    #[must_use]
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Number of addressable minute slots, zero when the file does not
    /// exist yet.
    ///
    /// # Errors
    ///
    /// Propagates header-load failures.
    pub fn len_minutes(&mut self) -> Result<u64> {
        Ok(self.load_header()?.map_or(0, |header| header.slot_count()))
    }

    /// Returns the file header, reading it from disk on first use.
    ///
    /// `Ok(None)` means the file does not exist yet. A file that exists but
    /// whose header cannot be read or parsed is treated as lost: it is
    /// logged, deleted, and reported as `Ok(None)` so the next write can
    /// re-create it.
    ///
    /// # Errors
    ///
    /// I/O failures other than a short or corrupt header.
    pub fn load_header(&mut self) -> Result<Option<Header>> {
        if let Some(header) = self.header {
            return Ok(Some(header));
        }
        if !self.path.exists() {
            return Ok(None);
        }

        let file = self.handles.reader()?;
        file.seek(SeekFrom::Start(0))?;
        let mut bytes = [0u8; HEADER_LEN];
        if let Err(err) = file.read_exact(&mut bytes) {
            if err.kind() == std::io::ErrorKind::UnexpectedEof {
                self.discard_corrupt_file("file is shorter than its header");
                return Ok(None);
            }
            return Err(err.into());
        }

        match Header::from_bytes(&bytes, &self.path) {
            Ok(header) => {
                self.header = Some(header);
                Ok(Some(header))
            }
            Err(err) => {
                self.discard_corrupt_file(&err.to_string());
                Ok(None)
            }
        }
    }

    /// Syncs buffered writes to disk without releasing any handle.
    ///
    /// # Errors
    ///
    /// Propagates the sync failure.
    pub fn flush(&mut self) -> Result<()> {
        self.handles.flush()
    }

    /// Syncs and releases the file handles and the write lock.
    ///
    /// The store stays usable; the next operation reopens what it needs.
    /// Calling `close` twice is harmless.
    ///
    /// # Errors
    ///
    /// Propagates the sync failure.
    pub fn close(&mut self) -> Result<()> {
        self.sector.invalidate();
        self.handles.close()
    }

    /// Reads one slot at `offset`, stamping it with `minute`.
    pub(crate) fn read_slot(&mut self, offset: u64, minute: DateTime<Utc>) -> Result<SlotRecord> {
        let file = self.handles.reader()?;
        let bytes = self.sector.read_record(file, offset)?;
        Ok(SlotRecord::from_bytes(&bytes, minute))
    }

    /// Deletes a file whose header cannot be trusted so the next write can
    /// start over. Failures here are logged, not propagated.
    fn discard_corrupt_file(&mut self, reason: &str) {
        warn!(
            path = %self.path.display(),
            reason,
            "discarding store file with unreadable header"
        );
        self.handles.release();
        self.sector.invalidate();
        self.header = None;
        if let Err(err) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), %err, "could not remove corrupt store file");
        }
    }
}

impl Drop for MinuteStore {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            error!(path = %self.path.display(), %err, "failed to sync store on drop");
        }
    }
}

impl std::fmt::Debug for MinuteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MinuteStore")
            .field("path", &self.path)
            .field("options", &self.options)
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

/// The slot-series operations a store exposes, as a trait so callers can
/// stay generic over the backing implementation.
pub trait MinuteSeries {
    /// Records a raw counter reading, interpolating any gap since the last
    /// valid slot. Returns the record written for the reading's own minute,
    /// or `None` when the write was skipped.
    fn set_value(
        &mut self,
        at: DateTime<Utc>,
        raw_value: u64,
        pulses_per_unit: f64,
        currency_per_unit: f64,
        previous: Option<&SlotRecord>,
    ) -> Result<Option<SlotRecord>>;

    /// Returns the slot covering `at`, or `None` outside the stored range.
    fn get_value(&mut self, at: DateTime<Utc>) -> Result<Option<SlotRecord>>;

    /// Scans backwards from `at` (exclusive) for the nearest valid slot.
    fn find_previous(&mut self, at: DateTime<Utc>) -> Result<Option<SlotRecord>>;

    /// Consumption between `begin` and `end` in `unit`, `0.0` when the
    /// range has no usable data.
    fn sum(&mut self, begin: DateTime<Utc>, end: DateTime<Utc>, unit: SeriesUnit) -> Result<f64>;

    /// Fills `buckets` with per-bucket consumption deltas. Returns `false`
    /// when the store has no file to read from.
    fn get_records(
        &mut self,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
        unit: SeriesUnit,
        buckets: &mut [TimeBucket],
        negate: bool,
    ) -> Result<bool>;

    /// Resets every slot from `from` to the end of the file back to the
    /// untouched state.
    fn reinitialize_slots(&mut self, from: DateTime<Utc>) -> Result<()>;

    /// Syncs and releases file handles and locks.
    fn close(&mut self) -> Result<()>;
}

impl MinuteSeries for MinuteStore {
    fn set_value(
        &mut self,
        at: DateTime<Utc>,
        raw_value: u64,
        pulses_per_unit: f64,
        currency_per_unit: f64,
        previous: Option<&SlotRecord>,
    ) -> Result<Option<SlotRecord>> {
        MinuteStore::set_value(self, at, raw_value, pulses_per_unit, currency_per_unit, previous)
    }

    fn get_value(&mut self, at: DateTime<Utc>) -> Result<Option<SlotRecord>> {
        MinuteStore::get_value(self, at)
    }

    fn find_previous(&mut self, at: DateTime<Utc>) -> Result<Option<SlotRecord>> {
        MinuteStore::find_previous(self, at)
    }

    fn sum(&mut self, begin: DateTime<Utc>, end: DateTime<Utc>, unit: SeriesUnit) -> Result<f64> {
        MinuteStore::sum(self, begin, end, unit)
    }

    fn get_records(
        &mut self,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
        unit: SeriesUnit,
        buckets: &mut [TimeBucket],
        negate: bool,
    ) -> Result<bool> {
        MinuteStore::get_records(self, begin, end, unit, buckets, negate)
    }

    fn reinitialize_slots(&mut self, from: DateTime<Utc>) -> Result<()> {
        MinuteStore::reinitialize_slots(self, from)
    }

    fn close(&mut self) -> Result<()> {
        MinuteStore::close(self)
    }
}
