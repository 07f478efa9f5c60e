//! # `PulseDB` Core
//!
//! Persistent per-minute storage for pulse-counter readings, with
//! gap-filling interpolation.
//!
//! `PulseDB` stores the readings of accumulating counters (energy meters,
//! water meters, heat allocators) in one flat file per counter: a 32-byte
//! header followed by a fixed 26-byte slot for every minute of the covered
//! range. A slot's position is a pure function of its timestamp, so point
//! reads never search and writes never shift data.
//!
//! ## Features
//!
//! - **Timestamp-addressed slots**: one record per minute, found by
//!   arithmetic instead of an index
//! - **Gap filling**: readings after an offline period spread the missed
//!   consumption across the hole, tagged with a quality index
//! - **Lazy growth**: files are created on first write and extended in
//!   place; they are never truncated
//! - **Non-throwing reads**: report queries degrade to "no value" instead
//!   of failing on a single bad slot
//! - **Async adapter**: the same capability set on the tokio blocking pool
//!   (feature `async`, enabled by default)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chrono::{Duration, Utc};
//! use pulsedb_core::{PulseDb, SeriesUnit, StorageKey, StoreOptions};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = PulseDb::open("./data", StoreOptions::default())?;
//!     let mut store = db.store(&StorageKey::counter("A1B2C3", 7))?;
//!
//!     // Feed readings as they arrive; passing the previous record back
//!     // skips the backward scan for the running total.
//!     let first = store.set_value(Utc::now(), 1250, 1000.0, 0.25, None)?;
//!     store.set_value(Utc::now() + Duration::minutes(1), 1262, 1000.0, 0.25, first.as_ref())?;
//!
//!     let used = store.sum(Utc::now() - Duration::hours(24), Utc::now(), SeriesUnit::Volumetric)?;
//!     println!("consumed: {used}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
// Clippy lints configured in workspace Cargo.toml [workspace.lints.clippy]
#![cfg_attr(
    test,
    allow(
        clippy::cast_lossless,
        clippy::cast_possible_truncation,
        clippy::uninlined_format_args
    )
)]

pub mod config;
pub mod error;
pub mod layout;
pub mod record;
pub mod series;
pub mod store;
pub mod time;

pub use config::{
    LoggingConfig, PulseConfig, StorageConfig, StoreOptions, DEFAULT_EXTENSION,
};
pub use error::{Error, Result};
pub use layout::{Header, HEADER_LEN};
pub use record::{Precision, SlotRecord, RECORD_LEN, SENTINEL_RAW};
pub use series::{SeriesUnit, TimeBucket};
#[cfg(feature = "async")]
pub use store::AsyncMinuteStore;
pub use store::{MinuteSeries, MinuteStore, ScanDirection};

use std::path::{Path, PathBuf};

/// Addresses one slot file inside a [`PulseDb`] data directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageKey {
    /// One counter of a metering device. Files are grouped in a directory
    /// per serial number and named `{serial}_{counter_id:08}`.
    Counter {
        /// Device serial number; doubles as the directory name.
        serial: String,
        /// Counter index on the device.
        counter_id: u32,
    },
    /// An explicit storage id, used verbatim as the file name.
    Explicit(String),
}

impl StorageKey {
    /// Key for counter `counter_id` of the device with `serial`.
    pub fn counter(serial: impl Into<String>, counter_id: u32) -> Self {
        Self::Counter {
            serial: serial.into(),
            counter_id,
        }
    }

    /// Path of the backing file relative to the data directory.
    fn relative_path(&self, extension: &str) -> PathBuf {
        match self {
            Self::Counter { serial, counter_id } => {
                PathBuf::from(serial).join(format!("{serial}_{counter_id:08}{extension}"))
            }
            Self::Explicit(id) => PathBuf::from(format!("{id}{extension}")),
        }
    }
}

/// A directory of slot files, one per counter.
///
/// `PulseDb` only resolves keys to paths and hands out stores; the stores
/// themselves are independent and can live longer than the `PulseDb` value
/// that created them.
#[derive(Debug, Clone)]
pub struct PulseDb {
    data_dir: PathBuf,
    extension: String,
    options: StoreOptions,
}

impl PulseDb {
    /// Opens (creating if necessary) the data directory at `path`. Stores
    /// handed out later inherit `options`.
    ///
    /// # Errors
    ///
    /// Returns an error if `options` fail validation or the directory
    /// cannot be created.
    pub fn open<P: AsRef<Path>>(path: P, options: StoreOptions) -> Result<Self> {
        options.validate()?;
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;
        tracing::info!(data_dir = %data_dir.display(), "opened pulse database");
        Ok(Self {
            data_dir,
            extension: DEFAULT_EXTENSION.to_owned(),
            options,
        })
    }

    /// Opens the database described by a loaded [`PulseConfig`].
    ///
    /// # Errors
    ///
    /// As [`open`](Self::open).
    pub fn from_config(config: &PulseConfig) -> Result<Self> {
        let mut db = Self::open(&config.storage.data_dir, config.storage.options)?;
        db.extension.clone_from(&config.storage.extension);
        Ok(db)
    }

    /// Absolute path of the slot file `key` resolves to.
    #[must_use]
    pub fn path_for(&self, key: &StorageKey) -> PathBuf {
        self.data_dir.join(key.relative_path(&self.extension))
    }

    /// Opens the store for `key` with the database-wide options.
    ///
    /// # Errors
    ///
    /// As [`MinuteStore::open`].
    pub fn store(&self, key: &StorageKey) -> Result<MinuteStore> {
        MinuteStore::open(self.path_for(key), self.options)
    }

    /// Opens the store for `key`, overriding the database-wide options.
    ///
    /// # Errors
    ///
    /// As [`MinuteStore::open`].
    pub fn store_with_options(
        &self,
        key: &StorageKey,
        options: StoreOptions,
    ) -> Result<MinuteStore> {
        MinuteStore::open(self.path_for(key), options)
    }

    /// Opens the async handle for `key`.
    ///
    /// # Errors
    ///
    /// As [`MinuteStore::open`].
    #[cfg(feature = "async")]
    pub fn async_store(&self, key: &StorageKey) -> Result<AsyncMinuteStore> {
        Ok(AsyncMinuteStore::new(self.store(key)?))
    }

    /// Root directory holding the slot files.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
