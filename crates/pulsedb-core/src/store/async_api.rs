//! Async adapter over the blocking store.
//!
//! The engine itself is synchronous file I/O. [`AsyncMinuteStore`] exposes
//! the same capability set to async callers by running every operation on
//! the tokio blocking pool, with a mutex serialising access the same way
//! call order does for a directly-owned [`MinuteStore`]. Handles are cheap
//! to clone and share one underlying store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::record::SlotRecord;
use crate::series::{SeriesUnit, TimeBucket};

use super::{MinuteStore, ScanDirection};

/// Clonable async handle to a [`MinuteStore`].
#[derive(Clone)]
pub struct AsyncMinuteStore {
    inner: Arc<Mutex<MinuteStore>>,
}

impl AsyncMinuteStore {
    /// Wraps a store for use from async contexts.
    #[must_use]
    pub fn new(store: MinuteStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Async [`MinuteStore::set_value`].
    ///
    /// # Errors
    ///
    /// As the blocking call, plus an I/O error if the blocking task is
    /// cancelled or panics.
    pub async fn set_value(
        &self,
        at: DateTime<Utc>,
        raw_value: u64,
        pulses_per_unit: f64,
        currency_per_unit: f64,
        previous: Option<SlotRecord>,
    ) -> Result<Option<SlotRecord>> {
        self.run(move |store| {
            store.set_value(
                at,
                raw_value,
                pulses_per_unit,
                currency_per_unit,
                previous.as_ref(),
            )
        })
        .await
    }

    /// Async [`MinuteStore::get_value`].
    ///
    /// # Errors
    ///
    /// As the blocking call.
    pub async fn get_value(&self, at: DateTime<Utc>) -> Result<Option<SlotRecord>> {
        self.run(move |store| store.get_value(at)).await
    }

    /// Async [`MinuteStore::find_previous`].
    ///
    /// # Errors
    ///
    /// As the blocking call.
    pub async fn find_previous(&self, at: DateTime<Utc>) -> Result<Option<SlotRecord>> {
        self.run(move |store| store.find_previous(at)).await
    }

    /// Async [`MinuteStore::find_next`].
    ///
    /// # Errors
    ///
    /// As the blocking call.
    pub async fn find_next(&self, at: DateTime<Utc>) -> Result<Option<SlotRecord>> {
        self.run(move |store| store.find_next(at)).await
    }

    /// Async [`MinuteStore::get_closest_value`].
    ///
    /// # Errors
    ///
    /// As the blocking call.
    pub async fn get_closest_value(
        &self,
        at: DateTime<Utc>,
        direction: ScanDirection,
    ) -> Result<Option<SlotRecord>> {
        self.run(move |store| store.get_closest_value(at, direction))
            .await
    }

    /// Async [`MinuteStore::sum`].
    ///
    /// # Errors
    ///
    /// As the blocking call.
    pub async fn sum(
        &self,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
        unit: SeriesUnit,
    ) -> Result<f64> {
        self.run(move |store| store.sum(begin, end, unit)).await
    }

    /// Async [`MinuteStore::get_records`]; takes the buckets by value and
    /// hands them back filled.
    ///
    /// # Errors
    ///
    /// As the blocking call.
    pub async fn get_records(
        &self,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
        unit: SeriesUnit,
        mut buckets: Vec<TimeBucket>,
        negate: bool,
    ) -> Result<(bool, Vec<TimeBucket>)> {
        self.run(move |store| {
            let found = store.get_records(begin, end, unit, &mut buckets, negate)?;
            Ok((found, buckets))
        })
        .await
    }

    /// Async [`MinuteStore::reinitialize_slots`].
    ///
    /// # Errors
    ///
    /// As the blocking call.
    pub async fn reinitialize_slots(&self, from: DateTime<Utc>) -> Result<()> {
        self.run(move |store| store.reinitialize_slots(from)).await
    }

    /// Async [`MinuteStore::flush`].
    ///
    /// # Errors
    ///
    /// As the blocking call.
    pub async fn flush(&self) -> Result<()> {
        self.run(MinuteStore::flush).await
    }

    /// Async [`MinuteStore::close`].
    ///
    /// # Errors
    ///
    /// As the blocking call.
    pub async fn close(&self) -> Result<()> {
        self.run(MinuteStore::close).await
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut MinuteStore) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&mut inner.lock()))
            .await
            .map_err(|err| Error::Io(std::io::Error::other(err)))?
    }
}

impl std::fmt::Debug for AsyncMinuteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncMinuteStore").finish_non_exhaustive()
    }
}
