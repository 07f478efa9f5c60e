//! File creation and in-place growth.
//!
//! Files are created on the first write, sized for `growth_days` worth of
//! minutes, and every slot is pre-filled with the untouched pattern so that
//! reads never see uninitialised bytes. When a later write lands within one
//! minute of the end of the covered range the file is extended the same
//! way. The physical file length is the ground truth for how far the range
//! actually reaches; the header's end timestamp is updated to match after
//! the new slots are on disk.

use std::io::{Seek, SeekFrom, Write};

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::error::{Error, Result};
use crate::layout::{byte_offset_for, calculated_end, Header, HEADER_LEN};
use crate::record::{SlotRecord, RECORD_LEN};

use super::MinuteStore;

/// Untouched records per fill chunk; 157 * 26 = 4082 bytes, just under one
/// sector.
const CHUNK_RECORDS: usize = 157;

impl MinuteStore {
    /// Makes sure the file exists and covers `minute`, creating or growing
    /// it as needed. Returns the current header.
    ///
    /// `minute` must already be truncated to minute precision. Growth only
    /// ever extends the end of the range; a minute before the start is left
    /// for the caller's bounds check.
    pub(crate) fn ensure_capacity_for(&mut self, minute: DateTime<Utc>) -> Result<Header> {
        let Some(header) = self.load_header()? else {
            return self.create_file(minute);
        };

        let file_len = std::fs::metadata(&self.path)?.len();
        let covered_until = calculated_end(header.start, file_len).ok_or_else(|| {
            Error::CorruptHeader {
                path: self.path.clone(),
                reason: format!("file length {file_len} does not map to a valid time range"),
            }
        })?;

        if minute + Duration::minutes(1) >= covered_until {
            self.grow_to(minute, header, covered_until)
        } else {
            Ok(header)
        }
    }

    /// Creates the file with `minute` as its start and a pre-filled range of
    /// `growth_days` days.
    fn create_file(&mut self, minute: DateTime<Utc>) -> Result<Header> {
        let end = minute + Duration::days(i64::from(self.options.growth_days));
        let header = Header::new(minute, end);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = self.handles.writer()?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header.to_bytes())?;
        self.fill_untouched_span(HEADER_LEN as u64, header.file_len())?;

        info!(
            path = %self.path.display(),
            start = %header.start,
            end = %header.end,
            slots = header.slot_count(),
            "created slot file"
        );
        self.header = Some(header);
        self.sector.invalidate();
        Ok(header)
    }

    /// Extends the file so its range reaches `minute + growth_days`, then
    /// persists the new end timestamp in the header.
    fn grow_to(
        &mut self,
        minute: DateTime<Utc>,
        header: Header,
        covered_until: DateTime<Utc>,
    ) -> Result<Header> {
        let new_end = minute + Duration::days(i64::from(self.options.growth_days));
        let fill_from = byte_offset_for(header.start, covered_until);
        let fill_to = byte_offset_for(header.start, new_end);
        self.fill_untouched_span(fill_from, fill_to)?;

        let file = self.handles.writer()?;
        file.seek(SeekFrom::Start(8))?;
        file.write_all(&new_end.timestamp().to_le_bytes())?;

        info!(
            path = %self.path.display(),
            old_end = %header.end,
            new_end = %new_end,
            "extended slot file"
        );
        let grown = Header {
            end: new_end,
            ..header
        };
        self.header = Some(grown);
        self.sector.invalidate();
        Ok(grown)
    }

    /// Writes the untouched slot pattern over `[from, to)`. Both bounds sit
    /// on record boundaries.
    pub(crate) fn fill_untouched_span(&mut self, from: u64, to: u64) -> Result<()> {
        if to <= from {
            return Ok(());
        }

        let record = SlotRecord::untouched(crate::time::epoch_floor()).to_bytes();
        let mut chunk = [0u8; CHUNK_RECORDS * RECORD_LEN];
        for slot in chunk.chunks_exact_mut(RECORD_LEN) {
            slot.copy_from_slice(&record);
        }

        let file = self.handles.writer()?;
        file.seek(SeekFrom::Start(from))?;
        let mut remaining = usize::try_from(to - from).map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("fill span of {} bytes is too large", to - from),
            )
        })?;
        while remaining > 0 {
            let step = remaining.min(chunk.len());
            file.write_all(&chunk[..step])?;
            remaining -= step;
        }
        self.sector.invalidate();
        Ok(())
    }
}
