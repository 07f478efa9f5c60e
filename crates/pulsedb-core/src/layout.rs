//! File header and slot offset arithmetic.
//!
//! A storage file is a 32-byte header followed by one 26-byte slot per
//! minute:
//!
//! ```text
//! ┌────────────────┬────────────────┬──────────────────┬───────────────────
//! │ start: i64 LE  │ end: i64 LE    │ file id: 16 B    │ slots, 26 B each,
//! │ Unix seconds,  │ Unix seconds,  │ random UUID,     │ minute-indexed
//! │ minute-aligned │ minute-aligned │ informational    │ from start
//! └────────────────┴────────────────┴──────────────────┴───────────────────
//! ```
//!
//! Slot `i` always represents `start + i minutes`; a slot's byte offset is a
//! pure function of its timestamp, never a free-form index.

use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::record::RECORD_LEN;
use crate::time;

/// Number of bytes the file header occupies.
pub const HEADER_LEN: usize = 32;

/// Parsed file header.
///
/// `start` and `end` bound the addressable minute range; `file_id` is
/// assigned at creation and never read back operationally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// First minute the file can address.
    pub start: DateTime<Utc>,
    /// One past the last minute the file can address. Strictly greater than
    /// `start`; only ever moves forward.
    pub end: DateTime<Utc>,
    /// Informational unique identifier.
    pub file_id: Uuid,
}

impl Header {
    /// Builds a header for a freshly created file.
    pub(crate) fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            file_id: Uuid::new_v4(),
        }
    }

    /// Serializes the header into its fixed 32-byte layout.
    #[must_use]
    pub(crate) fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..8].copy_from_slice(&self.start.timestamp().to_le_bytes());
        buf[8..16].copy_from_slice(&self.end.timestamp().to_le_bytes());
        buf[16..32].copy_from_slice(self.file_id.as_bytes());
        buf
    }

    /// Decodes a header, rejecting timestamps that cannot be represented or
    /// an end marker that does not lie after the start.
    pub(crate) fn from_bytes(bytes: &[u8; HEADER_LEN], path: &Path) -> Result<Self> {
        let mut field = [0u8; 8];
        field.copy_from_slice(&bytes[0..8]);
        let start_secs = i64::from_le_bytes(field);
        field.copy_from_slice(&bytes[8..16]);
        let end_secs = i64::from_le_bytes(field);

        let corrupt = |reason: String| Error::CorruptHeader {
            path: path.to_path_buf(),
            reason,
        };
        let start = DateTime::from_timestamp(start_secs, 0)
            .ok_or_else(|| corrupt(format!("start timestamp {start_secs} not representable")))?;
        let end = DateTime::from_timestamp(end_secs, 0)
            .ok_or_else(|| corrupt(format!("end timestamp {end_secs} not representable")))?;
        if end <= start {
            return Err(corrupt(format!("end {end} does not lie after start {start}")));
        }

        let mut id = [0u8; 16];
        id.copy_from_slice(&bytes[16..32]);
        Ok(Self {
            start,
            end,
            file_id: Uuid::from_bytes(id),
        })
    }

    /// Number of slots between start and end.
    #[allow(clippy::cast_sign_loss)] // Reason: end > start is a decode invariant
    #[must_use]
    pub fn slot_count(&self) -> u64 {
        time::minutes_between(self.start, self.end) as u64
    }

    /// Total file length implied by the header, in bytes.
    #[must_use]
    pub fn file_len(&self) -> u64 {
        HEADER_LEN as u64 + self.slot_count() * RECORD_LEN as u64
    }
}

/// Where a timestamp's slot falls relative to the addressable range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotPosition {
    /// The minute predates `start`; no slot exists for it.
    BeforeStart,
    /// The slot exists at this absolute byte offset.
    InRange(u64),
    /// The minute is at or past `end`; the file would need to grow first.
    AtOrAfterEnd,
}

/// Maps a minute to its byte offset, classified against the file bounds.
#[allow(clippy::cast_sign_loss)] // Reason: negative minute counts are filtered out first
pub(crate) fn classify_offset(header: &Header, t: DateTime<Utc>) -> SlotPosition {
    let minutes = time::minutes_between(header.start, t);
    if minutes < 0 {
        return SlotPosition::BeforeStart;
    }
    if minutes as u64 >= header.slot_count() {
        return SlotPosition::AtOrAfterEnd;
    }
    SlotPosition::InRange(byte_offset_for(header.start, t))
}

/// Byte offset of the slot for `t`, without bounds checking. The caller must
/// ensure `t` does not precede `start`.
#[allow(clippy::cast_sign_loss)] // Reason: callers guarantee t >= start
pub(crate) fn byte_offset_for(start: DateTime<Utc>, t: DateTime<Utc>) -> u64 {
    let minutes = time::minutes_between(start, t) as u64;
    HEADER_LEN as u64 + minutes * RECORD_LEN as u64
}

/// End timestamp implied by the physical file length: `start` plus one
/// minute per whole slot actually present on disk.
///
/// `None` when the length is absurd enough to overflow the representable
/// time range, which only happens with a corrupted file.
#[allow(clippy::cast_possible_wrap)] // Reason: slot counts fit i64 long before chrono overflows
pub(crate) fn calculated_end(start: DateTime<Utc>, file_len: u64) -> Option<DateTime<Utc>> {
    let slots = file_len.saturating_sub(HEADER_LEN as u64) / RECORD_LEN as u64;
    start.checked_add_signed(Duration::minutes(slots as i64))
}
