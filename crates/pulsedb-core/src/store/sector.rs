//! Read-through sector cache over the record region.
//!
//! Point lookups during scans cluster heavily, so reads are grouped into
//! 4 KiB-aligned blocks: one physical read fills the cache, and neighbouring
//! record lookups are served from memory until something is written. A
//! record may straddle a block boundary, in which case the fill covers both
//! blocks. The cache never changes lookup semantics; it only batches I/O.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use crate::record::RECORD_LEN;

/// Block granularity of physical reads.
pub(crate) const SECTOR_LEN: u64 = 4096;

/// One cached run of sectors. Owned by exactly one store; its lifetime is
/// tied to that store's handles.
pub(crate) struct SectorCache {
    /// Absolute byte offset of `buf[0]`.
    start: u64,
    /// Cached bytes; empty means cold.
    buf: Vec<u8>,
}

impl SectorCache {
    pub(crate) fn new() -> Self {
        Self {
            start: 0,
            buf: Vec::new(),
        }
    }

    /// Drops the cached bytes. Called unconditionally after every write,
    /// since a write may be followed immediately by a read of the same
    /// region.
    pub(crate) fn invalidate(&mut self) {
        self.buf.clear();
    }

    /// Reads the record at `offset`, refilling the cache from `file` when
    /// the requested span is not already covered.
    ///
    /// # Errors
    ///
    /// `ErrorKind::UnexpectedEof` when the file is physically shorter than
    /// the requested record span — the file is truncated relative to what
    /// its header claims, which callers treat as fatal.
    pub(crate) fn read_record(
        &mut self,
        file: &mut File,
        offset: u64,
    ) -> std::io::Result<[u8; RECORD_LEN]> {
        if !self.covers(offset) {
            self.fill(file, offset)?;
        }
        let rel = usize::try_from(offset - self.start).unwrap_or(usize::MAX);
        let mut record = [0u8; RECORD_LEN];
        record.copy_from_slice(&self.buf[rel..rel + RECORD_LEN]);
        Ok(record)
    }

    fn covers(&self, offset: u64) -> bool {
        !self.buf.is_empty()
            && offset >= self.start
            && offset + RECORD_LEN as u64 <= self.start + self.buf.len() as u64
    }

    /// Replaces the cache with the sector-aligned block range spanning the
    /// record at `offset`, clamped to the physical end of the file.
    fn fill(&mut self, file: &mut File, offset: u64) -> std::io::Result<()> {
        let record_end = offset + RECORD_LEN as u64;
        let file_len = file.metadata()?.len();
        if record_end > file_len {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "record at offset {offset} extends past the physical end of file ({file_len} bytes)"
                ),
            ));
        }

        let first = offset / SECTOR_LEN * SECTOR_LEN;
        let last = record_end.div_ceil(SECTOR_LEN) * SECTOR_LEN;
        let span = usize::try_from(last.min(file_len) - first).unwrap_or(usize::MAX);

        let mut buf = vec![0u8; span];
        file.seek(SeekFrom::Start(first))?;
        file.read_exact(&mut buf)?;
        self.start = first;
        self.buf = buf;
        Ok(())
    }
}
