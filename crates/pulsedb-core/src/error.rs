//! Error types for pulsedb-core.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

/// Storage engine error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying file I/O failure. Stream truncation surfaces here with
    /// [`std::io::ErrorKind::UnexpectedEof`] when the file is shorter than
    /// its header claims.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A write addressed a slot outside the file's addressable range.
    #[error("slot offset out of bounds for {timestamp}")]
    OffsetOutOfBounds {
        /// Minute whose slot fell outside `[StartOfFile, EndOfFile)`.
        timestamp: DateTime<Utc>,
    },

    /// The exclusive write lock could not be acquired before the deadline.
    #[error("could not acquire write lock on {} within {waited_ms} ms", .path.display())]
    LockTimeout {
        /// Lock file that stayed contended.
        path: PathBuf,
        /// Total time spent retrying.
        waited_ms: u64,
    },

    /// The file header could not be decoded.
    #[error("corrupt header in {}: {reason}", .path.display())]
    CorruptHeader {
        /// Storage file with the bad header.
        path: PathBuf,
        /// What failed while decoding.
        reason: String,
    },

    /// Raw pulse counts carry no unit; differencing them is not defined.
    #[error("delta over raw pulse values is not defined; query a scaled unit")]
    UnscaledDelta,

    /// Configuration could not be loaded or merged.
    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    /// A configuration value was rejected during validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;
