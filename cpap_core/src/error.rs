//! Error types for the cpap_core library.

use crate::records::FileKind;
use chrono::NaiveDate;
use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for cpap_core operations
///
/// Integrity violations are not errors; they are reported as
/// [`Finding`](crate::integrity::Finding)s on the resulting session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timestamp field out of range, or fewer than 8 bytes available
    #[error("Malformed timestamp: {0}")]
    MalformedTimestamp(String),

    /// File shorter than the fixed header
    #[error("Header size mismatch: expected {expected} bytes, got {actual}")]
    HeaderSizeMismatch { expected: usize, actual: usize },

    /// Header version string not recognized
    #[error("Unsupported format version: {0:?}")]
    UnsupportedFormatVersion(String),

    /// Body length is not a multiple of the record size
    #[error("Truncated {kind} body: {len} bytes is not a multiple of {record_size}")]
    TruncatedRecord {
        kind: FileKind,
        len: usize,
        record_size: usize,
    },

    /// A night has usage but not enough captured data to reconstruct it
    #[error("Insufficient data for {date}: {reason}")]
    InsufficientData { date: NaiveDate, reason: String },

    /// The directory for the requested night does not exist
    #[error("No directory for {0}")]
    DirectoryNotFound(NaiveDate),
}

impl Error {
    /// Whether this error came from decoding a single file
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Error::MalformedTimestamp(_)
                | Error::HeaderSizeMismatch { .. }
                | Error::UnsupportedFormatVersion(_)
                | Error::TruncatedRecord { .. }
        )
    }
}
