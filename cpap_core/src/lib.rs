#![forbid(unsafe_code)]

//! Session reconstruction engine for Hypnus CPAP SD card data.
//!
//! This crate provides:
//! - Binary decoding (timestamps, 512-byte headers, per-type record bodies)
//! - Day directory loading with legacy/current format detection
//! - Boundary resolution and proportional allocation across directory pairs
//! - Per-night session aggregation and integrity checking
//! - Raw per-directory reports
//! - CSV export and multi-night summaries

pub mod error;
pub mod config;
pub mod logging;
pub mod timestamp;
pub mod header;
pub mod records;
pub mod directory;
pub mod boundary;
pub mod allocation;
pub mod integrity;
pub mod stats;
pub mod session;
pub mod day;
pub mod export;
pub mod summary;
pub mod writer;

// Re-export commonly used types
pub use error::{Error, Result};
pub use config::Config;
pub use timestamp::Timestamp;
pub use header::{FileHeader, HEADER_SIZE};
pub use records::{
    BreathingSample, ConfigSnapshot, EventRecord, FileKind, PressureChangeRecord, UsageTimeRecord,
};
pub use directory::{DirectorySet, DirectoryStore, FormatKind};
pub use boundary::{resolve_usage, NightUsage};
pub use allocation::Allocation;
pub use integrity::{Finding, Severity};
pub use session::{reconstruct, reconstruct_from_store, reconstruct_range, NightOutcome, Session};
pub use summary::PeriodSummary;
pub use day::DayReport;
