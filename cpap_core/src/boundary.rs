//! Boundary resolution: which usage-time records belong to which night.
//!
//! The device closes the running segment at a fixed hour and starts a new
//! directory. The truncated evening segment is stamped exactly on the hour
//! (a boundary record) in the earlier directory; the rest of the night shows
//! up as ordinary records in the next one. So night X is
//!
//!   boundary record of dir(X-1) + non-boundary records of dir(X)
//!
//! Directories written before the device used this convention have no
//! boundary records at all and hold the whole night themselves.

use crate::directory::{DirectorySet, FormatKind};
use crate::records::UsageTimeRecord;
use serde::{Deserialize, Serialize};

/// Split usage records into (boundary, non-boundary), preserving order
pub fn classify(records: &[UsageTimeRecord]) -> (Vec<&UsageTimeRecord>, Vec<&UsageTimeRecord>) {
    records.iter().partition(|r| r.is_boundary())
}

/// Seconds of the evening segment the directory hands to the next night.
/// Only the last boundary record counts.
pub fn boundary_secs(set: &DirectorySet) -> u64 {
    set.usage_times()
        .iter()
        .rev()
        .find(|r| r.is_boundary())
        .map_or(0, |r| r.duration_seconds as u64)
}

/// Seconds of morning segments, skipping segments shorter than `min_segment_secs`
pub fn morning_secs(set: &DirectorySet, min_segment_secs: u32) -> u64 {
    let (_, non_boundary) = classify(set.usage_times());
    non_boundary
        .into_iter()
        .filter(|r| r.duration_seconds >= min_segment_secs)
        .map(|r| r.duration_seconds as u64)
        .sum()
}

/// Seconds across every usage record in the directory
pub fn total_secs(set: &DirectorySet) -> u64 {
    set.usage_times()
        .iter()
        .map(|r| r.duration_seconds as u64)
        .sum()
}

/// Longest single non-boundary segment; the whole night in legacy layout
pub fn longest_segment_secs(set: &DirectorySet) -> u64 {
    let (_, non_boundary) = classify(set.usage_times());
    non_boundary
        .into_iter()
        .map(|r| r.duration_seconds as u64)
        .max()
        .unwrap_or(0)
}

/// How a night must be reconstructed.
///
/// Split-night fusion needs both a current-format dir(X) and a dir(X-1);
/// anything else is handled as a self-contained single directory.
pub fn night_mode(prev: Option<&DirectorySet>, curr: &DirectorySet) -> FormatKind {
    match (prev, curr.format()) {
        (Some(_), FormatKind::Current) => FormatKind::Current,
        (None, FormatKind::Current) => {
            tracing::info!(
                "No directory before {}, reconstructing it from its own data",
                curr.date()
            );
            FormatKind::Legacy
        }
        (_, FormatKind::Legacy) => FormatKind::Legacy,
    }
}

/// Resolved usage for one night
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NightUsage {
    pub mode: FormatKind,
    /// Contributed by dir(X-1)
    pub evening_secs: u64,
    /// Contributed by dir(X)
    pub morning_secs: u64,
}

impl NightUsage {
    pub fn total_secs(&self) -> u64 {
        self.evening_secs + self.morning_secs
    }

    pub fn usage_hours(&self) -> f64 {
        self.total_secs() as f64 / 3600.0
    }
}

/// Resolve the usage of the night ending in `curr`
pub fn resolve_usage(
    prev: Option<&DirectorySet>,
    curr: &DirectorySet,
    min_segment_secs: u32,
) -> NightUsage {
    let mode = night_mode(prev, curr);
    let usage = match (mode, prev) {
        (FormatKind::Current, Some(prev)) => NightUsage {
            mode,
            evening_secs: boundary_secs(prev),
            morning_secs: morning_secs(curr, min_segment_secs),
        },
        _ => NightUsage {
            mode: FormatKind::Legacy,
            evening_secs: 0,
            morning_secs: longest_segment_secs(curr),
        },
    };

    tracing::debug!(
        "Night {}: {:?}, evening {} s + morning {} s",
        curr.date(),
        usage.mode,
        usage.evening_secs,
        usage.morning_secs
    );
    usage
}
