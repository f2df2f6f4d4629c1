//! Proportional allocation of periodic series across a directory pair.
//!
//! difleak and mvtvbr carry no per-sample timestamps, so the evening part of
//! dir(X-1) and the morning part of dir(X) are cut by sample count, in
//! proportion to the usage-time durations:
//!
//! ```text
//! evening_ratio = boundary(dir X-1) / total(dir X-1)   -> last n samples
//! morning_ratio = morning(dir X)    / total(dir X)     -> first n samples
//! ```

use crate::boundary;
use crate::directory::{DirectorySet, FormatKind};
use crate::records::BreathingSample;

/// `numerator / denominator` clamped to [0, 1]; 0 when there is no usage
pub fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    (numerator as f64 / denominator as f64).clamp(0.0, 1.0)
}

/// Number of samples a ratio selects from a series of `len` samples
pub fn sample_count(ratio: f64, len: usize) -> usize {
    if !ratio.is_finite() || ratio <= 0.0 {
        return 0;
    }
    let n = (ratio * len as f64).round();
    if n >= len as f64 {
        len
    } else {
        n as usize
    }
}

/// The last `round(ratio * len)` samples
pub fn evening_slice<T>(series: &[T], ratio: f64) -> &[T] {
    let n = sample_count(ratio, series.len());
    &series[series.len() - n..]
}

/// The first `round(ratio * len)` samples
pub fn morning_slice<T>(series: &[T], ratio: f64) -> &[T] {
    let n = sample_count(ratio, series.len());
    &series[..n]
}

/// Share of dir(X-1) usage that belongs to the following night
pub fn evening_ratio(prev: &DirectorySet) -> f64 {
    ratio(boundary::boundary_secs(prev), boundary::total_secs(prev))
}

/// Share of dir(X) usage that belongs to the night ending in it
pub fn morning_ratio(curr: &DirectorySet, min_segment_secs: u32) -> f64 {
    ratio(
        boundary::morning_secs(curr, min_segment_secs),
        boundary::total_secs(curr),
    )
}

/// Periodic series of one night, owned
#[derive(Clone, Debug, PartialEq)]
pub struct Allocation {
    pub mode: FormatKind,
    pub evening_ratio: f64,
    pub morning_ratio: f64,
    /// Samples taken from dir(X-1), then dir(X): (difleak, mvtvbr)
    pub evening_samples: (usize, usize),
    pub morning_samples: (usize, usize),
    pub difleak: Vec<u8>,
    pub breathing: Vec<BreathingSample>,
}

impl Allocation {
    /// Self-contained night: dir(X)'s full series, no slicing
    pub fn legacy(curr: &DirectorySet) -> Self {
        let (difleak, breathing) = curr.periodic_series();
        Allocation {
            mode: FormatKind::Legacy,
            evening_ratio: 0.0,
            morning_ratio: 1.0,
            evening_samples: (0, 0),
            morning_samples: (difleak.len(), breathing.len()),
            difleak: difleak.to_vec(),
            breathing: breathing.to_vec(),
        }
    }

    /// Split night: evening tail of dir(X-1) followed by morning head of dir(X).
    ///
    /// Each directory's difleak/mvtvbr pair is trimmed to its 2:1 prefix
    /// before slicing; the two series are then cut independently.
    pub fn across(prev: &DirectorySet, curr: &DirectorySet, min_segment_secs: u32) -> Self {
        let evening_ratio = evening_ratio(prev);
        let morning_ratio = morning_ratio(curr, min_segment_secs);

        let (prev_leak, prev_breath) = prev.periodic_series();
        let (curr_leak, curr_breath) = curr.periodic_series();

        let evening_leak = evening_slice(prev_leak, evening_ratio);
        let evening_breath = evening_slice(prev_breath, evening_ratio);
        let morning_leak = morning_slice(curr_leak, morning_ratio);
        let morning_breath = morning_slice(curr_breath, morning_ratio);

        tracing::debug!(
            "Allocating {}: evening ratio {:.3} ({} leak, {} breath), morning ratio {:.3} ({} leak, {} breath)",
            curr.date(),
            evening_ratio,
            evening_leak.len(),
            evening_breath.len(),
            morning_ratio,
            morning_leak.len(),
            morning_breath.len()
        );

        Allocation {
            mode: FormatKind::Current,
            evening_ratio,
            morning_ratio,
            evening_samples: (evening_leak.len(), evening_breath.len()),
            morning_samples: (morning_leak.len(), morning_breath.len()),
            difleak: [evening_leak, morning_leak].concat(),
            breathing: [evening_breath, morning_breath].concat(),
        }
    }

    /// Allocate according to the night's resolved mode
    pub fn for_night(
        mode: FormatKind,
        prev: Option<&DirectorySet>,
        curr: &DirectorySet,
        min_segment_secs: u32,
    ) -> Self {
        match (mode, prev) {
            (FormatKind::Current, Some(prev)) => Self::across(prev, curr, min_segment_secs),
            _ => Self::legacy(curr),
        }
    }
}
