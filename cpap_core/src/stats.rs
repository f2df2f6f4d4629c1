//! Descriptive statistics over nightly series.
//!
//! Empty input yields 0 everywhere so a night without a series still
//! produces a complete row.

use serde::{Deserialize, Serialize};

/// Arithmetic mean
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median of an ascending-sorted slice
pub fn median_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
    }
}

/// Percentile `p` (0-100) of an ascending-sorted slice, interpolating
/// linearly between the closest ranks
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let k = (sorted.len() - 1) as f64 * p.clamp(0.0, 100.0) / 100.0;
    let lower = k.floor() as usize;
    let upper = lower + 1;
    if upper >= sorted.len() {
        return sorted[lower];
    }
    sorted[lower] + (k - lower as f64) * (sorted[upper] - sorted[lower])
}

fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Mean and median of a series
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CentralStats {
    pub mean: f64,
    pub median: f64,
}

impl CentralStats {
    pub fn from_values(values: &[f64]) -> Self {
        CentralStats {
            mean: mean(values),
            median: median_sorted(&sorted_copy(values)),
        }
    }
}

/// Pressure distribution in cmH2O
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PressureStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub p90: f64,
    pub p95: f64,
}

impl PressureStats {
    pub fn from_values(values: &[f64]) -> Self {
        let sorted = sorted_copy(values);
        PressureStats {
            min: sorted.first().copied().unwrap_or(0.0),
            max: sorted.last().copied().unwrap_or(0.0),
            mean: mean(&sorted),
            median: median_sorted(&sorted),
            p90: percentile_sorted(&sorted, 90.0),
            p95: percentile_sorted(&sorted, 95.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_empty_series_is_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(PressureStats::from_values(&[]), PressureStats::default());
        assert_eq!(CentralStats::from_values(&[]), CentralStats::default());
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median_sorted(&[1.0, 2.0, 9.0]), 2.0);
        assert_eq!(median_sorted(&[1.0, 2.0, 4.0, 9.0]), 3.0);
    }

    #[test]
    fn test_percentile_interpolates() {
        let sorted: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        // k = 9 * 0.9 = 8.1 -> 9 + 0.1 * (10 - 9)
        assert!(close(percentile_sorted(&sorted, 90.0), 9.1));
        assert!(close(percentile_sorted(&sorted, 95.0), 9.55));
        assert_eq!(percentile_sorted(&sorted, 100.0), 10.0);
        assert_eq!(percentile_sorted(&[7.0], 90.0), 7.0);
    }

    #[test]
    fn test_pressure_stats_unsorted_input() {
        let stats = PressureStats::from_values(&[8.0, 6.0, 10.0, 7.0]);
        assert_eq!(stats.min, 6.0);
        assert_eq!(stats.max, 10.0);
        assert_eq!(stats.mean, 7.75);
        assert_eq!(stats.median, 7.5);
        // k = 3 * 0.9 = 2.7 -> 8 + 0.7 * 2
        assert!(close(stats.p90, 9.4));
    }
}
