//! Multi-night summaries.

use crate::stats;
use crate::Session;
use serde::{Deserialize, Serialize};
use std::fmt;

/// AHI severity bands
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AhiSeverity {
    Normal,
    Mild,
    Moderate,
    Severe,
}

impl AhiSeverity {
    pub fn from_ahi(ahi: f64) -> Self {
        if ahi < 5.0 {
            AhiSeverity::Normal
        } else if ahi < 15.0 {
            AhiSeverity::Mild
        } else if ahi < 30.0 {
            AhiSeverity::Moderate
        } else {
            AhiSeverity::Severe
        }
    }
}

impl fmt::Display for AhiSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AhiSeverity::Normal => "normal",
            AhiSeverity::Mild => "mild",
            AhiSeverity::Moderate => "moderate",
            AhiSeverity::Severe => "severe",
        };
        f.write_str(label)
    }
}

/// Aggregate over a run of nights
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub nights: usize,
    pub total_usage_hours: f64,
    pub avg_usage_hours: f64,
    /// Nights with at least `compliance_hours` of use
    pub compliant_nights: usize,
    pub compliance_pct: f64,
    /// Σ(ai + hi) / Σ usage
    pub overall_ahi: f64,
    pub severity: AhiSeverity,
    pub total_ai: usize,
    pub total_hi: usize,
    pub total_csa: usize,
    pub total_snore: usize,
    pub avg_leak_lpm: f64,
    pub avg_pressure_p90: f64,
    pub avg_breathing_rate: f64,
    pub avg_tidal_volume: f64,
    pub degraded_nights: usize,
}

/// Mean over the non-zero values only; nights without a series report 0
fn mean_nonzero(values: impl Iterator<Item = f64>) -> f64 {
    let values: Vec<f64> = values.filter(|v| *v > 0.0).collect();
    stats::mean(&values)
}

impl PeriodSummary {
    pub fn from_sessions(sessions: &[Session], compliance_hours: f64) -> Self {
        let nights = sessions.len();
        let total_usage_hours: f64 = sessions.iter().map(|s| s.usage_hours).sum();
        let total_ai: usize = sessions.iter().map(|s| s.ai_count).sum();
        let total_hi: usize = sessions.iter().map(|s| s.hi_count).sum();
        let compliant_nights = sessions
            .iter()
            .filter(|s| s.usage_hours >= compliance_hours)
            .count();

        let overall_ahi = if total_usage_hours > 0.0 {
            (total_ai + total_hi) as f64 / total_usage_hours
        } else {
            0.0
        };

        PeriodSummary {
            nights,
            total_usage_hours,
            avg_usage_hours: if nights > 0 {
                total_usage_hours / nights as f64
            } else {
                0.0
            },
            compliant_nights,
            compliance_pct: if nights > 0 {
                compliant_nights as f64 * 100.0 / nights as f64
            } else {
                0.0
            },
            overall_ahi,
            severity: AhiSeverity::from_ahi(overall_ahi),
            total_ai,
            total_hi,
            total_csa: sessions.iter().map(|s| s.csa_count).sum(),
            total_snore: sessions.iter().map(|s| s.snore_count).sum(),
            avg_leak_lpm: mean_nonzero(sessions.iter().map(|s| s.leak_avg_lpm)),
            avg_pressure_p90: mean_nonzero(sessions.iter().map(|s| s.pressure.p90)),
            avg_breathing_rate: mean_nonzero(sessions.iter().map(|s| s.breathing_rate.mean)),
            avg_tidal_volume: mean_nonzero(sessions.iter().map(|s| s.tidal_volume.mean)),
            degraded_nights: sessions.iter().filter(|s| s.degraded).count(),
        }
    }
}
