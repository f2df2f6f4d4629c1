//! Per-night session aggregation.
//!
//! A night is reconstructed as a pure function of the pair
//! (dir(X-1), dir(X)); nothing is carried between nights.

use crate::allocation::Allocation;
use crate::boundary::{self, NightUsage};
use crate::directory::{DirectorySet, DirectoryStore, FormatKind};
use crate::integrity::{self, Check, Finding, Severity};
use crate::records::FileKind;
use crate::stats::{CentralStats, PressureStats};
use crate::{Config, Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One reconstructed night
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Date of the directory holding the morning half
    pub date: NaiveDate,
    /// Which reconstruction path was used
    pub format: FormatKind,
    pub usage_hours: f64,
    pub evening_secs: u64,
    pub morning_secs: u64,
    pub ahi: f64,
    pub ai_count: usize,
    pub hi_count: usize,
    pub csa_count: usize,
    pub snore_count: usize,
    pub ai_total_duration_sec: u64,
    pub hi_total_duration_sec: u64,
    pub leak_avg_lpm: f64,
    pub pressure: PressureStats,
    pub breathing_rate: CentralStats,
    pub tidal_volume: CentralStats,
    /// Third mvtvbr field over the merged series; meaning unconfirmed
    pub ventilation_raw: Vec<u16>,
    /// flow/pressure samples of dir(X) used (the shorter on mismatch)
    pub waveform_samples: usize,
    pub degraded: bool,
    pub findings: Vec<Finding>,
}

impl Session {
    /// Hours of 25 Hz flow waveform behind `waveform_samples`.
    ///
    /// Kept alongside `usage_hours` as-is; the two are not reconciled.
    pub fn waveform_hours(&self) -> f64 {
        let interval = FileKind::Flow
            .sample_interval()
            .map_or(0.0, |d| d.as_secs_f64());
        self.waveform_samples as f64 * interval / 3600.0
    }
}

/// Result of reconstructing one night in a batch
#[derive(Debug)]
pub struct NightOutcome {
    pub date: NaiveDate,
    pub result: Result<Session>,
}

/// `(ai + hi) / hours`, 0 without usage
pub fn apnea_hypopnea_index(ai_count: usize, hi_count: usize, usage_hours: f64) -> f64 {
    if usage_hours > 0.0 {
        (ai_count + hi_count) as f64 / usage_hours
    } else {
        0.0
    }
}

/// Reconstruct the night ending in `curr`.
///
/// `prev` is the directory of the previous calendar day, if it exists.
pub fn reconstruct(
    date: NaiveDate,
    prev: Option<&DirectorySet>,
    curr: &DirectorySet,
    config: &Config,
) -> Result<Session> {
    if let Some(reason) = curr.unreadable_reason(FileKind::UseTime) {
        return Err(Error::InsufficientData {
            date,
            reason: format!("usage-time file is unreadable: {}", reason),
        });
    }
    if !curr.has(FileKind::UseTime) && !curr.is_empty() {
        return Err(Error::InsufficientData {
            date,
            reason: "directory has data files but no usage-time records".into(),
        });
    }

    // Without its usage records dir(X-1) cannot be split, so X stands alone
    let mut late_findings = Vec::new();
    let prev = match prev {
        Some(p) if p.is_unreadable(FileKind::UseTime) => {
            tracing::warn!(
                "Usage records of {} unreadable; treating {} as self-contained",
                p.date(),
                date
            );
            late_findings.push(previous_unusable(p.date(), "usage-time file is unreadable"));
            None
        }
        other => other,
    };

    let usage: NightUsage = boundary::resolve_usage(prev, curr, config.session.min_segment_secs);
    let contributing: Vec<&DirectorySet> = match (usage.mode, prev) {
        (FormatKind::Current, Some(prev)) => vec![prev, curr],
        _ => vec![curr],
    };

    let usage_hours = usage.usage_hours();
    if usage_hours > 0.0 {
        check_signal_files(date, usage_hours, &contributing)?;
    }

    let allocation =
        Allocation::for_night(usage.mode, prev, curr, config.session.min_segment_secs);

    if usage_hours > 0.0 {
        let missing = match (allocation.difleak.is_empty(), allocation.breathing.is_empty()) {
            (true, true) => Some("difleak and mvtvbr"),
            (true, false) => Some("difleak"),
            (false, true) => Some("mvtvbr"),
            (false, false) => None,
        };
        if let Some(missing) = missing {
            return Err(Error::InsufficientData {
                date,
                reason: format!(
                    "{:.2} h of usage recorded but no {} samples for the night",
                    usage_hours, missing
                ),
            });
        }
    }

    // Events are only recorded for the morning half, so dir(X) alone
    let ai = curr.events(FileKind::Ai);
    let hi = curr.events(FileKind::Hi);
    let ai_total_duration_sec = ai.iter().map(|e| e.duration_seconds as u64).sum::<u64>();
    let hi_total_duration_sec = hi.iter().map(|e| e.duration_seconds as u64).sum::<u64>();

    // Pressure changes cover only their own directory's therapy time; pool them
    let pressures: Vec<f64> = contributing
        .iter()
        .flat_map(|d| d.pressure_changes().iter().map(|r| r.cmh2o()))
        .collect();

    let leak: Vec<f64> = allocation.difleak.iter().map(|&v| v as f64).collect();
    let breaths: Vec<_> = allocation
        .breathing
        .iter()
        .filter(|s| s.breathing_rate > 0)
        .collect();
    let rates: Vec<f64> = breaths.iter().map(|s| s.breathing_rate as f64).collect();
    let volumes: Vec<f64> = breaths.iter().map(|s| s.tidal_volume as f64).collect();

    let mut findings = collect_findings(&contributing, config);
    findings.append(&mut late_findings);
    let degraded = findings.iter().any(Finding::degrades);

    let session = Session {
        date,
        format: usage.mode,
        usage_hours,
        evening_secs: usage.evening_secs,
        morning_secs: usage.morning_secs,
        ahi: apnea_hypopnea_index(ai.len(), hi.len(), usage_hours),
        ai_count: ai.len(),
        hi_count: hi.len(),
        csa_count: curr.events(FileKind::Csa).len(),
        snore_count: curr.events(FileKind::Snore).len(),
        ai_total_duration_sec,
        hi_total_duration_sec,
        leak_avg_lpm: crate::stats::mean(&leak),
        pressure: PressureStats::from_values(&pressures),
        breathing_rate: CentralStats::from_values(&rates),
        tidal_volume: CentralStats::from_values(&volumes),
        ventilation_raw: allocation.breathing.iter().map(|s| s.ventilation_raw).collect(),
        waveform_samples: curr.waveform_samples(),
        degraded,
        findings,
    };

    tracing::info!(
        "Reconstructed {}: {:.2} h, AHI {:.1}{}",
        date,
        session.usage_hours,
        session.ahi,
        if session.degraded { " (degraded)" } else { "" }
    );
    Ok(session)
}

/// A signal file that exists but failed to decode loses the night
fn check_signal_files(
    date: NaiveDate,
    usage_hours: f64,
    contributing: &[&DirectorySet],
) -> Result<()> {
    for dir in contributing {
        for kind in [FileKind::Flow, FileKind::Difleak, FileKind::Mvtvbr] {
            if let Some(reason) = dir.unreadable_reason(kind) {
                return Err(Error::InsufficientData {
                    date,
                    reason: format!(
                        "{:.2} h of usage recorded but {} of {} is unreadable: {}",
                        usage_hours,
                        kind,
                        dir.date(),
                        reason
                    ),
                });
            }
        }
    }
    Ok(())
}

fn previous_unusable(prev_date: NaiveDate, reason: &str) -> Finding {
    Finding {
        date: prev_date,
        severity: Severity::Warning,
        check: Check::UnreadableDirectory,
        detail: format!("previous directory skipped: {}", reason),
    }
}

/// Decode-time findings of every contributing directory plus setpoint checks
fn collect_findings(contributing: &[&DirectorySet], config: &Config) -> Vec<Finding> {
    let mut findings = Vec::new();
    for dir in contributing {
        findings.extend_from_slice(dir.findings());
        findings.extend(integrity::check_pressure_setpoints(
            dir,
            config.integrity.pressure_tolerance_cmh2o,
        ));
    }
    findings
}

/// Load dir(X-1) and dir(X) fresh from the store and reconstruct night X
pub fn reconstruct_from_store(
    date: NaiveDate,
    store: &DirectoryStore,
    config: &Config,
) -> Result<Session> {
    let curr = store.load(date)?.ok_or(Error::DirectoryNotFound(date))?;

    let mut unreadable = None;
    let prev = match date.pred_opt() {
        Some(prev_date) => match store.load(prev_date) {
            Ok(prev) => prev,
            Err(e) => {
                tracing::warn!(
                    "Previous directory {} unreadable ({}); treating {} as self-contained",
                    prev_date,
                    e,
                    date
                );
                unreadable = Some(previous_unusable(prev_date, &e.to_string()));
                None
            }
        },
        None => None,
    };

    let mut session = reconstruct(date, prev.as_ref(), &curr, config)?;
    if let Some(finding) = unreadable {
        session.findings.push(finding);
        session.degraded = true;
    }
    Ok(session)
}

/// Reconstruct every listed night; a failed night never stops the rest
pub fn reconstruct_range(
    dates: &[NaiveDate],
    store: &DirectoryStore,
    config: &Config,
) -> Vec<NightOutcome> {
    dates
        .iter()
        .map(|&date| {
            let result = reconstruct_from_store(date, store, config);
            if let Err(ref e) = result {
                tracing::warn!("Skipping {}: {}", date, e);
            }
            NightOutcome { date, result }
        })
        .collect()
}
