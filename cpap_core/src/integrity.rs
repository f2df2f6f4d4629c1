//! Structural cross-checks over decoded data.
//!
//! Checks never abort decoding or aggregation. They return [`Finding`]s;
//! a `Violation` marks the resulting session as degraded and the aggregator
//! falls back to the shorter of the mismatched series.

use crate::directory::DirectorySet;
use crate::records::FileKind;
use crate::session::Session;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How serious a finding is
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Violation,
}

/// Which check produced a finding
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    /// flow and pressure sample counts differ
    WaveformLength,
    /// difleak is not exactly twice mvtvbr
    PeriodicRatio,
    /// apcp pressure outside the configured setpoints
    PressureSetpoint,
    /// reconstructed usage differs from a reference value
    UsageReference,
    /// a single file failed to decode and was left out
    UnreadableFile,
    /// previous directory could not be used
    UnreadableDirectory,
}

/// A single integrity finding
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Directory (or night) the finding applies to
    pub date: NaiveDate,
    pub severity: Severity,
    pub check: Check,
    pub detail: String,
}

impl Finding {
    pub fn is_violation(&self) -> bool {
        self.severity == Severity::Violation
    }

    /// Whether a session carrying this finding is degraded: any violation,
    /// or data that had to be left out
    pub fn degrades(&self) -> bool {
        self.is_violation()
            || matches!(self.check, Check::UnreadableFile | Check::UnreadableDirectory)
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Violation => "violation",
        };
        write!(f, "{} [{}] {}", self.date.format("%Y%m%d"), level, self.detail)
    }
}

/// flow and pressure come from the same 25 Hz clock and must match
pub fn check_waveform_lengths(date: NaiveDate, flow: usize, pressure: usize) -> Option<Finding> {
    (flow != pressure).then(|| Finding {
        date,
        severity: Severity::Violation,
        check: Check::WaveformLength,
        detail: format!(
            "flow has {} samples but pressure has {}; using {}",
            flow,
            pressure,
            flow.min(pressure)
        ),
    })
}

/// difleak (2.5 s) must hold exactly twice as many samples as mvtvbr (5 s)
pub fn check_periodic_ratio(date: NaiveDate, difleak: usize, mvtvbr: usize) -> Option<Finding> {
    (difleak != 2 * mvtvbr).then(|| {
        let (dl, mv) = usable_periodic_lens(difleak, mvtvbr);
        Finding {
            date,
            severity: Severity::Violation,
            check: Check::PeriodicRatio,
            detail: format!(
                "difleak has {} samples but mvtvbr has {} (expected 2:1); using {}/{}",
                difleak, mvtvbr, dl, mv
            ),
        }
    })
}

/// Longest (difleak, mvtvbr) prefix lengths that satisfy the 2:1 tie
pub fn usable_periodic_lens(difleak: usize, mvtvbr: usize) -> (usize, usize) {
    let mv = mvtvbr.min(difleak / 2);
    (2 * mv, mv)
}

/// A file of `kind` that failed to decode and was skipped
pub fn unreadable_file(date: NaiveDate, kind: FileKind, reason: &str) -> Finding {
    Finding {
        date,
        severity: Severity::Warning,
        check: Check::UnreadableFile,
        detail: format!("{} file skipped: {}", kind, reason),
    }
}

/// Decode-time structural checks for one directory.
///
/// Pairs are only compared when both files are present.
pub fn check_directory(set: &DirectorySet) -> Vec<Finding> {
    let mut findings = Vec::new();

    if set.has(FileKind::Flow) && set.has(FileKind::Pressure) {
        findings.extend(check_waveform_lengths(
            set.date(),
            set.flow().len(),
            set.pressure().len(),
        ));
    }
    if set.has(FileKind::Difleak) && set.has(FileKind::Mvtvbr) {
        findings.extend(check_periodic_ratio(
            set.date(),
            set.difleak().len(),
            set.breathing().len(),
        ));
    }

    for finding in &findings {
        tracing::warn!("Integrity: {}", finding);
    }
    findings
}

/// Compare apcp pressures against the directory's configured setpoints
pub fn check_pressure_setpoints(set: &DirectorySet, tolerance_cmh2o: f64) -> Option<Finding> {
    let (lo, hi) = set.settings()?.pressure_setpoints()?;
    let lo = lo as f64 - tolerance_cmh2o;
    let hi = hi as f64 + tolerance_cmh2o;

    let changes = set.pressure_changes();
    let outside: Vec<f64> = changes
        .iter()
        .map(|r| r.cmh2o())
        .filter(|p| *p < lo || *p > hi)
        .collect();
    if outside.is_empty() {
        return None;
    }

    let excess = |p: f64| if p < lo { lo - p } else { p - hi };
    let worst = outside
        .iter()
        .copied()
        .max_by(|a, b| excess(*a).total_cmp(&excess(*b)))
        .unwrap_or_default();
    let finding = Finding {
        date: set.date(),
        severity: Severity::Warning,
        check: Check::PressureSetpoint,
        detail: format!(
            "{} of {} apcp pressures outside {:.1}..{:.1} cmH2O (e.g. {:.1})",
            outside.len(),
            changes.len(),
            lo,
            hi,
            worst
        ),
    };
    tracing::warn!("Integrity: {}", finding);
    Some(finding)
}

/// Validation-mode check of usage against an externally known value
pub fn check_usage_reference(
    session: &Session,
    reference_hours: f64,
    tolerance_hours: f64,
) -> Option<Finding> {
    let diff = (session.usage_hours - reference_hours).abs();
    (diff > tolerance_hours).then(|| Finding {
        date: session.date,
        severity: Severity::Warning,
        check: Check::UsageReference,
        detail: format!(
            "usage {:.2} h differs from reference {:.2} h by {:.2} h (tolerance {:.2})",
            session.usage_hours, reference_hours, diff, tolerance_hours
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{ConfigSnapshot, PressureChangeRecord, RecordBody};
    use crate::Timestamp;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 5, 28).unwrap()
    }

    fn ts() -> Timestamp {
        Timestamp {
            year: 2022,
            month: 5,
            day: 28,
            hour: 3,
            minute: 10,
            second: 0,
            subsecond: 0,
        }
    }

    #[test]
    fn test_waveform_mismatch_is_violation() {
        let finding = check_waveform_lengths(date(), 225_000, 224_999).unwrap();
        assert!(finding.is_violation());
        assert_eq!(finding.check, Check::WaveformLength);
        assert!(finding.detail.contains("224999"));

        assert!(check_waveform_lengths(date(), 10, 10).is_none());
    }

    #[test]
    fn test_unreadable_file_degrades() {
        let finding = unreadable_file(date(), FileKind::Spo2Bpm, "truncated");
        assert_eq!(finding.severity, Severity::Warning);
        assert!(finding.degrades());
        assert!(finding.detail.starts_with("spo2bpm file skipped"));

        let violation = check_waveform_lengths(date(), 3, 2).unwrap();
        assert!(violation.degrades());
    }

    #[test]
    fn test_periodic_ratio() {
        assert!(check_periodic_ratio(date(), 200, 100).is_none());
        assert!(check_periodic_ratio(date(), 0, 0).is_none());

        let finding = check_periodic_ratio(date(), 201, 100).unwrap();
        assert_eq!(finding.severity, Severity::Violation);
    }

    #[test]
    fn test_usable_periodic_lens() {
        assert_eq!(usable_periodic_lens(200, 100), (200, 100));
        assert_eq!(usable_periodic_lens(201, 100), (200, 100));
        assert_eq!(usable_periodic_lens(150, 100), (150, 75));
        assert_eq!(usable_periodic_lens(151, 100), (150, 75));
        assert_eq!(usable_periodic_lens(10, 0), (0, 0));
    }

    #[test]
    fn test_check_directory_only_compares_present_pairs() {
        let set = DirectorySet::from_bodies(
            date(),
            vec![(FileKind::Flow, RecordBody::Bytes(vec![0; 50]))],
        );
        assert!(check_directory(&set).is_empty());

        let set = DirectorySet::from_bodies(
            date(),
            vec![
                (FileKind::Flow, RecordBody::Bytes(vec![0; 50])),
                (FileKind::Pressure, RecordBody::Words(vec![0; 49])),
            ],
        );
        let findings = check_directory(&set);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].check, Check::WaveformLength);
    }

    #[test]
    fn test_pressure_setpoint_warning() {
        crate::logging::init_test();

        let mut settings = [0u8; ConfigSnapshot::SETTINGS_SIZE];
        settings[0x70..0x74].copy_from_slice(&6.0f32.to_le_bytes());
        settings[0x74..0x78].copy_from_slice(&10.0f32.to_le_bytes());
        let config = ConfigSnapshot {
            settings,
            timestamp: ts(),
        };
        let apcp = |raw| PressureChangeRecord {
            raw_pressure: raw,
            flags: 0,
            timestamp: ts(),
        };

        let within = DirectorySet::from_bodies(
            date(),
            vec![
                (FileKind::Config, RecordBody::Configs(vec![config.clone()])),
                (
                    FileKind::Apcp,
                    RecordBody::PressureChanges(vec![apcp(60), apcp(105)]),
                ),
            ],
        );
        assert!(check_pressure_setpoints(&within, 1.0).is_none());

        let outside = DirectorySet::from_bodies(
            date(),
            vec![
                (FileKind::Config, RecordBody::Configs(vec![config])),
                (
                    FileKind::Apcp,
                    RecordBody::PressureChanges(vec![apcp(60), apcp(140)]),
                ),
            ],
        );
        let finding = check_pressure_setpoints(&outside, 1.0).unwrap();
        assert_eq!(finding.severity, Severity::Warning);
        assert!(finding.detail.starts_with("1 of 2"));
    }

    #[test]
    fn test_pressure_check_without_config_is_silent() {
        let set = DirectorySet::from_bodies(
            date(),
            vec![(
                FileKind::Apcp,
                RecordBody::PressureChanges(vec![PressureChangeRecord {
                    raw_pressure: 400,
                    flags: 0,
                    timestamp: ts(),
                }]),
            )],
        );
        assert!(check_pressure_setpoints(&set, 1.0).is_none());
    }
}
