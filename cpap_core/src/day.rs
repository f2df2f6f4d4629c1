//! Raw per-directory report.
//!
//! Describes one `YYYYMMDD` directory as decoded, with no reconstruction
//! across days. Useful for checking what a card actually holds.

use crate::directory::{DirectorySet, FormatKind};
use crate::records::{EventRecord, FileKind, UsageTimeRecord};
use crate::timestamp::Timestamp;
use chrono::NaiveDate;
use serde::Serialize;

/// Event file kinds, in listing order
const EVENT_KINDS: [FileKind; 5] = [
    FileKind::Ai,
    FileKind::Hi,
    FileKind::Csa,
    FileKind::Snore,
    FileKind::Leak,
];

/// Sampled file kinds summarised by value range
const SIGNAL_KINDS: [FileKind; 5] = [
    FileKind::Flow,
    FileKind::Pressure,
    FileKind::RealPressure,
    FileKind::SnoreData,
    FileKind::Difleak,
];

/// Min, max and mean of a series
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl ValueRange {
    /// `None` for an empty series
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in values {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        (count > 0).then(|| ValueRange {
            min,
            max,
            mean: sum / count as f64,
        })
    }
}

/// Device identification from the first decoded header
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeviceInfo {
    /// File the header was taken from
    pub source: FileKind,
    pub version: String,
    pub firmware: String,
    pub patient_id: String,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SignalSummary {
    pub kind: FileKind,
    pub samples: usize,
    /// Recorded span implied by the fixed sampling interval
    pub duration_secs: Option<f64>,
    pub range: Option<ValueRange>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PressureChangeSummary {
    pub records: usize,
    pub first: Timestamp,
    pub last: Timestamp,
    pub raw: ValueRange,
    pub cmh2o: ValueRange,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EventSummary {
    pub kind: FileKind,
    pub total_duration_secs: u64,
    pub events: Vec<EventRecord>,
}

/// The three mvtvbr fields, each as decoded
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BreathingSummary {
    pub records: usize,
    pub tidal_volume: ValueRange,
    pub breathing_rate: ValueRange,
    pub ventilation_raw: ValueRange,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OximetrySummary {
    pub samples: usize,
    /// Zero means no oximeter reading
    pub non_zero: usize,
    pub non_zero_min: Option<u16>,
    pub non_zero_max: Option<u16>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConfigEntry {
    pub timestamp: Timestamp,
    pub float_values: Vec<f32>,
    pub pressure_setpoints: Option<(f32, f32)>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkippedFile {
    pub kind: FileKind,
    pub reason: String,
}

/// Everything decoded from one day directory
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DayReport {
    pub date: NaiveDate,
    pub format: FormatKind,
    pub device: Option<DeviceInfo>,
    pub signals: Vec<SignalSummary>,
    pub pressure_changes: Option<PressureChangeSummary>,
    pub events: Vec<EventSummary>,
    pub breathing: Option<BreathingSummary>,
    pub usage: Vec<UsageTimeRecord>,
    pub oximetry: Option<OximetrySummary>,
    pub configs: Vec<ConfigEntry>,
    pub skipped: Vec<SkippedFile>,
}

impl DayReport {
    pub fn from_directory(dir: &DirectorySet) -> Self {
        DayReport {
            date: dir.date(),
            format: dir.format(),
            device: device_info(dir),
            signals: SIGNAL_KINDS
                .iter()
                .filter(|&&kind| dir.has(kind))
                .map(|&kind| signal_summary(dir, kind))
                .collect(),
            pressure_changes: pressure_change_summary(dir),
            events: EVENT_KINDS
                .iter()
                .filter(|&&kind| dir.has(kind))
                .map(|&kind| {
                    let events = dir.events(kind).to_vec();
                    EventSummary {
                        kind,
                        total_duration_secs: events.iter().map(|e| e.duration_seconds as u64).sum(),
                        events,
                    }
                })
                .collect(),
            breathing: breathing_summary(dir),
            usage: dir.usage_times().to_vec(),
            oximetry: dir.has(FileKind::Spo2Bpm).then(|| oximetry_summary(dir.spo2bpm())),
            configs: dir
                .configs()
                .iter()
                .map(|c| ConfigEntry {
                    timestamp: c.timestamp,
                    float_values: c.float_values(),
                    pressure_setpoints: c.pressure_setpoints(),
                })
                .collect(),
            skipped: dir
                .unreadable_kinds()
                .map(|kind| SkippedFile {
                    kind,
                    reason: dir.unreadable_reason(kind).unwrap_or_default().to_string(),
                })
                .collect(),
        }
    }
}

fn device_info(dir: &DirectorySet) -> Option<DeviceInfo> {
    let (source, header) = dir
        .file_kinds()
        .find_map(|kind| dir.header(kind).map(|h| (kind, h)))?;
    Some(DeviceInfo {
        source,
        version: header.version.clone(),
        firmware: header.firmware.clone(),
        patient_id: header.patient_id.clone(),
        start_time: header.start_time,
        end_time: header.end_time,
    })
}

fn signal_summary(dir: &DirectorySet, kind: FileKind) -> SignalSummary {
    let values: Vec<f64> = match kind {
        FileKind::Flow => dir.flow().iter().map(|&v| v as f64).collect(),
        FileKind::Difleak => dir.difleak().iter().map(|&v| v as f64).collect(),
        FileKind::Pressure => dir.pressure().iter().map(|&v| v as f64).collect(),
        FileKind::RealPressure => dir.real_pressure().iter().map(|&v| v as f64).collect(),
        FileKind::SnoreData => dir.snore_waveform().iter().map(|&v| v as f64).collect(),
        _ => Vec::new(),
    };
    SignalSummary {
        kind,
        samples: values.len(),
        duration_secs: kind
            .sample_interval()
            .map(|d| d.as_secs_f64() * values.len() as f64),
        range: ValueRange::from_values(values),
    }
}

fn pressure_change_summary(dir: &DirectorySet) -> Option<PressureChangeSummary> {
    let records = dir.pressure_changes();
    let first = records.first()?;
    let last = records.last()?;
    Some(PressureChangeSummary {
        records: records.len(),
        first: first.timestamp,
        last: last.timestamp,
        raw: ValueRange::from_values(records.iter().map(|r| r.raw_pressure as f64))?,
        cmh2o: ValueRange::from_values(records.iter().map(|r| r.cmh2o()))?,
    })
}

fn breathing_summary(dir: &DirectorySet) -> Option<BreathingSummary> {
    let samples = dir.breathing();
    Some(BreathingSummary {
        records: samples.len(),
        tidal_volume: ValueRange::from_values(samples.iter().map(|s| s.tidal_volume as f64))?,
        breathing_rate: ValueRange::from_values(samples.iter().map(|s| s.breathing_rate as f64))?,
        ventilation_raw: ValueRange::from_values(
            samples.iter().map(|s| s.ventilation_raw as f64),
        )?,
    })
}

fn oximetry_summary(samples: &[u16]) -> OximetrySummary {
    let non_zero: Vec<u16> = samples.iter().copied().filter(|&v| v != 0).collect();
    OximetrySummary {
        samples: samples.len(),
        non_zero: non_zero.len(),
        non_zero_min: non_zero.iter().copied().min(),
        non_zero_max: non_zero.iter().copied().max(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::FileHeader;
    use crate::records::{
        BreathingSample, ConfigSnapshot, PressureChangeRecord, RecordBody,
    };
    use crate::writer::DayWriter;
    use crate::{Config, DirectoryStore};

    fn ts(hour: u8, minute: u8, second: u8) -> Timestamp {
        Timestamp {
            year: 2022,
            month: 5,
            day: 28,
            hour,
            minute,
            second,
            subsecond: 0,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 5, 28).unwrap()
    }

    fn sample_dir() -> DirectorySet {
        let mut settings = [0u8; ConfigSnapshot::SETTINGS_SIZE];
        settings[0x70..0x74].copy_from_slice(&6.0f32.to_le_bytes());
        settings[0x74..0x78].copy_from_slice(&12.5f32.to_le_bytes());

        DirectorySet::from_bodies(
            date(),
            vec![
                (FileKind::Flow, RecordBody::Bytes(vec![100, 150, 200])),
                (FileKind::Pressure, RecordBody::Words(vec![80, 90, 100])),
                (
                    FileKind::Apcp,
                    RecordBody::PressureChanges(vec![
                        PressureChangeRecord {
                            raw_pressure: 60,
                            flags: 0,
                            timestamp: ts(1, 0, 1),
                        },
                        PressureChangeRecord {
                            raw_pressure: 110,
                            flags: 0,
                            timestamp: ts(4, 30, 0),
                        },
                    ]),
                ),
                (
                    FileKind::Ai,
                    RecordBody::Events(vec![
                        EventRecord {
                            event_type: 1,
                            duration_seconds: 12,
                            timestamp: ts(2, 10, 0),
                        },
                        EventRecord {
                            event_type: 1,
                            duration_seconds: 20,
                            timestamp: ts(3, 10, 0),
                        },
                    ]),
                ),
                (
                    FileKind::Mvtvbr,
                    RecordBody::Breathing(vec![
                        BreathingSample {
                            tidal_volume: 400,
                            breathing_rate: 12,
                            ventilation_raw: 5,
                        },
                        BreathingSample {
                            tidal_volume: 600,
                            breathing_rate: 16,
                            ventilation_raw: 7,
                        },
                    ]),
                ),
                (
                    FileKind::UseTime,
                    RecordBody::UsageTimes(vec![UsageTimeRecord {
                        duration_seconds: 3600,
                        parameter: 0x0102,
                        timestamp: ts(2, 0, 0),
                    }]),
                ),
                (FileKind::Spo2Bpm, RecordBody::Words(vec![0, 95, 0, 97])),
                (
                    FileKind::Config,
                    RecordBody::Configs(vec![ConfigSnapshot {
                        settings,
                        timestamp: ts(0, 5, 0),
                    }]),
                ),
            ],
        )
    }

    #[test]
    fn test_value_range() {
        assert_eq!(ValueRange::from_values(Vec::new()), None);
        let range = ValueRange::from_values([2.0, 8.0, 5.0]).unwrap();
        assert_eq!(range.min, 2.0);
        assert_eq!(range.max, 8.0);
        assert_eq!(range.mean, 5.0);
    }

    #[test]
    fn test_day_report_from_directory() {
        let report = DayReport::from_directory(&sample_dir());
        assert_eq!(report.date, date());
        assert_eq!(report.format, FormatKind::Current);

        assert_eq!(report.signals.len(), 2);
        let flow = &report.signals[0];
        assert_eq!(flow.kind, FileKind::Flow);
        assert_eq!(flow.samples, 3);
        assert!((flow.duration_secs.unwrap() - 0.12).abs() < 1e-9);
        assert_eq!(flow.range.unwrap().mean, 150.0);

        let apcp = report.pressure_changes.unwrap();
        assert_eq!(apcp.records, 2);
        assert_eq!(apcp.first, ts(1, 0, 1));
        assert_eq!(apcp.last, ts(4, 30, 0));
        assert_eq!(apcp.cmh2o.min, 6.0);
        assert_eq!(apcp.cmh2o.max, 11.0);

        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].kind, FileKind::Ai);
        assert_eq!(report.events[0].total_duration_secs, 32);

        let breathing = report.breathing.unwrap();
        assert_eq!(breathing.tidal_volume.max, 600.0);
        assert_eq!(breathing.breathing_rate.mean, 14.0);
        assert_eq!(breathing.ventilation_raw.min, 5.0);

        assert_eq!(report.usage.len(), 1);
        assert!(report.usage[0].is_boundary());

        let oximetry = report.oximetry.unwrap();
        assert_eq!(oximetry.samples, 4);
        assert_eq!(oximetry.non_zero, 2);
        assert_eq!(oximetry.non_zero_min, Some(95));
        assert_eq!(oximetry.non_zero_max, Some(97));

        assert_eq!(report.configs.len(), 1);
        assert_eq!(report.configs[0].float_values.len(), 16);
        assert_eq!(report.configs[0].pressure_setpoints, Some((6.0, 12.5)));
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_empty_directory_report() {
        let report = DayReport::from_directory(&DirectorySet::from_bodies(date(), Vec::new()));
        assert_eq!(report.format, FormatKind::Legacy);
        assert!(report.device.is_none());
        assert!(report.signals.is_empty());
        assert!(report.pressure_changes.is_none());
        assert!(report.breathing.is_none());
        assert!(report.oximetry.is_none());
    }

    #[test]
    fn test_day_report_from_disk() {
        crate::logging::init_test();
        let temp_dir = tempfile::tempdir().unwrap();
        let writer = DayWriter::new(temp_dir.path(), date())
            .unwrap()
            .with_header(FileHeader {
                version: "0".into(),
                firmware: "SW1.2".into(),
                patient_id: "HY-0042".into(),
                start_time: Some(ts(22, 0, 0)),
                end_time: Some(ts(6, 30, 0)),
                ..FileHeader::default()
            });
        writer
            .write(FileKind::Flow, &RecordBody::Bytes(vec![128; 25]))
            .unwrap();
        writer.write_raw(FileKind::Snore, &[0u8; 7]).unwrap();

        let store = DirectoryStore::open(temp_dir.path(), &Config::default()).unwrap();
        let report = DayReport::from_directory(&store.load(date()).unwrap().unwrap());

        let device = report.device.unwrap();
        assert_eq!(device.source, FileKind::Flow);
        assert_eq!(device.firmware, "SW1.2");
        assert_eq!(device.patient_id, "HY-0042");
        assert_eq!(device.start_time, Some(ts(22, 0, 0)));
        assert!((report.signals[0].duration_secs.unwrap() - 1.0).abs() < 1e-9);

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].kind, FileKind::Snore);
        assert!(report.skipped[0].reason.contains("Truncated"));
    }
}
