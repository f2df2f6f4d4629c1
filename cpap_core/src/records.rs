//! Record body decoding, one layout per file type.
//!
//! Each `.edf` file is a 512-byte header followed by a body of fixed-size
//! records. The record size and meaning depend only on the file type.

use crate::timestamp::{Timestamp, TIMESTAMP_SIZE};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ============================================================================
// File kinds
// ============================================================================

/// Every file type found in a day directory
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Flow,
    Pressure,
    RealPressure,
    SnoreData,
    Spo2Bpm,
    Mvtvbr,
    Difleak,
    Ai,
    Hi,
    Snore,
    Csa,
    Leak,
    Apcp,
    UseTime,
    Config,
}

impl FileKind {
    pub const ALL: [FileKind; 15] = [
        FileKind::Flow,
        FileKind::Pressure,
        FileKind::RealPressure,
        FileKind::SnoreData,
        FileKind::Spo2Bpm,
        FileKind::Mvtvbr,
        FileKind::Difleak,
        FileKind::Ai,
        FileKind::Hi,
        FileKind::Snore,
        FileKind::Csa,
        FileKind::Leak,
        FileKind::Apcp,
        FileKind::UseTime,
        FileKind::Config,
    ];

    /// File name suffix, as in `20220528_<suffix>.edf`
    pub fn suffix(self) -> &'static str {
        match self {
            FileKind::Flow => "flow",
            FileKind::Pressure => "pressure",
            FileKind::RealPressure => "realpresdata",
            FileKind::SnoreData => "snoredata",
            FileKind::Spo2Bpm => "spo2bpm",
            FileKind::Mvtvbr => "mvtvbr",
            FileKind::Difleak => "difleak",
            FileKind::Ai => "ai",
            FileKind::Hi => "hi",
            FileKind::Snore => "snore",
            FileKind::Csa => "csa",
            FileKind::Leak => "leak",
            FileKind::Apcp => "apcp",
            FileKind::UseTime => "usetime",
            FileKind::Config => "config",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.suffix() == suffix)
    }

    /// Bytes per record in the body
    pub fn record_size(self) -> usize {
        match self {
            FileKind::Flow | FileKind::Difleak => 1,
            FileKind::Pressure
            | FileKind::RealPressure
            | FileKind::SnoreData
            | FileKind::Spo2Bpm => 2,
            FileKind::Mvtvbr => BreathingSample::SIZE,
            FileKind::Ai
            | FileKind::Hi
            | FileKind::Snore
            | FileKind::Csa
            | FileKind::Leak => EventRecord::SIZE,
            FileKind::Apcp => PressureChangeRecord::SIZE,
            FileKind::UseTime => UsageTimeRecord::SIZE,
            FileKind::Config => ConfigSnapshot::SIZE,
        }
    }

    /// Fixed sampling interval; `None` for event-triggered records
    pub fn sample_interval(self) -> Option<Duration> {
        match self {
            FileKind::Flow | FileKind::Pressure | FileKind::RealPressure | FileKind::SnoreData => {
                Some(Duration::from_millis(40))
            }
            FileKind::Mvtvbr => Some(Duration::from_secs(5)),
            FileKind::Difleak => Some(Duration::from_millis(2500)),
            FileKind::Apcp => Some(Duration::from_secs(1)),
            _ => None,
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

// ============================================================================
// Fixed-size records
// ============================================================================

/// A record with a fixed on-disk size
pub trait FixedRecord: Sized {
    const SIZE: usize;

    /// Decode from exactly `SIZE` bytes
    fn decode(bytes: &[u8]) -> Result<Self>;

    /// Append the on-disk encoding to `out`
    fn encode_into(&self, out: &mut Vec<u8>);

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        self.encode_into(&mut out);
        out
    }
}

fn u16_at(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// One mvtvbr triplet, sampled every 5 seconds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreathingSample {
    /// Tidal volume, mL
    pub tidal_volume: u16,
    /// Breaths per minute; 0 when no breath was detected
    pub breathing_rate: u16,
    /// Ventilation-related value of unconfirmed meaning, passed through as-is
    pub ventilation_raw: u16,
}

impl FixedRecord for BreathingSample {
    const SIZE: usize = 6;

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(BreathingSample {
            tidal_volume: u16_at(bytes, 0),
            breathing_rate: u16_at(bytes, 2),
            ventilation_raw: u16_at(bytes, 4),
        })
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.tidal_volume.to_le_bytes());
        out.extend_from_slice(&self.breathing_rate.to_le_bytes());
        out.extend_from_slice(&self.ventilation_raw.to_le_bytes());
    }
}

/// Respiratory event (ai, hi, csa, snore, leak files)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_type: u32,
    pub duration_seconds: u32,
    pub timestamp: Timestamp,
}

impl FixedRecord for EventRecord {
    const SIZE: usize = 16;

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(EventRecord {
            event_type: u32_at(bytes, 0),
            duration_seconds: u32_at(bytes, 4),
            timestamp: Timestamp::decode(&bytes[8..8 + TIMESTAMP_SIZE])?,
        })
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.event_type.to_le_bytes());
        out.extend_from_slice(&self.duration_seconds.to_le_bytes());
        out.extend_from_slice(&self.timestamp.encode());
    }
}

/// Usage-time record written when a therapy segment ends
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTimeRecord {
    pub duration_seconds: u32,
    pub parameter: u32,
    pub timestamp: Timestamp,
}

impl UsageTimeRecord {
    /// Segment cut short by the directory split: stamped exactly on the hour
    pub fn is_boundary(&self) -> bool {
        self.timestamp.is_on_the_hour()
    }
}

impl FixedRecord for UsageTimeRecord {
    const SIZE: usize = 16;

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(UsageTimeRecord {
            duration_seconds: u32_at(bytes, 0),
            parameter: u32_at(bytes, 4),
            timestamp: Timestamp::decode(&bytes[8..8 + TIMESTAMP_SIZE])?,
        })
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.duration_seconds.to_le_bytes());
        out.extend_from_slice(&self.parameter.to_le_bytes());
        out.extend_from_slice(&self.timestamp.encode());
    }
}

/// APAP pressure adjustment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PressureChangeRecord {
    /// Tenths of cmH2O
    pub raw_pressure: u32,
    pub flags: u32,
    pub timestamp: Timestamp,
}

impl PressureChangeRecord {
    pub fn cmh2o(&self) -> f64 {
        self.raw_pressure as f64 / 10.0
    }
}

impl FixedRecord for PressureChangeRecord {
    const SIZE: usize = 16;

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(PressureChangeRecord {
            raw_pressure: u32_at(bytes, 0),
            flags: u32_at(bytes, 4),
            timestamp: Timestamp::decode(&bytes[8..8 + TIMESTAMP_SIZE])?,
        })
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.raw_pressure.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.timestamp.encode());
    }
}

/// Settings block written whenever the device configuration changes
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigSnapshot {
    pub settings: [u8; ConfigSnapshot::SETTINGS_SIZE],
    pub timestamp: Timestamp,
}

impl ConfigSnapshot {
    pub const SETTINGS_SIZE: usize = 192;

    /// Window of float32 setting values
    const FLOAT_WINDOW: std::ops::Range<usize> = 0x70..0xB0;

    /// Plausible device pressure range, cmH2O
    const PRESSURE_RANGE: std::ops::RangeInclusive<f32> = 4.0..=20.0;

    /// Float32 settings in the known window, unrounded
    pub fn float_values(&self) -> Vec<f32> {
        self.settings[Self::FLOAT_WINDOW]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    /// Min and max of the float settings that look like pressure setpoints
    pub fn pressure_setpoints(&self) -> Option<(f32, f32)> {
        self.float_values()
            .into_iter()
            .filter(|v| v.is_finite() && Self::PRESSURE_RANGE.contains(v))
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

impl FixedRecord for ConfigSnapshot {
    const SIZE: usize = 200;

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut settings = [0u8; Self::SETTINGS_SIZE];
        settings.copy_from_slice(&bytes[..Self::SETTINGS_SIZE]);
        Ok(ConfigSnapshot {
            settings,
            timestamp: Timestamp::decode(&bytes[Self::SETTINGS_SIZE..Self::SIZE])?,
        })
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.settings);
        out.extend_from_slice(&self.timestamp.encode());
    }
}

// ============================================================================
// Body decoding
// ============================================================================

/// Decoded body of one file
#[derive(Clone, Debug, PartialEq)]
pub enum RecordBody {
    /// 1-byte samples (flow, difleak)
    Bytes(Vec<u8>),
    /// 2-byte LE samples (pressure, realpresdata, snoredata, spo2bpm)
    Words(Vec<u16>),
    Breathing(Vec<BreathingSample>),
    Events(Vec<EventRecord>),
    PressureChanges(Vec<PressureChangeRecord>),
    UsageTimes(Vec<UsageTimeRecord>),
    Configs(Vec<ConfigSnapshot>),
}

impl RecordBody {
    /// Number of records or samples
    pub fn len(&self) -> usize {
        match self {
            RecordBody::Bytes(v) => v.len(),
            RecordBody::Words(v) => v.len(),
            RecordBody::Breathing(v) => v.len(),
            RecordBody::Events(v) => v.len(),
            RecordBody::PressureChanges(v) => v.len(),
            RecordBody::UsageTimes(v) => v.len(),
            RecordBody::Configs(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Re-encode to the on-disk body layout
    pub fn encode(&self) -> Vec<u8> {
        match self {
            RecordBody::Bytes(v) => v.clone(),
            RecordBody::Words(v) => v.iter().flat_map(|w| w.to_le_bytes()).collect(),
            RecordBody::Breathing(v) => encode_records(v),
            RecordBody::Events(v) => encode_records(v),
            RecordBody::PressureChanges(v) => encode_records(v),
            RecordBody::UsageTimes(v) => encode_records(v),
            RecordBody::Configs(v) => encode_records(v),
        }
    }
}

fn encode_records<R: FixedRecord>(records: &[R]) -> Vec<u8> {
    let mut out = Vec::with_capacity(records.len() * R::SIZE);
    for r in records {
        r.encode_into(&mut out);
    }
    out
}

fn check_multiple(kind: FileKind, body: &[u8]) -> Result<()> {
    let record_size = kind.record_size();
    if body.len() % record_size != 0 {
        return Err(Error::TruncatedRecord {
            kind,
            len: body.len(),
            record_size,
        });
    }
    Ok(())
}

fn decode_records<R: FixedRecord>(kind: FileKind, body: &[u8]) -> Result<Vec<R>> {
    check_multiple(kind, body)?;
    body.chunks_exact(R::SIZE).map(R::decode).collect()
}

/// Decode a file body (everything after the header) for the given kind
pub fn decode_body(kind: FileKind, body: &[u8]) -> Result<RecordBody> {
    check_multiple(kind, body)?;

    let decoded = match kind {
        FileKind::Flow | FileKind::Difleak => RecordBody::Bytes(body.to_vec()),
        FileKind::Pressure | FileKind::RealPressure | FileKind::SnoreData | FileKind::Spo2Bpm => {
            RecordBody::Words(body.chunks_exact(2).map(|c| u16_at(c, 0)).collect())
        }
        FileKind::Mvtvbr => RecordBody::Breathing(decode_records(kind, body)?),
        FileKind::Ai | FileKind::Hi | FileKind::Snore | FileKind::Csa | FileKind::Leak => {
            RecordBody::Events(decode_records(kind, body)?)
        }
        FileKind::Apcp => RecordBody::PressureChanges(decode_records(kind, body)?),
        FileKind::UseTime => RecordBody::UsageTimes(decode_records(kind, body)?),
        FileKind::Config => RecordBody::Configs(decode_records(kind, body)?),
    };

    tracing::trace!("Decoded {} {} records", decoded.len(), kind);
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn test_record_sizes_match_layouts() {
        assert_eq!(FileKind::Flow.record_size(), 1);
        assert_eq!(FileKind::SnoreData.record_size(), 2);
        assert_eq!(FileKind::Mvtvbr.record_size(), 6);
        assert_eq!(FileKind::Difleak.record_size(), 1);
        assert_eq!(FileKind::Csa.record_size(), 16);
        assert_eq!(FileKind::Apcp.record_size(), 16);
        assert_eq!(FileKind::UseTime.record_size(), 16);
        assert_eq!(FileKind::Config.record_size(), 200);
    }

    #[test]
    fn test_suffix_lookup() {
        for kind in FileKind::ALL {
            assert_eq!(FileKind::from_suffix(kind.suffix()), Some(kind));
        }
        assert_eq!(FileKind::from_suffix("unknown"), None);
    }

    #[test]
    fn test_decode_words_little_endian() {
        let body = [0x34, 0x12, 0xFF, 0x00];
        let decoded = decode_body(FileKind::Pressure, &body).unwrap();
        assert_eq!(decoded, RecordBody::Words(vec![0x1234, 0x00FF]));
    }

    #[test]
    fn test_decode_event_record() {
        let mut body = Vec::new();
        body.extend_from_slice(&1u32.to_le_bytes());
        body.extend_from_slice(&14u32.to_le_bytes());
        body.extend_from_slice(&ts(3, 12, 40).encode());

        let decoded = decode_body(FileKind::Ai, &body).unwrap();
        let RecordBody::Events(events) = decoded else {
            panic!("expected events");
        };
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].duration_seconds, 14);
        assert_eq!(events[0].timestamp, ts(3, 12, 40));
    }

    #[test]
    fn test_truncated_body_rejected() {
        let err = decode_body(FileKind::Mvtvbr, &[0u8; 13]).unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedRecord {
                kind: FileKind::Mvtvbr,
                len: 13,
                record_size: 6
            }
        ));

        assert!(decode_body(FileKind::UseTime, &[0u8; 17]).is_err());
        assert!(decode_body(FileKind::Pressure, &[0u8; 3]).is_err());
    }

    #[test]
    fn test_bad_record_timestamp_fails_file() {
        let mut body = vec![0u8; 16];
        body[8..16].copy_from_slice(&[0xE6, 0x07, 0, 1, 0, 0, 0, 0]);
        assert!(matches!(
            decode_body(FileKind::UseTime, &body),
            Err(Error::MalformedTimestamp(_))
        ));
    }

    #[test]
    fn test_fixed_records_roundtrip_bytes() {
        let mut body = Vec::new();
        UsageTimeRecord {
            duration_seconds: 3600,
            parameter: 0x0A0B_0C0D,
            timestamp: ts(2, 0, 0),
        }
        .encode_into(&mut body);
        UsageTimeRecord {
            duration_seconds: 18000,
            parameter: 7,
            timestamp: ts(7, 31, 5),
        }
        .encode_into(&mut body);

        let decoded = decode_body(FileKind::UseTime, &body).unwrap();
        assert_eq!(decoded.encode(), body);

        let apcp = PressureChangeRecord {
            raw_pressure: 87,
            flags: 3,
            timestamp: ts(1, 2, 3),
        };
        let bytes = apcp.encode();
        assert_eq!(PressureChangeRecord::decode(&bytes).unwrap(), apcp);
        assert_eq!(apcp.cmh2o(), 8.7);

        let breath = BreathingSample {
            tidal_volume: 480,
            breathing_rate: 14,
            ventilation_raw: 65535,
        };
        assert_eq!(BreathingSample::decode(&breath.encode()).unwrap(), breath);

        let event = EventRecord {
            event_type: 2,
            duration_seconds: 11,
            timestamp: ts(4, 5, 6),
        };
        assert_eq!(EventRecord::decode(&event.encode()).unwrap(), event);
    }

    #[test]
    fn test_config_snapshot_floats_and_roundtrip() {
        let mut settings = [0u8; ConfigSnapshot::SETTINGS_SIZE];
        settings[0x70..0x74].copy_from_slice(&6.5f32.to_le_bytes());
        settings[0x74..0x78].copy_from_slice(&12.0f32.to_le_bytes());
        settings[0x78..0x7C].copy_from_slice(&f32::NAN.to_le_bytes());
        settings[0x7C..0x80].copy_from_slice(&300.0f32.to_le_bytes());
        let snapshot = ConfigSnapshot {
            settings,
            timestamp: ts(12, 0, 0),
        };

        let bytes = snapshot.encode();
        assert_eq!(bytes.len(), 200);
        let decoded = ConfigSnapshot::decode(&bytes).unwrap();
        assert_eq!(decoded.encode(), bytes);

        let floats = decoded.float_values();
        assert_eq!(floats.len(), 16);
        assert_eq!(floats[0], 6.5);
        assert_eq!(decoded.pressure_setpoints(), Some((6.5, 12.0)));
    }

    #[test]
    fn test_boundary_usage_record() {
        let boundary = UsageTimeRecord {
            duration_seconds: 3600,
            parameter: 0,
            timestamp: ts(2, 0, 0),
        };
        let morning = UsageTimeRecord {
            timestamp: ts(7, 0, 1),
            ..boundary
        };
        assert!(boundary.is_boundary());
        assert!(!morning.is_boundary());
    }
}
