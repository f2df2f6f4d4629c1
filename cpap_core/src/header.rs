//! Fixed 512-byte file header.
//!
//! The layout resembles EDF but is not standard EDF: ASCII fields at fixed
//! offsets, with the recording range stored as two binary timestamps.

use crate::timestamp::{Timestamp, TIMESTAMP_SIZE};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Size of every file header
pub const HEADER_SIZE: usize = 512;

const VERSION: Range<usize> = 0x000..0x008;
const SERIAL: Range<usize> = 0x008..0x020;
const PATIENT_ID: Range<usize> = 0x020..0x058;
const MODEL_CODE: Range<usize> = 0x058..0x0A8;
const START_TIME: usize = 0x0A8;
const END_TIME: usize = 0x0B0;
const HEADER_SIZE_FIELD: Range<usize> = 0x0B8..0x0C0;
const FIRMWARE: Range<usize> = 0x0C0..0x0D8;
const UNITS: Range<usize> = 0x0D8..0x100;
const SIGNAL_NAMES: Range<usize> = 0x100..0x160;
const DIGITAL_MIN: Range<usize> = 0x160..0x170;
const DIGITAL_MAX: Range<usize> = 0x170..0x178;
const PHYSICAL_MIN: Range<usize> = 0x178..0x180;
const PHYSICAL_MAX: Range<usize> = 0x180..0x188;
const SAMPLES_PER_RECORD: Range<usize> = 0x1D0..0x1E0;

/// Parsed file header
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileHeader {
    pub version: String,
    pub serial: String,
    pub patient_id: String,
    pub model_code: String,
    /// Indicative range only, not the actual recording span
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub header_size: String,
    pub firmware: String,
    pub units: String,
    pub signal_names: String,
    pub digital_min: String,
    pub digital_max: String,
    pub physical_min: String,
    pub physical_max: String,
    pub samples_per_record: String,
}

impl FileHeader {
    /// Parse a header, accepting any all-digit version string
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Self::parse_accepting(bytes, &[])
    }

    /// Parse a header, accepting only the listed versions (empty = any all-digit version)
    pub fn parse_accepting(bytes: &[u8], accepted_versions: &[String]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::HeaderSizeMismatch {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let version = ascii_field(bytes, VERSION);
        if !is_recognized_version(&version, accepted_versions) {
            return Err(Error::UnsupportedFormatVersion(version));
        }

        Ok(FileHeader {
            version,
            serial: ascii_field(bytes, SERIAL),
            patient_id: ascii_field(bytes, PATIENT_ID),
            model_code: ascii_field(bytes, MODEL_CODE),
            start_time: header_timestamp(bytes, START_TIME, "start"),
            end_time: header_timestamp(bytes, END_TIME, "end"),
            header_size: ascii_field(bytes, HEADER_SIZE_FIELD),
            firmware: ascii_field(bytes, FIRMWARE),
            units: ascii_field(bytes, UNITS),
            signal_names: ascii_field(bytes, SIGNAL_NAMES),
            digital_min: ascii_field(bytes, DIGITAL_MIN),
            digital_max: ascii_field(bytes, DIGITAL_MAX),
            physical_min: ascii_field(bytes, PHYSICAL_MIN),
            physical_max: ascii_field(bytes, PHYSICAL_MAX),
            samples_per_record: ascii_field(bytes, SAMPLES_PER_RECORD),
        })
    }

    /// Encode to the 512-byte layout. Text fields are space padded and
    /// truncated to their slot; reserved areas are zero.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        put_ascii(&mut out, VERSION, &self.version);
        put_ascii(&mut out, SERIAL, &self.serial);
        put_ascii(&mut out, PATIENT_ID, &self.patient_id);
        put_ascii(&mut out, MODEL_CODE, &self.model_code);
        if let Some(ts) = self.start_time {
            out[START_TIME..START_TIME + TIMESTAMP_SIZE].copy_from_slice(&ts.encode());
        }
        if let Some(ts) = self.end_time {
            out[END_TIME..END_TIME + TIMESTAMP_SIZE].copy_from_slice(&ts.encode());
        }
        put_ascii(&mut out, HEADER_SIZE_FIELD, &self.header_size);
        put_ascii(&mut out, FIRMWARE, &self.firmware);
        put_ascii(&mut out, UNITS, &self.units);
        put_ascii(&mut out, SIGNAL_NAMES, &self.signal_names);
        put_ascii(&mut out, DIGITAL_MIN, &self.digital_min);
        put_ascii(&mut out, DIGITAL_MAX, &self.digital_max);
        put_ascii(&mut out, PHYSICAL_MIN, &self.physical_min);
        put_ascii(&mut out, PHYSICAL_MAX, &self.physical_max);
        put_ascii(&mut out, SAMPLES_PER_RECORD, &self.samples_per_record);
        out
    }

    /// Declared header size, when the field holds a number
    pub fn declared_header_size(&self) -> Option<usize> {
        self.header_size.parse().ok()
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        FileHeader {
            version: "0".into(),
            serial: String::new(),
            patient_id: String::new(),
            model_code: String::new(),
            start_time: None,
            end_time: None,
            header_size: HEADER_SIZE.to_string(),
            firmware: String::new(),
            units: String::new(),
            signal_names: String::new(),
            digital_min: String::new(),
            digital_max: String::new(),
            physical_min: String::new(),
            physical_max: String::new(),
            samples_per_record: String::new(),
        }
    }
}

fn is_recognized_version(version: &str, accepted: &[String]) -> bool {
    if accepted.is_empty() {
        !version.is_empty() && version.bytes().all(|b| b.is_ascii_digit())
    } else {
        accepted.iter().any(|v| v == version)
    }
}

fn ascii_field(bytes: &[u8], range: Range<usize>) -> String {
    String::from_utf8_lossy(&bytes[range])
        .trim_matches(|c: char| c == ' ' || c == '\0')
        .to_string()
}

fn header_timestamp(bytes: &[u8], offset: usize, which: &str) -> Option<Timestamp> {
    match Timestamp::decode(&bytes[offset..offset + TIMESTAMP_SIZE]) {
        Ok(ts) => Some(ts),
        Err(e) => {
            tracing::debug!("Ignoring header {} time: {}", which, e);
            None
        }
    }
}

fn put_ascii(out: &mut [u8], range: Range<usize>, value: &str) {
    let slot = &mut out[range];
    slot.fill(b' ');
    let len = value.len().min(slot.len());
    slot[..len].copy_from_slice(&value.as_bytes()[..len]);
}
