//! Device calendar timestamps.
//!
//! Every record and header carries an 8-byte wall-clock timestamp:
//! year (u16 LE), month, day, hour, minute, second, subsecond.
//! There is no timezone information.

use crate::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Encoded size of a timestamp
pub const TIMESTAMP_SIZE: usize = 8;

/// A device-local calendar timestamp
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub subsecond: u8,
}

impl Timestamp {
    /// Decode the first 8 bytes of `bytes`
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < TIMESTAMP_SIZE {
            return Err(Error::MalformedTimestamp(format!(
                "need {} bytes, got {}",
                TIMESTAMP_SIZE,
                bytes.len()
            )));
        }

        let ts = Timestamp {
            year: u16::from_le_bytes([bytes[0], bytes[1]]),
            month: bytes[2],
            day: bytes[3],
            hour: bytes[4],
            minute: bytes[5],
            second: bytes[6],
            subsecond: bytes[7],
        };
        ts.validate()?;
        Ok(ts)
    }

    /// Encode back to the on-disk layout
    pub fn encode(&self) -> [u8; TIMESTAMP_SIZE] {
        let year = self.year.to_le_bytes();
        [
            year[0],
            year[1],
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            self.subsecond,
        ]
    }

    fn validate(&self) -> Result<()> {
        let checks = [
            ("month", self.month, 1, 12),
            ("day", self.day, 1, 31),
            ("hour", self.hour, 0, 23),
            ("minute", self.minute, 0, 59),
            ("second", self.second, 0, 59),
        ];
        for (field, value, min, max) in checks {
            if value < min || value > max {
                return Err(Error::MalformedTimestamp(format!(
                    "{} {} outside {}..={}",
                    field, value, min, max
                )));
            }
        }
        Ok(())
    }

    /// Whether the timestamp falls exactly on the hour (minute and second zero)
    pub fn is_on_the_hour(&self) -> bool {
        self.minute == 0 && self.second == 0
    }

    /// Calendar date, if the day exists in that month
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32)
    }

    /// Wall-clock time as chrono; the subsecond byte is dropped
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        self.date()?
            .and_hms_opt(self.hour as u32, self.minute as u32, self.second as u32)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Timestamp {
        Timestamp {
            year: 2022,
            month: 5,
            day: 28,
            hour: 2,
            minute: 0,
            second: 0,
            subsecond: 7,
        }
    }

    #[test]
    fn test_decode_known_bytes() {
        let bytes = [0xE6, 0x07, 5, 28, 2, 0, 0, 7];
        let ts = Timestamp::decode(&bytes).unwrap();
        assert_eq!(ts, sample());
        assert!(ts.is_on_the_hour());
    }

    #[test]
    fn test_roundtrip_preserves_bytes() {
        let bytes = [0xE7, 0x07, 12, 31, 23, 59, 59, 255];
        let ts = Timestamp::decode(&bytes).unwrap();
        assert_eq!(ts.encode(), bytes);
        assert!(!ts.is_on_the_hour());
    }

    #[test]
    fn test_out_of_range_fields_rejected() {
        let mut bytes = sample().encode();
        bytes[2] = 13;
        assert!(matches!(
            Timestamp::decode(&bytes),
            Err(Error::MalformedTimestamp(_))
        ));

        let mut bytes = sample().encode();
        bytes[3] = 0;
        assert!(Timestamp::decode(&bytes).is_err());

        let mut bytes = sample().encode();
        bytes[4] = 24;
        assert!(Timestamp::decode(&bytes).is_err());

        let mut bytes = sample().encode();
        bytes[6] = 60;
        assert!(Timestamp::decode(&bytes).is_err());
    }

    #[test]
    fn test_short_input_rejected() {
        assert!(matches!(
            Timestamp::decode(&[0xE6, 0x07, 5]),
            Err(Error::MalformedTimestamp(_))
        ));
    }

    #[test]
    fn test_to_naive() {
        let naive = sample().to_naive().unwrap();
        assert_eq!(naive.to_string(), "2022-05-28 02:00:00");

        // Day 31 passes range validation but does not exist in February
        let bogus = Timestamp {
            month: 2,
            day: 31,
            ..sample()
        };
        assert!(bogus.to_naive().is_none());
    }
}
