//! CSV export of reconstructed nights.
//!
//! One row per night, floats rounded to two decimals. The file is replaced
//! atomically so a reader never sees a half-written export.

use crate::{Error, Result, Session};
use fs2::FileExt;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Column order of the export
pub const COLUMNS: [&str; 20] = [
    "date",
    "usage_hours",
    "ahi",
    "ai_count",
    "hi_count",
    "csa_count",
    "snore_count",
    "ai_total_duration_sec",
    "hi_total_duration_sec",
    "leak_avg_lpm",
    "pressure_min",
    "pressure_max",
    "pressure_mean",
    "pressure_median",
    "pressure_p90",
    "pressure_p95",
    "br_mean",
    "br_median",
    "tv_mean",
    "tv_median",
];

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow {
    date: String,
    usage_hours: f64,
    ahi: f64,
    ai_count: usize,
    hi_count: usize,
    csa_count: usize,
    snore_count: usize,
    ai_total_duration_sec: u64,
    hi_total_duration_sec: u64,
    leak_avg_lpm: f64,
    pressure_min: f64,
    pressure_max: f64,
    pressure_mean: f64,
    pressure_median: f64,
    pressure_p90: f64,
    pressure_p95: f64,
    br_mean: f64,
    br_median: f64,
    tv_mean: f64,
    tv_median: f64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl From<&Session> for CsvRow {
    fn from(session: &Session) -> Self {
        CsvRow {
            date: session.date.format("%Y-%m-%d").to_string(),
            usage_hours: round2(session.usage_hours),
            ahi: round2(session.ahi),
            ai_count: session.ai_count,
            hi_count: session.hi_count,
            csa_count: session.csa_count,
            snore_count: session.snore_count,
            ai_total_duration_sec: session.ai_total_duration_sec,
            hi_total_duration_sec: session.hi_total_duration_sec,
            leak_avg_lpm: round2(session.leak_avg_lpm),
            pressure_min: round2(session.pressure.min),
            pressure_max: round2(session.pressure.max),
            pressure_mean: round2(session.pressure.mean),
            pressure_median: round2(session.pressure.median),
            pressure_p90: round2(session.pressure.p90),
            pressure_p95: round2(session.pressure.p95),
            br_mean: round2(session.breathing_rate.mean),
            br_median: round2(session.breathing_rate.median),
            tv_mean: round2(session.tidal_volume.mean),
            tv_median: round2(session.tidal_volume.median),
        }
    }
}

/// Serialize sessions as CSV (with header row) into any writer
pub fn write_csv<W: Write>(writer: W, sessions: &[Session]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    writer.write_record(COLUMNS)?;
    for session in sessions {
        writer.serialize(CsvRow::from(session))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write sessions to `path`, replacing it atomically
///
/// The rows go to a locked temp file in the same directory, which is
/// synced and then renamed over `path`.
pub fn write_sessions_csv(path: &Path, sessions: &[Session]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent)?;
    temp.as_file().lock_exclusive()?;

    {
        let writer = std::io::BufWriter::new(temp.as_file());
        write_csv(writer, sessions)?;
    }

    temp.as_file().sync_all()?;
    temp.as_file().unlock()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;

    tracing::info!("Wrote {} nights to {:?}", sessions.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::FormatKind;
    use crate::stats::{CentralStats, PressureStats};
    use chrono::NaiveDate;

    fn session(day: u32, usage_hours: f64) -> Session {
        Session {
            date: NaiveDate::from_ymd_opt(2022, 5, day).unwrap(),
            format: FormatKind::Current,
            usage_hours,
            evening_secs: 3600,
            morning_secs: 18000,
            ahi: 1.0 / 3.0,
            ai_count: 1,
            hi_count: 1,
            csa_count: 0,
            snore_count: 7,
            ai_total_duration_sec: 12,
            hi_total_duration_sec: 31,
            leak_avg_lpm: 12.3456,
            pressure: PressureStats {
                min: 6.0,
                max: 10.0,
                mean: 7.75,
                median: 7.5,
                p90: 9.4,
                p95: 9.7,
            },
            breathing_rate: CentralStats {
                mean: 15.0,
                median: 16.0,
            },
            tidal_volume: CentralStats {
                mean: 480.126,
                median: 500.0,
            },
            ventilation_raw: vec![1, 2, 3],
            waveform_samples: 1000,
            degraded: false,
            findings: Vec::new(),
        }
    }

    #[test]
    fn test_csv_layout() {
        let mut buffer = Vec::new();
        write_csv(&mut buffer, &[session(28, 6.0)]).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();

        let header = lines.next().unwrap();
        assert_eq!(header.split(',').count(), 20);
        assert!(header.starts_with("date,usage_hours,ahi"));
        assert!(header.ends_with("tv_mean,tv_median"));

        let row: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(row.len(), 20);
        assert_eq!(row[0], "2022-05-28");
        assert_eq!(row[1], "6.0");
        assert_eq!(row[2], "0.33");
        assert_eq!(row[9], "12.35");
        assert_eq!(row[18], "480.13");
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_empty_export_has_header_only() {
        let mut buffer = Vec::new();
        write_csv(&mut buffer, &[]).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn test_write_sessions_csv_replaces_file() {
        crate::logging::init_test();
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("out").join("nights.csv");

        write_sessions_csv(&path, &[session(27, 5.0), session(28, 6.0)]).unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        assert_eq!(first.lines().count(), 3);

        write_sessions_csv(&path, &[session(28, 6.0)]).unwrap();
        let second = std::fs::read_to_string(&path).unwrap();
        assert_eq!(second.lines().count(), 2);

        // No temp files left behind
        let entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
