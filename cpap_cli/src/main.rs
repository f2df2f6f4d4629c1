use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use cpap_core::day::DayReport;
use cpap_core::summary::PeriodSummary;
use cpap_core::*;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cpapnight")]
#[command(about = "Nightly session reports from CPAP SD card data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory (the folder holding the YYYYMMDD directories)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use this config file instead of the default one
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Table of reconstructed nights with a summary (default)
    Report {
        /// Only the most recent N nights on the card
        #[arg(long)]
        days: Option<usize>,
    },

    /// Write every night to a CSV file
    Export {
        /// Output file
        #[arg(long, default_value = "cpap_nights.csv")]
        output: PathBuf,
    },

    /// Details for a single night
    Show {
        /// Night date as YYYYMMDD
        #[arg(value_parser = parse_date)]
        date: NaiveDate,

        /// Print the session as JSON
        #[arg(long)]
        json: bool,
    },

    /// Everything decoded from one day directory, without reconstruction
    Day {
        /// Directory date as YYYYMMDD
        #[arg(value_parser = parse_date)]
        date: NaiveDate,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare a night's usage against a known reference
    Validate {
        /// Night date as YYYYMMDD
        #[arg(value_parser = parse_date)]
        date: NaiveDate,

        /// Usage reported by the device or its software
        #[arg(long)]
        expected_hours: f64,
    },
}

fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, directory::DATE_FORMAT)
        .map_err(|e| format!("expected YYYYMMDD, got {:?}: {}", s, e))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    cpap_core::logging::init_with_level(cpap_core::logging::level_for_verbosity(cli.verbose));

    let config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    tracing::debug!("Using data directory {:?}", data_dir);
    let store = DirectoryStore::open(&data_dir, &config)?;

    match cli.command {
        Some(Commands::Report { days }) => cmd_report(&store, days, &config),
        Some(Commands::Export { output }) => cmd_export(&store, output, &config),
        Some(Commands::Show { date, json }) => cmd_show(&store, date, json, &config),
        Some(Commands::Day { date, json }) => cmd_day(&store, date, json),
        Some(Commands::Validate {
            date,
            expected_hours,
        }) => cmd_validate(&store, date, expected_hours, &config),
        None => cmd_report(&store, None, &config),
    }
}

/// Reconstruct nights, reporting the ones that fail on stderr
fn collect_sessions(store: &DirectoryStore, dates: &[NaiveDate], config: &Config) -> Vec<Session> {
    let mut sessions = Vec::new();
    for outcome in reconstruct_range(dates, store, config) {
        match outcome.result {
            Ok(session) => sessions.push(session),
            Err(e) => eprintln!("Skipped {}: {}", outcome.date, e),
        }
    }
    sessions
}

fn cmd_report(store: &DirectoryStore, days: Option<usize>, config: &Config) -> Result<()> {
    let mut dates = store.dates()?;
    if let Some(days) = days {
        let skip = dates.len().saturating_sub(days);
        dates.drain(..skip);
    }

    if dates.is_empty() {
        println!("No nights found in {}", store.root().display());
        return Ok(());
    }

    let sessions = collect_sessions(store, &dates, config);
    display_table(&sessions);
    display_summary(&PeriodSummary::from_sessions(
        &sessions,
        config.session.compliance_hours,
    ));
    Ok(())
}

fn cmd_export(store: &DirectoryStore, output: PathBuf, config: &Config) -> Result<()> {
    let dates = store.dates()?;
    let sessions = collect_sessions(store, &dates, config);
    cpap_core::export::write_sessions_csv(&output, &sessions)?;

    println!("✓ Exported {} nights to CSV", sessions.len());
    println!("  CSV: {}", output.display());
    Ok(())
}

fn cmd_show(store: &DirectoryStore, date: NaiveDate, json: bool, config: &Config) -> Result<()> {
    let session = reconstruct_from_store(date, store, config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
    } else {
        display_session(&session);
    }
    Ok(())
}

fn cmd_day(store: &DirectoryStore, date: NaiveDate, json: bool) -> Result<()> {
    let dir = store.load(date)?.ok_or(Error::DirectoryNotFound(date))?;
    let report = DayReport::from_directory(&dir);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        display_day(&report);
    }
    Ok(())
}

fn cmd_validate(
    store: &DirectoryStore,
    date: NaiveDate,
    expected_hours: f64,
    config: &Config,
) -> Result<()> {
    let session = reconstruct_from_store(date, store, config)?;
    let tolerance = config.integrity.usage_tolerance_hours;

    match integrity::check_usage_reference(&session, expected_hours, tolerance) {
        None => {
            println!(
                "✓ {}: {:.2} h matches reference {:.2} h (±{:.2})",
                date, session.usage_hours, expected_hours, tolerance
            );
            Ok(())
        }
        Some(finding) => {
            println!("✗ {}", finding);
            std::process::exit(1);
        }
    }
}

fn display_table(sessions: &[Session]) {
    println!(
        "{:<10}  {:>6}  {:>5}  {:>3}  {:>3}  {:>3}  {:>5}  {:>5}  {:>5}  {:>5}  {:>5}",
        "Date", "Hours", "AHI", "AI", "HI", "CSA", "Snore", "Leak", "P90", "BR", "TV"
    );
    println!("{}", "─".repeat(74));
    for s in sessions {
        println!(
            "{:<10}  {:>6.2}  {:>5.1}  {:>3}  {:>3}  {:>3}  {:>5}  {:>5.1}  {:>5.1}  {:>5.1}  {:>5.0}{}",
            s.date.format("%Y-%m-%d"),
            s.usage_hours,
            s.ahi,
            s.ai_count,
            s.hi_count,
            s.csa_count,
            s.snore_count,
            s.leak_avg_lpm,
            s.pressure.p90,
            s.breathing_rate.mean,
            s.tidal_volume.mean,
            if s.degraded { "  !" } else { "" }
        );
    }
}

fn display_summary(summary: &PeriodSummary) {
    println!();
    println!("╭─────────────────────────────────────────╮");
    println!("│  SUMMARY ({} nights)", summary.nights);
    println!("╰─────────────────────────────────────────╯");
    println!(
        "  Usage: {:.1} h total, {:.2} h average",
        summary.total_usage_hours, summary.avg_usage_hours
    );
    println!(
        "  Compliance: {}/{} nights ({:.0}%)",
        summary.compliant_nights, summary.nights, summary.compliance_pct
    );
    println!("  AHI: {:.2} ({})", summary.overall_ahi, summary.severity);
    println!(
        "  Events: {} AI, {} HI, {} CSA, {} snore",
        summary.total_ai, summary.total_hi, summary.total_csa, summary.total_snore
    );
    println!(
        "  Leak {:.1} L/min, P90 pressure {:.1} cmH2O",
        summary.avg_leak_lpm, summary.avg_pressure_p90
    );
    println!(
        "  Breathing {:.1} /min, tidal volume {:.0} mL",
        summary.avg_breathing_rate, summary.avg_tidal_volume
    );
    if summary.degraded_nights > 0 {
        println!("  ! {} degraded nights", summary.degraded_nights);
    }
}

fn display_session(s: &Session) {
    println!("\n╭─────────────────────────────────────────╮");
    println!("│  NIGHT {}", s.date.format("%Y-%m-%d"));
    println!("╰─────────────────────────────────────────╯");
    println!();
    println!(
        "  Usage: {:.2} h ({} s evening + {} s morning, {:?})",
        s.usage_hours, s.evening_secs, s.morning_secs, s.format
    );
    println!("  AHI: {:.2}", s.ahi);
    println!(
        "  Apneas: {} ({} s)   Hypopneas: {} ({} s)",
        s.ai_count, s.ai_total_duration_sec, s.hi_count, s.hi_total_duration_sec
    );
    println!("  Central: {}   Snores: {}", s.csa_count, s.snore_count);
    println!("  Leak: {:.1} L/min", s.leak_avg_lpm);
    println!(
        "  Pressure: {:.1}-{:.1} cmH2O, median {:.1}, p90 {:.1}, p95 {:.1}",
        s.pressure.min, s.pressure.max, s.pressure.median, s.pressure.p90, s.pressure.p95
    );
    println!(
        "  Breathing: {:.1} /min (median {:.1}), tidal volume {:.0} mL (median {:.0})",
        s.breathing_rate.mean,
        s.breathing_rate.median,
        s.tidal_volume.mean,
        s.tidal_volume.median
    );
    println!(
        "  Waveform: {} samples ({:.2} h)",
        s.waveform_samples,
        s.waveform_hours()
    );

    if !s.findings.is_empty() {
        println!();
        for finding in &s.findings {
            println!("  ℹ {}", finding);
        }
    }
    println!();
}

fn display_range(label: &str, range: Option<&cpap_core::day::ValueRange>) {
    if let Some(r) = range {
        println!("  {}: {} - {} (mean {:.1})", label, r.min, r.max, r.mean);
    }
}

fn display_day(r: &DayReport) {
    println!("\n╭─────────────────────────────────────────╮");
    println!("│  DAY {} ({:?})", r.date.format("%Y-%m-%d"), r.format);
    println!("╰─────────────────────────────────────────╯");

    if let Some(ref d) = r.device {
        let time = |t: Option<Timestamp>| t.map_or_else(|| "-".to_string(), |t| t.to_string());
        println!("\n[device]");
        println!("  Version: {}   Firmware: {}", d.version, d.firmware);
        println!("  Device ID: {}", d.patient_id);
        println!("  Header range: {} → {}", time(d.start_time), time(d.end_time));
    }

    for sig in &r.signals {
        println!("\n[{}]", sig.kind);
        match sig.duration_secs {
            Some(secs) => println!(
                "  Samples: {} ({:.1} min, {:.2} h)",
                sig.samples,
                secs / 60.0,
                secs / 3600.0
            ),
            None => println!("  Samples: {}", sig.samples),
        }
        display_range("Values", sig.range.as_ref());
    }

    if let Some(ref p) = r.pressure_changes {
        println!("\n[apcp]");
        println!("  Records: {}", p.records);
        println!("  Time range: {} → {}", p.first, p.last);
        println!("  Raw: {} - {} (mean {:.1})", p.raw.min, p.raw.max, p.raw.mean);
        println!("  Pressure: {:.1} - {:.1} cmH2O", p.cmh2o.min, p.cmh2o.max);
    }

    for ev in &r.events {
        println!("\n[{}]", ev.kind);
        println!("  Events: {} ({} s)", ev.events.len(), ev.total_duration_secs);
        for (i, e) in ev.events.iter().enumerate().take(5) {
            println!(
                "  #{}: type={}, duration={}s, time={}",
                i + 1,
                e.event_type,
                e.duration_seconds,
                e.timestamp
            );
        }
        if ev.events.len() > 5 {
            println!("  ... ({} more)", ev.events.len() - 5);
        }
    }

    if let Some(ref b) = r.breathing {
        println!("\n[mvtvbr]");
        println!("  Records: {}", b.records);
        display_range("Field1", Some(&b.tidal_volume));
        display_range("Field2", Some(&b.breathing_rate));
        display_range("Field3", Some(&b.ventilation_raw));
    }

    if !r.usage.is_empty() {
        println!("\n[usetime]");
        for (i, u) in r.usage.iter().enumerate() {
            println!(
                "  #{}: {} s, param=0x{:08x}, time={}{}",
                i + 1,
                u.duration_seconds,
                u.parameter,
                u.timestamp,
                if u.is_boundary() { "  (boundary)" } else { "" }
            );
        }
    }

    if let Some(ref o) = r.oximetry {
        println!("\n[spo2bpm]");
        println!("  Samples: {}, non-zero: {}", o.samples, o.non_zero);
        if let (Some(min), Some(max)) = (o.non_zero_min, o.non_zero_max) {
            println!("  Non-zero range: {} - {}", min, max);
        }
    }

    if !r.configs.is_empty() {
        println!("\n[config]");
        for (i, c) in r.configs.iter().enumerate().take(3) {
            println!("  #{}: time={}", i + 1, c.timestamp);
            println!("      floats: {:?}", c.float_values);
            if let Some((lo, hi)) = c.pressure_setpoints {
                println!("      setpoints: {:.1} - {:.1} cmH2O", lo, hi);
            }
        }
    }

    if !r.skipped.is_empty() {
        println!();
        for s in &r.skipped {
            println!("  ✗ {} skipped: {}", s.kind, s.reason);
        }
    }
    println!();
}
