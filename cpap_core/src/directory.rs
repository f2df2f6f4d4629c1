//! Day directories and the SD card store that holds them.
//!
//! The card holds one directory per calendar day (`YYYYMMDD`), each with one
//! `.edf` file per file type, and a sibling `CONFIG/config.bin`.

use crate::header::{FileHeader, HEADER_SIZE};
use crate::integrity::{self, Finding};
use crate::records::{
    decode_body, BreathingSample, ConfigSnapshot, EventRecord, FileKind, FixedRecord,
    PressureChangeRecord, RecordBody, UsageTimeRecord,
};
use crate::{Config, Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Directory name format
pub const DATE_FORMAT: &str = "%Y%m%d";

/// Whether a directory follows the split-night convention
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    /// Whole night stored in one directory; no boundary usage records
    Legacy,
    /// Night split across two directories at an hour boundary
    Current,
}

/// One decoded file: its header and body
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedFile {
    pub header: FileHeader,
    pub body: RecordBody,
}

/// Decoded contents of one calendar-day directory.
///
/// Immutable after construction. A directory is the evening half of one
/// night and the morning half of the next, so it is only ever shared by
/// reference.
#[derive(Clone, Debug)]
pub struct DirectorySet {
    date: NaiveDate,
    format: FormatKind,
    files: BTreeMap<FileKind, DecodedFile>,
    settings: Option<ConfigSnapshot>,
    findings: Vec<Finding>,
    /// Files present on disk that failed to decode, with the reason
    unreadable: BTreeMap<FileKind, String>,
}

impl DirectorySet {
    /// Build from decoded files. `fallback_settings` is used when the
    /// directory has no config file of its own.
    pub fn from_files(
        date: NaiveDate,
        files: BTreeMap<FileKind, DecodedFile>,
        fallback_settings: Option<ConfigSnapshot>,
    ) -> Self {
        let has_boundary = match files.get(&FileKind::UseTime).map(|f| &f.body) {
            Some(RecordBody::UsageTimes(records)) => records.iter().any(|r| r.is_boundary()),
            _ => false,
        };
        let format = if has_boundary {
            FormatKind::Current
        } else {
            FormatKind::Legacy
        };

        let own_settings = match files.get(&FileKind::Config).map(|f| &f.body) {
            Some(RecordBody::Configs(configs)) => configs.last().cloned(),
            _ => None,
        };

        let mut set = DirectorySet {
            date,
            format,
            files,
            settings: own_settings.or(fallback_settings),
            findings: Vec::new(),
            unreadable: BTreeMap::new(),
        };
        set.findings = integrity::check_directory(&set);

        tracing::debug!(
            "Directory {} has {} files ({:?})",
            date.format(DATE_FORMAT),
            set.files.len(),
            set.format
        );
        set
    }

    /// Build from bodies with default headers
    pub fn from_bodies(date: NaiveDate, bodies: Vec<(FileKind, RecordBody)>) -> Self {
        let files = bodies
            .into_iter()
            .map(|(kind, body)| {
                (
                    kind,
                    DecodedFile {
                        header: FileHeader::default(),
                        body,
                    },
                )
            })
            .collect();
        Self::from_files(date, files, None)
    }

    /// Decode every known file in `dir`.
    ///
    /// Missing files are skipped. A file that fails to decode is left out
    /// and recorded as an `UnreadableFile` finding; the rest of the
    /// directory is still usable. Only I/O errors fail the directory.
    pub fn load(
        dir: &Path,
        date: NaiveDate,
        accepted_versions: &[String],
        fallback_settings: Option<ConfigSnapshot>,
    ) -> Result<Self> {
        let stem = date.format(DATE_FORMAT).to_string();
        let mut files = BTreeMap::new();
        let mut unreadable = BTreeMap::new();

        for kind in FileKind::ALL {
            let path = dir.join(format!("{}_{}.edf", stem, kind.suffix()));
            if !path.exists() {
                continue;
            }

            match read_file(&path, kind, accepted_versions) {
                Ok(decoded) => {
                    files.insert(kind, decoded);
                }
                Err(e) if e.is_parse_error() => {
                    tracing::warn!("Skipping {:?}: {}", path, e);
                    unreadable.insert(kind, e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        let mut set = Self::from_files(date, files, fallback_settings);
        for (kind, reason) in &unreadable {
            set.findings
                .push(integrity::unreadable_file(date, *kind, reason));
        }
        set.unreadable = unreadable;
        Ok(set)
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn format(&self) -> FormatKind {
        self.format
    }

    /// Decode-time integrity findings
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn has(&self, kind: FileKind) -> bool {
        self.files.contains_key(&kind)
    }

    /// Whether a file of `kind` exists but could not be decoded
    pub fn is_unreadable(&self, kind: FileKind) -> bool {
        self.unreadable.contains_key(&kind)
    }

    /// Why a file of `kind` could not be decoded
    pub fn unreadable_reason(&self, kind: FileKind) -> Option<&str> {
        self.unreadable.get(&kind).map(String::as_str)
    }

    pub fn unreadable_kinds(&self) -> impl Iterator<Item = FileKind> + '_ {
        self.unreadable.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn file_kinds(&self) -> impl Iterator<Item = FileKind> + '_ {
        self.files.keys().copied()
    }

    pub fn header(&self, kind: FileKind) -> Option<&FileHeader> {
        self.files.get(&kind).map(|f| &f.header)
    }

    pub fn body(&self, kind: FileKind) -> Option<&RecordBody> {
        self.files.get(&kind).map(|f| &f.body)
    }

    /// The directory's last config record, or the card-level one
    pub fn settings(&self) -> Option<&ConfigSnapshot> {
        self.settings.as_ref()
    }

    fn bytes(&self, kind: FileKind) -> &[u8] {
        match self.body(kind) {
            Some(RecordBody::Bytes(v)) => v,
            _ => &[],
        }
    }

    fn words(&self, kind: FileKind) -> &[u16] {
        match self.body(kind) {
            Some(RecordBody::Words(v)) => v,
            _ => &[],
        }
    }

    pub fn flow(&self) -> &[u8] {
        self.bytes(FileKind::Flow)
    }

    pub fn pressure(&self) -> &[u16] {
        self.words(FileKind::Pressure)
    }

    pub fn real_pressure(&self) -> &[u16] {
        self.words(FileKind::RealPressure)
    }

    pub fn snore_waveform(&self) -> &[u16] {
        self.words(FileKind::SnoreData)
    }

    pub fn spo2bpm(&self) -> &[u16] {
        self.words(FileKind::Spo2Bpm)
    }

    pub fn difleak(&self) -> &[u8] {
        self.bytes(FileKind::Difleak)
    }

    pub fn breathing(&self) -> &[BreathingSample] {
        match self.body(FileKind::Mvtvbr) {
            Some(RecordBody::Breathing(v)) => v,
            _ => &[],
        }
    }

    /// Event records for an event file kind; empty for other kinds
    pub fn events(&self, kind: FileKind) -> &[EventRecord] {
        match self.body(kind) {
            Some(RecordBody::Events(v)) => v,
            _ => &[],
        }
    }

    pub fn pressure_changes(&self) -> &[PressureChangeRecord] {
        match self.body(FileKind::Apcp) {
            Some(RecordBody::PressureChanges(v)) => v,
            _ => &[],
        }
    }

    pub fn usage_times(&self) -> &[UsageTimeRecord] {
        match self.body(FileKind::UseTime) {
            Some(RecordBody::UsageTimes(v)) => v,
            _ => &[],
        }
    }

    pub fn configs(&self) -> &[ConfigSnapshot] {
        match self.body(FileKind::Config) {
            Some(RecordBody::Configs(v)) => v,
            _ => &[],
        }
    }

    /// Flow/pressure sample count usable together (the shorter on mismatch)
    pub fn waveform_samples(&self) -> usize {
        if self.has(FileKind::Flow) && self.has(FileKind::Pressure) {
            self.flow().len().min(self.pressure().len())
        } else {
            self.flow().len().max(self.pressure().len())
        }
    }

    /// difleak and mvtvbr series trimmed to a consistent 2:1 prefix when
    /// both are present and disagree
    pub fn periodic_series(&self) -> (&[u8], &[BreathingSample]) {
        let difleak = self.difleak();
        let breathing = self.breathing();
        if self.has(FileKind::Difleak) && self.has(FileKind::Mvtvbr) {
            let (dl, mv) = integrity::usable_periodic_lens(difleak.len(), breathing.len());
            (&difleak[..dl], &breathing[..mv])
        } else {
            (difleak, breathing)
        }
    }
}

fn read_file(path: &Path, kind: FileKind, accepted_versions: &[String]) -> Result<DecodedFile> {
    let data = std::fs::read(path)?;
    let header = FileHeader::parse_accepting(&data, accepted_versions)?;
    if let Some(declared) = header.declared_header_size() {
        if declared != HEADER_SIZE {
            tracing::debug!(
                "{:?} declares header size {}, decoding with {}",
                path,
                declared,
                HEADER_SIZE
            );
        }
    }
    let body = decode_body(kind, &data[HEADER_SIZE..])?;
    Ok(DecodedFile { header, body })
}

/// The root of an SD card dump
#[derive(Clone, Debug)]
pub struct DirectoryStore {
    root: PathBuf,
    accepted_versions: Vec<String>,
    global_settings: Option<ConfigSnapshot>,
}

impl DirectoryStore {
    /// Open a dump rooted at `root` (the directory holding `YYYYMMDD/`)
    pub fn open(root: impl Into<PathBuf>, config: &Config) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("data directory {:?} does not exist", root),
            )));
        }

        let global_settings = load_global_settings(&root, &config.decode.accepted_versions);
        tracing::info!(
            "Opened data directory {:?} (card config: {})",
            root,
            if global_settings.is_some() { "yes" } else { "no" }
        );

        Ok(DirectoryStore {
            root,
            accepted_versions: config.decode.accepted_versions.clone(),
            global_settings,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn global_settings(&self) -> Option<&ConfigSnapshot> {
        self.global_settings.as_ref()
    }

    pub fn dir_path(&self, date: NaiveDate) -> PathBuf {
        self.root.join(date.format(DATE_FORMAT).to_string())
    }

    /// All day directories on the card, oldest first
    pub fn dates(&self) -> Result<Vec<NaiveDate>> {
        let mut dates = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if let Some(date) = name.to_str().and_then(parse_dir_name) {
                dates.push(date);
            }
        }
        dates.sort();
        Ok(dates)
    }

    /// Load a day directory; `None` if it does not exist
    pub fn load(&self, date: NaiveDate) -> Result<Option<DirectorySet>> {
        let dir = self.dir_path(date);
        if !dir.is_dir() {
            return Ok(None);
        }
        DirectorySet::load(
            &dir,
            date,
            &self.accepted_versions,
            self.global_settings.clone(),
        )
        .map(Some)
    }
}

fn parse_dir_name(name: &str) -> Option<NaiveDate> {
    if name.len() != 8 || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(name, DATE_FORMAT).ok()
}

/// `CONFIG/config.bin`: a bare 200-byte record, or one behind a header
fn load_global_settings(root: &Path, accepted_versions: &[String]) -> Option<ConfigSnapshot> {
    let path = root.join("CONFIG").join("config.bin");
    let data = match std::fs::read(&path) {
        Ok(data) => data,
        Err(_) => return None,
    };

    let record = match data.len() {
        n if n == ConfigSnapshot::SIZE => &data[..],
        n if n == HEADER_SIZE + ConfigSnapshot::SIZE => {
            if let Err(e) = FileHeader::parse_accepting(&data, accepted_versions) {
                tracing::warn!("Ignoring {:?}: {}", path, e);
                return None;
            }
            &data[HEADER_SIZE..]
        }
        n => {
            tracing::warn!("Ignoring {:?}: unexpected size {} bytes", path, n);
            return None;
        }
    };

    match ConfigSnapshot::decode(record) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            tracing::warn!("Ignoring {:?}: {}", path, e);
            None
        }
    }
}
