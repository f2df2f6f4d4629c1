//! Encoder for day directories in the card layout.
//!
//! Produces byte-exact `.edf` files (header + body) so decoded data can be
//! written back out, and synthetic cards can be built for tests.

use crate::directory::DATE_FORMAT;
use crate::header::FileHeader;
use crate::records::{ConfigSnapshot, FileKind, FixedRecord, RecordBody};
use crate::Result;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// Writes files into one `YYYYMMDD` directory
pub struct DayWriter {
    dir: PathBuf,
    date: NaiveDate,
    header: FileHeader,
}

impl DayWriter {
    /// Create (if needed) `root/YYYYMMDD` and write into it
    pub fn new(root: &Path, date: NaiveDate) -> Result<Self> {
        let dir = root.join(date.format(DATE_FORMAT).to_string());
        std::fs::create_dir_all(&dir)?;
        Ok(DayWriter {
            dir,
            date,
            header: FileHeader::default(),
        })
    }

    /// Use `header` for every file written afterwards
    pub fn with_header(mut self, header: FileHeader) -> Self {
        self.header = header;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_path(&self, kind: FileKind) -> PathBuf {
        self.dir
            .join(format!("{}_{}.edf", self.date.format(DATE_FORMAT), kind.suffix()))
    }

    /// Write a decoded body behind the writer's header
    pub fn write(&self, kind: FileKind, body: &RecordBody) -> Result<PathBuf> {
        self.write_raw(kind, &body.encode())
    }

    /// Write raw body bytes behind the writer's header, unchecked
    pub fn write_raw(&self, kind: FileKind, body: &[u8]) -> Result<PathBuf> {
        let mut header = self.header.clone();
        if header.signal_names.is_empty() {
            header.signal_names = kind.suffix().to_string();
        }

        let mut data = Vec::with_capacity(crate::HEADER_SIZE + body.len());
        data.extend_from_slice(&header.encode());
        data.extend_from_slice(body);

        let path = self.file_path(kind);
        std::fs::write(&path, data)?;
        tracing::debug!("Wrote {:?} ({} body bytes)", path, body.len());
        Ok(path)
    }
}

/// Write the card-level `CONFIG/config.bin` (bare 200-byte record)
pub fn write_card_config(root: &Path, snapshot: &ConfigSnapshot) -> Result<PathBuf> {
    let dir = root.join("CONFIG");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("config.bin");
    std::fs::write(&path, snapshot.encode())?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HEADER_SIZE;
    use crate::records::decode_body;

    #[test]
    fn test_written_file_layout() {
        let temp_dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2022, 5, 28).unwrap();
        let writer = DayWriter::new(temp_dir.path(), date).unwrap();

        let body = RecordBody::Words(vec![1, 2, 3]);
        let path = writer.write(FileKind::SnoreData, &body).unwrap();
        assert!(path.ends_with("20220528/20220528_snoredata.edf"));

        let data = std::fs::read(&path).unwrap();
        assert_eq!(data.len(), HEADER_SIZE + 6);

        let header = FileHeader::parse(&data).unwrap();
        assert_eq!(header.signal_names, "snoredata");
        assert_eq!(
            decode_body(FileKind::SnoreData, &data[HEADER_SIZE..]).unwrap(),
            body
        );
    }

    #[test]
    fn test_custom_header_is_kept() {
        let temp_dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2022, 5, 28).unwrap();
        let header = FileHeader {
            firmware: "FW9".into(),
            ..FileHeader::default()
        };
        let writer = DayWriter::new(temp_dir.path(), date)
            .unwrap()
            .with_header(header);

        let path = writer.write_raw(FileKind::Flow, &[9, 9]).unwrap();
        let data = std::fs::read(path).unwrap();
        assert_eq!(FileHeader::parse(&data).unwrap().firmware, "FW9");
    }
}
