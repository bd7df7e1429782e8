//! The summary a scan hands back to whoever invoked it.

use serde::Serialize;

use crate::sink::PublishStats;
use crate::zip::{LocalFileHeaderRecord, ScanEnd, ScanError};

/// One discovered entry, with the byte range of its payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySummary {
    pub name: String,
    pub start_pos: u64,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub data_position_start: u64,
    pub data_position_end: u64,
    pub compression_method: u16,
    /// `YYYY-MM-DD HH:MM:SS` from the DOS timestamp
    pub last_modified: String,
    pub is_directory: bool,
}

impl From<&LocalFileHeaderRecord> for EntrySummary {
    fn from(record: &LocalFileHeaderRecord) -> Self {
        let (year, month, day) = record.mod_date();
        let (hour, minute, second) = record.mod_time();
        Self {
            name: record.file_name.clone(),
            start_pos: record.start_offset(),
            compressed_size: record.compressed_size as u64,
            uncompressed_size: record.uncompressed_size as u64,
            data_position_start: record.data_start(),
            data_position_end: record.data_end(),
            compression_method: record.compression_method,
            last_modified: format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            ),
            is_directory: record.is_directory(),
        }
    }
}

/// Outcome of scanning one archive
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub archive: String,
    pub archive_size: Option<u64>,
    pub success: bool,
    /// Full error chain when the scan failed
    pub error: Option<String>,
    pub end: Option<ScanEnd>,
    pub entries: Vec<EntrySummary>,
    pub publish: PublishStats,
    pub transferred_bytes: Option<u64>,
    pub elapsed_ms: u64,
}

impl ScanReport {
    /// Report for a scan that never started
    pub fn not_started(archive: &str, error: ScanError, elapsed_ms: u64) -> Self {
        Self {
            archive: archive.to_string(),
            archive_size: None,
            success: false,
            error: Some(error_chain(error)),
            end: None,
            entries: Vec::new(),
            publish: PublishStats::default(),
            transferred_bytes: None,
            elapsed_ms,
        }
    }

    pub fn total_compressed(&self) -> u64 {
        self.entries.iter().map(|e| e.compressed_size).sum()
    }

    pub fn total_uncompressed(&self) -> u64 {
        self.entries.iter().map(|e| e.uncompressed_size).sum()
    }
}

/// Render an error and its sources as `outer: inner: root`
pub fn error_chain(error: ScanError) -> String {
    format!("{:#}", anyhow::Error::new(error))
}
