//! Entry point glue: which archive to scan, where to read it from, and
//! what to report when done.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::io::{HttpOptions, HttpRangeReader, LocalFileReader, ReadAt};
use crate::observe::{ScanFinished, ScanObserver, ScanStarted};
use crate::report::{error_chain, EntrySummary, ScanReport};
use crate::sink::{EntryMessage, MetadataSink, Publisher};
use crate::zip::{ArchiveScanner, ScanError, ScanOptions};

pub const DEFAULT_S3_ENDPOINT: &str = "https://s3.amazonaws.com";

/// Where an archive lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveLocation {
    S3 { bucket: String, key: String },
    Http(String),
    Local(PathBuf),
}

impl FromStr for ArchiveLocation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(rest) = s.strip_prefix("s3://") {
            let (bucket, key) = rest
                .split_once('/')
                .ok_or_else(|| anyhow!("S3 location {s} has no object key"))?;
            if bucket.is_empty() || key.is_empty() {
                bail!("S3 location {s} needs both a bucket and a key");
            }
            return Ok(Self::S3 {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        if s.starts_with("http://") || s.starts_with("https://") {
            return Ok(Self::Http(s.to_string()));
        }

        if s.is_empty() {
            bail!("empty archive location");
        }
        Ok(Self::Local(PathBuf::from(s)))
    }
}

impl fmt::Display for ArchiveLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S3 { bucket, key } => write!(f, "s3://{bucket}/{key}"),
            Self::Http(url) => f.write_str(url),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Deserialize)]
struct S3Event {
    #[serde(rename = "Records")]
    records: Vec<S3EventRecord>,
}

#[derive(Deserialize)]
struct S3EventRecord {
    s3: S3Entity,
}

#[derive(Deserialize)]
struct S3Entity {
    bucket: S3Bucket,
    object: S3Object,
}

#[derive(Deserialize)]
struct S3Bucket {
    name: String,
}

#[derive(Deserialize)]
struct S3Object {
    key: String,
}

impl ArchiveLocation {
    /// Every object named by an S3 event notification document.
    ///
    /// Keys are taken as delivered; S3 URL-encodes them in notifications.
    pub fn from_s3_event(json: &str) -> Result<Vec<Self>> {
        let event: S3Event = serde_json::from_str(json).context("invalid S3 event document")?;
        if event.records.is_empty() {
            bail!("S3 event has no records");
        }
        Ok(event
            .records
            .into_iter()
            .map(|r| Self::S3 {
                bucket: r.s3.bucket.name,
                key: r.s3.object.key,
            })
            .collect())
    }

    /// URL to range-read this object from, for remote locations
    pub fn object_url(&self, s3_endpoint: &str) -> Option<String> {
        match self {
            Self::S3 { bucket, key } => Some(format!(
                "{}/{}/{}",
                s3_endpoint.trim_end_matches('/'),
                bucket,
                key
            )),
            Self::Http(url) => Some(url.clone()),
            Self::Local(_) => None,
        }
    }
}

/// Settings for one invocation
#[derive(Debug, Clone)]
pub struct InvokeOptions {
    pub scan: ScanOptions,
    pub http: HttpOptions,
    pub s3_endpoint: String,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            scan: ScanOptions::default(),
            http: HttpOptions::default(),
            s3_endpoint: DEFAULT_S3_ENDPOINT.to_string(),
        }
    }
}

/// Scan the archive at `location`, publishing each entry to `sink`.
///
/// Failures never escape as errors; they are described in the report.
pub async fn scan_location(
    location: &ArchiveLocation,
    options: &InvokeOptions,
    sink: Arc<dyn MetadataSink>,
    observer: Arc<dyn ScanObserver>,
) -> ScanReport {
    let archive = location.to_string();

    match open_source(location, options) {
        Ok(reader) => scan_source(reader, &archive, options, sink, observer).await,
        Err(e) => ScanReport::not_started(&archive, e, 0),
    }
}

/// Build the byte source for `location`.
///
/// A local file that cannot be opened has no size; a remote location only
/// fails here when the HTTP client itself cannot be built.
fn open_source(
    location: &ArchiveLocation,
    options: &InvokeOptions,
) -> std::result::Result<Arc<dyn ReadAt>, ScanError> {
    match (location, location.object_url(&options.s3_endpoint)) {
        (_, Some(url)) => {
            let reader = HttpRangeReader::new(url, &options.http)
                .context("building HTTP client")
                .map_err(|e| ScanError::SourceSetup { source: e.into() })?;
            Ok(Arc::new(reader))
        }
        (ArchiveLocation::Local(path), None) => {
            let reader = LocalFileReader::new(path)
                .map_err(|e| ScanError::SizeUnavailable { source: e.into() })?;
            Ok(Arc::new(reader))
        }
        (remote, None) => Err(ScanError::SourceSetup {
            source: anyhow!("no object URL for {remote}").into(),
        }),
    }
}

/// Scan an already opened byte source.
pub async fn scan_source<R: ReadAt + ?Sized>(
    reader: Arc<R>,
    archive: &str,
    options: &InvokeOptions,
    sink: Arc<dyn MetadataSink>,
    observer: Arc<dyn ScanObserver>,
) -> ScanReport {
    let started_at = SystemTime::now();
    let clock = Instant::now();

    let scanner = match ArchiveScanner::initialize(reader.clone(), &options.scan).await {
        Ok(scanner) => scanner.with_observer(observer.clone()),
        Err(e) => return ScanReport::not_started(archive, e, clock.elapsed().as_millis() as u64),
    };
    let object_size = scanner.object_size();

    observer.scan_started(&ScanStarted {
        archive,
        object_size,
        at: started_at,
    });

    let publisher = Publisher::spawn(sink);
    let outcome = scanner
        .scan_with(|record| {
            if !publisher.submit(EntryMessage::new(archive, record)) {
                tracing::warn!(file_name = %record.file_name, "publisher stopped, entry not forwarded");
            }
        })
        .await;

    let publish = match publisher.finish().await {
        Ok(stats) => stats,
        Err(e) => {
            tracing::warn!(error = %e, "metadata publisher task failed");
            Default::default()
        }
    };

    let error = outcome.error.map(error_chain);
    let elapsed = clock.elapsed();

    observer.scan_finished(&ScanFinished {
        archive,
        started_at,
        finished_at: SystemTime::now(),
        elapsed,
        entries: outcome.records.len(),
        end: outcome.end,
        error: error.as_deref(),
    });

    ScanReport {
        archive: archive.to_string(),
        archive_size: Some(object_size),
        success: error.is_none(),
        error,
        end: Some(outcome.end),
        entries: outcome.records.iter().map(EntrySummary::from).collect(),
        publish,
        transferred_bytes: reader.transferred_bytes(),
        elapsed_ms: elapsed.as_millis() as u64,
    }
}
