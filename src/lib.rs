//! # zipscan
//!
//! List the entries of a large remote ZIP archive without downloading it.
//!
//! The archive is read with small byte-range requests, one per entry: each
//! local file header is decoded where it sits, its payload is skipped, and
//! the next header is fetched. For every entry the payload's exact byte
//! range within the remote object is reported, so other workers can later
//! fetch individual entries directly.
//!
//! ## Features
//!
//! - Read archives from `s3://bucket/key`, HTTP/HTTPS URLs or local files
//! - Adaptive header fetches for long names and extra fields
//! - Per-entry metadata published to a pluggable sink without blocking the scan
//! - Structured scan reports and timing events
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use zipscan::{ArchiveScanner, HttpOptions, HttpRangeReader, ScanOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let reader = Arc::new(HttpRangeReader::new(
//!         "https://example.com/archive.zip".to_string(),
//!         &HttpOptions::default(),
//!     )?);
//!
//!     let mut scanner = ArchiveScanner::initialize(reader, &ScanOptions::default()).await?;
//!     for record in scanner.run().await? {
//!         println!("{} {}..{}", record.file_name, record.data_start(), record.data_end());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod invoke;
pub mod io;
pub mod observe;
pub mod report;
pub mod sink;
pub mod zip;

pub use cli::Cli;
pub use invoke::{scan_location, scan_source, ArchiveLocation, InvokeOptions};
pub use io::{HttpOptions, HttpRangeReader, LocalFileReader, MemoryReader, ReadAt};
pub use observe::{NoopObserver, ScanObserver, TracingObserver};
pub use report::{EntrySummary, ScanReport};
pub use sink::{DiscardSink, EntryMessage, EntryMetadata, MetadataSink, Publisher};
pub use self::zip::{ArchiveScanner, LocalFileHeaderRecord, ScanError, ScanOptions};
