use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use crate::invoke::{ArchiveLocation, InvokeOptions, DEFAULT_S3_ENDPOINT};
use crate::io::HttpOptions;
use crate::zip::{ScanOptions, DEFAULT_FETCH_UNIT, MIN_TRAILER_RESERVE};

/// Where entry metadata is published
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SinkKind {
    /// Do not publish
    #[value(name = "none")]
    Discard,
    /// JSON lines on stdout
    Stdout,
    /// JSON lines appended to --sink-path (created if missing)
    File,
    /// POST each entry as JSON to --sink-url
    Http,
}

#[derive(Parser, Debug)]
#[command(name = "zipscan")]
#[command(version)]
#[command(about = "List the entries of a remote ZIP archive using Range requests", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipscan s3://bucket/huge.zip                    list entries and payload offsets\n  \
  zipscan -v https://example.com/archive.zip      verbose listing with dates\n  \
  zipscan --event event.json --sink stdout        scan objects named by an S3 event\n  \
  zipscan --json --sink file --sink-path out.jsonl data.zip")]
pub struct Cli {
    /// Archive to scan: s3://bucket/key, HTTP(S) URL or local path
    #[arg(value_name = "ARCHIVE", required_unless_present = "event", conflicts_with = "event")]
    pub archive: Option<String>,

    /// S3 event notification JSON naming the archives to scan
    #[arg(long, value_name = "FILE")]
    pub event: Option<PathBuf>,

    /// Bytes requested per header
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_FETCH_UNIT)]
    pub fetch_unit: u64,

    /// Bytes at the end of the archive never parsed as a header
    #[arg(long, value_name = "BYTES", default_value_t = MIN_TRAILER_RESERVE)]
    pub trailer_reserve: u64,

    /// HTTP request timeout
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub timeout: u64,

    /// Attempts per range request on timeouts and connection errors
    #[arg(long, value_name = "N", default_value_t = 10)]
    pub max_retry: u32,

    /// Endpoint used to resolve s3:// locations (path-style)
    #[arg(long, value_name = "URL", env = "ZIPSCAN_S3_ENDPOINT", default_value = DEFAULT_S3_ENDPOINT)]
    pub s3_endpoint: String,

    /// Where to publish entry metadata
    #[arg(long, value_enum, default_value_t = SinkKind::Discard)]
    pub sink: SinkKind,

    /// Output file for --sink file
    #[arg(long, value_name = "PATH", required_if_eq("sink", "file"))]
    pub sink_path: Option<PathBuf>,

    /// Endpoint for --sink http
    #[arg(long, value_name = "URL", env = "ZIPSCAN_SINK_URL", required_if_eq("sink", "http"))]
    pub sink_url: Option<String>,

    /// Print the scan report as JSON
    #[arg(long)]
    pub json: bool,

    /// List verbosely with sizes, offsets and dates
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    /// Archives named on the command line or in the event document
    pub fn locations(&self) -> Result<Vec<ArchiveLocation>> {
        if let Some(path) = &self.event {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading event file {}", path.display()))?;
            return ArchiveLocation::from_s3_event(&json);
        }
        let archive = self.archive.as_deref().unwrap_or_default();
        Ok(vec![archive.parse()?])
    }

    pub fn invoke_options(&self) -> InvokeOptions {
        InvokeOptions {
            scan: ScanOptions::default()
                .fetch_unit(self.fetch_unit)
                .trailer_reserve(self.trailer_reserve),
            http: HttpOptions {
                timeout: Duration::from_secs(self.timeout),
                max_retry: self.max_retry,
            },
            s3_endpoint: self.s3_endpoint.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_scanner_defaults() {
        let cli = Cli::try_parse_from(["zipscan", "s3://bucket/a.zip"]).unwrap();
        let options = cli.invoke_options();
        assert_eq!(options.scan.fetch_unit, DEFAULT_FETCH_UNIT);
        assert_eq!(options.scan.trailer_reserve, MIN_TRAILER_RESERVE);
        assert_eq!(options.http.max_retry, 10);
        assert_eq!(cli.sink, SinkKind::Discard);
        assert_eq!(
            cli.locations().unwrap(),
            [ArchiveLocation::S3 {
                bucket: "bucket".into(),
                key: "a.zip".into()
            }]
        );
    }

    #[test]
    fn archive_or_event_is_required() {
        assert!(Cli::try_parse_from(["zipscan"]).is_err());
        assert!(Cli::try_parse_from(["zipscan", "a.zip", "--event", "e.json"]).is_err());
        assert!(Cli::try_parse_from(["zipscan", "--event", "e.json"]).is_ok());
    }

    #[test]
    fn file_sink_needs_a_path() {
        assert!(Cli::try_parse_from(["zipscan", "a.zip", "--sink", "file"]).is_err());
        let cli =
            Cli::try_parse_from(["zipscan", "a.zip", "--sink", "file", "--sink-path", "out.jsonl"])
                .unwrap();
        assert_eq!(cli.sink, SinkKind::File);
    }
}
