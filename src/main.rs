//! Main entry point for the zipscan CLI application.
//!
//! Scans one archive (or every archive named by an S3 event), publishes
//! per-entry metadata to the selected sink and prints a report.

use anyhow::{bail, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;

use zipscan::cli::SinkKind;
use zipscan::sink::{HttpSink, JsonLinesSink};
use zipscan::{
    scan_location, Cli, DiscardSink, MetadataSink, ScanObserver, ScanReport, TracingObserver,
};

/// Application entry point.
///
/// Exits with an error when any scan failed; reports are printed either way.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let locations = cli.locations()?;
    let sink = build_sink(&cli).await?;
    let observer: Arc<dyn ScanObserver> = Arc::new(TracingObserver);
    let options = cli.invoke_options();

    // keep stdout clean for the JSON lines sink
    let mut out: Box<dyn Write> = if cli.sink == SinkKind::Stdout {
        Box::new(std::io::stderr())
    } else {
        Box::new(std::io::stdout())
    };

    let mut failed = 0usize;
    for location in &locations {
        let report = scan_location(location, &options, sink.clone(), observer.clone()).await;
        if !report.success {
            failed += 1;
        }
        print_report(&mut *out, &report, &cli)?;
    }

    if failed > 0 {
        bail!("{} of {} scans failed", failed, locations.len());
    }
    Ok(())
}

/// `RUST_LOG` wins; otherwise -v shows scan progress and -q silences warnings.
fn init_logging(cli: &Cli) {
    let level = if cli.is_very_quiet() {
        log::LevelFilter::Off
    } else if cli.is_quiet() {
        log::LevelFilter::Error
    } else if cli.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

async fn build_sink(cli: &Cli) -> Result<Arc<dyn MetadataSink>> {
    let sink: Arc<dyn MetadataSink> = match cli.sink {
        SinkKind::Discard => Arc::new(DiscardSink),
        SinkKind::Stdout => Arc::new(JsonLinesSink::stdout()),
        SinkKind::File => match &cli.sink_path {
            Some(path) => Arc::new(JsonLinesSink::append(path).await?),
            None => bail!("--sink file requires --sink-path"),
        },
        SinkKind::Http => match &cli.sink_url {
            Some(url) => Arc::new(HttpSink::new(
                url.clone(),
                std::time::Duration::from_secs(cli.timeout),
            )?),
            None => bail!("--sink http requires --sink-url"),
        },
    };
    Ok(sink)
}

/// Print one report.
///
/// Supports three formats:
/// - JSON (`--json`): the full structured report
/// - Simple: entry names with their payload range
/// - Verbose (`-v`): table with sizes, ratio, dates and offsets
fn print_report(out: &mut dyn Write, report: &ScanReport, cli: &Cli) -> Result<()> {
    if cli.json {
        serde_json::to_writer_pretty(&mut *out, report)?;
        writeln!(out)?;
        return Ok(());
    }

    if cli.is_very_quiet() {
        return Ok(());
    }

    if !cli.is_quiet() {
        match report.archive_size {
            Some(size) => writeln!(out, "Archive:  {} ({})", report.archive, format_size(size))?,
            None => writeln!(out, "Archive:  {}", report.archive)?,
        }
    }

    if cli.verbose {
        writeln!(
            out,
            "{:>10}  {:>10}  {:>5}  {:>19}  {:>12}  {:>12}  Name",
            "Length", "Size", "Cmpr", "Modified", "Data start", "Data end"
        )?;
        writeln!(out, "{}", "-".repeat(96))?;
        for entry in &report.entries {
            writeln!(
                out,
                "{:>10}  {:>10}  {}  {:>19}  {:>12}  {:>12}  {}",
                entry.uncompressed_size,
                entry.compressed_size,
                ratio(entry.compressed_size, entry.uncompressed_size),
                entry.last_modified,
                entry.data_position_start,
                entry.data_position_end,
                entry.name
            )?;
        }
        writeln!(out, "{}", "-".repeat(96))?;
        writeln!(
            out,
            "{:>10}  {:>10}  {}  {:>47}  {} entries",
            report.total_uncompressed(),
            report.total_compressed(),
            ratio(report.total_compressed(), report.total_uncompressed()),
            "",
            report.entries.len()
        )?;
    } else {
        for entry in &report.entries {
            writeln!(
                out,
                "{}\t{}..{}",
                entry.name, entry.data_position_start, entry.data_position_end
            )?;
        }
    }

    if !cli.is_quiet() {
        if report.publish.published + report.publish.failed > 0 {
            writeln!(
                out,
                "Published {} entries ({} failed)",
                report.publish.published, report.publish.failed
            )?;
        }
        if let Some(transferred) = report.transferred_bytes {
            writeln!(out, "Total bytes transferred: {}", format_size(transferred))?;
        }
    }

    if let Some(error) = &report.error {
        writeln!(
            out,
            "error: {} ({} entries found before the failure)",
            error,
            report.entries.len()
        )?;
    }

    Ok(())
}

/// Percentage saved by compression
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 && compressed <= uncompressed {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        "  0%".to_string()
    }
}

/// Format a byte size into a human-readable string.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(format_size(500), "500 bytes");
/// assert_eq!(format_size(1536), "1.50 KB");
/// ```
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
