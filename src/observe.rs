//! Scan instrumentation.
//!
//! Callers inject a [`ScanObserver`] to time scans and individual range
//! requests. [`TracingObserver`] turns the events into `tracing` events.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::zip::ScanEnd;

/// A scan is about to walk an archive.
#[derive(Debug, Clone)]
pub struct ScanStarted<'a> {
    pub archive: &'a str,
    pub object_size: u64,
    pub at: SystemTime,
}

/// One range request completed.
#[derive(Debug, Clone)]
pub struct FetchEvent {
    pub offset: u64,
    pub requested: u64,
    pub received: u64,
    pub elapsed: Duration,
}

/// A scan stopped, successfully or not.
#[derive(Debug, Clone)]
pub struct ScanFinished<'a> {
    pub archive: &'a str,
    pub started_at: SystemTime,
    pub finished_at: SystemTime,
    pub elapsed: Duration,
    pub entries: usize,
    pub end: ScanEnd,
    pub error: Option<&'a str>,
}

/// Receives scan lifecycle events. Every method defaults to doing nothing.
pub trait ScanObserver: Send + Sync {
    fn scan_started(&self, _event: &ScanStarted<'_>) {}

    fn fetch_completed(&self, _event: &FetchEvent) {}

    fn scan_finished(&self, _event: &ScanFinished<'_>) {}
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ScanObserver for NoopObserver {}

/// Emits every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ScanObserver for TracingObserver {
    fn scan_started(&self, event: &ScanStarted<'_>) {
        tracing::info!(
            archive = event.archive,
            object_size = event.object_size,
            started_at_ms = unix_millis(event.at),
            "scan started"
        );
    }

    fn fetch_completed(&self, event: &FetchEvent) {
        tracing::debug!(
            offset = event.offset,
            requested = event.requested,
            received = event.received,
            elapsed_ms = event.elapsed.as_millis() as u64,
            "range fetched"
        );
    }

    fn scan_finished(&self, event: &ScanFinished<'_>) {
        match event.error {
            Some(error) => tracing::warn!(
                archive = event.archive,
                entries = event.entries,
                elapsed_ms = event.elapsed.as_millis() as u64,
                finished_at_ms = unix_millis(event.finished_at),
                error,
                "scan failed"
            ),
            None => tracing::info!(
                archive = event.archive,
                entries = event.entries,
                end = ?event.end,
                elapsed_ms = event.elapsed.as_millis() as u64,
                finished_at_ms = unix_millis(event.finished_at),
                "scan finished"
            ),
        }
    }
}

pub(crate) fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
