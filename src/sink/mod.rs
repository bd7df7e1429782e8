//! Destinations for per-entry metadata.
//!
//! A scan does not wait on its sink. Records are handed to a [`Publisher`],
//! which forwards them to a [`MetadataSink`] from a background task so a
//! slow or failing destination never holds up the next range request.

mod http;
mod jsonl;

pub use http::HttpSink;
pub use jsonl::JsonLinesSink;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::zip::LocalFileHeaderRecord;

/// What downstream consumers learn about one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub file_name: String,
    /// Offset of the entry's local file header
    pub start_pos: u64,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
}

impl From<&LocalFileHeaderRecord> for EntryMetadata {
    fn from(record: &LocalFileHeaderRecord) -> Self {
        Self {
            file_name: record.file_name.clone(),
            start_pos: record.start_offset(),
            uncompressed_size: record.uncompressed_size as u64,
            compressed_size: record.compressed_size as u64,
        }
    }
}

/// Entry metadata tagged with the archive it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMessage {
    pub archive: String,
    pub data: EntryMetadata,
}

impl EntryMessage {
    pub fn new(archive: &str, record: &LocalFileHeaderRecord) -> Self {
        Self {
            archive: archive.to_string(),
            data: EntryMetadata::from(record),
        }
    }
}

/// A destination for entry messages
#[async_trait]
pub trait MetadataSink: Send + Sync {
    /// Deliver one message. Delivery is at-least-once; deduplication is
    /// up to the receiver.
    async fn publish(&self, message: &EntryMessage) -> Result<()>;

    /// Push out anything buffered
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Drops every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

#[async_trait]
impl MetadataSink for DiscardSink {
    async fn publish(&self, _message: &EntryMessage) -> Result<()> {
        Ok(())
    }
}

/// Delivery counts for one publisher
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PublishStats {
    pub published: u64,
    pub failed: u64,
}

/// Fire-and-forget front for a [`MetadataSink`].
///
/// Messages are queued without blocking and published in submission
/// order by a background task. Failures are logged and counted.
pub struct Publisher {
    tx: mpsc::UnboundedSender<EntryMessage>,
    task: JoinHandle<PublishStats>,
}

impl Publisher {
    /// Start the background task. Must be called within a tokio runtime.
    pub fn spawn(sink: Arc<dyn MetadataSink>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<EntryMessage>();

        let task = tokio::spawn(async move {
            let mut stats = PublishStats::default();
            while let Some(message) = rx.recv().await {
                match sink.publish(&message).await {
                    Ok(()) => stats.published += 1,
                    Err(e) => {
                        stats.failed += 1;
                        tracing::warn!(
                            archive = %message.archive,
                            file_name = %message.data.file_name,
                            error = %e,
                            "failed to publish entry metadata"
                        );
                    }
                }
            }
            if let Err(e) = sink.flush().await {
                tracing::warn!(error = %e, "failed to flush metadata sink");
            }
            stats
        });

        Self { tx, task }
    }

    /// Queue a message. Returns `false` if the background task is gone.
    pub fn submit(&self, message: EntryMessage) -> bool {
        self.tx.send(message).is_ok()
    }

    /// Wait for every queued message to be handled.
    pub async fn finish(self) -> Result<PublishStats> {
        let Self { tx, task } = self;
        drop(tx);
        Ok(task.await?)
    }
}
