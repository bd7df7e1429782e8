use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter, Stdout};
use tokio::sync::Mutex;

use super::{EntryMessage, MetadataSink};

/// Writes one JSON document per line
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl JsonLinesSink<BufWriter<Stdout>> {
    pub fn stdout() -> Self {
        Self::new(BufWriter::new(tokio::io::stdout()))
    }
}

impl JsonLinesSink<BufWriter<File>> {
    /// Append messages to `path`, creating it if needed
    pub async fn append(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path).await?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> MetadataSink for JsonLinesSink<W> {
    async fn publish(&self, message: &EntryMessage) -> Result<()> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        self.writer.lock().await.write_all(&line).await?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.writer.lock().await.flush().await?;
        Ok(())
    }
}
