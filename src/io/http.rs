use async_trait::async_trait;
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;

use super::ReadAt;
use anyhow::{anyhow, bail, Result};

/// Connection settings for [`HttpRangeReader`].
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Per-request timeout
    pub timeout: Duration,
    /// Attempts allowed for timeouts and connection errors on one range
    pub max_retry: u32,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retry: 10,
        }
    }
}

/// HTTP Range reader for remote objects
pub struct HttpRangeReader {
    client: Client,
    url: String,
    size: OnceCell<u64>,
    transferred_bytes: AtomicU64,
    max_retry: u32,
}

impl HttpRangeReader {
    /// Create a new HTTP Range reader.
    ///
    /// No request is sent until the size or a range is first asked for.
    pub fn new(url: String, options: &HttpOptions) -> Result<Self> {
        let client = Client::builder().timeout(options.timeout).build()?;

        Ok(Self {
            client,
            url,
            size: OnceCell::new(),
            transferred_bytes: AtomicU64::new(0),
            max_retry: options.max_retry.max(1),
        })
    }

    /// Send a HEAD request to verify Range support and get the object size
    #[tracing::instrument(skip(self), fields(url = %self.url))]
    async fn head(&self) -> Result<u64> {
        let resp = self.client.head(&self.url).send().await?;

        if !resp.status().is_success() {
            bail!("HEAD {} failed with status: {}", self.url, resp.status());
        }

        let accept_ranges = resp
            .headers()
            .get("accept-ranges")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("none");

        if !accept_ranges.contains("bytes") {
            bail!("Remote server does not support Range requests");
        }

        let size: u64 = resp
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| anyhow!("Remote server did not return Content-Length"))?;

        tracing::debug!(size, "remote object size");
        Ok(size)
    }
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let size = self.size().await?;
        if buf.is_empty() || offset >= size {
            return Ok(0);
        }

        let end = (offset + buf.len() as u64 - 1).min(size - 1);
        let expected_size = (end - offset + 1) as usize;

        let mut received = 0;
        let mut retry_count = 0;

        while received < expected_size {
            let current_start = offset + received as u64;
            let range = format!("bytes={}-{}", current_start, end);

            let result = self
                .client
                .get(&self.url)
                .header("Range", &range)
                .send()
                .await;

            match result {
                Ok(resp) => {
                    if resp.status() != reqwest::StatusCode::PARTIAL_CONTENT {
                        bail!("Range request {} failed with status: {}", range, resp.status());
                    }

                    let bytes = resp.bytes().await?;
                    if bytes.is_empty() {
                        bail!("Range request {} returned an empty body", range);
                    }
                    let chunk_len = bytes.len().min(expected_size - received);
                    buf[received..received + chunk_len].copy_from_slice(&bytes[..chunk_len]);
                    received += chunk_len;

                    self.transferred_bytes
                        .fetch_add(chunk_len as u64, Ordering::Relaxed);
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    retry_count += 1;
                    if retry_count >= self.max_retry {
                        bail!("Max retries exceeded for range {}: {}", range, e);
                    }
                    tracing::warn!(
                        retry = retry_count,
                        max_retry = self.max_retry,
                        error = %e,
                        "connection error, retrying range request"
                    );
                    tokio::time::sleep(Duration::from_millis(500 * retry_count as u64)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(received)
    }

    async fn size(&self) -> Result<u64> {
        self.size.get_or_try_init(|| self.head()).await.copied()
    }

    fn transferred_bytes(&self) -> Option<u64> {
        Some(self.transferred_bytes.load(Ordering::Relaxed))
    }
}
