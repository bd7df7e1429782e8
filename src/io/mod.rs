//! Random access byte sources.
//!
//! The scanner never holds a whole archive in memory. Everything it needs
//! comes from [`ReadAt`], which answers two questions: how large is the
//! object, and what are the bytes in a given range.

mod http;
mod local;
mod mem;

pub use http::{HttpOptions, HttpRangeReader};
pub use local::LocalFileReader;
pub use mem::MemoryReader;

use anyhow::Result;
use async_trait::async_trait;

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer.
    ///
    /// Returns the number of bytes read, which is less than `buf.len()`
    /// only when the range runs past the end of the object.
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    async fn size(&self) -> Result<u64>;

    /// Fetch `[offset, offset + length)` as an owned buffer.
    ///
    /// The returned buffer is truncated to the bytes actually read.
    async fn fetch(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; usize::try_from(length)?];
        let n = self.read_at(offset, &mut buf).await?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Bytes pulled over the network so far, for sources that track it.
    fn transferred_bytes(&self) -> Option<u64> {
        None
    }
}
