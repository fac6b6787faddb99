//! Storage abstraction trait
//!
//! This module defines the ObjectStorage trait that all storage backends
//! must implement, plus the shared types for streaming transfers.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use recode_core::constants::{
    DEFAULT_MULTIPART_PART_SIZE_BYTES, DEFAULT_MULTIPART_THRESHOLD_BYTES,
};

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// A stream of downloaded byte chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Byte-level progress callback, invoked with the cumulative number of
/// bytes transferred so far. Must be cheap and non-blocking.
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Size thresholds steering the single-shot vs. multipart upload choice.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    /// At or below this declared size, upload in one atomic put.
    pub multipart_threshold: u64,
    /// Fixed size of every part except possibly the last.
    pub part_size: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD_BYTES,
            part_size: DEFAULT_MULTIPART_PART_SIZE_BYTES,
        }
    }
}

impl UploadLimits {
    /// Number of parts a multipart upload of `size` bytes produces.
    pub fn part_count(&self, size: u64) -> u64 {
        size.div_ceil(self.part_size)
    }
}

/// Storage abstraction trait
///
/// All storage backends (S3, local filesystem) must implement this trait,
/// which keeps the conversion pipeline independent of the backing store.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Identifier of the backing store (bucket name or local root label),
    /// recorded in object locations.
    fn store_id(&self) -> &str;

    /// Open a read stream for an object, returning the stream and the
    /// object's declared size in bytes.
    async fn download_stream(&self, key: &str) -> StorageResult<(ByteStream, u64)>;

    /// Upload from a reader until EOF, choosing single-shot or multipart
    /// by declared size (multipart when the size is unknown and the stream
    /// outgrows the threshold). Progress is reported after each part or
    /// after the single-shot put. Returns the total bytes uploaded.
    async fn upload_stream(
        &self,
        key: &str,
        reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
        declared_size: Option<u64>,
        progress: Option<ProgressFn>,
    ) -> StorageResult<u64>;

    /// Single-shot upload of an in-memory payload.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Download a whole object into memory. For small objects only.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Size in bytes of an object, if it exists.
    async fn content_length(&self, key: &str) -> StorageResult<u64>;
}

/// Reads up to `cap` bytes from `reader`, returning fewer only at EOF.
pub(crate) async fn read_up_to(
    reader: &mut Pin<Box<dyn AsyncRead + Send + Unpin>>,
    cap: usize,
) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; cap];
    let mut filled = 0;
    while filled < cap {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_count_math() {
        let limits = UploadLimits {
            multipart_threshold: 10,
            part_size: 4,
        };
        assert_eq!(limits.part_count(12), 3);
        assert_eq!(limits.part_count(13), 4);
        assert_eq!(limits.part_count(4), 1);
        assert_eq!(limits.part_count(0), 0);
    }

    #[tokio::test]
    async fn test_read_up_to_stops_at_eof() {
        let data = b"hello world".to_vec();
        let mut reader: Pin<Box<dyn AsyncRead + Send + Unpin>> =
            Box::pin(std::io::Cursor::new(data));
        let chunk = read_up_to(&mut reader, 64).await.unwrap();
        assert_eq!(chunk, b"hello world");
        let chunk = read_up_to(&mut reader, 64).await.unwrap();
        assert!(chunk.is_empty());
    }

    #[tokio::test]
    async fn test_read_up_to_fills_cap() {
        let data = vec![7u8; 100];
        let mut reader: Pin<Box<dyn AsyncRead + Send + Unpin>> =
            Box::pin(std::io::Cursor::new(data));
        let chunk = read_up_to(&mut reader, 40).await.unwrap();
        assert_eq!(chunk.len(), 40);
    }
}
