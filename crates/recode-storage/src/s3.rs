use crate::traits::{
    read_up_to, ByteStream, ObjectStorage, ProgressFn, StorageError, StorageResult, UploadLimits,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{MultipartUpload, ObjectStoreExt, PutPayload, Result as ObjectResult};
use std::pin::Pin;
use tokio::io::AsyncRead;

/// S3 storage implementation
#[derive(Clone)]
pub struct S3ObjectStorage {
    store: AmazonS3,
    bucket: String,
    limits: UploadLimits,
}

impl S3ObjectStorage {
    /// Create a new S3ObjectStorage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    /// * `limits` - single-shot vs. multipart thresholds
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
        limits: UploadLimits,
    ) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region)
            .with_bucket_name(bucket.clone());

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3ObjectStorage {
            store,
            bucket,
            limits,
        })
    }

    fn report(progress: &Option<ProgressFn>, uploaded: u64) {
        if let Some(cb) = progress {
            cb(uploaded);
        }
    }

    /// Streams a multipart upload: fixed-size parts uploaded in order, a
    /// possibly-smaller final part, `complete` on success. Any part
    /// failure aborts the multipart upload server-side before the error
    /// propagates, so no orphaned parts accrue storage costs.
    async fn multipart_upload(
        &self,
        location: &Path,
        key: &str,
        mut reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
        initial: Vec<u8>,
        progress: Option<ProgressFn>,
    ) -> StorageResult<u64> {
        let part_size = self.limits.part_size as usize;
        let mut upload = self
            .store
            .put_multipart(location)
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;

        let mut buf = BytesMut::from(&initial[..]);
        let mut uploaded: u64 = 0;
        let mut parts: u64 = 0;
        let mut eof = false;

        loop {
            while buf.len() >= part_size {
                let part = buf.split_to(part_size).freeze();
                if let Err(e) = upload.put_part(PutPayload::from(part)).await {
                    Self::abort_best_effort(upload, &self.bucket, key).await;
                    return Err(StorageError::UploadFailed(e.to_string()));
                }
                parts += 1;
                uploaded += part_size as u64;
                Self::report(&progress, uploaded);
            }

            if eof {
                break;
            }

            let chunk = match read_up_to(&mut reader, part_size).await {
                Ok(chunk) => chunk,
                Err(e) => {
                    Self::abort_best_effort(upload, &self.bucket, key).await;
                    return Err(StorageError::UploadFailed(format!(
                        "failed to read upload source: {}",
                        e
                    )));
                }
            };
            if chunk.len() < part_size {
                eof = true;
            }
            buf.extend_from_slice(&chunk);
        }

        if !buf.is_empty() {
            let rest = buf.freeze();
            let len = rest.len() as u64;
            if let Err(e) = upload.put_part(PutPayload::from(rest)).await {
                Self::abort_best_effort(upload, &self.bucket, key).await;
                return Err(StorageError::UploadFailed(e.to_string()));
            }
            parts += 1;
            uploaded += len;
            Self::report(&progress, uploaded);
        }

        if let Err(e) = upload.complete().await {
            Self::abort_best_effort(upload, &self.bucket, key).await;
            return Err(StorageError::UploadFailed(e.to_string()));
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = uploaded,
            parts,
            "S3 multipart upload successful"
        );
        Ok(uploaded)
    }

    async fn abort_best_effort(mut upload: Box<dyn MultipartUpload>, bucket: &str, key: &str) {
        if let Err(abort_err) = upload.abort().await {
            tracing::warn!(
                bucket = %bucket,
                key = %key,
                error = %abort_err,
                "Failed to abort multipart upload"
            );
        }
    }
}

#[async_trait]
impl ObjectStorage for S3ObjectStorage {
    fn store_id(&self) -> &str {
        &self.bucket
    }

    async fn download_stream(&self, key: &str) -> StorageResult<(ByteStream, u64)> {
        let location = Path::from(key.to_string());

        let result: ObjectResult<_> = self.store.get(&location).await;
        let result = result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => StorageError::DownloadFailed(other.to_string()),
        })?;

        let size = result.meta.size;
        let bucket = self.bucket.clone();
        let key = key.to_string();

        let stream = result.into_stream().map(move |res| {
            res.map_err(|e| {
                tracing::error!(
                    bucket = %bucket,
                    key = %key,
                    error = %e,
                    "S3 stream download error"
                );
                StorageError::DownloadFailed(e.to_string())
            })
        });

        Ok((Box::pin(stream), size))
    }

    async fn upload_stream(
        &self,
        key: &str,
        mut reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
        declared_size: Option<u64>,
        progress: Option<ProgressFn>,
    ) -> StorageResult<u64> {
        let location = Path::from(key.to_string());
        let threshold = self.limits.multipart_threshold as usize;
        let start = std::time::Instant::now();

        match declared_size {
            Some(size) if size > self.limits.multipart_threshold => {
                self.multipart_upload(&location, key, reader, Vec::new(), progress)
                    .await
            }
            _ => {
                // Small or unknown size: buffer up to one byte past the
                // threshold to decide whether the stream fits a single put.
                let head = read_up_to(&mut reader, threshold + 1).await.map_err(|e| {
                    StorageError::UploadFailed(format!("failed to read upload source: {}", e))
                })?;

                if head.len() > threshold {
                    return self
                        .multipart_upload(&location, key, reader, head, progress)
                        .await;
                }

                let size = head.len() as u64;
                let result: ObjectResult<_> = self
                    .store
                    .put(&location, PutPayload::from(Bytes::from(head)))
                    .await;

                result.map_err(|e| {
                    tracing::error!(
                        error = %e,
                        bucket = %self.bucket,
                        key = %key,
                        size_bytes = size,
                        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                        "S3 upload failed"
                    );
                    StorageError::UploadFailed(e.to_string())
                })?;

                Self::report(&progress, size);
                tracing::info!(
                    bucket = %self.bucket,
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 upload successful"
                );
                Ok(size)
            }
        }
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let location = Path::from(key.to_string());
        let result: ObjectResult<_> = self.store.put(&location, PutPayload::from(data)).await;
        result.map_err(|e| StorageError::UploadFailed(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let location = Path::from(key.to_string());
        let result: ObjectResult<_> = self.store.get(&location).await;
        let result = result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => StorageError::DownloadFailed(other.to_string()),
        })?;

        result
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let location = Path::from(key.to_string());
        let result: ObjectResult<_> = self.store.delete(&location).await;
        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                "S3 delete failed"
            );
            StorageError::DeleteFailed(e.to_string())
        })?;
        Ok(())
    }

    async fn content_length(&self, key: &str) -> StorageResult<u64> {
        let location = Path::from(key.to_string());
        match self.store.head(&location).await {
            Ok(meta) => Ok(meta.size),
            Err(ObjectStoreError::NotFound { .. }) => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }
}
