use futures::StreamExt;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::ChildStderr;
use uuid::Uuid;

use recode_core::models::{ConversionJob, JobStatus, MediaFormat, ObjectLocation, Phase};
use recode_core::{ConvertError, ConverterConfig};
use recode_db::JobStore;
use recode_storage::ObjectStorage;

use crate::compat::check_compatibility;
use crate::encoder::args::{build_file_args, build_streaming_args};
use crate::encoder::parser::ParserState;
use crate::encoder::process::{EncoderProcess, ProcessRegistry};
use crate::progress::reporter::PhaseReporter;
use crate::progress::store::ProgressStore;

/// Lines of stderr kept for the error detail of a failed run.
const STDERR_TAIL_LINES: usize = 8;

/// Terminal outcome of one conversion request.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    pub job_id: Uuid,
    pub success: bool,
    pub output: Option<ObjectLocation>,
    pub error: Option<String>,
    /// Whether the file-based path produced the output (either because the
    /// pair was ineligible for streaming, or as the automatic retry after
    /// a streaming failure).
    pub fallback_used: bool,
    pub processing_time_ms: u64,
}

/// Drives one job through its phases.
///
/// Streaming is attempted first for eligible format pairs; any non-fatal
/// streaming failure is retried exactly once through the file-based
/// fallback. Every phase transition goes to the progress store, every
/// terminal outcome to the job record, so the status query and the
/// progress query always agree.
pub struct ConversionOrchestrator {
    config: ConverterConfig,
    storage: Arc<dyn ObjectStorage>,
    jobs: Arc<dyn JobStore>,
    progress: Arc<ProgressStore>,
    registry: ProcessRegistry,
}

impl ConversionOrchestrator {
    pub fn new(
        config: ConverterConfig,
        storage: Arc<dyn ObjectStorage>,
        jobs: Arc<dyn JobStore>,
        progress: Arc<ProgressStore>,
        registry: ProcessRegistry,
    ) -> Self {
        Self {
            config,
            storage,
            jobs,
            progress,
            registry,
        }
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub async fn run(
        &self,
        job: &ConversionJob,
        timeout_override_secs: Option<u64>,
    ) -> ConversionResult {
        let started = Instant::now();
        self.progress.init(job.id).await;

        tracing::info!(
            job_id = %job.id,
            input_key = %job.input.key,
            output_format = %job.output_format,
            size_bytes = job.input.size_bytes,
            "Starting conversion"
        );

        let (outcome, fallback_used) = self.drive(job, timeout_override_secs).await;

        match outcome {
            Ok(output) => {
                if let Err(e) = self
                    .jobs
                    .update_status(job.id, JobStatus::Completed, Some(output.clone()), None)
                    .await
                {
                    let msg = format!("conversion succeeded but the job record write failed: {}", e);
                    tracing::error!(job_id = %job.id, error = %e, "Job record finalization failed");
                    self.progress.mark_failed(job.id, &msg).await;
                    return self.failure(job.id, msg, fallback_used, started);
                }
                self.progress.mark_complete(job.id).await;

                tracing::info!(
                    job_id = %job.id,
                    output_key = %output.key,
                    size_bytes = output.size_bytes,
                    fallback_used,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Conversion completed"
                );

                ConversionResult {
                    job_id: job.id,
                    success: true,
                    output: Some(output),
                    error: None,
                    fallback_used,
                    processing_time_ms: started.elapsed().as_millis() as u64,
                }
            }
            Err(e) => {
                let msg = e.to_string();
                if let Err(db_err) = self
                    .jobs
                    .update_status(job.id, JobStatus::Failed, None, Some(msg.clone()))
                    .await
                {
                    tracing::error!(job_id = %job.id, error = %db_err, "Failed to record job failure");
                }
                self.progress.mark_failed(job.id, &msg).await;

                tracing::warn!(
                    job_id = %job.id,
                    error = %msg,
                    fallback_used,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Conversion failed"
                );

                self.failure(job.id, msg, fallback_used, started)
            }
        }
    }

    fn failure(
        &self,
        job_id: Uuid,
        error: String,
        fallback_used: bool,
        started: Instant,
    ) -> ConversionResult {
        ConversionResult {
            job_id,
            success: false,
            output: None,
            error: Some(error),
            fallback_used,
            processing_time_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Picks a path and drives it, returning the output location and
    /// whether the fallback produced it.
    async fn drive(
        &self,
        job: &ConversionJob,
        timeout_override_secs: Option<u64>,
    ) -> (Result<ObjectLocation, ConvertError>, bool) {
        let input_format = match input_format_from_key(&job.input.key) {
            Ok(f) => f,
            Err(e) => return (Err(e), false),
        };

        if let Err(e) = self
            .jobs
            .update_status(job.id, JobStatus::Processing, None, None)
            .await
        {
            return (Err(e), false);
        }

        let output_key = format!("converted/{}.{}", job.id, job.output_format.extension());
        let compat = check_compatibility(input_format, job.output_format);

        if compat.supports_streaming {
            match self
                .attempt_streaming(job, &output_key, timeout_override_secs)
                .await
            {
                Ok(output) => return (Ok(output), false),
                // A fatal error or an explicit cancellation ends the job
                // here; only ordinary streaming failures earn the retry.
                Err(e) if e.is_fatal() || matches!(e, ConvertError::Cancelled) => {
                    return (Err(e), false)
                }
                Err(e) => {
                    // The single automatic retry in the system.
                    tracing::warn!(
                        job_id = %job.id,
                        error = %e,
                        "Streaming path failed, retrying via fallback"
                    );
                }
            }
        } else {
            tracing::info!(
                job_id = %job.id,
                reason = compat.reason.as_deref().unwrap_or(""),
                "Format pair is not streamable, using fallback path"
            );
        }

        let result = self
            .attempt_fallback(job, input_format, &output_key, timeout_override_secs)
            .await;
        (result, true)
    }

    /// Streaming path: download stream into the encoder's stdin, encoder
    /// stdout into an object-store upload, stderr into the progress
    /// parser. All three run concurrently; a subprocess whose output is
    /// not drained blocks once its pipe buffer fills.
    async fn attempt_streaming(
        &self,
        job: &ConversionJob,
        output_key: &str,
        timeout_override_secs: Option<u64>,
    ) -> Result<ObjectLocation, ConvertError> {
        let (mut stream, input_size) = self
            .storage
            .download_stream(&job.input.key)
            .await
            .map_err(|e| ConvertError::Storage(e.to_string()))?;

        let args = build_streaming_args(job.output_format, job.bitrate_kbps);
        let mut process = EncoderProcess::spawn(&self.config.ffmpeg_path, &args, true)?;

        let mut stdin = process
            .take_stdin()
            .ok_or_else(|| ConvertError::Internal("encoder stdin not piped".into()))?;
        let stdout = process
            .take_stdout()
            .ok_or_else(|| ConvertError::Internal("encoder stdout not piped".into()))?;
        let stderr = process
            .take_stderr()
            .ok_or_else(|| ConvertError::Internal("encoder stderr not piped".into()))?;

        let token = self.registry.register(job.id);
        let bytes_fed = Arc::new(AtomicU64::new(0));

        let feeder = {
            let reporter = self.reporter(job.id, Phase::Upload, "downloading input");
            let bytes_fed = Arc::clone(&bytes_fed);
            let cap = self.config.download_progress_cap;
            tokio::spawn(async move {
                let mut fed: u64 = 0;
                while let Some(chunk) = stream.next().await {
                    let chunk =
                        chunk.map_err(|e| ConvertError::Storage(e.to_string()))?;
                    if stdin.write_all(&chunk).await.is_err() {
                        // Encoder exited early; its status carries the story.
                        break;
                    }
                    fed += chunk.len() as u64;
                    bytes_fed.store(fed, Ordering::Relaxed);
                    if input_size > 0 {
                        let percent =
                            ((fed as f32 / input_size as f32) * 100.0).min(cap * 100.0);
                        reporter.report(percent).await;
                    }
                }
                // Dropping stdin delivers EOF so the encoder can finish.
                drop(stdin);
                Ok::<(), ConvertError>(())
            })
        };

        let uploader = {
            let storage = Arc::clone(&self.storage);
            let key = output_key.to_string();
            tokio::spawn(async move {
                storage
                    .upload_stream(&key, Box::pin(stdout), None, None)
                    .await
            })
        };

        let stderr_task = self.spawn_stderr_parser(
            job.id,
            stderr,
            Some(input_size),
            Some(Arc::clone(&bytes_fed)),
        );

        let deadline = self.config.deadline_for(input_size, timeout_override_secs);
        let wait_result = process
            .wait(deadline, self.config.kill_grace(), token)
            .await;
        self.registry.deregister(job.id);

        let status = match wait_result {
            Ok(status) => status,
            Err(e) => {
                // The child is dead, so its stdout has hit EOF. Let the
                // uploader run down on its own: a part failure triggers the
                // multipart abort inside the store, and a committed
                // truncated object is deleted below. Aborting the task
                // instead would strand uncommitted parts.
                feeder.abort();
                stderr_task.abort();
                let _ = uploader.await;
                self.discard_partial_output(output_key).await;
                return Err(e);
            }
        };

        let stderr_tail = stderr_task.await.unwrap_or_default();
        let feed_result = feeder
            .await
            .unwrap_or_else(|e| Err(ConvertError::Internal(format!("feeder task failed: {}", e))));
        let upload_result = uploader.await.unwrap_or_else(|e| {
            Err(recode_storage::StorageError::UploadFailed(format!(
                "upload task failed: {}",
                e
            )))
        });

        if !status.success() {
            self.discard_partial_output(output_key).await;
            return Err(ConvertError::EncoderFailed {
                code: status.code().unwrap_or(-1),
                detail: stderr_tail,
            });
        }

        if let Err(e) = feed_result {
            // The encoder saw a premature EOF and may have produced a
            // truncated but "successful" output.
            self.discard_partial_output(output_key).await;
            return Err(e);
        }

        let uploaded = upload_result.map_err(|e| ConvertError::Storage(e.to_string()))?;

        self.progress
            .report(job.id, Phase::StoreUpload, 100.0, "uploading output", None, None)
            .await;

        Ok(ObjectLocation::new(
            self.storage.store_id(),
            output_key,
            uploaded,
        ))
    }

    /// Fallback path: download the input fully to scratch, run the encoder
    /// file-to-file, upload the result.
    async fn attempt_fallback(
        &self,
        job: &ConversionJob,
        input_format: MediaFormat,
        output_key: &str,
        timeout_override_secs: Option<u64>,
    ) -> Result<ObjectLocation, ConvertError> {
        let scratch = self.scratch_dir()?;
        let input_path = scratch.path().join(format!("input.{}", input_format.extension()));
        let output_path = scratch
            .path()
            .join(format!("output.{}", job.output_format.extension()));

        let input_size = self.download_to_file(job, &input_path).await?;

        let args = build_file_args(&input_path, &output_path, job.output_format, job.bitrate_kbps);
        let mut process = EncoderProcess::spawn(&self.config.ffmpeg_path, &args, false)?;
        let stderr = process
            .take_stderr()
            .ok_or_else(|| ConvertError::Internal("encoder stderr not piped".into()))?;

        let token = self.registry.register(job.id);
        let stderr_task = self.spawn_stderr_parser(job.id, stderr, None, None);

        let deadline = self.config.deadline_for(input_size, timeout_override_secs);
        let wait_result = process
            .wait(deadline, self.config.kill_grace(), token)
            .await;
        self.registry.deregister(job.id);

        let status = wait_result?;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(ConvertError::EncoderFailed {
                code: status.code().unwrap_or(-1),
                detail: stderr_tail,
            });
        }

        let size = tokio::fs::metadata(&output_path)
            .await
            .map_err(|e| ConvertError::Internal(format!("encoder produced no output: {}", e)))?
            .len();
        let output_file = tokio::fs::File::open(&output_path)
            .await
            .map_err(|e| ConvertError::Internal(format!("failed to open output: {}", e)))?;

        let reporter = self.reporter(job.id, Phase::StoreUpload, "uploading output");
        let callback = reporter.byte_callback(size, 1.0);
        let uploaded = self
            .storage
            .upload_stream(output_key, Box::pin(output_file), Some(size), Some(callback))
            .await
            .map_err(|e| ConvertError::Storage(e.to_string()))?;

        self.progress
            .report(job.id, Phase::StoreUpload, 100.0, "uploading output", None, None)
            .await;

        if let Err(e) = scratch.close() {
            tracing::warn!(job_id = %job.id, error = %e, "Failed to remove scratch directory");
        }

        Ok(ObjectLocation::new(
            self.storage.store_id(),
            output_key,
            uploaded,
        ))
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir, ConvertError> {
        let builder_result = match &self.config.scratch_dir {
            Some(base) => tempfile::Builder::new().prefix("recode-").tempdir_in(base),
            None => tempfile::Builder::new().prefix("recode-").tempdir(),
        };
        builder_result
            .map_err(|e| ConvertError::Internal(format!("failed to create scratch directory: {}", e)))
    }

    async fn download_to_file(
        &self,
        job: &ConversionJob,
        path: &std::path::Path,
    ) -> Result<u64, ConvertError> {
        let (mut stream, input_size) = self
            .storage
            .download_stream(&job.input.key)
            .await
            .map_err(|e| ConvertError::Storage(e.to_string()))?;

        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| ConvertError::Internal(format!("failed to create scratch file: {}", e)))?;

        let reporter = self.reporter(job.id, Phase::Upload, "downloading input");
        let cap = self.config.download_progress_cap;
        let mut fed: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ConvertError::Storage(e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| ConvertError::Internal(format!("scratch write failed: {}", e)))?;
            fed += chunk.len() as u64;
            if input_size > 0 {
                let percent = ((fed as f32 / input_size as f32) * 100.0).min(cap * 100.0);
                reporter.report(percent).await;
            }
        }

        file.flush()
            .await
            .map_err(|e| ConvertError::Internal(format!("scratch flush failed: {}", e)))?;

        Ok(input_size)
    }

    /// Drains the encoder's stderr through the parser, reporting throttled
    /// conversion progress, and returns the last few lines for error
    /// context.
    fn spawn_stderr_parser(
        &self,
        job_id: Uuid,
        stderr: ChildStderr,
        declared_input_bytes: Option<u64>,
        bytes_fed: Option<Arc<AtomicU64>>,
    ) -> tokio::task::JoinHandle<String> {
        let reporter = self.reporter(job_id, Phase::Conversion, "converting");
        tokio::spawn(async move {
            let mut state = ParserState::new(declared_input_bytes);
            let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut lines = BufReader::new(stderr).lines();

            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(update) = state.observe_line(&line) {
                    reporter
                        .report_media_time(update.percent, update.elapsed, update.total)
                        .await;
                } else if let Some(fed) = &bytes_fed {
                    if let Some(percent) = state.observe_bytes(fed.load(Ordering::Relaxed)) {
                        reporter.report(percent).await;
                    }
                }

                if !line.trim().is_empty() {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }

            tail.into_iter().collect::<Vec<_>>().join("\n")
        })
    }

    async fn discard_partial_output(&self, output_key: &str) {
        if let Err(e) = self.storage.delete(output_key).await {
            tracing::warn!(
                key = %output_key,
                error = %e,
                "Failed to delete partial output object"
            );
        }
    }

    fn reporter(&self, job_id: Uuid, phase: Phase, stage: &str) -> Arc<PhaseReporter> {
        PhaseReporter::new(
            Arc::clone(&self.progress),
            job_id,
            phase,
            stage,
            self.config.progress_throttle(),
            self.config.progress_min_delta_percent,
        )
    }
}

/// The input format is carried by the input key's extension; a key without
/// a recognizable one is rejected before any subprocess is spawned.
fn input_format_from_key(key: &str) -> Result<MediaFormat, ConvertError> {
    let ext = std::path::Path::new(key)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| {
            ConvertError::InvalidInput(format!("input key has no format extension: {}", key))
        })?;
    ext.parse()
}
