use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use uuid::Uuid;

use recode_core::models::{ConversionJob, MediaFormat, ObjectLocation, ProgressEntry};
use recode_core::{ConvertError, ConverterConfig};
use recode_db::JobStore;
use recode_storage::ObjectStorage;

use crate::compat::{check_compatibility, Compatibility};
use crate::encoder::process::ProcessRegistry;
use crate::orchestrator::{ConversionOrchestrator, ConversionResult};
use crate::progress::cache::ProgressCache;
use crate::progress::store::ProgressStore;

/// Caller-facing facade over the conversion pipeline.
///
/// One instance serves many concurrent jobs; each `start_conversion` call
/// is an independent unit of work. `get_progress` is read-only and safe
/// to poll at high frequency.
pub struct ConversionService {
    config: ConverterConfig,
    jobs: Arc<dyn JobStore>,
    progress: Arc<ProgressStore>,
    registry: ProcessRegistry,
    orchestrator: ConversionOrchestrator,
}

impl ConversionService {
    pub fn new(
        config: ConverterConfig,
        storage: Arc<dyn ObjectStorage>,
        jobs: Arc<dyn JobStore>,
        cache: Arc<dyn ProgressCache>,
    ) -> Self {
        let progress = Arc::new(ProgressStore::new(
            cache,
            Arc::clone(&jobs),
            config.progress_ttl_secs,
        ));
        let registry = ProcessRegistry::new();
        let orchestrator = ConversionOrchestrator::new(
            config.clone(),
            storage,
            Arc::clone(&jobs),
            Arc::clone(&progress),
            registry.clone(),
        );

        Self {
            config,
            jobs,
            progress,
            registry,
            orchestrator,
        }
    }

    /// Creates the durable Job Record for a finalized input object. Done
    /// before conversion starts so a crash mid-conversion still leaves a
    /// queryable record.
    pub async fn create_job(
        &self,
        input: ObjectLocation,
        output_format: MediaFormat,
        bitrate_kbps: Option<u32>,
    ) -> Result<ConversionJob, ConvertError> {
        let job = ConversionJob::new(
            Uuid::new_v4(),
            input,
            output_format,
            bitrate_kbps,
            self.config.job_ttl_secs,
        );
        self.jobs.create_job(&job).await?;
        Ok(job)
    }

    /// Runs a conversion to completion. Long-running; callers typically
    /// spawn this and poll `get_progress`.
    pub async fn start_conversion(
        &self,
        job_id: Uuid,
        timeout_override_secs: Option<u64>,
    ) -> Result<ConversionResult, ConvertError> {
        let job = self
            .jobs
            .get_job(job_id)
            .await?
            .ok_or(ConvertError::JobNotFound(job_id))?;
        Ok(self.orchestrator.run(&job, timeout_override_secs).await)
    }

    /// Current progress for a job, or `None` when both tiers have never
    /// heard of it.
    pub async fn get_progress(&self, job_id: Uuid) -> Option<ProgressEntry> {
        self.progress.get(job_id).await
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Option<ConversionJob>, ConvertError> {
        self.jobs.get_job(job_id).await
    }

    pub fn check_compatibility(
        &self,
        input: MediaFormat,
        output: MediaFormat,
    ) -> Compatibility {
        check_compatibility(input, output)
    }

    pub fn cancel(&self, job_id: Uuid) -> bool {
        self.registry.cancel(job_id)
    }

    /// Terminates every in-flight subprocess. Used at process shutdown.
    pub fn cleanup_all(&self) -> usize {
        self.registry.cancel_all()
    }

    /// One sweep over both tiers: expired progress entries and expired
    /// job records.
    pub async fn sweep_expired(&self) -> (u64, u64) {
        let progress_purged = self.progress.sweep_expired().await;
        let jobs_purged = match self.jobs.sweep_expired().await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "Job record sweep failed");
                0
            }
        };
        (progress_purged, jobs_purged)
    }
}

/// Background service that periodically purges expired progress entries
/// and job records.
pub struct ExpirySweeper {
    shutdown_tx: mpsc::Sender<()>,
}

impl ExpirySweeper {
    pub fn spawn(service: Arc<ConversionService>, poll_interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            let mut tick = interval(poll_interval);

            tracing::info!(
                poll_interval_secs = poll_interval.as_secs(),
                "Expiry sweeper started"
            );

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let (progress_purged, jobs_purged) = service.sweep_expired().await;
                        if progress_purged > 0 || jobs_purged > 0 {
                            tracing::info!(
                                progress_purged,
                                jobs_purged,
                                "Expiry sweep removed entries"
                            );
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Expiry sweeper shutting down");
                        break;
                    }
                }
            }
        });

        Self { shutdown_tx }
    }

    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}
