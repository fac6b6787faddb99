use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use recode_core::models::{JobStatus, Phase, ProgressEntry, FAILED_PERCENT};
use recode_db::JobStore;

use crate::progress::cache::ProgressCache;

/// Writes that fail are retried this many times before being dropped.
const WRITE_ATTEMPTS: u32 = 3;
const WRITE_BACKOFF_BASE_MS: u64 = 50;

/// Tiered progress store.
///
/// All mutators write to the ephemeral tier with bounded retry and never
/// raise: losing a progress update must never fail a conversion. `get`
/// reads through to the durable Job Record when the ephemeral tier cannot
/// answer, deriving a coarse entry from the job's lifecycle status.
pub struct ProgressStore {
    cache: Arc<dyn ProgressCache>,
    jobs: Arc<dyn JobStore>,
    ttl_secs: i64,
}

impl ProgressStore {
    pub fn new(cache: Arc<dyn ProgressCache>, jobs: Arc<dyn JobStore>, ttl_secs: i64) -> Self {
        Self {
            cache,
            jobs,
            ttl_secs,
        }
    }

    /// Seeds a fresh entry for a job about to start.
    pub async fn init(&self, job_id: Uuid) {
        self.write_best_effort(ProgressEntry::new(job_id, self.ttl_secs))
            .await;
    }

    /// Applies a phase-scoped update. Regressive updates are dropped by
    /// the entry itself, so concurrent reporters need no coordination.
    pub async fn report(
        &self,
        job_id: Uuid,
        phase: Phase,
        percent: f32,
        stage: &str,
        elapsed: Option<String>,
        total: Option<String>,
    ) {
        let mut entry = self.current_or_new(job_id).await;
        if entry.apply_media_time(phase, percent, stage, elapsed, total) {
            self.write_best_effort(entry).await;
        }
    }

    pub async fn mark_complete(&self, job_id: Uuid) {
        let mut entry = self.current_or_new(job_id).await;
        entry.mark_completed();
        self.write_best_effort(entry).await;
    }

    pub async fn mark_failed(&self, job_id: Uuid, reason: &str) {
        let mut entry = self.current_or_new(job_id).await;
        entry.mark_failed(reason);
        self.write_best_effort(entry).await;
    }

    /// Reads the ephemeral tier first; on a miss or tier error, derives a
    /// coarse entry from the durable Job Record. `None` means the job is
    /// unknown to both tiers (callers treat it as "not found", not as an
    /// error).
    pub async fn get(&self, job_id: Uuid) -> Option<ProgressEntry> {
        match self.cache.get(job_id).await {
            Ok(Some(entry)) => return Some(entry),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    job_id = %job_id,
                    error = %e,
                    "Progress cache read failed, deriving from job record"
                );
            }
        }

        match self.jobs.get_job(job_id).await {
            Ok(Some(job)) => Some(self.entry_from_status(job_id, job.status, job.error)),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(
                    job_id = %job_id,
                    error = %e,
                    "Job record read failed during progress fallback"
                );
                None
            }
        }
    }

    /// Purges expired ephemeral entries, returning how many were removed.
    pub async fn sweep_expired(&self) -> u64 {
        match self.cache.sweep_expired().await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "Progress cache sweep failed");
                0
            }
        }
    }

    /// Coarse mapping from the durable lifecycle status. The fixed 50%
    /// for processing is a deliberate loss of granularity: the durable
    /// tier cannot tell "just started" from "almost done".
    fn entry_from_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error: Option<String>,
    ) -> ProgressEntry {
        let mut entry = ProgressEntry::new(job_id, self.ttl_secs);
        match status {
            JobStatus::Created => {
                entry.percent = 0.0;
                entry.phase = Phase::Upload;
                entry.stage = "queued".to_string();
            }
            JobStatus::Processing => {
                entry.percent = 50.0;
                entry.phase = Phase::Conversion;
                entry.stage = "processing".to_string();
            }
            JobStatus::Completed => {
                entry.percent = 100.0;
                entry.phase = Phase::Completed;
                entry.stage = "completed".to_string();
            }
            JobStatus::Failed => {
                entry.percent = FAILED_PERCENT;
                entry.phase = Phase::Failed;
                entry.stage = "failed".to_string();
                entry.error = error;
            }
        }
        entry
    }

    async fn current_or_new(&self, job_id: Uuid) -> ProgressEntry {
        match self.cache.get(job_id).await {
            Ok(Some(entry)) => entry,
            Ok(None) => ProgressEntry::new(job_id, self.ttl_secs),
            Err(_) => ProgressEntry::new(job_id, self.ttl_secs),
        }
    }

    /// The single place the non-fatal write policy lives: bounded retry
    /// with exponential backoff, then a warning and a silent drop.
    async fn write_best_effort(&self, entry: ProgressEntry) {
        let job_id = entry.job_id;
        let mut backoff = Duration::from_millis(WRITE_BACKOFF_BASE_MS);

        for attempt in 1..=WRITE_ATTEMPTS {
            match self.cache.put(entry.clone()).await {
                Ok(()) => return,
                Err(e) if attempt == WRITE_ATTEMPTS => {
                    tracing::warn!(
                        job_id = %job_id,
                        error = %e,
                        attempts = WRITE_ATTEMPTS,
                        "Dropping progress update after retries"
                    );
                }
                Err(_) => {
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use recode_core::models::{ConversionJob, MediaFormat, ObjectLocation};
    use recode_db::MemoryJobStore;

    use crate::progress::cache::{CacheError, MemoryProgressCache};

    /// An ephemeral tier that is always down.
    struct FailingCache;

    #[async_trait]
    impl ProgressCache for FailingCache {
        async fn put(&self, _entry: ProgressEntry) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn get(&self, _job_id: Uuid) -> Result<Option<ProgressEntry>, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn remove(&self, _job_id: Uuid) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn sweep_expired(&self) -> Result<u64, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
    }

    fn location() -> ObjectLocation {
        ObjectLocation::new("bucket", "in/song.mp3", 2048)
    }

    async fn job_with_status(
        jobs: &MemoryJobStore,
        status: JobStatus,
        output: Option<ObjectLocation>,
        error: Option<String>,
    ) -> Uuid {
        let job = ConversionJob::new(Uuid::new_v4(), location(), MediaFormat::Wav, None, 3600);
        let id = job.id;
        jobs.create_job(&job).await.unwrap();
        if status != JobStatus::Created {
            jobs.update_status(id, status, output, error).await.unwrap();
        }
        id
    }

    #[tokio::test]
    async fn test_fine_grained_entry_served_from_cache() {
        let cache = Arc::new(MemoryProgressCache::new());
        let jobs = Arc::new(MemoryJobStore::new());
        let store = ProgressStore::new(cache, jobs, 3600);

        let job_id = Uuid::new_v4();
        store.init(job_id).await;
        store
            .report(job_id, Phase::Conversion, 37.5, "converting", None, None)
            .await;

        let entry = store.get(job_id).await.unwrap();
        assert_eq!(entry.phase, Phase::Conversion);
        assert_eq!(entry.percent, 37.5);
    }

    #[tokio::test]
    async fn test_fallback_table_when_cache_is_down() {
        let jobs = Arc::new(MemoryJobStore::new());
        let store = ProgressStore::new(Arc::new(FailingCache), jobs.clone(), 3600);

        let cases = [
            (JobStatus::Created, None, None, 0.0, Phase::Upload),
            (JobStatus::Processing, None, None, 50.0, Phase::Conversion),
            (
                JobStatus::Completed,
                Some(ObjectLocation::new("bucket", "out/song.wav", 512)),
                None,
                100.0,
                Phase::Completed,
            ),
            (
                JobStatus::Failed,
                None,
                Some("encoder exited with status 1".to_string()),
                FAILED_PERCENT,
                Phase::Failed,
            ),
        ];

        for (status, output, error, expected_percent, expected_phase) in cases {
            let id = job_with_status(&jobs, status, output, error.clone()).await;
            let entry = store.get(id).await.unwrap();
            assert_eq!(entry.percent, expected_percent);
            assert_eq!(entry.phase, expected_phase);
            if status == JobStatus::Failed {
                assert_eq!(entry.error, error);
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_job_is_absent_not_an_error() {
        let jobs = Arc::new(MemoryJobStore::new());
        let store = ProgressStore::new(Arc::new(FailingCache), jobs, 3600);
        assert!(store.get(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_writes_never_raise_when_cache_is_down() {
        let jobs = Arc::new(MemoryJobStore::new());
        let store = ProgressStore::new(Arc::new(FailingCache), jobs, 3600);

        let job_id = Uuid::new_v4();
        store.init(job_id).await;
        store
            .report(job_id, Phase::Upload, 10.0, "downloading input", None, None)
            .await;
        store.mark_complete(job_id).await;
        store.mark_failed(job_id, "late failure").await;
    }

    #[tokio::test]
    async fn test_progress_bounds_hold_through_fallback() {
        let jobs = Arc::new(MemoryJobStore::new());
        let store = ProgressStore::new(Arc::new(FailingCache), jobs.clone(), 3600);

        for status in [
            JobStatus::Created,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            let output = (status == JobStatus::Completed)
                .then(|| ObjectLocation::new("bucket", "out/x.wav", 1));
            let error = (status == JobStatus::Failed).then(|| "boom".to_string());
            let id = job_with_status(&jobs, status, output, error).await;
            let entry = store.get(id).await.unwrap();
            assert!((-1.0..=100.0).contains(&entry.percent));
        }
    }

    #[tokio::test]
    async fn test_terminal_marks_land_in_cache() {
        let cache = Arc::new(MemoryProgressCache::new());
        let jobs = Arc::new(MemoryJobStore::new());
        let store = ProgressStore::new(cache, jobs, 3600);

        let job_id = Uuid::new_v4();
        store.init(job_id).await;
        store.mark_failed(job_id, "encoder exited with status 2").await;

        let entry = store.get(job_id).await.unwrap();
        assert_eq!(entry.phase, Phase::Failed);
        assert_eq!(entry.percent, FAILED_PERCENT);
        assert_eq!(
            entry.error.as_deref(),
            Some("encoder exited with status 2")
        );
    }
}
