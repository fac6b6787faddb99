//! In-memory Job Record store.
//!
//! Backs tests and single-node deployments without a database. Shares the
//! `JobStore` contract with the Postgres implementation, including the
//! status/output invariant.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use recode_core::models::{ConversionJob, JobStatus, ObjectLocation};
use recode_core::ConvertError;

use crate::job_store::JobStore;

#[derive(Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<Mutex<HashMap<Uuid, ConversionJob>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().expect("job store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, job: &ConversionJob) -> Result<(), ConvertError> {
        let mut jobs = self.jobs.lock().expect("job store lock poisoned");
        if jobs.contains_key(&job.id) {
            return Err(ConvertError::InvalidInput(format!(
                "job {} already exists",
                job.id
            )));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<ConversionJob>, ConvertError> {
        let jobs = self.jobs.lock().expect("job store lock poisoned");
        Ok(jobs.get(&id).cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        output: Option<ObjectLocation>,
        error: Option<String>,
    ) -> Result<(), ConvertError> {
        ConversionJob::check_invariant(status, output.as_ref())?;

        let mut jobs = self.jobs.lock().expect("job store lock poisoned");
        let job = jobs.get_mut(&id).ok_or(ConvertError::JobNotFound(id))?;
        job.status = status;
        job.output = output;
        job.error = error;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<u64, ConvertError> {
        let mut jobs = self.jobs.lock().expect("job store lock poisoned");
        let now = Utc::now();
        let before = jobs.len();
        jobs.retain(|_, job| !job.is_expired(now));
        Ok((before - jobs.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use recode_core::models::MediaFormat;

    fn job() -> ConversionJob {
        ConversionJob::new(
            Uuid::new_v4(),
            ObjectLocation::new("bucket", "in/a.flac", 2048),
            MediaFormat::Wav,
            None,
            3600,
        )
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryJobStore::new();
        let j = job();
        store.create_job(&j).await.unwrap();

        let fetched = store.get_job(j.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Created);
        assert_eq!(fetched.input.key, "in/a.flac");
    }

    #[tokio::test]
    async fn test_missing_job_is_none() {
        let store = MemoryJobStore::new();
        assert!(store.get_job(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = MemoryJobStore::new();
        let j = job();
        store.create_job(&j).await.unwrap();
        assert!(store.create_job(&j).await.is_err());
    }

    #[tokio::test]
    async fn test_complete_requires_output() {
        let store = MemoryJobStore::new();
        let j = job();
        store.create_job(&j).await.unwrap();

        let err = store
            .update_status(j.id, JobStatus::Completed, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidInput(_)));

        store
            .update_status(
                j.id,
                JobStatus::Completed,
                Some(ObjectLocation::new("bucket", "out/a.wav", 4096)),
                None,
            )
            .await
            .unwrap();
        let fetched = store.get_job(j.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Completed);
        assert_eq!(fetched.output.unwrap().key, "out/a.wav");
    }

    #[tokio::test]
    async fn test_update_missing_job() {
        let store = MemoryJobStore::new();
        let err = store
            .update_status(Uuid::new_v4(), JobStatus::Processing, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let store = MemoryJobStore::new();
        let mut expired = job();
        expired.expires_at = Utc::now() - Duration::seconds(5);
        let live = job();
        store.create_job(&expired).await.unwrap();
        store.create_job(&live).await.unwrap();

        let purged = store.sweep_expired().await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.get_job(expired.id).await.unwrap().is_none());
        assert!(store.get_job(live.id).await.unwrap().is_some());
    }
}
