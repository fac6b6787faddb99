use async_trait::async_trait;
use uuid::Uuid;

use recode_core::models::{ConversionJob, JobStatus, ObjectLocation};
use recode_core::ConvertError;

/// Durable store of Job Records, keyed by job id.
///
/// Records carry a time-to-live; `sweep_expired` purges records past
/// theirs. A missing record is `Ok(None)`, never an error, so that the
/// progress fallback path can treat "unknown" as "not found".
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: &ConversionJob) -> Result<(), ConvertError>;

    async fn get_job(&self, id: Uuid) -> Result<Option<ConversionJob>, ConvertError>;

    /// Transitions a job's lifecycle status. The `output` location may only
    /// accompany `Completed`; `error` may only accompany `Failed`.
    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        output: Option<ObjectLocation>,
        error: Option<String>,
    ) -> Result<(), ConvertError>;

    /// Removes records whose expiry has passed, returning how many were
    /// purged.
    async fn sweep_expired(&self) -> Result<u64, ConvertError>;
}
