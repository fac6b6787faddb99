use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ConvertError;
use crate::models::format::MediaFormat;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Processing,
    Completed,
    Failed,
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobStatus::Created => write!(f, "created"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(JobStatus::Created),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(ConvertError::InvalidInput(format!(
                "Invalid job status: {}",
                other
            ))),
        }
    }
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Where an object lives in the object store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectLocation {
    /// Identifier of the backing store (bucket name, local root label).
    pub store_id: String,
    pub key: String,
    pub size_bytes: u64,
}

impl ObjectLocation {
    pub fn new(store_id: impl Into<String>, key: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            store_id: store_id.into(),
            key: key.into(),
            size_bytes,
        }
    }
}

/// Durable record of a conversion request's lifecycle.
///
/// Mutated only by the orchestrator driving the job; purged by the expiry
/// sweep after `expires_at`. Invariant: `output` is set if and only if
/// `status` is `Completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub input: ObjectLocation,
    pub output: Option<ObjectLocation>,
    pub output_format: MediaFormat,
    /// Requested audio bitrate in kbit/s, when the caller asked for one.
    pub bitrate_kbps: Option<u32>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ConversionJob {
    pub fn new(
        id: Uuid,
        input: ObjectLocation,
        output_format: MediaFormat,
        bitrate_kbps: Option<u32>,
        ttl_secs: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Created,
            input,
            output: None,
            output_format,
            bitrate_kbps,
            error: None,
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::seconds(ttl_secs),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Checks the status/output invariant. Stores call this before
    /// persisting a transition.
    pub fn check_invariant(
        status: JobStatus,
        output: Option<&ObjectLocation>,
    ) -> Result<(), ConvertError> {
        match (status, output) {
            (JobStatus::Completed, None) => Err(ConvertError::InvalidInput(
                "completed job requires an output location".to_string(),
            )),
            (JobStatus::Completed, Some(_)) => Ok(()),
            (_, Some(_)) => Err(ConvertError::InvalidInput(format!(
                "output location is only valid for completed jobs, got {}",
                status
            ))),
            (_, None) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> ObjectLocation {
        ObjectLocation::new("bucket", "in/song.flac", 1024)
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            JobStatus::Created,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<JobStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Created.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_new_job_starts_created() {
        let job = ConversionJob::new(Uuid::new_v4(), location(), MediaFormat::Wav, None, 3600);
        assert_eq!(job.status, JobStatus::Created);
        assert!(job.output.is_none());
        assert!(job.error.is_none());
        assert!(job.expires_at > job.created_at);
    }

    #[test]
    fn test_invariant_completed_requires_output() {
        assert!(ConversionJob::check_invariant(JobStatus::Completed, None).is_err());
        assert!(ConversionJob::check_invariant(JobStatus::Completed, Some(&location())).is_ok());
    }

    #[test]
    fn test_invariant_output_only_when_completed() {
        assert!(ConversionJob::check_invariant(JobStatus::Processing, Some(&location())).is_err());
        assert!(ConversionJob::check_invariant(JobStatus::Failed, None).is_ok());
    }

    #[test]
    fn test_expiry() {
        let mut job = ConversionJob::new(Uuid::new_v4(), location(), MediaFormat::Mp3, None, 3600);
        assert!(!job.is_expired(Utc::now()));
        job.expires_at = Utc::now() - Duration::seconds(1);
        assert!(job.is_expired(Utc::now()));
    }
}
