//! Error types module
//!
//! All errors in the conversion path are unified under the `ConvertError`
//! enum. The taxonomy distinguishes configuration errors (encoder binary
//! unusable, fatal and never retried) from per-job failures (encoder exit,
//! timeout, storage I/O), because the orchestrator's fallback retry only
//! applies to the latter.

use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// The encoder binary is missing or not runnable. This is a deployment
    /// problem, not a per-job failure, and is never retried.
    #[error("Encoder unavailable: {0}")]
    EncoderUnavailable(String),

    #[error("Encoder exited with status {code}: {detail}")]
    EncoderFailed { code: i32, detail: String },

    #[error("Conversion timed out after {0:?}")]
    Timeout(Duration),

    #[error("Conversion cancelled")]
    Cancelled,

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// Fatal errors abort the job immediately, without the fallback retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConvertError::EncoderUnavailable(_) | ConvertError::UnsupportedFormat(_)
        )
    }

    /// Timeouts are surfaced distinctly so callers can decide whether a
    /// retry with a larger timeout is sensible.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConvertError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ConvertError::EncoderUnavailable("missing".into()).is_fatal());
        assert!(ConvertError::UnsupportedFormat("xyz".into()).is_fatal());
        assert!(!ConvertError::Storage("read reset".into()).is_fatal());
        assert!(!ConvertError::EncoderFailed {
            code: 1,
            detail: "boom".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_timeout_classification() {
        assert!(ConvertError::Timeout(Duration::from_secs(30)).is_timeout());
        assert!(!ConvertError::Cancelled.is_timeout());
    }

    #[test]
    fn test_display_includes_exit_code() {
        let err = ConvertError::EncoderFailed {
            code: 187,
            detail: "unknown codec".into(),
        };
        assert!(err.to_string().contains("187"));
    }
}
