use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ConvertError;

/// Percentage value reserved to mean "failed".
pub const FAILED_PERCENT: f32 = -1.0;

/// Ordered stages of a conversion. Each phase has its own independent
/// 0-100 progress scale; percentages are never blended across phases.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Upload,
    Conversion,
    StoreUpload,
    Completed,
    Failed,
}

impl Phase {
    /// Rank in the forward progression. `Failed` is an absorbing state
    /// reachable from anywhere, so it ranks above everything.
    fn rank(&self) -> u8 {
        match self {
            Phase::Upload => 0,
            Phase::Conversion => 1,
            Phase::StoreUpload => 2,
            Phase::Completed => 3,
            Phase::Failed => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Phase::Upload => write!(f, "upload"),
            Phase::Conversion => write!(f, "conversion"),
            Phase::StoreUpload => write!(f, "store-upload"),
            Phase::Completed => write!(f, "completed"),
            Phase::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for Phase {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(Phase::Upload),
            "conversion" => Ok(Phase::Conversion),
            "store-upload" => Ok(Phase::StoreUpload),
            "completed" => Ok(Phase::Completed),
            "failed" => Ok(Phase::Failed),
            other => Err(ConvertError::InvalidInput(format!(
                "Invalid phase: {}",
                other
            ))),
        }
    }
}

/// A point-in-time progress estimate for one job.
///
/// `apply` enforces the monotonicity invariant: phases only move forward
/// (or jump to `Failed`), and the percentage within a phase never
/// decreases. Regressive updates are silently dropped, which lets
/// concurrent reporters write without coordinating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub job_id: Uuid,
    /// Completion percentage in `[-1, 100]`; `-1` means failed.
    pub percent: f32,
    /// Human-readable stage label.
    pub stage: String,
    pub phase: Phase,
    /// Media-time elapsed (e.g. "00:01:23.45"), when the encoder reports it.
    pub elapsed: Option<String>,
    /// Declared total media time, when known.
    pub total: Option<String>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ProgressEntry {
    pub fn new(job_id: Uuid, ttl_secs: i64) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            percent: 0.0,
            stage: "queued".to_string(),
            phase: Phase::Upload,
            elapsed: None,
            total: None,
            error: None,
            updated_at: now,
            expires_at: now + Duration::seconds(ttl_secs),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Applies an update, returning whether anything changed. Terminal
    /// entries, backwards phase moves, and within-phase regressions are
    /// all no-ops.
    pub fn apply(&mut self, phase: Phase, percent: f32, stage: &str) -> bool {
        if self.phase.is_terminal() {
            return false;
        }
        let percent = percent.clamp(0.0, 100.0);
        match phase.rank().cmp(&self.phase.rank()) {
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Greater => {
                // Entering a new phase resets the percentage scale.
                self.phase = phase;
                self.percent = if phase == Phase::Completed {
                    100.0
                } else {
                    percent
                };
                self.stage = stage.to_string();
                self.elapsed = None;
                self.updated_at = Utc::now();
                true
            }
            std::cmp::Ordering::Equal => {
                if percent <= self.percent {
                    return false;
                }
                self.percent = percent;
                self.stage = stage.to_string();
                self.updated_at = Utc::now();
                true
            }
        }
    }

    pub fn apply_media_time(
        &mut self,
        phase: Phase,
        percent: f32,
        stage: &str,
        elapsed: Option<String>,
        total: Option<String>,
    ) -> bool {
        let changed = self.apply(phase, percent, stage);
        if changed {
            if elapsed.is_some() {
                self.elapsed = elapsed;
            }
            if total.is_some() {
                self.total = total;
            }
        }
        changed
    }

    pub fn mark_completed(&mut self) {
        if self.phase == Phase::Failed {
            return;
        }
        self.phase = Phase::Completed;
        self.percent = 100.0;
        self.stage = "completed".to_string();
        self.error = None;
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, reason: &str) {
        self.phase = Phase::Failed;
        self.percent = FAILED_PERCENT;
        self.stage = "failed".to_string();
        self.error = Some(reason.to_string());
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ProgressEntry {
        ProgressEntry::new(Uuid::new_v4(), 3600)
    }

    #[test]
    fn test_phase_round_trip() {
        for phase in [
            Phase::Upload,
            Phase::Conversion,
            Phase::StoreUpload,
            Phase::Completed,
            Phase::Failed,
        ] {
            assert_eq!(phase.to_string().parse::<Phase>().unwrap(), phase);
        }
    }

    #[test]
    fn test_forward_progression() {
        let mut e = entry();
        assert!(e.apply(Phase::Upload, 40.0, "downloading input"));
        assert!(e.apply(Phase::Conversion, 0.0, "converting"));
        assert_eq!(e.phase, Phase::Conversion);
        assert_eq!(e.percent, 0.0);
        assert!(e.apply(Phase::StoreUpload, 50.0, "uploading output"));
        assert!(e.apply(Phase::Completed, 0.0, "completed"));
        assert_eq!(e.percent, 100.0);
    }

    #[test]
    fn test_phase_never_regresses() {
        let mut e = entry();
        e.apply(Phase::Conversion, 30.0, "converting");
        assert!(!e.apply(Phase::Upload, 99.0, "downloading input"));
        assert_eq!(e.phase, Phase::Conversion);
        assert_eq!(e.percent, 30.0);
    }

    #[test]
    fn test_percent_never_regresses_within_phase() {
        let mut e = entry();
        e.apply(Phase::Conversion, 60.0, "converting");
        assert!(!e.apply(Phase::Conversion, 45.0, "converting"));
        assert_eq!(e.percent, 60.0);
    }

    #[test]
    fn test_new_phase_resets_percent() {
        let mut e = entry();
        e.apply(Phase::Upload, 95.0, "downloading input");
        e.apply(Phase::Conversion, 2.0, "converting");
        assert_eq!(e.percent, 2.0);
    }

    #[test]
    fn test_percent_clamped_to_bounds() {
        let mut e = entry();
        e.apply(Phase::Upload, 250.0, "downloading input");
        assert_eq!(e.percent, 100.0);
    }

    #[test]
    fn test_failed_is_absorbing() {
        let mut e = entry();
        e.apply(Phase::Conversion, 80.0, "converting");
        e.mark_failed("encoder exited with status 1");
        assert_eq!(e.percent, FAILED_PERCENT);
        assert!(!e.apply(Phase::StoreUpload, 10.0, "uploading output"));
        assert_eq!(e.phase, Phase::Failed);
        assert_eq!(e.error.as_deref(), Some("encoder exited with status 1"));
    }

    #[test]
    fn test_completed_is_terminal() {
        let mut e = entry();
        e.mark_completed();
        assert!(!e.apply(Phase::Conversion, 50.0, "converting"));
        assert_eq!(e.percent, 100.0);
    }

    #[test]
    fn test_media_time_recorded() {
        let mut e = entry();
        let changed = e.apply_media_time(
            Phase::Conversion,
            25.0,
            "converting",
            Some("00:01:15.00".to_string()),
            Some("00:05:00.00".to_string()),
        );
        assert!(changed);
        assert_eq!(e.elapsed.as_deref(), Some("00:01:15.00"));
        assert_eq!(e.total.as_deref(), Some("00:05:00.00"));
    }

    #[test]
    fn test_expiry() {
        let mut e = entry();
        assert!(!e.is_expired(Utc::now()));
        e.expires_at = Utc::now() - Duration::seconds(1);
        assert!(e.is_expired(Utc::now()));
    }
}
