//! Configuration module
//!
//! Env-driven configuration for the conversion pipeline. Every tuning
//! parameter has a documented default from `constants`; `from_env` never
//! fails on a missing variable, only on one that is present but invalid
//! in a way that cannot be defaulted.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::*;

/// Conversion pipeline configuration.
#[derive(Clone, Debug)]
pub struct ConverterConfig {
    /// Path to the encoder binary.
    pub ffmpeg_path: String,
    /// Scratch directory for the file-based fallback path. When unset a
    /// per-attempt temp directory under the system temp dir is used.
    pub scratch_dir: Option<PathBuf>,
    pub multipart_threshold_bytes: u64,
    pub multipart_part_size_bytes: u64,
    pub progress_throttle_ms: u64,
    pub progress_min_delta_percent: f32,
    pub download_progress_cap: f32,
    pub download_report_every_bytes: u64,
    pub deadline_floor_secs: u64,
    pub deadline_ceiling_secs: u64,
    pub deadline_secs_per_mib: f64,
    pub kill_grace_secs: u64,
    pub progress_ttl_secs: i64,
    pub job_ttl_secs: i64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            scratch_dir: None,
            multipart_threshold_bytes: DEFAULT_MULTIPART_THRESHOLD_BYTES,
            multipart_part_size_bytes: DEFAULT_MULTIPART_PART_SIZE_BYTES,
            progress_throttle_ms: DEFAULT_PROGRESS_THROTTLE_MS,
            progress_min_delta_percent: DEFAULT_PROGRESS_MIN_DELTA_PERCENT,
            download_progress_cap: DEFAULT_DOWNLOAD_PROGRESS_CAP,
            download_report_every_bytes: DEFAULT_DOWNLOAD_REPORT_EVERY_BYTES,
            deadline_floor_secs: DEFAULT_DEADLINE_FLOOR_SECS,
            deadline_ceiling_secs: DEFAULT_DEADLINE_CEILING_SECS,
            deadline_secs_per_mib: DEFAULT_DEADLINE_SECS_PER_MIB,
            kill_grace_secs: DEFAULT_KILL_GRACE_SECS,
            progress_ttl_secs: DEFAULT_PROGRESS_TTL_SECS,
            job_ttl_secs: DEFAULT_JOB_TTL_SECS,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ConverterConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let defaults = ConverterConfig::default();

        let config = ConverterConfig {
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            scratch_dir: env::var("SCRATCH_DIR").ok().map(PathBuf::from),
            multipart_threshold_bytes: env_parse(
                "MULTIPART_THRESHOLD_BYTES",
                defaults.multipart_threshold_bytes,
            ),
            multipart_part_size_bytes: env_parse(
                "MULTIPART_PART_SIZE_BYTES",
                defaults.multipart_part_size_bytes,
            ),
            progress_throttle_ms: env_parse("PROGRESS_THROTTLE_MS", defaults.progress_throttle_ms),
            progress_min_delta_percent: env_parse(
                "PROGRESS_MIN_DELTA_PERCENT",
                defaults.progress_min_delta_percent,
            ),
            download_progress_cap: env_parse(
                "DOWNLOAD_PROGRESS_CAP",
                defaults.download_progress_cap,
            ),
            download_report_every_bytes: env_parse(
                "DOWNLOAD_REPORT_EVERY_BYTES",
                defaults.download_report_every_bytes,
            ),
            deadline_floor_secs: env_parse("DEADLINE_FLOOR_SECS", defaults.deadline_floor_secs),
            deadline_ceiling_secs: env_parse(
                "DEADLINE_CEILING_SECS",
                defaults.deadline_ceiling_secs,
            ),
            deadline_secs_per_mib: env_parse(
                "DEADLINE_SECS_PER_MIB",
                defaults.deadline_secs_per_mib,
            ),
            kill_grace_secs: env_parse("KILL_GRACE_SECS", defaults.kill_grace_secs),
            progress_ttl_secs: env_parse("PROGRESS_TTL_SECS", defaults.progress_ttl_secs),
            job_ttl_secs: env_parse("JOB_TTL_SECS", defaults.job_ttl_secs),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.ffmpeg_path.trim().is_empty() {
            return Err(anyhow::anyhow!("FFMPEG_PATH must not be empty"));
        }
        if self.multipart_part_size_bytes == 0 {
            return Err(anyhow::anyhow!("MULTIPART_PART_SIZE_BYTES must be > 0"));
        }
        if self.deadline_floor_secs > self.deadline_ceiling_secs {
            return Err(anyhow::anyhow!(
                "DEADLINE_FLOOR_SECS ({}) must not exceed DEADLINE_CEILING_SECS ({})",
                self.deadline_floor_secs,
                self.deadline_ceiling_secs
            ));
        }
        if !(0.0..=1.0).contains(&self.download_progress_cap) {
            return Err(anyhow::anyhow!(
                "DOWNLOAD_PROGRESS_CAP must be within [0, 1]"
            ));
        }
        Ok(())
    }

    /// Deadline for one encoder run. Scales with declared input size and is
    /// clamped to the configured floor and ceiling; an explicit caller
    /// override is clamped the same way.
    pub fn deadline_for(&self, input_size_bytes: u64, override_secs: Option<u64>) -> Duration {
        let secs = match override_secs {
            Some(secs) => secs,
            None => {
                let mib = input_size_bytes as f64 / (1024.0 * 1024.0);
                self.deadline_floor_secs + (mib * self.deadline_secs_per_mib) as u64
            }
        };
        Duration::from_secs(secs.clamp(self.deadline_floor_secs, self.deadline_ceiling_secs))
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_secs)
    }

    pub fn progress_throttle(&self) -> Duration {
        Duration::from_millis(self.progress_throttle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ConverterConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.multipart_threshold_bytes > 10_000_000);
    }

    #[test]
    fn test_deadline_has_floor() {
        let config = ConverterConfig::default();
        let deadline = config.deadline_for(0, None);
        assert_eq!(deadline, Duration::from_secs(config.deadline_floor_secs));
    }

    #[test]
    fn test_deadline_has_ceiling() {
        let config = ConverterConfig::default();
        // 100 GiB of input would blow far past the ceiling.
        let deadline = config.deadline_for(100 * 1024 * 1024 * 1024, None);
        assert_eq!(deadline, Duration::from_secs(config.deadline_ceiling_secs));
    }

    #[test]
    fn test_deadline_scales_with_size() {
        let config = ConverterConfig::default();
        let small = config.deadline_for(10 * 1024 * 1024, None);
        let large = config.deadline_for(500 * 1024 * 1024, None);
        assert!(large > small);
    }

    #[test]
    fn test_deadline_override_is_clamped() {
        let config = ConverterConfig::default();
        let deadline = config.deadline_for(0, Some(10_000_000));
        assert_eq!(deadline, Duration::from_secs(config.deadline_ceiling_secs));
        let deadline = config.deadline_for(0, Some(1));
        assert_eq!(deadline, Duration::from_secs(config.deadline_floor_secs));
    }

    #[test]
    fn test_invalid_cap_rejected() {
        let config = ConverterConfig {
            download_progress_cap: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
