//! Shared constants and default tuning values.
//!
//! The byte/percentage thresholds here are operational tuning parameters;
//! `ConverterConfig` lets deployments override every one of them.

/// Uploads at or below this size go up in a single atomic put.
pub const DEFAULT_MULTIPART_THRESHOLD_BYTES: u64 = 10 * 1024 * 1024;

/// Fixed part size for multipart uploads (S3 requires parts >= 5 MiB,
/// except the final one).
pub const DEFAULT_MULTIPART_PART_SIZE_BYTES: u64 = 5 * 1024 * 1024;

/// Minimum interval between persisted progress writes for one phase.
pub const DEFAULT_PROGRESS_THROTTLE_MS: u64 = 400;

/// Minimum percent change that forces a persisted progress write even
/// inside the throttle window.
pub const DEFAULT_PROGRESS_MIN_DELTA_PERCENT: f32 = 2.0;

/// Download progress is capped to this fraction of its phase budget so it
/// does not visually outrun the work still remaining.
pub const DEFAULT_DOWNLOAD_PROGRESS_CAP: f32 = 0.95;

/// Encoder deadline bounds and scaling.
pub const DEFAULT_DEADLINE_FLOOR_SECS: u64 = 60;
pub const DEFAULT_DEADLINE_CEILING_SECS: u64 = 1800;
pub const DEFAULT_DEADLINE_SECS_PER_MIB: f64 = 2.0;

/// Grace period between the graceful termination request and a hard kill.
pub const DEFAULT_KILL_GRACE_SECS: u64 = 5;

/// Progress entries are ephemeral detail and expire well before the job
/// record does.
pub const DEFAULT_PROGRESS_TTL_SECS: i64 = 60 * 60;
pub const DEFAULT_JOB_TTL_SECS: i64 = 24 * 60 * 60;

/// Chunk size for pipe/stream copy loops.
pub const STREAM_COPY_BUF_BYTES: usize = 64 * 1024;

/// Download progress is reported at most once per this many bytes.
pub const DEFAULT_DOWNLOAD_REPORT_EVERY_BYTES: u64 = 1024 * 1024;
