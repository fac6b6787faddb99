pub mod format;
pub mod job;
pub mod progress;

pub use format::MediaFormat;
pub use job::{ConversionJob, JobStatus, ObjectLocation};
pub use progress::{Phase, ProgressEntry, FAILED_PERCENT};
