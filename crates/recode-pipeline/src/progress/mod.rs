//! Tiered progress tracking.
//!
//! The ephemeral tier (`ProgressCache`) serves fine-grained entries with a
//! TTL; the durable tier is the Job Record store, from which a coarse
//! entry is derived whenever the cache cannot answer. `ProgressStore`
//! combines the two with write-best-effort semantics; `PhaseReporter`
//! throttles the high-frequency call sites.

pub mod cache;
pub mod reporter;
pub mod store;

pub use cache::{CacheError, MemoryProgressCache, ProgressCache};
pub use reporter::PhaseReporter;
pub use store::ProgressStore;
