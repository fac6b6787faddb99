//! Durable Job Record store.
//!
//! The `JobStore` trait is the durable tier of the progress-tracking
//! subsystem: it survives restarts while the ephemeral progress cache does
//! not. `PgJobStore` backs it with Postgres; `MemoryJobStore` is an
//! in-process implementation for tests and single-node deployments.

pub mod job_store;
pub mod memory;
pub mod pg;

pub use job_store::JobStore;
pub use memory::MemoryJobStore;
pub use pg::PgJobStore;
