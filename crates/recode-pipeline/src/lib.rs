//! Streaming conversion pipeline.
//!
//! This crate drives a conversion end to end: the compatibility check, the
//! encoder subprocess with its deadline and registry, the stream wiring
//! between the object store and the encoder's standard I/O, the diagnostic
//! parser, and the tiered progress store. `ConversionService` is the
//! caller-facing facade.

pub mod compat;
pub mod encoder;
pub mod orchestrator;
pub mod progress;
pub mod service;
pub mod telemetry;

pub use compat::{check_compatibility, Compatibility};
pub use encoder::process::ProcessRegistry;
pub use orchestrator::{ConversionOrchestrator, ConversionResult};
pub use progress::cache::{CacheError, MemoryProgressCache, ProgressCache};
pub use progress::store::ProgressStore;
pub use service::{ConversionService, ExpirySweeper};
