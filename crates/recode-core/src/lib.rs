//! Recode Core Library
//!
//! This crate provides the core domain models, error types, configuration,
//! and constants shared across all Recode components.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::ConverterConfig;
pub use error::ConvertError;
pub use models::{
    ConversionJob, JobStatus, MediaFormat, ObjectLocation, Phase, ProgressEntry, FAILED_PERCENT,
};
