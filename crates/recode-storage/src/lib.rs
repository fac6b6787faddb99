//! Object store streaming I/O.
//!
//! All backends implement the `ObjectStorage` trait: streaming download
//! with a declared size, streaming upload that picks single-shot or
//! multipart by size, and byte-level progress callbacks. `S3ObjectStorage`
//! targets S3 and S3-compatible providers; `LocalObjectStorage` serves
//! tests and small deployments.

pub mod local;
pub mod s3;
pub mod traits;

pub use local::LocalObjectStorage;
pub use s3::S3ObjectStorage;
pub use traits::{
    ByteStream, ObjectStorage, ProgressFn, StorageError, StorageResult, UploadLimits,
};
