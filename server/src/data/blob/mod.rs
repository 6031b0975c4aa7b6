//! Blob store backends and the append-only event log

pub mod event_log;
pub mod memory;
pub mod s3;
pub mod storage;

pub use event_log::EventLog;
pub use memory::MemoryBlobStorage;
pub use s3::S3BlobStorage;
pub use storage::{BlobStorage, UploadBinding};
