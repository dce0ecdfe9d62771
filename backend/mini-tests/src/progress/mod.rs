//! Client-side progress: durable storage, attempt accounting and the
//! fire-and-forget mirror to the collector.

pub mod mirror;
pub mod storage;
pub mod store;

pub use mirror::{HttpSubmissionSink, Mirror, MirrorError, SubmissionSink};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError};
pub use store::{ProgressStore, RecordedProgress};
