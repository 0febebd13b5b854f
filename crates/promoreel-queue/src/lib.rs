//! Redis-backed job queue and job store.
//!
//! This crate provides:
//! - Job enqueueing and consumption via Redis Streams, with retry/DLQ
//! - Job documents with optimistic versioning
//! - A per-job execution lock
//! - Status updates via Redis Pub/Sub

pub mod error;
pub mod keys;
pub mod lock;
pub mod message;
pub mod queue;
pub mod status;
pub mod store;

pub use error::{QueueError, QueueResult};
pub use lock::{JobLock, JobLocks};
pub use message::JobMessage;
pub use queue::{JobQueue, QueueConfig};
pub use status::StatusChannel;
pub use store::RedisJobStore;
