//! Marketing video worker.
//!
//! This crate provides:
//! - The job orchestrator: enhancement, storyboard, clips, voiceover,
//!   music, assembly and thumbnail, resumable from checkpoints
//! - Media assembly of each requested aspect ratio
//! - A queue executor with per-job locking, retry and DLQ handling
//! - Job lifecycle logging and Prometheus metrics
//! - Graceful shutdown

pub mod assembly;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod repository;
pub mod retry;
pub mod services;

#[cfg(test)]
mod test_support;

pub use assembly::{AssembledVideo, AssemblyPipeline, Soundtrack};
pub use config::{AppConfig, LocalStorageConfig, WorkerConfig};
pub use error::{StageError, WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use orchestrator::{JobOutcome, Orchestrator, PipelineServices};
pub use repository::{InMemoryJobRepository, JobRepository};
