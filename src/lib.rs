//! Resumable batch execution of parameterized jobs.
//!
//! A [`Batch`] enumerates jobs, derives a deterministic name and hash for each,
//! asks its [`Tracker`] which jobs are still incomplete and runs those, either
//! serially or on a worker pool. Completion state lives in the tracker's
//! storage (output files or a SQLite table), so re-running a batch skips the
//! jobs that already finished.

pub mod batch;
pub mod config;
pub mod error;
pub mod job;
pub mod report;
pub mod tracker;

pub use batch::orchestrator::{Executor, JobFailure, RunSummary};
pub use batch::{Batch, JobContext, JobRate, JobSource};
pub use config::tracker::{DbConfig, OutputSpec, TrackerConfig, TrackerKind};
pub use error::{JobError, Result};
pub use job::JobData;
pub use report::{BatchStatus, Conclusion, Reporter, TracingReporter};
pub use tracker::{JobCatalog, JobOutput, JobRef, Tracker, TrackerBackend};
