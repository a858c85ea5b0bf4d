// 全ジョブ実行: remaining → dispatch (serial | parallel) → conclusion

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{info, warn};

use super::{Batch, JobSource};
use crate::error::JobError;
use crate::report::{BatchStatus, Conclusion};

/// How remaining jobs are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Executor {
    /// In order, one at a time, on the calling thread.
    Serial,
    /// On a pool of `n_processes` workers (default: one per available core).
    Parallel { n_processes: Option<usize> },
}

impl Default for Executor {
    fn default() -> Self {
        Executor::Parallel { n_processes: None }
    }
}

impl std::fmt::Display for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Executor::Serial => write!(f, "serial"),
            Executor::Parallel { n_processes: Some(n) } => write!(f, "parallel ({n} workers)"),
            Executor::Parallel { n_processes: None } => write!(f, "parallel (available cores)"),
        }
    }
}

/// A job whose run did not finish normally.
#[derive(Debug)]
pub struct JobFailure {
    pub index: usize,
    pub error: JobError,
}

/// Outcome of one orchestration run.
#[derive(Debug)]
pub struct RunSummary {
    pub n_jobs: usize,
    /// Jobs that were incomplete when the run started.
    pub remaining: Vec<usize>,
    pub failures: Vec<JobFailure>,
    /// `None` when there was nothing to do.
    pub conclusion: Option<Conclusion>,
}

impl RunSummary {
    pub fn n_succeeded(&self) -> usize {
        self.remaining.len() - self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Number of workers for a parallel run.
fn worker_count(n_processes: Option<usize>) -> usize {
    match n_processes {
        Some(n) if n > 0 => n,
        _ => std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
    }
}

impl<S: JobSource> Batch<S> {
    /// Run every job the tracker does not report complete.
    ///
    /// Job failures are collected in the returned summary and do not stop the
    /// other jobs. Configuration errors, missing overrides and tracker protocol
    /// violations are returned as `Err`.
    pub fn orchestrate(&self, executor: Executor) -> crate::error::Result<RunSummary> {
        let n_jobs = self.n_jobs()?;
        let remaining = self.remaining_jobs()?;
        self.reporter().report_status(&BatchStatus {
            list_name: self.list_name(),
            n_jobs,
            n_remaining: remaining.len(),
            details: Vec::new(),
        });

        if remaining.is_empty() {
            self.reporter().report_nothing_to_do();
            return Ok(RunSummary {
                n_jobs,
                remaining,
                failures: Vec::new(),
                conclusion: None,
            });
        }

        let start_time: DateTime<Utc> = Utc::now();
        self.reporter().report_start(start_time, remaining.len());

        let failures = match executor {
            Executor::Serial => self.serial_execute(&remaining)?,
            Executor::Parallel { n_processes } => self.parallel_execute(&remaining, n_processes)?,
        };

        let conclusion = Conclusion::new(start_time, Utc::now(), remaining.len(), failures.len());
        self.reporter().report_conclusion(&conclusion);

        Ok(RunSummary {
            n_jobs,
            remaining,
            failures,
            conclusion: Some(conclusion),
        })
    }

    /// Run `jobs` in order. A fatal error stops the loop and is returned.
    pub fn serial_execute(&self, jobs: &[usize]) -> crate::error::Result<Vec<JobFailure>> {
        let mut failures = Vec::new();
        for &i in jobs {
            if let Err(error) = self.run_job(i) {
                self.reporter().report_job_failed(i, &error);
                if error.is_fatal() {
                    return Err(error);
                }
                failures.push(JobFailure { index: i, error });
            }
        }
        Ok(failures)
    }

    /// Run `jobs` on a dedicated pool and wait for all of them.
    ///
    /// Completion order is not preserved. If any job hit a fatal error, the
    /// first one (in job order) is returned once every worker has finished.
    pub fn parallel_execute(
        &self,
        jobs: &[usize],
        n_processes: Option<usize>,
    ) -> crate::error::Result<Vec<JobFailure>> {
        let n_workers = worker_count(n_processes);
        info!(n_workers, n_jobs = jobs.len(), "starting worker pool");
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_workers)
            .thread_name(|i| format!("jobbatch-worker-{i}"))
            .build()?;

        let results: Vec<(usize, crate::error::Result<()>)> = pool.install(|| {
            jobs.par_iter()
                .map(|&i| {
                    let result = self.run_job(i);
                    if let Err(error) = &result {
                        self.reporter().report_job_failed(i, error);
                    }
                    (i, result)
                })
                .collect()
        });

        let mut failures = Vec::new();
        let mut fatal: Option<JobError> = None;
        for (index, result) in results {
            if let Err(error) = result {
                if error.is_fatal() && fatal.is_none() {
                    fatal = Some(error);
                } else {
                    failures.push(JobFailure { index, error });
                }
            }
        }
        match fatal {
            Some(error) => {
                warn!(n_failures = failures.len(), "parallel run aborted by fatal error");
                Err(error)
            }
            None => Ok(failures),
        }
    }
}
