pub mod job_runner;
pub mod orchestrator;

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::config::tracker::TrackerConfig;
use crate::error::JobError;
use crate::job::{JobData, hash, naming};
use crate::report::{BatchStatus, Reporter, TracingReporter};
use crate::tracker::{JobCatalog, JobOutput, JobRef, Tracker, TrackerBackend};

/// The concrete job type: what a job does, and optionally where the job list
/// comes from and how jobs are named.
///
/// A batch built without an explicit job list asks the source for
/// `n_jobs`/`job_data`; sources that do not override them fail with
/// [`JobError::NotImplemented`].
pub trait JobSource: Send + Sync {
    fn n_jobs(&self) -> crate::error::Result<usize> {
        Err(JobError::not_implemented(
            "must specify jobs or implement JobSource::n_jobs()",
        ))
    }

    fn job_data(&self, _i: usize) -> crate::error::Result<JobData> {
        Err(JobError::not_implemented(
            "must specify jobs or implement JobSource::job_data()",
        ))
    }

    /// Override to name jobs whose data is not a flat map of scalars.
    fn job_name(
        &self,
        list_name: &str,
        data: &JobData,
        extra: &[(&str, &str)],
    ) -> crate::error::Result<String> {
        naming::job_name(list_name, data, extra)
    }

    fn job_hash(&self, data: &JobData) -> crate::error::Result<String> {
        hash::compute_job_hash(data)
    }

    /// Run one job. Called at most once per remaining job per run.
    fn execute_job(&self, job: &JobContext) -> crate::error::Result<()>;
}

impl<F> JobSource for F
where
    F: Fn(&JobContext) -> crate::error::Result<()> + Send + Sync,
{
    fn execute_job(&self, job: &JobContext) -> crate::error::Result<()> {
        self(job)
    }
}

/// Everything a job body needs to know about the job it runs.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub index: usize,
    pub data: JobData,
    pub name: String,
    /// Files the tracker expects this job to produce. Empty for the SQL tracker.
    pub outputs: Vec<JobOutput>,
}

impl JobContext {
    /// Path of the single output file of a file-tracked job.
    pub fn output_path(&self) -> Option<&Path> {
        match self.outputs.as_slice() {
            [only] => Some(&only.path),
            _ => None,
        }
    }

    /// Path of a named output of a multi-file-tracked job.
    pub fn output_path_named(&self, output_name: &str) -> Option<&Path> {
        self.outputs
            .iter()
            .find(|o| o.name.as_deref() == Some(output_name))
            .map(|o| o.path.as_path())
    }
}

/// Jobs/second of the sample window a finished job falls in.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRate {
    pub name: String,
    pub jobs_per_second: f64,
}

/// A list of jobs bound to the tracker that records their completion.
pub struct Batch<S: JobSource> {
    name: Option<String>,
    jobs: Option<Vec<JobData>>,
    source: S,
    tracker: Tracker,
    reporter: Box<dyn Reporter>,
}

impl<S: JobSource> Batch<S> {
    pub fn new(source: S, tracker: Tracker) -> Self {
        Batch {
            name: None,
            jobs: None,
            source,
            tracker,
            reporter: Box::new(TracingReporter),
        }
    }

    /// Build the tracker from `config` and bind it to a new batch.
    pub fn from_config(source: S, config: &TrackerConfig) -> crate::error::Result<Self> {
        Ok(Self::new(source, Tracker::from_config(config)?))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_jobs(mut self, jobs: Vec<JobData>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn with_reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub(crate) fn reporter(&self) -> &dyn Reporter {
        self.reporter.as_ref()
    }

    /// Display name, or the source's type name when none was given.
    pub fn list_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => short_type_name::<S>().to_string(),
        }
    }

    // ---- job data ----

    pub fn n_jobs(&self) -> crate::error::Result<usize> {
        match &self.jobs {
            Some(jobs) => Ok(jobs.len()),
            None => self.source.n_jobs(),
        }
    }

    pub fn job_data(&self, i: usize) -> crate::error::Result<JobData> {
        let n_jobs = self.n_jobs()?;
        if i >= n_jobs {
            return Err(JobError::IndexOutOfRange { index: i, n_jobs });
        }
        match &self.jobs {
            Some(jobs) => Ok(jobs[i].clone()),
            None => self.source.job_data(i),
        }
    }

    // ---- names and hashes ----

    pub fn job_name(&self, i: usize, extra: &[(&str, &str)]) -> crate::error::Result<String> {
        self.job_name_for(&self.job_data(i)?, extra)
    }

    pub fn job_name_for(
        &self,
        data: &JobData,
        extra: &[(&str, &str)],
    ) -> crate::error::Result<String> {
        self.source.job_name(&self.list_name(), data, extra)
    }

    /// Best-effort reconstruction of job data from a job name.
    pub fn parse_job_name(&self, name: &str) -> crate::error::Result<JobData> {
        naming::parse_job_name(&self.list_name(), name)
    }

    pub fn job_hash(&self, i: usize) -> crate::error::Result<String> {
        self.job_hash_for(&self.job_data(i)?)
    }

    pub fn job_hash_for(&self, data: &JobData) -> crate::error::Result<String> {
        self.source.job_hash(data)
    }

    /// Hashes of the given jobs, or of every job when `indices` is `None`.
    pub fn job_hashes(&self, indices: Option<&[usize]>) -> crate::error::Result<Vec<String>> {
        match indices {
            Some(indices) => indices.iter().map(|&i| self.job_hash(i)).collect(),
            None => (0..self.n_jobs()?).map(|i| self.job_hash(i)).collect(),
        }
    }

    pub fn job_hashes_for(&self, datas: &[JobData]) -> crate::error::Result<Vec<String>> {
        datas.iter().map(|d| self.job_hash_for(d)).collect()
    }

    // ---- completion ----

    pub fn is_job_complete<'a>(&self, job: impl Into<JobRef<'a>>) -> crate::error::Result<bool> {
        self.tracker.is_job_complete(self, job.into())
    }

    pub fn are_jobs_complete(&self, indices: &[usize]) -> crate::error::Result<Vec<bool>> {
        indices.iter().map(|&i| self.is_job_complete(i)).collect()
    }

    /// Indices of jobs the tracker does not report complete, in order.
    pub fn remaining_jobs(&self) -> crate::error::Result<Vec<usize>> {
        self.tracker.remaining_jobs(self)
    }

    pub fn job_outputs<'a>(
        &self,
        job: impl Into<JobRef<'a>>,
    ) -> crate::error::Result<Vec<JobOutput>> {
        self.tracker.job_outputs(self, job.into())
    }

    // ---- times ----

    pub fn job_start_time<'a>(
        &self,
        job: impl Into<JobRef<'a>>,
    ) -> crate::error::Result<Option<DateTime<Utc>>> {
        self.tracker.job_start_time(self, job.into())
    }

    pub fn job_end_time<'a>(
        &self,
        job: impl Into<JobRef<'a>>,
    ) -> crate::error::Result<Option<DateTime<Utc>>> {
        self.tracker.job_end_time(self, job.into())
    }

    pub fn jobs_start_times(
        &self,
        jobs: &[JobRef<'_>],
    ) -> crate::error::Result<Vec<Option<DateTime<Utc>>>> {
        jobs.iter().map(|&job| self.job_start_time(job)).collect()
    }

    pub fn jobs_end_times(
        &self,
        jobs: &[JobRef<'_>],
    ) -> crate::error::Result<Vec<Option<DateTime<Utc>>>> {
        jobs.iter().map(|&job| self.job_end_time(job)).collect()
    }

    /// Seconds between the first and the last recorded end time.
    pub fn total_time(&self) -> crate::error::Result<Option<f64>> {
        let mut first: Option<DateTime<Utc>> = None;
        let mut last: Option<DateTime<Utc>> = None;
        for i in 0..self.n_jobs()? {
            if let Some(end) = self.job_end_time(i)? {
                first = Some(first.map_or(end, |t| t.min(end)));
                last = Some(last.map_or(end, |t| t.max(end)));
            }
        }
        Ok(match (first, last) {
            (Some(first), Some(last)) => {
                Some((last - first).num_milliseconds() as f64 / 1000.0)
            }
            _ => None,
        })
    }

    /// For every finished job, the throughput of the `sample_secs` window its
    /// end time falls in.
    pub fn throughput_by_window(&self, sample_secs: u64) -> crate::error::Result<Vec<JobRate>> {
        if sample_secs == 0 {
            return Err(JobError::config("sample_secs must be positive"));
        }
        let window = i64::try_from(sample_secs)
            .map_err(|_| JobError::config("sample_secs is too large"))?;

        let mut finished: Vec<(String, i64)> = Vec::new();
        for i in 0..self.n_jobs()? {
            if let Some(end) = self.job_end_time(i)? {
                finished.push((self.job_name(i, &[])?, end.timestamp().div_euclid(window)));
            }
        }

        let mut counts: HashMap<i64, usize> = HashMap::new();
        for (_, sample) in &finished {
            *counts.entry(*sample).or_default() += 1;
        }

        Ok(finished
            .into_iter()
            .map(|(name, sample)| JobRate {
                name,
                jobs_per_second: counts[&sample] as f64 / sample_secs as f64,
            })
            .collect())
    }

    // ---- status ----

    /// Job counts plus the tracker's key/value summary.
    pub fn status(&self) -> crate::error::Result<BatchStatus> {
        Ok(BatchStatus {
            list_name: self.list_name(),
            n_jobs: self.n_jobs()?,
            n_remaining: self.remaining_jobs()?.len(),
            details: self.tracker.summary(self)?,
        })
    }

    pub fn report_status(&self) -> crate::error::Result<()> {
        let status = self.status()?;
        self.reporter.report_status(&status);
        Ok(())
    }
}

impl<S: JobSource> JobCatalog for Batch<S> {
    fn n_jobs(&self) -> crate::error::Result<usize> {
        Batch::n_jobs(self)
    }

    fn job_data(&self, i: usize) -> crate::error::Result<JobData> {
        Batch::job_data(self, i)
    }

    fn job_name_for(&self, data: &JobData, extra: &[(&str, &str)]) -> crate::error::Result<String> {
        Batch::job_name_for(self, data, extra)
    }

    fn job_hash_for(&self, data: &JobData) -> crate::error::Result<String> {
        Batch::job_hash_for(self, data)
    }

    fn parse_job_name(&self, name: &str) -> crate::error::Result<JobData> {
        Batch::parse_job_name(self, name)
    }
}

/// `my_crate::jobs::Resize<T>` → `Resize`
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
