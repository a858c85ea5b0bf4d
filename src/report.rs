// Reporting boundary: the core hands plain numbers to a Reporter and does no
// formatting of its own.

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::error::JobError;
use crate::tracker::Summary;

/// Job counts of a batch, plus the tracker's key/value summary when requested.
#[derive(Debug, Clone)]
pub struct BatchStatus {
    pub list_name: String,
    pub n_jobs: usize,
    pub n_remaining: usize,
    pub details: Summary,
}

/// Timing of a finished orchestration run.
///
/// Everything is derived from the start time, the end time and the number of
/// jobs that were dispatched.
#[derive(Debug, Clone, PartialEq)]
pub struct Conclusion {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub n_completed: usize,
    pub n_failed: usize,
    pub duration_secs: f64,
    pub seconds_per_job: f64,
    pub jobs_per_minute: f64,
    pub jobs_per_hour: f64,
    pub jobs_per_day: f64,
}

impl Conclusion {
    pub fn new(
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        n_completed: usize,
        n_failed: usize,
    ) -> Self {
        let duration_secs = (end_time - start_time)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let n = n_completed as f64;
        let seconds_per_job = if n_completed > 0 {
            duration_secs / n
        } else {
            0.0
        };
        // A zero-length run yields infinite rates.
        let jobs_per_second = n / duration_secs;
        Conclusion {
            start_time,
            end_time,
            n_completed,
            n_failed,
            duration_secs,
            seconds_per_job,
            jobs_per_minute: jobs_per_second * 60.0,
            jobs_per_hour: jobs_per_second * 3600.0,
            jobs_per_day: jobs_per_second * 86400.0,
        }
    }
}

/// Receives progress of a batch run.
pub trait Reporter: Send + Sync {
    fn report_status(&self, status: &BatchStatus);

    fn report_nothing_to_do(&self);

    fn report_start(&self, start_time: DateTime<Utc>, n_remaining: usize);

    fn report_job_failed(&self, index: usize, error: &JobError);

    fn report_conclusion(&self, conclusion: &Conclusion);
}

/// Emits every report as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report_status(&self, status: &BatchStatus) {
        info!(
            batch = %status.list_name,
            n_jobs = status.n_jobs,
            n_remaining = status.n_remaining,
            "job summary"
        );
        for (key, value) in &status.details {
            info!(batch = %status.list_name, key = *key, value = %value, "tracker");
        }
    }

    fn report_nothing_to_do(&self) {
        info!("all jobs already completed");
    }

    fn report_start(&self, start_time: DateTime<Utc>, n_remaining: usize) {
        info!(start_time = %start_time.to_rfc3339(), n_remaining, "running remaining jobs");
    }

    fn report_job_failed(&self, index: usize, error: &JobError) {
        error!(index, error = %error, "job failed");
    }

    fn report_conclusion(&self, conclusion: &Conclusion) {
        info!(
            end_time = %conclusion.end_time.to_rfc3339(),
            n_completed = conclusion.n_completed,
            n_failed = conclusion.n_failed,
            duration_secs = conclusion.duration_secs,
            seconds_per_job = conclusion.seconds_per_job,
            jobs_per_minute = conclusion.jobs_per_minute,
            jobs_per_hour = conclusion.jobs_per_hour,
            jobs_per_day = conclusion.jobs_per_day,
            "jobs completed"
        );
    }
}
