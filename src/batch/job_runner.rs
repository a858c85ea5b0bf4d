// ジョブ単位: start → execute → end

use std::panic::{self, AssertUnwindSafe};

use tracing::debug;

use super::{Batch, JobContext, JobSource};
use crate::error::JobError;
use crate::tracker::{JobRef, TrackerBackend};

impl<S: JobSource> Batch<S> {
    /// Everything the job body gets to see for job `i`.
    pub fn job_context(&self, i: usize) -> crate::error::Result<JobContext> {
        let data = self.job_data(i)?;
        let name = self.job_name_for(&data, &[])?;
        let outputs = self.tracker.job_outputs(self, JobRef::Data(&data))?;
        Ok(JobContext {
            index: i,
            data,
            name,
            outputs,
        })
    }

    /// Run a single job: record its start, execute it, record its end.
    ///
    /// The end is recorded only when the body returns `Ok`. Errors and panics
    /// from the body come back as [`JobError::Execution`].
    pub fn run_job(&self, i: usize) -> crate::error::Result<()> {
        self.tracker.start_job(self, i)?;
        let context = self.job_context(i)?;
        debug!(index = i, job = %context.name, "job started");

        execute_guarded(&self.source, &context).map_err(|e| JobError::execution(i, e))?;

        self.tracker.end_job(self, i)?;
        debug!(index = i, job = %context.name, "job finished");
        Ok(())
    }
}

/// Call the job body, turning a panic into an ordinary job failure.
fn execute_guarded<S: JobSource>(source: &S, context: &JobContext) -> crate::error::Result<()> {
    match panic::catch_unwind(AssertUnwindSafe(|| source.execute_job(context))) {
        Ok(result) => result,
        Err(payload) => {
            let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                *s
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.as_str()
            } else {
                "unknown panic payload"
            };
            Err(JobError::failed(format!("job panicked: {msg}")))
        }
    }
}
