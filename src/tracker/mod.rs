pub mod file;
pub mod multifile;
pub mod sql;

use std::borrow::Cow;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::config::tracker::{TrackerConfig, TrackerKind};
use crate::error::JobError;
use crate::job::JobData;

pub use file::FileTracker;
pub use multifile::MultiFileTracker;
pub use sql::SqlTracker;

/// Read-only view of a batch that trackers use to resolve job identity.
///
/// Passed into every tracker operation instead of being stored, so a tracker
/// never holds on to the batch that owns it.
pub trait JobCatalog: Sync {
    fn n_jobs(&self) -> crate::error::Result<usize>;
    fn job_data(&self, i: usize) -> crate::error::Result<JobData>;
    fn job_name_for(&self, data: &JobData, extra: &[(&str, &str)]) -> crate::error::Result<String>;
    fn job_hash_for(&self, data: &JobData) -> crate::error::Result<String>;
    fn parse_job_name(&self, name: &str) -> crate::error::Result<JobData>;
}

/// A job addressed either by its index in the batch or by its data.
#[derive(Debug, Clone, Copy)]
pub enum JobRef<'a> {
    Index(usize),
    Data(&'a JobData),
}

impl From<usize> for JobRef<'_> {
    fn from(i: usize) -> Self {
        JobRef::Index(i)
    }
}

impl<'a> From<&'a JobData> for JobRef<'a> {
    fn from(data: &'a JobData) -> Self {
        JobRef::Data(data)
    }
}

impl<'a> JobRef<'a> {
    pub fn data(self, catalog: &dyn JobCatalog) -> crate::error::Result<Cow<'a, JobData>> {
        match self {
            JobRef::Index(i) => catalog.job_data(i).map(Cow::Owned),
            JobRef::Data(data) => Ok(Cow::Borrowed(data)),
        }
    }

    pub fn name(
        self,
        catalog: &dyn JobCatalog,
        extra: &[(&str, &str)],
    ) -> crate::error::Result<String> {
        let data = self.data(catalog)?;
        catalog.job_name_for(&data, extra)
    }

    pub fn hash(self, catalog: &dyn JobCatalog) -> crate::error::Result<String> {
        let data = self.data(catalog)?;
        catalog.job_hash_for(&data)
    }
}

/// One artifact a job is expected to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutput {
    /// Output name for multi-file trackers, `None` for a single-file tracker.
    pub name: Option<String>,
    pub path: PathBuf,
}

/// Statically declared key/value pairs describing a component for reporting.
pub type Summary = Vec<(&'static str, String)>;

/// Operations shared by every completion-state backend.
pub trait TrackerBackend {
    fn is_job_complete(&self, catalog: &dyn JobCatalog, job: JobRef<'_>)
    -> crate::error::Result<bool>;

    /// Indices in `0..n` that are not complete, in order.
    fn remaining_jobs(&self, catalog: &dyn JobCatalog) -> crate::error::Result<Vec<usize>> {
        let mut remaining = Vec::new();
        for i in 0..catalog.n_jobs()? {
            if !self.is_job_complete(catalog, JobRef::Index(i))? {
                remaining.push(i);
            }
        }
        Ok(remaining)
    }

    fn job_start_time(
        &self,
        catalog: &dyn JobCatalog,
        job: JobRef<'_>,
    ) -> crate::error::Result<Option<DateTime<Utc>>>;

    fn job_end_time(
        &self,
        catalog: &dyn JobCatalog,
        job: JobRef<'_>,
    ) -> crate::error::Result<Option<DateTime<Utc>>>;

    fn start_job(&self, _catalog: &dyn JobCatalog, _i: usize) -> crate::error::Result<()> {
        Ok(())
    }

    fn end_job(&self, _catalog: &dyn JobCatalog, _i: usize) -> crate::error::Result<()> {
        Ok(())
    }

    fn job_outputs(
        &self,
        _catalog: &dyn JobCatalog,
        _job: JobRef<'_>,
    ) -> crate::error::Result<Vec<JobOutput>> {
        Ok(Vec::new())
    }

    fn summary(&self, catalog: &dyn JobCatalog) -> crate::error::Result<Summary>;
}

/// The tracker a batch records completion in.
pub enum Tracker {
    File(FileTracker),
    MultiFile(MultiFileTracker),
    Sql(SqlTracker),
}

macro_rules! dispatch {
    ($self:ident, $tracker:ident => $body:expr) => {
        match $self {
            Tracker::File($tracker) => $body,
            Tracker::MultiFile($tracker) => $body,
            Tracker::Sql($tracker) => $body,
        }
    };
}

impl Tracker {
    /// Build the tracker selected by `config`.
    ///
    /// Fails with a configuration error before any storage is touched when the
    /// kind cannot be determined or its parameters are missing.
    pub fn from_config(config: &TrackerConfig) -> crate::error::Result<Self> {
        match config.kind()? {
            TrackerKind::File => {
                let output_dir = config
                    .output_dir
                    .as_ref()
                    .ok_or_else(|| JobError::config("must specify output_dir for file tracker"))?;
                let output_filetype = config.output_filetype.as_ref().ok_or_else(|| {
                    JobError::config("must specify output_filetype for file tracker")
                })?;
                Ok(Tracker::File(FileTracker::new(
                    output_dir,
                    output_filetype.clone(),
                )?))
            }
            TrackerKind::Multifile => {
                let outputs = config.normalized_outputs()?;
                Ok(Tracker::MultiFile(MultiFileTracker::new(outputs)?))
            }
            TrackerKind::Sql => {
                let db_config = config
                    .db_config
                    .clone()
                    .ok_or_else(|| JobError::config("must specify db_config for sql tracker"))?;
                Ok(Tracker::Sql(SqlTracker::new(db_config)?))
            }
        }
    }

    pub fn kind(&self) -> TrackerKind {
        match self {
            Tracker::File(_) => TrackerKind::File,
            Tracker::MultiFile(_) => TrackerKind::Multifile,
            Tracker::Sql(_) => TrackerKind::Sql,
        }
    }

    pub fn as_file(&self) -> Option<&FileTracker> {
        match self {
            Tracker::File(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_multifile(&self) -> Option<&MultiFileTracker> {
        match self {
            Tracker::MultiFile(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> Option<&SqlTracker> {
        match self {
            Tracker::Sql(t) => Some(t),
            _ => None,
        }
    }
}

impl TrackerBackend for Tracker {
    fn is_job_complete(
        &self,
        catalog: &dyn JobCatalog,
        job: JobRef<'_>,
    ) -> crate::error::Result<bool> {
        dispatch!(self, t => t.is_job_complete(catalog, job))
    }

    fn remaining_jobs(&self, catalog: &dyn JobCatalog) -> crate::error::Result<Vec<usize>> {
        dispatch!(self, t => t.remaining_jobs(catalog))
    }

    fn job_start_time(
        &self,
        catalog: &dyn JobCatalog,
        job: JobRef<'_>,
    ) -> crate::error::Result<Option<DateTime<Utc>>> {
        dispatch!(self, t => t.job_start_time(catalog, job))
    }

    fn job_end_time(
        &self,
        catalog: &dyn JobCatalog,
        job: JobRef<'_>,
    ) -> crate::error::Result<Option<DateTime<Utc>>> {
        dispatch!(self, t => t.job_end_time(catalog, job))
    }

    fn start_job(&self, catalog: &dyn JobCatalog, i: usize) -> crate::error::Result<()> {
        dispatch!(self, t => t.start_job(catalog, i))
    }

    fn end_job(&self, catalog: &dyn JobCatalog, i: usize) -> crate::error::Result<()> {
        dispatch!(self, t => t.end_job(catalog, i))
    }

    fn job_outputs(
        &self,
        catalog: &dyn JobCatalog,
        job: JobRef<'_>,
    ) -> crate::error::Result<Vec<JobOutput>> {
        dispatch!(self, t => t.job_outputs(catalog, job))
    }

    fn summary(&self, catalog: &dyn JobCatalog) -> crate::error::Result<Summary> {
        dispatch!(self, t => t.summary(catalog))
    }
}
