use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unsupported job data: {0}")]
    UnsupportedJobData(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Job index {index} out of range (batch has {n_jobs} jobs)")]
    IndexOutOfRange { index: usize, n_jobs: usize },

    #[error("Job {index} failed: {source}")]
    Execution {
        index: usize,
        #[source]
        source: Box<JobError>,
    },

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Tracker protocol error: {0}")]
    TrackerProtocol(String),

    #[error("Job name parse error: {0}")]
    JobNameParse(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Generates factory methods for [`JobError`] variants that wrap a `String`.
macro_rules! error_constructors {
    ($(
        $(#[doc = $doc:expr])*
        $method:ident => $variant:ident
    ),* $(,)?) => {
        impl JobError {
            $(
                $(#[doc = $doc])*
                pub fn $method(msg: impl Into<String>) -> Self {
                    Self::$variant(msg.into())
                }
            )*
        }
    };
}

error_constructors! {
    /// Create a configuration error.
    config => ConfigError,
    /// Create an unsupported job data error.
    unsupported_job_data => UnsupportedJobData,
    /// Create an error for a missing mandatory override.
    not_implemented => NotImplemented,
    /// Create a job body failure. Use this from `execute_job`.
    failed => JobFailed,
    /// Create a tracker protocol error.
    tracker_protocol => TrackerProtocol,
    /// Create a job name parse error.
    job_name_parse => JobNameParse,
    /// Create a database error.
    database => Database,
}

impl JobError {
    /// Wrap an error raised while executing job `index`.
    pub fn execution(index: usize, source: JobError) -> Self {
        match source {
            already @ Self::Execution { .. } => already,
            other => Self::Execution {
                index,
                source: Box::new(other),
            },
        }
    }

    /// Programming or setup errors that must stop orchestration instead of
    /// being isolated to a single job.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::ConfigError(_) | Self::NotImplemented(_) | Self::TrackerProtocol(_) => true,
            Self::Execution { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for JobError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_yml::Error> for JobError {
    fn from(e: serde_yml::Error) -> Self {
        Self::ConfigError(e.to_string())
    }
}

impl From<sqlx::Error> for JobError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for JobError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        Self::ThreadPool(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, JobError>;
