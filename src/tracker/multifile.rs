use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::file::{ensure_output_dir, file_times, job_name_from_path};
use super::{JobCatalog, JobOutput, JobRef, Summary, TrackerBackend};
use crate::config::tracker::OutputSpec;
use crate::error::JobError;
use crate::job::JobData;
use crate::job::naming::{KEY_VALUE_SEPARATOR, TOKEN_SEPARATOR};

/// Extra job-name token that distinguishes the outputs of one job.
pub const OUTPUT_NAME_KEY: &str = "output_name";

/// `__output_name_{output_name}`, the token appended to every job name.
fn output_name_suffix(output_name: &str) -> String {
    format!("{TOKEN_SEPARATOR}{OUTPUT_NAME_KEY}{KEY_VALUE_SEPARATOR}{output_name}")
}

/// Tracker for jobs that produce several named files.
///
/// A job is complete only when every named output exists.
pub struct MultiFileTracker {
    outputs: BTreeMap<String, OutputSpec>,
}

impl MultiFileTracker {
    pub fn new(outputs: BTreeMap<String, OutputSpec>) -> crate::error::Result<Self> {
        if outputs.is_empty() {
            return Err(JobError::config(
                "multifile tracker needs at least one output",
            ));
        }
        for (name, output) in &outputs {
            if output.output_filetype.is_empty() {
                return Err(JobError::config(format!(
                    "output_filetype must not be empty for output '{name}'"
                )));
            }
            ensure_output_dir(&output.output_dir)?;
        }
        Ok(Self { outputs })
    }

    pub fn outputs(&self) -> &BTreeMap<String, OutputSpec> {
        &self.outputs
    }

    pub fn job_output_filenames(
        &self,
        catalog: &dyn JobCatalog,
        job: JobRef<'_>,
    ) -> crate::error::Result<BTreeMap<String, String>> {
        let data = job.data(catalog)?;
        let mut filenames = BTreeMap::new();
        for (output_name, output) in &self.outputs {
            let job_name =
                catalog.job_name_for(&data, &[(OUTPUT_NAME_KEY, output_name.as_str())])?;
            filenames.insert(
                output_name.clone(),
                format!("{job_name}.{}", output.output_filetype),
            );
        }
        Ok(filenames)
    }

    pub fn job_output_paths(
        &self,
        catalog: &dyn JobCatalog,
        job: JobRef<'_>,
    ) -> crate::error::Result<BTreeMap<String, PathBuf>> {
        let filenames = self.job_output_filenames(catalog, job)?;
        Ok(filenames
            .into_iter()
            .map(|(output_name, filename)| {
                let path = self.outputs[&output_name].output_dir.join(filename);
                (output_name, path)
            })
            .collect())
    }

    /// Recover job data from one output path (best-effort).
    ///
    /// The trailing `output_name` token must name one of this tracker's
    /// outputs; it is stripped before the rest of the name is parsed.
    pub fn parse_job_output_path(
        &self,
        catalog: &dyn JobCatalog,
        path: &Path,
    ) -> crate::error::Result<JobData> {
        let name = job_name_from_path(path)?;
        let job_name = self
            .outputs
            .keys()
            .find_map(|output_name| name.strip_suffix(&output_name_suffix(output_name)))
            .ok_or_else(|| {
                JobError::job_name_parse(format!(
                    "'{name}' does not end with the output name of any of {:?}",
                    self.outputs.keys().collect::<Vec<_>>()
                ))
            })?;
        catalog.parse_job_name(job_name)
    }

    fn existing_times(
        &self,
        catalog: &dyn JobCatalog,
        job: JobRef<'_>,
    ) -> crate::error::Result<Vec<(DateTime<Utc>, DateTime<Utc>)>> {
        let mut times = Vec::new();
        for path in self.job_output_paths(catalog, job)?.values() {
            if let Some(t) = file_times(path)? {
                times.push(t);
            }
        }
        Ok(times)
    }
}

impl TrackerBackend for MultiFileTracker {
    fn is_job_complete(
        &self,
        catalog: &dyn JobCatalog,
        job: JobRef<'_>,
    ) -> crate::error::Result<bool> {
        Ok(self
            .job_output_paths(catalog, job)?
            .values()
            .all(|path| path.exists()))
    }

    fn job_start_time(
        &self,
        catalog: &dyn JobCatalog,
        job: JobRef<'_>,
    ) -> crate::error::Result<Option<DateTime<Utc>>> {
        let times = self.existing_times(catalog, job)?;
        Ok(times.iter().map(|(created, _)| *created).min())
    }

    fn job_end_time(
        &self,
        catalog: &dyn JobCatalog,
        job: JobRef<'_>,
    ) -> crate::error::Result<Option<DateTime<Utc>>> {
        let times = self.existing_times(catalog, job)?;
        Ok(times.iter().map(|(_, modified)| *modified).max())
    }

    fn job_outputs(
        &self,
        catalog: &dyn JobCatalog,
        job: JobRef<'_>,
    ) -> crate::error::Result<Vec<JobOutput>> {
        Ok(self
            .job_output_paths(catalog, job)?
            .into_iter()
            .map(|(name, path)| JobOutput {
                name: Some(name),
                path,
            })
            .collect())
    }

    fn summary(&self, catalog: &dyn JobCatalog) -> crate::error::Result<Summary> {
        let mut n_files = 0usize;
        let mut total_bytes = 0u64;
        for i in 0..catalog.n_jobs()? {
            for path in self.job_output_paths(catalog, JobRef::Index(i))?.values() {
                if let Ok(metadata) = std::fs::metadata(path) {
                    if metadata.is_file() {
                        n_files += 1;
                        total_bytes += metadata.len();
                    }
                }
            }
        }
        let names: Vec<&str> = self.outputs.keys().map(String::as_str).collect();
        Ok(vec![
            ("tracker", "multifile".to_string()),
            ("outputs", names.join(", ")),
            ("output_files", n_files.to_string()),
            ("output_bytes", total_bytes.to_string()),
        ])
    }
}
