// ファイルシステムトラッカー: ジョブ名 → 出力ファイル
//
// A job is complete when `{output_dir}/{job_name}.{output_filetype}` exists.
// Start/end times are read back from file metadata, never recorded.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use super::{JobCatalog, JobOutput, JobRef, Summary, TrackerBackend};
use crate::error::JobError;
use crate::job::JobData;

/// 1ジョブ1ファイルで完了状態を表すトラッカー。
pub struct FileTracker {
    output_dir: PathBuf,
    output_filetype: String,
}

/// Creation and modification time of a file, `None` if it does not exist.
///
/// Platforms without a birth time report the modification time for both.
pub(crate) fn file_times(
    path: &Path,
) -> crate::error::Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if !metadata.is_file() {
        return Ok(None);
    }
    let modified = metadata.modified()?;
    let created = metadata.created().unwrap_or(modified);
    Ok(Some((created.into(), modified.into())))
}

/// 出力ディレクトリが存在しなければ作成する。
pub(crate) fn ensure_output_dir(output_dir: &Path) -> crate::error::Result<()> {
    if !output_dir.is_dir() {
        info!(output_dir = %output_dir.display(), "output_dir does not exist, creating now");
        fs::create_dir_all(output_dir)?;
    }
    Ok(())
}

/// Strip directory and extension from an output path, leaving the job name.
pub(crate) fn job_name_from_path(path: &Path) -> crate::error::Result<&str> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            JobError::job_name_parse(format!(
                "cannot extract a job name from path '{}'",
                path.display()
            ))
        })
}

impl FileTracker {
    /// 出力ディレクトリが存在しない場合は自動的に作成する。
    pub fn new(
        output_dir: impl AsRef<Path>,
        output_filetype: impl Into<String>,
    ) -> crate::error::Result<Self> {
        let output_filetype = output_filetype.into();
        if output_filetype.is_empty() {
            return Err(JobError::config("output_filetype must not be empty"));
        }
        let output_dir = output_dir.as_ref().to_path_buf();
        ensure_output_dir(&output_dir)?;
        Ok(Self {
            output_dir,
            output_filetype,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn output_filetype(&self) -> &str {
        &self.output_filetype
    }

    pub fn job_output_filename(
        &self,
        catalog: &dyn JobCatalog,
        job: JobRef<'_>,
    ) -> crate::error::Result<String> {
        let job_name = job.name(catalog, &[])?;
        Ok(format!("{job_name}.{}", self.output_filetype))
    }

    pub fn job_output_path(
        &self,
        catalog: &dyn JobCatalog,
        job: JobRef<'_>,
    ) -> crate::error::Result<PathBuf> {
        Ok(self.output_dir.join(self.job_output_filename(catalog, job)?))
    }

    /// Recover job data from an output file path (best-effort).
    pub fn parse_job_output_path(
        &self,
        catalog: &dyn JobCatalog,
        path: &Path,
    ) -> crate::error::Result<JobData> {
        catalog.parse_job_name(job_name_from_path(path)?)
    }
}

impl TrackerBackend for FileTracker {
    fn is_job_complete(
        &self,
        catalog: &dyn JobCatalog,
        job: JobRef<'_>,
    ) -> crate::error::Result<bool> {
        Ok(self.job_output_path(catalog, job)?.exists())
    }

    /// ディレクトリを一度だけ列挙し、出力ファイルが無いジョブを返す。
    fn remaining_jobs(&self, catalog: &dyn JobCatalog) -> crate::error::Result<Vec<usize>> {
        let mut present: HashSet<String> = HashSet::new();
        for entry in fs::read_dir(&self.output_dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                present.insert(name.to_string());
            }
        }

        let mut remaining = Vec::new();
        for i in 0..catalog.n_jobs()? {
            let filename = self.job_output_filename(catalog, JobRef::Index(i))?;
            if !present.contains(&filename) {
                remaining.push(i);
            }
        }
        Ok(remaining)
    }

    fn job_start_time(
        &self,
        catalog: &dyn JobCatalog,
        job: JobRef<'_>,
    ) -> crate::error::Result<Option<DateTime<Utc>>> {
        let path = self.job_output_path(catalog, job)?;
        Ok(file_times(&path)?.map(|(created, _)| created))
    }

    fn job_end_time(
        &self,
        catalog: &dyn JobCatalog,
        job: JobRef<'_>,
    ) -> crate::error::Result<Option<DateTime<Utc>>> {
        let path = self.job_output_path(catalog, job)?;
        Ok(file_times(&path)?.map(|(_, modified)| modified))
    }

    fn job_outputs(
        &self,
        catalog: &dyn JobCatalog,
        job: JobRef<'_>,
    ) -> crate::error::Result<Vec<JobOutput>> {
        Ok(vec![JobOutput {
            name: None,
            path: self.job_output_path(catalog, job)?,
        }])
    }

    fn summary(&self, catalog: &dyn JobCatalog) -> crate::error::Result<Summary> {
        let mut n_files = 0usize;
        let mut total_bytes = 0u64;
        for i in 0..catalog.n_jobs()? {
            let path = self.job_output_path(catalog, JobRef::Index(i))?;
            if let Ok(metadata) = fs::metadata(&path) {
                if metadata.is_file() {
                    n_files += 1;
                    total_bytes += metadata.len();
                }
            }
        }
        Ok(vec![
            ("tracker", "file".to_string()),
            ("output_dir", self.output_dir.display().to_string()),
            ("output_filetype", self.output_filetype.clone()),
            ("output_files", n_files.to_string()),
            ("output_bytes", total_bytes.to_string()),
        ])
    }
}
