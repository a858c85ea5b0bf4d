// SQLトラッカー: jobs(job_hash PRIMARY KEY, name, job_data, start_time, end_time)
//
// The only backend with an explicit start/end record. Every operation opens
// its own connection on a short-lived runtime and closes it before returning,
// so parallel workers never share a storage handle.

use std::collections::HashSet;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode};
use sqlx::{Connection, Row};
use tracing::debug;

use super::{JobCatalog, JobRef, Summary, TrackerBackend};
use crate::config::tracker::DbConfig;
use crate::error::JobError;

const CREATE_JOBS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    job_hash TEXT PRIMARY KEY,
    name TEXT,
    job_data JSON,
    start_time DATETIME,
    end_time DATETIME NULL
)
"#;

const UPSERT_STARTED_JOB: &str = r#"
INSERT INTO jobs (job_hash, name, job_data, start_time, end_time)
VALUES (?, ?, ?, ?, NULL)
ON CONFLICT(job_hash) DO UPDATE SET
    name = excluded.name,
    job_data = excluded.job_data,
    start_time = excluded.start_time,
    end_time = NULL
"#;

pub struct SqlTracker {
    db_config: DbConfig,
    options: SqliteConnectOptions,
}

/// Drive `fut` to completion on a fresh current-thread runtime.
fn block_on_fresh_runtime<T>(fut: impl Future<Output = crate::error::Result<T>>) -> crate::error::Result<T> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(fut)
}

/// Synchronous wrapper around an async database operation.
///
/// Inside an existing runtime the work moves to a scoped thread, since a
/// runtime cannot be blocked on from within another.
fn run_sync<T, F>(fut: F) -> crate::error::Result<T>
where
    F: Future<Output = crate::error::Result<T>> + Send,
    T: Send,
{
    if tokio::runtime::Handle::try_current().is_ok() {
        std::thread::scope(|s| {
            s.spawn(move || block_on_fresh_runtime(fut))
                .join()
                .map_err(|_| JobError::database("sql tracker thread panicked"))?
        })
    } else {
        block_on_fresh_runtime(fut)
    }
}

impl SqlTracker {
    /// Open (creating if missing) the database and ensure the `jobs` table exists.
    pub fn new(db_config: DbConfig) -> crate::error::Result<Self> {
        let options = SqliteConnectOptions::from_str(&db_config.url)
            .map_err(|e| JobError::config(format!("invalid db url '{}': {e}", db_config.url)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(db_config.busy_timeout_ms));
        let tracker = Self { db_config, options };
        tracker.create_db_tables()?;
        Ok(tracker)
    }

    pub fn db_config(&self) -> &DbConfig {
        &self.db_config
    }

    async fn connect(&self) -> crate::error::Result<SqliteConnection> {
        Ok(SqliteConnection::connect_with(&self.options).await?)
    }

    pub fn create_db_tables(&self) -> crate::error::Result<()> {
        run_sync(async {
            let mut conn = self.connect().await?;
            sqlx::query(CREATE_JOBS_TABLE).execute(&mut conn).await?;
            conn.close().await?;
            Ok(())
        })
    }

    fn select_time(
        &self,
        column: &'static str,
        job_hash: String,
    ) -> crate::error::Result<Option<DateTime<Utc>>> {
        let sql = format!("SELECT {column} FROM jobs WHERE job_hash = ?");
        run_sync(async move {
            let mut conn = self.connect().await?;
            let time: Option<Option<DateTime<Utc>>> = sqlx::query_scalar(&sql)
                .bind(&job_hash)
                .fetch_optional(&mut conn)
                .await?;
            conn.close().await?;
            Ok(time.flatten())
        })
    }

    /// Hashes of all jobs with a recorded end time.
    pub fn completed_hashes(&self) -> crate::error::Result<HashSet<String>> {
        run_sync(async {
            let mut conn = self.connect().await?;
            let hashes: Vec<String> =
                sqlx::query_scalar("SELECT job_hash FROM jobs WHERE end_time IS NOT NULL")
                    .fetch_all(&mut conn)
                    .await?;
            conn.close().await?;
            Ok(hashes.into_iter().collect())
        })
    }

    /// Delete the tracking rows of `jobs` so they run again. Returns the
    /// number of rows removed.
    pub fn delete_job_records(
        &self,
        catalog: &dyn JobCatalog,
        jobs: &[JobRef<'_>],
    ) -> crate::error::Result<u64> {
        let mut hashes = Vec::with_capacity(jobs.len());
        for job in jobs {
            hashes.push(job.hash(catalog)?);
        }
        let deleted = run_sync(async move {
            let mut conn = self.connect().await?;
            let mut tx = conn.begin().await?;
            let mut deleted = 0u64;
            for hash in &hashes {
                deleted += sqlx::query("DELETE FROM jobs WHERE job_hash = ?")
                    .bind(hash)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
            }
            tx.commit().await?;
            conn.close().await?;
            Ok(deleted)
        })?;
        debug!(deleted, "deleted job records");
        Ok(deleted)
    }
}

impl TrackerBackend for SqlTracker {
    fn is_job_complete(
        &self,
        catalog: &dyn JobCatalog,
        job: JobRef<'_>,
    ) -> crate::error::Result<bool> {
        Ok(self.job_end_time(catalog, job)?.is_some())
    }

    fn remaining_jobs(&self, catalog: &dyn JobCatalog) -> crate::error::Result<Vec<usize>> {
        let completed = self.completed_hashes()?;
        let mut remaining = Vec::new();
        for i in 0..catalog.n_jobs()? {
            if !completed.contains(&JobRef::Index(i).hash(catalog)?) {
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
        self.select_time("start_time", job.hash(catalog)?)
    }

    fn job_end_time(
        &self,
        catalog: &dyn JobCatalog,
        job: JobRef<'_>,
    ) -> crate::error::Result<Option<DateTime<Utc>>> {
        self.select_time("end_time", job.hash(catalog)?)
    }

    fn start_job(&self, catalog: &dyn JobCatalog, i: usize) -> crate::error::Result<()> {
        let data = catalog.job_data(i)?;
        let job_hash = catalog.job_hash_for(&data)?;
        let name = catalog.job_name_for(&data, &[])?;
        let job_data = serde_json::to_string(&data)?;
        let start_time = Utc::now();
        run_sync(async move {
            let mut conn = self.connect().await?;
            sqlx::query(UPSERT_STARTED_JOB)
                .bind(&job_hash)
                .bind(&name)
                .bind(&job_data)
                .bind(start_time)
                .execute(&mut conn)
                .await?;
            conn.close().await?;
            Ok(())
        })
    }

    fn end_job(&self, catalog: &dyn JobCatalog, i: usize) -> crate::error::Result<()> {
        let job_hash = JobRef::Index(i).hash(catalog)?;
        let end_time = Utc::now();
        let updated = run_sync(async {
            let mut conn = self.connect().await?;
            let result = sqlx::query("UPDATE jobs SET end_time = ? WHERE job_hash = ?")
                .bind(end_time)
                .bind(&job_hash)
                .execute(&mut conn)
                .await?;
            conn.close().await?;
            Ok(result.rows_affected())
        })?;
        if updated == 0 {
            return Err(JobError::tracker_protocol(format!(
                "end_job called for job {i} (hash {job_hash}) without a prior start_job"
            )));
        }
        Ok(())
    }

    fn summary(&self, _catalog: &dyn JobCatalog) -> crate::error::Result<Summary> {
        let (rows, finished) = run_sync(async {
            let mut conn = self.connect().await?;
            let row = sqlx::query(
                "SELECT COUNT(*) AS n_rows, COUNT(end_time) AS n_finished FROM jobs",
            )
            .fetch_one(&mut conn)
            .await?;
            let counts: (i64, i64) = (row.try_get("n_rows")?, row.try_get("n_finished")?);
            conn.close().await?;
            Ok(counts)
        })?;
        Ok(vec![
            ("tracker", "sql".to_string()),
            ("database", self.db_config.url.clone()),
            ("rows", rows.to_string()),
            ("finished_rows", finished.to_string()),
        ])
    }
}
