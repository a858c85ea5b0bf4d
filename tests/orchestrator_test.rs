// Orchestration end to end: serial and parallel runs, resumption, failure
// isolation and reporting.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use jobbatch::{
    Batch, BatchStatus, Conclusion, DbConfig, Executor, JobContext, JobData, JobError, JobSource,
    Reporter, TrackerConfig,
};
use serde_json::json;
use tempfile::tempdir;

fn numbered_jobs(n: i64) -> Vec<JobData> {
    (0..n).map(|i| JobData::from_value(json!({"i": i}))).collect()
}

/// Writes the job's single output file.
fn write_output(ctx: &JobContext) -> jobbatch::Result<()> {
    let path = ctx
        .output_path()
        .ok_or_else(|| JobError::failed("no output path"))?;
    std::fs::write(path, ctx.name.as_bytes())?;
    Ok(())
}

/// Succeeds except for job `fail_index`, which returns an error.
struct FailOne {
    fail_index: usize,
}

impl JobSource for FailOne {
    fn execute_job(&self, ctx: &JobContext) -> jobbatch::Result<()> {
        if ctx.index == self.fail_index {
            return Err(JobError::failed(format!("job {} refused", ctx.index)));
        }
        write_output(ctx)
    }
}

/// Panics on job `panic_index`.
struct PanicOne {
    panic_index: usize,
}

impl JobSource for PanicOne {
    fn execute_job(&self, ctx: &JobContext) -> jobbatch::Result<()> {
        if ctx.index == self.panic_index {
            panic!("boom in job {}", ctx.index);
        }
        write_output(ctx)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Status { n_jobs: usize, n_remaining: usize },
    NothingToDo,
    Start { n_remaining: usize },
    Failed(usize),
    Conclusion { n_completed: usize, n_failed: usize },
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<Event>>>);

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }
}

impl Reporter for Recorder {
    fn report_status(&self, status: &BatchStatus) {
        self.push(Event::Status {
            n_jobs: status.n_jobs,
            n_remaining: status.n_remaining,
        });
    }

    fn report_nothing_to_do(&self) {
        self.push(Event::NothingToDo);
    }

    fn report_start(&self, _start_time: DateTime<Utc>, n_remaining: usize) {
        self.push(Event::Start { n_remaining });
    }

    fn report_job_failed(&self, index: usize, _error: &JobError) {
        self.push(Event::Failed(index));
    }

    fn report_conclusion(&self, conclusion: &Conclusion) {
        self.push(Event::Conclusion {
            n_completed: conclusion.n_completed,
            n_failed: conclusion.n_failed,
        });
    }
}

fn file_batch<S: JobSource>(source: S, dir: &Path, n: i64) -> Batch<S> {
    Batch::from_config(source, &TrackerConfig::file(dir, "txt"))
        .expect("file tracker")
        .with_name("numbers")
        .with_jobs(numbered_jobs(n))
}

fn sql_batch<S: JobSource>(source: S, dir: &Path, n: i64) -> Batch<S> {
    let config = TrackerConfig::sql(DbConfig::sqlite(dir.join("jobs.db")));
    Batch::from_config(source, &config)
        .expect("sql tracker")
        .with_name("numbers")
        .with_jobs(numbered_jobs(n))
}

// ============================================================
// 1. Serial and parallel runs
// ============================================================

#[test]
fn test_serial_run_completes_all_jobs() {
    let dir = tempdir().expect("failed to create temp dir");
    let batch = file_batch(write_output, dir.path(), 4);

    let summary = batch.orchestrate(Executor::Serial).unwrap();
    assert_eq!(summary.n_jobs, 4);
    assert_eq!(summary.remaining, vec![0, 1, 2, 3]);
    assert!(summary.is_success());
    assert_eq!(summary.n_succeeded(), 4);
    assert!(batch.remaining_jobs().unwrap().is_empty());

    let written = std::fs::read_to_string(dir.path().join("numbers__i_2.txt")).unwrap();
    assert_eq!(written, "numbers__i_2");
}

#[test]
fn test_parallel_run_completes_same_set_as_serial() {
    let serial_dir = tempdir().expect("failed to create temp dir");
    let parallel_dir = tempdir().expect("failed to create temp dir");

    let serial = file_batch(write_output, serial_dir.path(), 12);
    let parallel = file_batch(write_output, parallel_dir.path(), 12);
    serial.orchestrate(Executor::Serial).unwrap();
    let summary = parallel
        .orchestrate(Executor::Parallel {
            n_processes: Some(3),
        })
        .unwrap();

    assert!(summary.is_success());
    let all: Vec<usize> = (0..12).collect();
    assert_eq!(
        serial.are_jobs_complete(&all).unwrap(),
        parallel.are_jobs_complete(&all).unwrap()
    );
    assert!(parallel.remaining_jobs().unwrap().is_empty());
}

#[test]
fn test_parallel_run_with_sql_tracker() {
    let dir = tempdir().expect("failed to create temp dir");
    let noop = |_ctx: &JobContext| -> jobbatch::Result<()> { Ok(()) };
    let batch = sql_batch(noop, dir.path(), 20);

    let summary = batch
        .orchestrate(Executor::Parallel {
            n_processes: Some(4),
        })
        .unwrap();
    assert!(summary.is_success());
    assert!(batch.remaining_jobs().unwrap().is_empty());
    for i in 0..20 {
        assert!(batch.job_end_time(i).unwrap().is_some(), "job {i} has no end time");
    }
}

// ============================================================
// 2. Resumption
// ============================================================

#[test]
fn test_second_run_has_nothing_to_do() {
    let dir = tempdir().expect("failed to create temp dir");
    let counter = Arc::new(Mutex::new(0usize));
    let calls = Arc::clone(&counter);
    let body = move |ctx: &JobContext| -> jobbatch::Result<()> {
        *calls.lock().unwrap() += 1;
        write_output(ctx)
    };
    let recorder = Recorder::default();
    let batch = file_batch(body, dir.path(), 3).with_reporter(recorder.clone());

    batch.orchestrate(Executor::Serial).unwrap();
    assert_eq!(*counter.lock().unwrap(), 3);

    let second = batch.orchestrate(Executor::Serial).unwrap();
    assert_eq!(*counter.lock().unwrap(), 3, "no job runs twice");
    assert!(second.remaining.is_empty());
    assert!(second.conclusion.is_none());

    let events = recorder.events();
    assert_eq!(
        &events[events.len() - 2..],
        &[
            Event::Status {
                n_jobs: 3,
                n_remaining: 0
            },
            Event::NothingToDo
        ]
    );
}

#[test]
fn test_only_remaining_jobs_are_run() {
    let dir = tempdir().expect("failed to create temp dir");
    let batch = file_batch(write_output, dir.path(), 3);
    std::fs::write(dir.path().join("numbers__i_1.txt"), b"done").unwrap();

    let summary = batch.orchestrate(Executor::Serial).unwrap();
    assert_eq!(summary.remaining, vec![0, 2]);
    let untouched = std::fs::read_to_string(dir.path().join("numbers__i_1.txt")).unwrap();
    assert_eq!(untouched, "done");
}

// ============================================================
// 3. Failures
// ============================================================

#[test]
fn test_failed_job_does_not_stop_others_serial() {
    let dir = tempdir().expect("failed to create temp dir");
    let recorder = Recorder::default();
    let batch = file_batch(FailOne { fail_index: 1 }, dir.path(), 4).with_reporter(recorder.clone());

    let summary = batch.orchestrate(Executor::Serial).unwrap();
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].index, 1);
    assert!(matches!(
        summary.failures[0].error,
        JobError::Execution { index: 1, .. }
    ));
    assert_eq!(summary.n_succeeded(), 3);
    assert_eq!(batch.remaining_jobs().unwrap(), vec![1]);

    assert_eq!(
        recorder.events(),
        vec![
            Event::Status {
                n_jobs: 4,
                n_remaining: 4
            },
            Event::Start { n_remaining: 4 },
            Event::Failed(1),
            Event::Conclusion {
                n_completed: 4,
                n_failed: 1
            },
        ]
    );
}

#[test]
fn test_failed_job_with_sql_tracker_keeps_start_time_only() {
    let dir = tempdir().expect("failed to create temp dir");
    let batch = sql_batch(
        |ctx: &JobContext| -> jobbatch::Result<()> {
            if ctx.index == 2 {
                Err(JobError::failed("nope"))
            } else {
                Ok(())
            }
        },
        dir.path(),
        3,
    );

    let summary = batch
        .orchestrate(Executor::Parallel {
            n_processes: Some(2),
        })
        .unwrap();
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(batch.remaining_jobs().unwrap(), vec![2]);
    assert!(batch.job_start_time(2).unwrap().is_some());
    assert!(batch.job_end_time(2).unwrap().is_none());

    // A later run retries only the failed job.
    let retry = sql_batch(
        |_ctx: &JobContext| -> jobbatch::Result<()> { Ok(()) },
        dir.path(),
        3,
    );
    let summary = retry.orchestrate(Executor::Serial).unwrap();
    assert_eq!(summary.remaining, vec![2]);
    assert!(retry.remaining_jobs().unwrap().is_empty());
}

#[test]
fn test_panicking_job_is_isolated_in_parallel_run() {
    let dir = tempdir().expect("failed to create temp dir");
    let batch = file_batch(PanicOne { panic_index: 3 }, dir.path(), 6);

    let summary = batch
        .orchestrate(Executor::Parallel {
            n_processes: Some(2),
        })
        .unwrap();
    assert_eq!(summary.failures.len(), 1);
    let failure = &summary.failures[0];
    assert_eq!(failure.index, 3);
    let message = failure.error.to_string();
    assert!(message.contains("panicked"), "unexpected error: {message}");
    assert!(message.contains("boom in job 3"));
    assert_eq!(batch.remaining_jobs().unwrap(), vec![3]);
}

#[test]
fn test_fatal_error_stops_serial_run() {
    let dir = tempdir().expect("failed to create temp dir");
    let calls = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&calls);
    let body = move |ctx: &JobContext| -> jobbatch::Result<()> {
        seen.lock().unwrap().push(ctx.index);
        Err(JobError::config("bad setup"))
    };
    let batch = file_batch(body, dir.path(), 3);

    let result = batch.orchestrate(Executor::Serial);
    assert!(matches!(result, Err(ref e) if e.is_fatal()));
    assert_eq!(*calls.lock().unwrap(), vec![0]);
}

// ============================================================
// 4. Job sources
// ============================================================

#[test]
fn test_missing_job_list_is_not_implemented() {
    let dir = tempdir().expect("failed to create temp dir");
    let batch = Batch::from_config(write_output, &TrackerConfig::file(dir.path(), "txt")).unwrap();
    let result = batch.orchestrate(Executor::Serial);
    assert!(
        matches!(result, Err(JobError::NotImplemented(_))),
        "expected NotImplemented, got {result:?}"
    );
}

#[test]
fn test_virtual_job_source() {
    struct Squares;
    impl JobSource for Squares {
        fn n_jobs(&self) -> jobbatch::Result<usize> {
            Ok(5)
        }
        fn job_data(&self, i: usize) -> jobbatch::Result<JobData> {
            let n = i as i64;
            Ok(JobData::from_value(json!({"n": n, "sq": n * n})))
        }
        fn execute_job(&self, ctx: &JobContext) -> jobbatch::Result<()> {
            write_output(ctx)
        }
    }

    let dir = tempdir().expect("failed to create temp dir");
    let batch = Batch::from_config(Squares, &TrackerConfig::file(dir.path(), "txt"))
        .unwrap()
        .with_name("squares");
    assert_eq!(batch.job_name(3, &[]).unwrap(), "squares__n_3__sq_9");

    let summary = batch.orchestrate(Executor::Serial).unwrap();
    assert_eq!(summary.n_jobs, 5);
    assert!(dir.path().join("squares__n_4__sq_16.txt").exists());
    assert!(batch.remaining_jobs().unwrap().is_empty());
}
