use std::path::Path;
use std::process::ExitCode;

use jobbatch::config::batch_file::BatchFile;
use jobbatch::config::load_batch_file;
use jobbatch::{Batch, JobContext, JobError, JobRef, JobSource};
use tracing_subscriber::EnvFilter;

/// Job source for inspecting a batch file without running anything.
struct Inspect;

impl JobSource for Inspect {
    fn execute_job(&self, _job: &JobContext) -> jobbatch::Result<()> {
        Err(JobError::not_implemented(
            "the jobbatch tool inspects batches and does not execute jobs",
        ))
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        eprintln!("Usage: jobbatch [--reset] <batch.yaml>...");
        eprintln!("  Show total and remaining jobs of each batch file.");
        eprintln!("  --reset  delete the SQL tracking rows of every job in the batch");
        eprintln!("  The batch name defaults to the file stem when `name` is not set.");
        return if args.is_empty() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        };
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        eprintln!("jobbatch {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let reset = args.iter().any(|a| a == "--reset");
    let files: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();
    if files.is_empty() {
        eprintln!("ERROR: no batch file given");
        return ExitCode::FAILURE;
    }

    let mut has_error = false;
    for file_arg in files {
        let path = Path::new(file_arg.as_str());
        let batch_file = match load_batch_file(path) {
            Ok(bf) => bf,
            Err(e) => {
                eprintln!("ERROR: Failed to load batch file {file_arg}: {e}");
                has_error = true;
                continue;
            }
        };

        if let Err(e) = inspect(path, batch_file, reset) {
            eprintln!("ERROR: {file_arg}: {e}");
            has_error = true;
        }
    }

    if has_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn inspect(path: &Path, batch_file: BatchFile, reset: bool) -> jobbatch::Result<()> {
    let name = match batch_file.name {
        Some(name) => name,
        None => path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("batch")
            .to_string(),
    };
    let executor = batch_file.settings.executor();
    let batch = Batch::from_config(Inspect, &batch_file.tracker)?
        .with_name(name)
        .with_jobs(batch_file.jobs);

    if reset {
        let sql = batch.tracker().as_sql().ok_or_else(|| {
            JobError::config("--reset is only supported for the sql tracker")
        })?;
        let refs: Vec<JobRef<'_>> = (0..batch.n_jobs()?).map(JobRef::Index).collect();
        let deleted = sql.delete_job_records(&batch, &refs)?;
        eprintln!("RESET: {} ({deleted} records deleted)", batch.list_name());
    }

    let status = batch.status()?;
    eprintln!(
        "{}: {} jobs, {} remaining",
        status.list_name, status.n_jobs, status.n_remaining
    );
    eprintln!("- executor: {executor}");
    for (key, value) in &status.details {
        eprintln!("- {key}: {value}");
    }
    for i in batch.remaining_jobs()? {
        eprintln!("  remaining: {}", batch.job_name(i, &[])?);
    }
    Ok(())
}
