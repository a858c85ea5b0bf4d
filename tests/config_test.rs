// 設定ファイル解析テスト: tracker / settings / batch file

use std::io::Write;
use std::path::Path;

use jobbatch::config::load_batch_file;
use jobbatch::config::settings::{ExecutorKind, Settings};
use jobbatch::{Executor, JobData, JobError, OutputSpec, Tracker, TrackerConfig, TrackerKind};
use serde_json::json;

fn write_file(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).expect("create file");
    f.write_all(content.as_bytes()).expect("write file");
    path
}

// ============================================================
// 1. Tracker kind inference
// ============================================================

#[test]
fn test_kind_inferred_as_file() {
    let config = TrackerConfig::from_yaml("output_dir: out\noutput_filetype: json\n").unwrap();
    assert_eq!(config.kind().unwrap(), TrackerKind::File);
}

#[test]
fn test_kind_inferred_as_sql() {
    let config = TrackerConfig::from_yaml("db_config:\n  url: sqlite://jobs.db\n").unwrap();
    assert_eq!(config.kind().unwrap(), TrackerKind::Sql);
    assert_eq!(config.db_config.unwrap().busy_timeout_ms, 5000);
}

#[test]
fn test_kind_inferred_as_multifile() {
    let yaml = "output_dir: out\noutput_filetype: json\noutputs: [left, right]\n";
    let config = TrackerConfig::from_yaml(yaml).unwrap();
    assert_eq!(config.kind().unwrap(), TrackerKind::Multifile);
}

#[test]
fn test_kind_explicit_wins() {
    let yaml = "tracker: sql\noutput_dir: out\noutput_filetype: json\ndb_config: {url: 'sqlite://x.db'}\n";
    let config = TrackerConfig::from_yaml(yaml).unwrap();
    assert_eq!(config.kind().unwrap(), TrackerKind::Sql);
}

#[test]
fn test_kind_ambiguous_is_config_error() {
    let yaml = "output_dir: out\noutput_filetype: json\ndb_config: {url: 'sqlite://x.db'}\n";
    let config = TrackerConfig::from_yaml(yaml).unwrap();
    let result = config.kind();
    assert!(
        matches!(result, Err(JobError::ConfigError(_))),
        "expected ConfigError, got {result:?}"
    );
}

#[test]
fn test_kind_missing_is_config_error() {
    let config = TrackerConfig::from_yaml("output_dir: out\n").unwrap();
    assert!(matches!(config.kind(), Err(JobError::ConfigError(_))));
}

#[test]
fn test_unknown_tracker_kind_rejected() {
    assert!(TrackerConfig::from_yaml("tracker: bucket\n").is_err());
}

// ============================================================
// 2. Multi-file outputs shorthand
// ============================================================

fn spec(dir: &str, filetype: &str) -> OutputSpec {
    OutputSpec {
        output_dir: dir.into(),
        output_filetype: filetype.to_string(),
    }
}

#[test]
fn test_outputs_list_of_names_uses_defaults() {
    let yaml = "output_dir: out\noutput_filetype: json\noutputs: [left, right]\n";
    let outputs = TrackerConfig::from_yaml(yaml).unwrap().normalized_outputs().unwrap();
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs["left"], spec("out", "json"));
    assert_eq!(outputs["right"], spec("out", "json"));
}

#[test]
fn test_outputs_list_of_specs_overrides_defaults() {
    let yaml = r#"
output_dir: out
output_filetype: json
outputs:
  - left
  - name: right
    output_filetype: csv
    output_dir: elsewhere
"#;
    let outputs = TrackerConfig::from_yaml(yaml).unwrap().normalized_outputs().unwrap();
    assert_eq!(outputs["left"], spec("out", "json"));
    assert_eq!(outputs["right"], spec("elsewhere", "csv"));
}

#[test]
fn test_outputs_map_form() {
    let yaml = r#"
output_filetype: png
outputs:
  thumb: {output_dir: thumbs}
  full: {output_dir: full, output_filetype: tiff}
"#;
    let outputs = TrackerConfig::from_yaml(yaml).unwrap().normalized_outputs().unwrap();
    assert_eq!(outputs["thumb"], spec("thumbs", "png"));
    assert_eq!(outputs["full"], spec("full", "tiff"));
}

#[test]
fn test_outputs_map_name_mismatch() {
    let yaml = "output_dir: out\noutput_filetype: json\noutputs:\n  left: {name: right}\n";
    let result = TrackerConfig::from_yaml(yaml).unwrap().normalized_outputs();
    assert!(matches!(result, Err(JobError::ConfigError(_))));
}

#[test]
fn test_outputs_spec_without_name() {
    let yaml = "output_dir: out\noutput_filetype: json\noutputs:\n  - {output_filetype: csv}\n";
    let result = TrackerConfig::from_yaml(yaml).unwrap().normalized_outputs();
    assert!(matches!(result, Err(JobError::ConfigError(_))));
}

#[test]
fn test_outputs_missing_filetype() {
    let yaml = "output_dir: out\noutputs: [left]\n";
    let result = TrackerConfig::from_yaml(yaml).unwrap().normalized_outputs();
    assert!(matches!(result, Err(JobError::ConfigError(_))));
}

#[test]
fn test_outputs_duplicate_names() {
    let yaml = "output_dir: out\noutput_filetype: json\noutputs: [left, left]\n";
    let result = TrackerConfig::from_yaml(yaml).unwrap().normalized_outputs();
    assert!(matches!(result, Err(JobError::ConfigError(_))));
}

// ============================================================
// 3. Tracker construction
// ============================================================

#[test]
fn test_tracker_from_config_fails_before_creating_dirs() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let out = dir.path().join("never");
    let config = TrackerConfig {
        output_dir: Some(out.clone()),
        ..Default::default()
    };
    assert!(Tracker::from_config(&config).is_err());
    assert!(!out.exists());
}

#[test]
fn test_tracker_from_config_rejects_empty_filetype() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let result = Tracker::from_config(&TrackerConfig::file(dir.path(), ""));
    assert!(matches!(result, Err(JobError::ConfigError(_))));
}

#[test]
fn test_tracker_from_config_builds_each_kind() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let file = Tracker::from_config(&TrackerConfig::file(dir.path().join("f"), "json")).unwrap();
    assert_eq!(file.kind(), TrackerKind::File);

    let multi = Tracker::from_config(&TrackerConfig::multifile([(
        "only",
        OutputSpec {
            output_dir: dir.path().join("m"),
            output_filetype: "json".to_string(),
        },
    )]))
    .unwrap();
    assert_eq!(multi.kind(), TrackerKind::Multifile);
    assert!(dir.path().join("m").is_dir());

    let sql = Tracker::from_config(&TrackerConfig::sql(jobbatch::DbConfig::sqlite(
        dir.path().join("jobs.db"),
    )))
    .unwrap();
    assert_eq!(sql.kind(), TrackerKind::Sql);
}

// ============================================================
// 4. Settings
// ============================================================

#[test]
fn test_settings_defaults() {
    let settings = Settings::default();
    assert_eq!(settings.executor, ExecutorKind::Parallel);
    assert_eq!(settings.parallel_workers, 0);
    assert_eq!(settings.executor(), Executor::Parallel { n_processes: None });
}

#[test]
fn test_settings_from_yaml() {
    let settings = Settings::from_yaml("executor: parallel\nparallel_workers: 3\n").unwrap();
    assert_eq!(
        settings.executor(),
        Executor::Parallel {
            n_processes: Some(3)
        }
    );

    let serial = Settings::from_yaml("executor: serial\n").unwrap();
    assert_eq!(serial.executor(), Executor::Serial);
}

#[test]
fn test_settings_invalid_executor() {
    let result = Settings::from_yaml("executor: threads\n");
    assert!(matches!(result, Err(JobError::ConfigError(_))));
}

#[test]
fn test_settings_from_file() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = write_file(dir.path(), "settings.yaml", "executor: serial\n");
    assert_eq!(Settings::from_file(&path).unwrap().executor(), Executor::Serial);
}

// ============================================================
// 5. Batch files
// ============================================================

#[test]
fn test_load_batch_file_resolves_relative_dirs() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let yaml = r#"
name: resize
jobs:
  - {id: a, width: 100}
  - {id: b, width: 200}
tracker:
  output_dir: out
  output_filetype: json
settings:
  executor: serial
"#;
    let path = write_file(dir.path(), "batch.yaml", yaml);
    let batch_file = load_batch_file(&path).unwrap();

    assert_eq!(batch_file.name.as_deref(), Some("resize"));
    assert_eq!(batch_file.jobs.len(), 2);
    assert_eq!(batch_file.jobs[1], JobData::from_value(json!({"id": "b", "width": 200})));
    assert_eq!(batch_file.tracker.output_dir, Some(dir.path().join("out")));
    assert_eq!(batch_file.settings.executor(), Executor::Serial);
}

#[test]
fn test_load_batch_file_resolves_output_dirs() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let yaml = r#"
jobs: [{id: a}]
tracker:
  output_filetype: json
  outputs:
    left: {output_dir: l}
    right: {output_dir: /abs/r}
"#;
    let path = write_file(dir.path(), "multi.yaml", yaml);
    let batch_file = load_batch_file(&path).unwrap();
    let outputs = batch_file.tracker.normalized_outputs().unwrap();
    assert_eq!(outputs["left"].output_dir, dir.path().join("l"));
    assert_eq!(outputs["right"].output_dir, Path::new("/abs/r"));
    assert!(batch_file.name.is_none());
    assert_eq!(batch_file.settings.executor, ExecutorKind::Parallel);
}

#[test]
fn test_load_batch_file_missing_jobs() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = write_file(dir.path(), "bad.yaml", "tracker: {output_dir: o, output_filetype: t}\n");
    assert!(matches!(load_batch_file(&path), Err(JobError::ConfigError(_))));
}

#[test]
fn test_load_batch_file_not_found() {
    let result = load_batch_file(Path::new("/nonexistent/batch.yaml"));
    assert!(matches!(result, Err(JobError::IoError(_))));
}
