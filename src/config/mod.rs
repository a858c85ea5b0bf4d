pub mod batch_file;
pub mod settings;
pub mod tracker;

use batch_file::BatchFile;
use std::path::{Path, PathBuf};

/// バッチファイル（YAML）を読み込む。
///
/// トラッカーの相対パス（`output_dir` と各出力の `output_dir`）はバッチファイルの
/// ディレクトリを基準に解決される。SQLiteのURLはそのまま使用する。
pub fn load_batch_file(path: &Path) -> crate::error::Result<BatchFile> {
    let content = std::fs::read_to_string(path)?;
    let mut batch_file: BatchFile = serde_yml::from_str(&content).map_err(|e| {
        crate::error::JobError::config(format!(
            "Failed to parse batch file {}: {e}",
            path.display()
        ))
    })?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tracker_config = &mut batch_file.tracker;
    if let Some(dir) = tracker_config.output_dir.take() {
        tracker_config.output_dir = Some(resolve_path(base_dir, &dir));
    }
    if let Some(outputs) = tracker_config.outputs.as_mut() {
        let shorthands: Vec<&mut tracker::ShorthandOutput> = match outputs {
            tracker::OutputsSpec::List(entries) => entries
                .iter_mut()
                .filter_map(|entry| match entry {
                    tracker::OutputEntry::Spec(spec) => Some(spec),
                    tracker::OutputEntry::Name(_) => None,
                })
                .collect(),
            tracker::OutputsSpec::Map(map) => map.values_mut().collect(),
        };
        for shorthand in shorthands {
            if let Some(dir) = shorthand.output_dir.take() {
                shorthand.output_dir = Some(resolve_path(base_dir, &dir));
            }
        }
    }

    Ok(batch_file)
}

/// Resolve a potentially relative path against a base directory.
/// If the path is already absolute, return it as-is.
fn resolve_path(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}
