use serde::Deserialize;

use super::settings::Settings;
use super::tracker::TrackerConfig;
use crate::job::JobData;

/// A batch described in YAML: the job list plus where completion is tracked.
///
/// ```yaml
/// name: resize
/// jobs:
///   - {id: a, width: 100}
///   - {id: b, width: 200}
/// tracker:
///   output_dir: out
///   output_filetype: json
/// settings:
///   executor: serial
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct BatchFile {
    pub name: Option<String>,
    pub jobs: Vec<JobData>,
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub settings: Settings,
}
