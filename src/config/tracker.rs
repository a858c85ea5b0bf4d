use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::JobError;

/// 完了状態を記録するバックエンドの種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerKind {
    File,
    Multifile,
    Sql,
}

impl FromStr for TrackerKind {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(TrackerKind::File),
            "multifile" => Ok(TrackerKind::Multifile),
            "sql" => Ok(TrackerKind::Sql),
            other => Err(JobError::config(format!("unknown tracker kind: '{other}'"))),
        }
    }
}

/// トラッカー設定。YAMLの `tracker:` セクションに対応する。
///
/// `tracker` が省略された場合は、与えられたパラメータから種類を推論する。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub tracker: Option<TrackerKind>,
    pub output_dir: Option<PathBuf>,
    pub output_filetype: Option<String>,
    pub outputs: Option<OutputsSpec>,
    pub db_config: Option<DbConfig>,
}

/// Named outputs of a multi-file tracker, in any of the accepted shorthands.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OutputsSpec {
    /// `["left", {name: "right", output_filetype: "csv"}]`
    List(Vec<OutputEntry>),
    /// `{left: {}, right: {output_dir: "out/right"}}`
    Map(BTreeMap<String, ShorthandOutput>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OutputEntry {
    Name(String),
    Spec(ShorthandOutput),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ShorthandOutput {
    pub name: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub output_filetype: Option<String>,
}

/// Fully resolved location of one named output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    pub output_dir: PathBuf,
    pub output_filetype: String,
}

/// SQLite接続設定。
#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    /// `sqlite://path/to/jobs.db` or a plain file path. In-memory databases are
    /// not supported because every operation opens its own connection.
    pub url: String,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl DbConfig {
    /// Configuration for a SQLite database file at `path`.
    pub fn sqlite(path: impl AsRef<Path>) -> Self {
        DbConfig {
            url: format!("sqlite://{}", path.as_ref().display()),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl TrackerConfig {
    /// File tracker writing `{output_dir}/{job_name}.{output_filetype}`.
    pub fn file(output_dir: impl Into<PathBuf>, output_filetype: impl Into<String>) -> Self {
        TrackerConfig {
            tracker: Some(TrackerKind::File),
            output_dir: Some(output_dir.into()),
            output_filetype: Some(output_filetype.into()),
            ..Default::default()
        }
    }

    /// Multi-file tracker with explicit per-output locations.
    pub fn multifile<I, S>(outputs: I) -> Self
    where
        I: IntoIterator<Item = (S, OutputSpec)>,
        S: Into<String>,
    {
        let map = outputs
            .into_iter()
            .map(|(name, spec)| {
                (
                    name.into(),
                    ShorthandOutput {
                        name: None,
                        output_dir: Some(spec.output_dir),
                        output_filetype: Some(spec.output_filetype),
                    },
                )
            })
            .collect();
        TrackerConfig {
            tracker: Some(TrackerKind::Multifile),
            outputs: Some(OutputsSpec::Map(map)),
            ..Default::default()
        }
    }

    pub fn sql(db_config: DbConfig) -> Self {
        TrackerConfig {
            tracker: Some(TrackerKind::Sql),
            db_config: Some(db_config),
            ..Default::default()
        }
    }

    /// Explicit kind, or the single kind the supplied parameters point to.
    pub fn kind(&self) -> crate::error::Result<TrackerKind> {
        if let Some(kind) = self.tracker {
            return Ok(kind);
        }

        let mut candidates = Vec::new();
        if self.outputs.is_some() {
            candidates.push(TrackerKind::Multifile);
        } else if self.output_dir.is_some() && self.output_filetype.is_some() {
            candidates.push(TrackerKind::File);
        }
        if self.db_config.is_some() {
            candidates.push(TrackerKind::Sql);
        }

        match candidates.as_slice() {
            [kind] => Ok(*kind),
            [] => Err(JobError::config(
                "no tracker specified: supply output_dir and output_filetype, outputs, or db_config",
            )),
            _ => Err(JobError::config(format!(
                "ambiguous tracker configuration, candidates: {candidates:?}; set `tracker` explicitly"
            ))),
        }
    }

    /// Resolve the `outputs` shorthand into one location per output name.
    ///
    /// Missing per-output fields fall back to the top-level `output_dir` and
    /// `output_filetype`.
    pub fn normalized_outputs(&self) -> crate::error::Result<BTreeMap<String, OutputSpec>> {
        let outputs = self
            .outputs
            .as_ref()
            .ok_or_else(|| JobError::config("must specify outputs for multifile tracker"))?;

        let mut strict = BTreeMap::new();
        match outputs {
            OutputsSpec::List(entries) => {
                for entry in entries {
                    let (name, shorthand) = match entry {
                        OutputEntry::Name(name) => (name.clone(), ShorthandOutput::default()),
                        OutputEntry::Spec(spec) => {
                            let name = spec.name.clone().ok_or_else(|| {
                                JobError::config("must specify \"name\" in each output")
                            })?;
                            (name, spec.clone())
                        }
                    };
                    let resolved = self.resolve_output(&name, &shorthand)?;
                    if strict.insert(name.clone(), resolved).is_some() {
                        return Err(JobError::config(format!("duplicate output name '{name}'")));
                    }
                }
            }
            OutputsSpec::Map(map) => {
                for (name, shorthand) in map {
                    if let Some(inner) = &shorthand.name {
                        if inner != name {
                            return Err(JobError::config(format!(
                                "names do not match in outputs spec: '{name}' vs '{inner}'"
                            )));
                        }
                    }
                    strict.insert(name.clone(), self.resolve_output(name, shorthand)?);
                }
            }
        }

        if strict.is_empty() {
            return Err(JobError::config("outputs must name at least one output"));
        }
        Ok(strict)
    }

    fn resolve_output(
        &self,
        name: &str,
        shorthand: &ShorthandOutput,
    ) -> crate::error::Result<OutputSpec> {
        let output_dir = shorthand
            .output_dir
            .clone()
            .or_else(|| self.output_dir.clone())
            .ok_or_else(|| {
                JobError::config(format!("must specify output_dir for output '{name}'"))
            })?;
        let output_filetype = shorthand
            .output_filetype
            .clone()
            .or_else(|| self.output_filetype.clone())
            .ok_or_else(|| {
                JobError::config(format!("must specify output_filetype for output '{name}'"))
            })?;
        Ok(OutputSpec {
            output_dir,
            output_filetype,
        })
    }

    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        serde_yml::from_str(yaml).map_err(|e| {
            JobError::config(format!("Failed to parse tracker YAML: {e}"))
        })
    }
}
