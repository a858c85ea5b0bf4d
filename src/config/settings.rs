use std::path::Path;

use serde::Deserialize;

use crate::batch::orchestrator::Executor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    Serial,
    Parallel,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub executor: ExecutorKind,
    /// Worker count for parallel runs; 0 means one per available core.
    pub parallel_workers: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            executor: ExecutorKind::Parallel,
            parallel_workers: 0,
        }
    }
}

impl Settings {
    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        serde_yml::from_str(yaml).map_err(|e| {
            crate::error::JobError::config(format!("Failed to parse settings YAML: {e}"))
        })
    }

    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn executor(&self) -> Executor {
        match self.executor {
            ExecutorKind::Serial => Executor::Serial,
            ExecutorKind::Parallel => Executor::Parallel {
                n_processes: (self.parallel_workers > 0).then_some(self.parallel_workers),
            },
        }
    }
}
