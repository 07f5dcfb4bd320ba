use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::catalog::FailurePolicy;
use crate::error::{CatalogError, Result};
use crate::session::{SessionOptions, DEFAULT_BATCH_SIZE};
use crate::tasks::IngestTask;

pub const DEFAULT_CONFIG_PATH: &str = "bh_catalog.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub journal: JournalConfig,
    pub input: InputConfig,
    pub logging: LoggingConfig,
    pub tasks: BTreeMap<String, TaskConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub failure_policy: FailurePolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub dir: PathBuf,
    pub meta_db: String,
    pub batch_size: usize,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output/journal"),
            meta_db: "meta.db".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub dir: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("input"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub enabled: bool,
    /// Input file name relative to `[input] dir`.
    pub file: Option<String>,
    pub expected_total: Option<usize>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: None,
            expected_total: None,
        }
    }
}

impl Config {
    /// Load from `path`. A missing file gives the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            CatalogError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.journal.batch_size == 0 {
            return Err(CatalogError::Config(
                "journal.batch_size must be at least 1".to_string(),
            ));
        }
        if self.journal.meta_db.trim().is_empty() {
            return Err(CatalogError::Config("journal.meta_db is empty".to_string()));
        }
        Ok(())
    }

    pub fn task(&self, name: &str) -> TaskConfig {
        self.tasks.get(name).cloned().unwrap_or_default()
    }

    pub fn input_path(&self, task: &dyn IngestTask) -> PathBuf {
        let file = self
            .task(task.name())
            .file
            .unwrap_or_else(|| task.default_file().to_string());
        self.input.dir.join(file)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            batch_size: self.journal.batch_size,
            expected: self
                .tasks
                .iter()
                .filter_map(|(name, t)| t.expected_total.map(|n| (name.clone(), n)))
                .collect(),
            ..SessionOptions::default()
        }
    }
}
