//! Configuration types for notebook-jobs

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "notebook-jobs.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Notebook execution configuration
///
/// Groups settings for how jobs are executed and where their files live.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Server root; registered job file paths are relative to it (default: ".")
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Bundle every staged file into a single tar.gz archive and keep
    /// partial results when a cell fails (default: false)
    #[serde(default)]
    pub archive_outputs: bool,

    /// Persist interactive widget state in executed notebooks (default: true)
    #[serde(default = "default_true")]
    pub store_widget_state: bool,

    /// Path to the jupyter executable (auto-detected if None)
    #[serde(default)]
    pub jupyter_path: Option<PathBuf>,

    /// Path to the Python interpreter that runs nbclient (auto-detected if None)
    #[serde(default)]
    pub python_path: Option<PathBuf>,

    /// Whether to search PATH for jupyter and python if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            archive_outputs: false,
            store_widget_state: true,
            jupyter_path: None,
            python_path: None,
            search_path: true,
        }
    }
}

/// Main configuration for notebook-jobs
///
/// Sub-configs are flattened so the serialized form has no nesting.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Database settings
    #[serde(flatten)]
    pub persistence: PersistenceConfig,

    /// Execution settings
    #[serde(flatten)]
    pub execution: ExecutionConfig,
}

impl Config {
    /// Check settings that would otherwise fail late, at first use
    pub fn validate(&self) -> Result<()> {
        if self.persistence.database_path.as_os_str().is_empty() {
            return Err(Error::Config {
                message: "database path must not be empty".to_string(),
                key: Some("database_path".to_string()),
            });
        }

        if let Some(path) = &self.execution.jupyter_path
            && !path.exists()
        {
            return Err(Error::Config {
                message: format!("jupyter executable not found at {}", path.display()),
                key: Some("jupyter_path".to_string()),
            });
        }

        if let Some(path) = &self.execution.python_path
            && !path.exists()
        {
            return Err(Error::Config {
                message: format!("python interpreter not found at {}", path.display()),
                key: Some("python_path".to_string()),
            });
        }

        Ok(())
    }

    /// Resolve the jupyter executable from explicit config or PATH
    pub fn jupyter_binary(&self) -> Option<PathBuf> {
        match &self.execution.jupyter_path {
            Some(path) => Some(path.clone()),
            None if self.execution.search_path => which::which("jupyter").ok(),
            None => None,
        }
    }

    /// Resolve the Python interpreter from explicit config or PATH
    ///
    /// PATH lookup prefers `python3` over `python`.
    pub fn python_binary(&self) -> Option<PathBuf> {
        match &self.execution.python_path {
            Some(path) => Some(path.clone()),
            None if self.execution.search_path => which::which("python3")
                .or_else(|_| which::which("python"))
                .ok(),
            None => None,
        }
    }
}

// Default value functions
fn default_database_path() -> PathBuf {
    PathBuf::from("notebook-jobs.db")
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}
