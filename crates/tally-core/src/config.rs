use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::TallyError;
use crate::rules::InProgressMode;
use crate::tracker::ReopenPolicy;

/// Directory holding the store and project config.
pub const TALLY_DIR: &str = ".tally";
/// SQLite store file name inside [`TALLY_DIR`].
pub const DB_FILE: &str = "tally.db";
/// Project config file name inside [`TALLY_DIR`].
pub const CONFIG_FILE: &str = "config.toml";

#[must_use]
pub fn db_path(project_root: &Path) -> PathBuf {
    project_root.join(TALLY_DIR).join(DB_FILE)
}

#[must_use]
pub fn config_path(project_root: &Path) -> PathBuf {
    project_root.join(TALLY_DIR).join(CONFIG_FILE)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub labels: LabelsConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Whether reopening a done item clears its first-done timestamp.
    #[serde(default)]
    pub on_reopen: ReopenPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Honour `<year> archive` markers in stage names.
    #[serde(default = "default_true")]
    pub archive_override: bool,
    #[serde(default)]
    pub in_progress: InProgressMode,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            archive_override: default_true(),
            in_progress: InProgressMode::default(),
        }
    }
}

/// Stage-name prefixes recognised per bucket (case-insensitive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelsConfig {
    #[serde(default = "default_backlog_labels")]
    pub backlog: Vec<String>,
    #[serde(default = "default_todo_labels")]
    pub todo: Vec<String>,
    #[serde(default = "default_in_progress_labels")]
    pub in_progress: Vec<String>,
}

impl Default for LabelsConfig {
    fn default() -> Self {
        Self {
            backlog: default_backlog_labels(),
            todo: default_todo_labels(),
            in_progress: default_in_progress_labels(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

/// Load `.tally/config.toml`, falling back to defaults when absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read, or a
/// [`TallyError::ConfigParse`] if its contents are invalid.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = config_path(project_root);
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    parse_project_config(&content).map_err(|reason| {
        TallyError::ConfigParse {
            path: path.display().to_string(),
            reason,
        }
        .into()
    })
}

fn parse_project_config(content: &str) -> std::result::Result<ProjectConfig, String> {
    toml::from_str::<ProjectConfig>(content).map_err(|error| error.message().to_string())
}

/// Load the per-user config from the platform config directory.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("tally/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Render the default project config as written by `tally init`.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn default_config_toml() -> Result<String> {
    toml::to_string_pretty(&ProjectConfig::default()).context("serialize default config")
}

const fn default_true() -> bool {
    true
}

fn default_backlog_labels() -> Vec<String> {
    vec!["backlog".to_string()]
}

fn default_todo_labels() -> Vec<String> {
    vec!["to do".to_string()]
}

fn default_in_progress_labels() -> Vec<String> {
    vec!["in progress".to_string()]
}
