//! Configuration loading and management
//!
//! Handles parsing of `todo.toml` in the data directory.

use chrono::format::{Item, StrftimeItems};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::task::DEFAULT_DATE_FORMAT;

/// File name of the configuration inside the data directory
pub const CONFIG_FILE: &str = "todo.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Task list persistence
    #[serde(default)]
    pub storage: StorageConfig,

    /// Reminder scheduling
    #[serde(default)]
    pub reminders: ReminderConfig,

    /// Human-readable output
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Where the task list document lives
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Override for the data directory (defaults to the platform data dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Task list document name inside the data directory
    #[serde(default = "default_file_name")]
    pub file_name: String,
}

fn default_file_name() -> String {
    "TodoList.json".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            file_name: default_file_name(),
        }
    }
}

/// Reminder-related configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReminderConfig {
    /// Whether the user allows reminders at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Title text of every reminder
    #[serde(default = "default_reminder_title")]
    pub title: String,

    /// Journal of pending reminder requests inside the data directory
    #[serde(default = "default_journal_file")]
    pub journal_file: String,
}

fn default_true() -> bool {
    true
}

fn default_reminder_title() -> String {
    "Reminder".to_string()
}

fn default_journal_file() -> String {
    "reminders.json".to_string()
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            title: default_reminder_title(),
            journal_file: default_journal_file(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    /// strftime format for due dates
    #[serde(default = "default_date_format")]
    pub date_format: String,
}

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            date_format: default_date_format(),
        }
    }
}

fn validate_file_name(name: &str, field: &str) -> crate::error::Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(crate::error::Error::InvalidConfig(format!(
            "{field} cannot be empty"
        )));
    }
    let as_path = Path::new(trimmed);
    if as_path.components().count() != 1 || as_path.file_name().is_none() {
        return Err(crate::error::Error::InvalidConfig(format!(
            "{field}: '{trimmed}' must be a plain file name"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a `todo.toml` file
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a data directory, or return defaults
    pub fn load_from_dir(dir: &Path) -> Self {
        let config_path = dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Self::default();
        }
        match Self::load(&config_path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(
                    "ignoring invalid config {}: {err}",
                    config_path.display()
                );
                Self::default()
            }
        }
    }

    /// Task list document path for a resolved data directory
    pub fn tasks_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(self.storage.file_name.trim())
    }

    /// Reminder journal path for a resolved data directory
    pub fn journal_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(self.reminders.journal_file.trim())
    }

    fn validate(&self) -> crate::error::Result<()> {
        validate_file_name(&self.storage.file_name, "storage.file_name")?;
        validate_file_name(&self.reminders.journal_file, "reminders.journal_file")?;

        if self.storage.file_name.trim() == self.reminders.journal_file.trim() {
            return Err(crate::error::Error::InvalidConfig(
                "storage.file_name and reminders.journal_file must differ".to_string(),
            ));
        }

        if self.reminders.title.trim().is_empty() {
            return Err(crate::error::Error::InvalidConfig(
                "reminders.title cannot be empty".to_string(),
            ));
        }

        if self.display.date_format.trim().is_empty() {
            return Err(crate::error::Error::InvalidConfig(
                "display.date_format cannot be empty".to_string(),
            ));
        }
        if StrftimeItems::new(&self.display.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(crate::error::Error::InvalidConfig(format!(
                "display.date_format: invalid format '{}'",
                self.display.date_format
            )));
        }

        Ok(())
    }
}
