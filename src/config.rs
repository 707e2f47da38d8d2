//! Configuration for the ledger tooling.
//!
//! Settings are JSON and layered: the user file
//! (`<config dir>/agent-ledger/settings.json`) is read first, then the
//! project file (`.agent-ledger/settings.json`), whose keys win. Missing
//! files are skipped; missing keys take their defaults.
//!
//! ```json
//! {
//!   "ledgerFile": "test_result.md",
//!   "stuckThreshold": 3,
//!   "strictValidation": false,
//!   "maxConflictRetries": 3,
//!   "createdBy": "main_agent"
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LedgerError, Result};

/// Default ledger file name, relative to the project directory.
pub const DEFAULT_LEDGER_FILE: &str = "test_result.md";

/// Project-level settings directory.
pub const PROJECT_CONFIG_DIR: &str = ".agent-ledger";

/// Settings file name inside each config directory.
pub const SETTINGS_FILE: &str = "settings.json";

/// Ledger tooling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LedgerConfig {
    /// Ledger path, relative to the project directory unless absolute
    pub ledger_file: PathBuf,
    /// `stuck_count` at which a task is listed in `stuck_tasks`
    pub stuck_threshold: u32,
    /// Report validation warnings as errors
    pub strict_validation: bool,
    /// Retries after a concurrent-write conflict
    pub max_conflict_retries: u32,
    /// Value for `metadata.created_by` in new ledgers
    pub created_by: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            ledger_file: PathBuf::from(DEFAULT_LEDGER_FILE),
            stuck_threshold: 3,
            strict_validation: false,
            max_conflict_retries: 3,
            created_by: "main_agent".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Load user then project settings for `project_dir`.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let mut layers = Vec::with_capacity(2);
        if let Some(user) = Self::user_settings_path() {
            layers.push(user);
        }
        layers.push(Self::settings_path(project_dir));
        Self::load_layers(&layers)
    }

    /// Merge the JSON objects in `paths` in order, later files winning.
    pub fn load_layers(paths: &[PathBuf]) -> Result<Self> {
        let mut merged = serde_json::Map::new();
        for path in paths {
            if !path.exists() {
                continue;
            }
            let content = std::fs::read_to_string(path)?;
            let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
                LedgerError::config_with_path(format!("invalid JSON: {e}"), path.clone())
            })?;
            let serde_json::Value::Object(map) = value else {
                return Err(LedgerError::config_with_path(
                    "settings must be a JSON object",
                    path.clone(),
                ));
            };
            debug!("Loaded settings layer {}", path.display());
            merged.extend(map);
        }

        let config: Self = serde_json::from_value(serde_json::Value::Object(merged))
            .map_err(|e| LedgerError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.stuck_threshold == 0 {
            return Err(LedgerError::InvalidConfig {
                field: "stuckThreshold".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.ledger_file.as_os_str().is_empty() {
            return Err(LedgerError::InvalidConfig {
                field: "ledgerFile".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Ledger path resolved against `project_dir`.
    #[must_use]
    pub fn ledger_path(&self, project_dir: &Path) -> PathBuf {
        if self.ledger_file.is_absolute() {
            self.ledger_file.clone()
        } else {
            project_dir.join(&self.ledger_file)
        }
    }

    /// Get the project settings path
    pub fn settings_path(project_dir: &Path) -> PathBuf {
        project_dir.join(PROJECT_CONFIG_DIR).join(SETTINGS_FILE)
    }

    /// Get the user settings path, if the platform has a config directory
    pub fn user_settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("agent-ledger").join(SETTINGS_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_files() {
        let temp = TempDir::new().unwrap();
        let config = LedgerConfig::load_layers(&[temp.path().join("missing.json")]).unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(
            config.ledger_path(temp.path()),
            temp.path().join("test_result.md")
        );
    }

    #[test]
    fn test_project_overrides_user() {
        let temp = TempDir::new().unwrap();
        let user = write(
            temp.path(),
            "user.json",
            r#"{"stuckThreshold": 5, "createdBy": "alice"}"#,
        );
        let project = write(temp.path(), "project.json", r#"{"stuckThreshold": 2}"#);

        let config = LedgerConfig::load_layers(&[user, project]).unwrap();
        assert_eq!(config.stuck_threshold, 2);
        assert_eq!(config.created_by, "alice");
        assert!(!config.strict_validation);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let temp = TempDir::new().unwrap();
        let bad = write(temp.path(), "bad.json", "{ not json");
        let err = LedgerConfig::load_layers(&[bad.clone()]).unwrap_err();
        assert!(matches!(err, LedgerError::Config { path: Some(p), .. } if p == bad));
    }

    #[test]
    fn test_non_object_rejected() {
        let temp = TempDir::new().unwrap();
        let arr = write(temp.path(), "arr.json", "[1, 2]");
        assert!(LedgerConfig::load_layers(&[arr]).is_err());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let temp = TempDir::new().unwrap();
        let zero = write(temp.path(), "zero.json", r#"{"stuckThreshold": 0}"#);
        let err = LedgerConfig::load_layers(&[zero]).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidConfig { .. }));
    }

    #[test]
    fn test_absolute_ledger_path_kept() {
        let temp = TempDir::new().unwrap();
        let config = LedgerConfig {
            ledger_file: temp.path().join("elsewhere.md"),
            ..LedgerConfig::default()
        };
        assert_eq!(
            config.ledger_path(Path::new("/proj")),
            temp.path().join("elsewhere.md")
        );
    }

    #[test]
    fn test_settings_path() {
        assert_eq!(
            LedgerConfig::settings_path(Path::new("/proj")),
            PathBuf::from("/proj/.agent-ledger/settings.json")
        );
    }
}
