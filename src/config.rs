//! Engine configuration, loaded from TOML.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::ConfigError;

fn default_credo_per_level() -> i64 {
    100
}

fn default_recent_limit() -> usize {
    10
}

fn default_window_days() -> i64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Credo required per level; level `n` is reached at `n * credo_per_level`
    #[serde(default = "default_credo_per_level")]
    pub credo_per_level: i64,
    /// Directory holding `skills/*.toml`. The embedded catalog is used when unset.
    #[serde(default)]
    pub skill_data_dir: Option<PathBuf>,
    #[serde(default = "default_recent_limit")]
    pub recent_transactions_limit: usize,
    /// Default window for transaction-count quests that don't name one
    #[serde(default = "default_window_days")]
    pub transaction_window_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            credo_per_level: default_credo_per_level(),
            skill_data_dir: None,
            recent_transactions_limit: default_recent_limit(),
            transaction_window_days: default_window_days(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content, &path.to_string_lossy())?;
        info!("Loaded engine config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.credo_per_level <= 0 {
            return Err(ConfigError::Invalid(format!(
                "credo_per_level must be positive, got {}",
                self.credo_per_level
            )));
        }
        if self.transaction_window_days <= 0 {
            return Err(ConfigError::Invalid(format!(
                "transaction_window_days must be positive, got {}",
                self.transaction_window_days
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = EngineConfig::from_toml("credo_per_level = 250", "inline").unwrap();
        assert_eq!(config.credo_per_level, 250);
        assert_eq!(config.recent_transactions_limit, 10);
        assert_eq!(config.transaction_window_days, 30);
        assert!(config.skill_data_dir.is_none());
    }

    #[test]
    fn test_rejects_non_positive_level_cost() {
        let err = EngineConfig::from_toml("credo_per_level = 0", "inline").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "skill_data_dir = \"data\"\ntransaction_window_days = 7\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.skill_data_dir, Some(PathBuf::from("data")));
        assert_eq!(config.transaction_window_days, 7);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = EngineConfig::load(Path::new("/nonexistent/engine.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
