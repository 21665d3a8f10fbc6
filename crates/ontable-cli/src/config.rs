//! Persistent CLI configuration.

use std::path::{Path, PathBuf};

use ontable_core::config::{LanConfig, SessionConfig};
use ontable_core::entitlement::Tier;
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "config.json";
const DEFAULT_DISPLAY_NAME: &str = "OnTable";

pub const DISPLAY_NAME_ENV: &str = "ONTABLE_DISPLAY_NAME";
pub const DB_PATH_ENV: &str = "ONTABLE_DB_PATH";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub tier: Tier,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub lan: LanConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            version: default_config_version(),
            display_name: None,
            db_path: None,
            tier: Tier::default(),
            session: SessionConfig::default(),
            lan: LanConfig::default(),
        }
    }
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ontable")
        .join(CONFIG_FILE_NAME)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ontable")
        .join("ontable.db")
}

fn normalize_text(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl CliConfig {
    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        let config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    error
                )
            })?;
        }

        let serialized = serde_json::to_string_pretty(self)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(path, serialized)
            .map_err(|error| format!("Failed to write config at {}: {}", path.display(), error))
    }

    pub fn validate(&self) -> Result<(), String> {
        self.session.validate()?;
        self.lan.validate()
    }

    /// Flag, then environment, then config file, then a fixed fallback
    pub fn resolve_display_name(&self, explicit: Option<String>, env: Option<String>) -> String {
        normalize_text(explicit)
            .or_else(|| normalize_text(env))
            .or_else(|| normalize_text(self.display_name.clone()))
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string())
    }

    /// Flag, then environment, then config file, then the platform data dir
    pub fn resolve_db_path(&self, explicit: Option<PathBuf>, env: Option<String>) -> PathBuf {
        explicit
            .or_else(|| normalize_text(env).map(PathBuf::from))
            .or_else(|| self.db_path.clone())
            .unwrap_or_else(default_db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = CliConfig::load_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.tier, Tier::Free);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let config = CliConfig {
            display_name: Some("Jo's laptop".into()),
            tier: Tier::Plus,
            ..CliConfig::default()
        };
        config.save_to_path(&path).unwrap();
        assert_eq!(CliConfig::load_from_path(&path).unwrap(), config);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, r#"{ "tier": "pro", "session": { "connect_timeout_ms": 5000 } }"#)
            .unwrap();

        let config = CliConfig::load_from_path(&path).unwrap();
        assert_eq!(config.tier, Tier::Pro);
        assert_eq!(config.session.connect_timeout_ms, 5000);
        assert_eq!(config.lan, LanConfig::default());
    }

    #[test]
    fn invalid_values_are_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, r#"{ "lan": { "service_type": "No Spaces" } }"#).unwrap();
        assert!(CliConfig::load_from_path(&path).is_err());
    }

    #[test]
    fn display_name_precedence() {
        let config = CliConfig {
            display_name: Some("From file".into()),
            ..CliConfig::default()
        };
        assert_eq!(
            config.resolve_display_name(Some("Flag".into()), Some("Env".into())),
            "Flag"
        );
        assert_eq!(config.resolve_display_name(None, Some("Env".into())), "Env");
        assert_eq!(config.resolve_display_name(Some("  ".into()), None), "From file");
        assert_eq!(
            CliConfig::default().resolve_display_name(None, None),
            DEFAULT_DISPLAY_NAME
        );
    }

    #[test]
    fn db_path_precedence() {
        let config = CliConfig {
            db_path: Some(PathBuf::from("/from/file.db")),
            ..CliConfig::default()
        };
        assert_eq!(
            config.resolve_db_path(None, Some("/from/env.db".into())),
            PathBuf::from("/from/env.db")
        );
        assert_eq!(
            config.resolve_db_path(Some(PathBuf::from("/flag.db")), Some("/from/env.db".into())),
            PathBuf::from("/flag.db")
        );
        assert_eq!(config.resolve_db_path(None, None), PathBuf::from("/from/file.db"));
    }
}
