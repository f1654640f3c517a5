// pgdump-provision/src/config/mod.rs
pub mod credentials;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::toolchain::DEFAULT_INSTALL_ROOT;
use crate::toolchain::remote::{DEFAULT_DOWNLOADS_PAGE_URL, DEFAULT_VERSIONS_FEED_URL};

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
const DEFAULT_BACKUP_DIR: &str = "./backups";
const DEFAULT_INSTALLERS_DIR: &str = "./installers";
const DEFAULT_SCHEMA: &str = "public";
const DEFAULT_LOG_LEVEL: &str = "info";

// Structs for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub schemas: Option<Vec<String>>,
    pub backup_dir: Option<PathBuf>,
    pub installers_dir: Option<PathBuf>,
    pub install_root: Option<PathBuf>,
    pub versions_feed_url: Option<String>,
    pub downloads_page_url: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub schemas: Vec<String>,
    pub backup_dir: PathBuf,
    pub installers_dir: PathBuf,
    pub install_root: PathBuf,
    pub versions_feed_url: String,
    pub downloads_page_url: String,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig::from_raw(RawJsonConfig::default())
    }
}

impl AppConfig {
    /// Reads `config_path` if it exists; a missing file means all defaults.
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(AppConfig::default());
        }
        let config = AppConfig::load_from_json(config_path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw_json_config: RawJsonConfig =
            serde_json::from_str(&config_content).with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?;
        Ok(AppConfig::from_raw(raw_json_config))
    }

    fn from_raw(raw: RawJsonConfig) -> Self {
        AppConfig {
            schemas: raw
                .schemas
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| vec![DEFAULT_SCHEMA.to_string()]),
            backup_dir: raw
                .backup_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_DIR)),
            installers_dir: raw
                .installers_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INSTALLERS_DIR)),
            install_root: raw
                .install_root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INSTALL_ROOT)),
            versions_feed_url: raw
                .versions_feed_url
                .unwrap_or_else(|| DEFAULT_VERSIONS_FEED_URL.to_string()),
            downloads_page_url: raw
                .downloads_page_url
                .unwrap_or_else(|| DEFAULT_DOWNLOADS_PAGE_URL.to_string()),
            log_level: raw
                .log_level
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        }
    }

    /// Replaces the configured schema list when `schemas` is non-empty.
    pub fn override_schemas(&mut self, schemas: Vec<String>) -> Result<()> {
        if !schemas.is_empty() {
            self.schemas = schemas;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if let Some(bad) = self.schemas.iter().find(|s| !is_valid_schema_name(s)) {
            anyhow::bail!(
                "Invalid schema name '{}': use letters, digits, '_' or '-'",
                bad
            );
        }
        if self.backup_dir.as_os_str().is_empty() {
            anyhow::bail!("backup_dir cannot be empty in config.json.");
        }
        Ok(())
    }
}

fn is_valid_schema_name(name: &str) -> bool {
    !name.trim().is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_config_file_yields_defaults() -> anyhow::Result<()> {
        let scratch = tempfile::tempdir()?;
        let config = AppConfig::load(&scratch.path().join("config.json"))?;

        assert_eq!(config.schemas, vec!["public".to_string()]);
        assert_eq!(config.backup_dir, PathBuf::from("./backups"));
        assert_eq!(config.installers_dir, PathBuf::from("./installers"));
        assert_eq!(config.versions_feed_url, DEFAULT_VERSIONS_FEED_URL);
        Ok(())
    }

    #[test]
    fn test_config_file_overrides_defaults() -> anyhow::Result<()> {
        let scratch = tempfile::tempdir()?;
        let path = scratch.path().join("config.json");
        fs::write(
            &path,
            json!({
                "schemas": ["public", "dblog"],
                "backup_dir": "/var/backups/pg",
                "install_root": "/opt/pg",
                "log_level": "debug"
            })
            .to_string(),
        )?;

        let config = AppConfig::load(&path)?;
        assert_eq!(config.schemas, vec!["public".to_string(), "dblog".to_string()]);
        assert_eq!(config.backup_dir, PathBuf::from("/var/backups/pg"));
        assert_eq!(config.install_root, PathBuf::from("/opt/pg"));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.installers_dir, PathBuf::from("./installers"));
        Ok(())
    }

    #[test]
    fn test_empty_schema_list_falls_back_to_public() {
        let raw: RawJsonConfig = serde_json::from_value(json!({ "schemas": [] })).unwrap();
        assert_eq!(AppConfig::from_raw(raw).schemas, vec!["public".to_string()]);
    }

    #[test]
    fn test_invalid_schema_name_is_rejected() -> anyhow::Result<()> {
        let scratch = tempfile::tempdir()?;
        let path = scratch.path().join("config.json");
        fs::write(&path, json!({ "schemas": ["public; drop"] }).to_string())?;

        assert!(AppConfig::load(&path).is_err());
        Ok(())
    }

    #[test]
    fn test_cli_schemas_override_config() -> anyhow::Result<()> {
        let mut config = AppConfig::default();
        config.override_schemas(vec!["audit".into()])?;
        assert_eq!(config.schemas, vec!["audit".to_string()]);

        config.override_schemas(Vec::new())?;
        assert_eq!(config.schemas, vec!["audit".to_string()]);

        assert!(config.override_schemas(vec!["".into()]).is_err());
        Ok(())
    }

    #[test]
    fn test_malformed_json_is_an_error() -> anyhow::Result<()> {
        let scratch = tempfile::tempdir()?;
        let path = scratch.path().join("config.json");
        fs::write(&path, "{ not json")?;
        assert!(AppConfig::load(&path).is_err());
        Ok(())
    }
}
