use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::storage::StorageConfig;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Maximum size of an uploaded file (in bytes)
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,

    /// Storage backend settings
    #[serde(default)]
    pub storage: StorageSection,
}

/// `[storage]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSection {
    /// Azure storage connection string, or `file://<dir>` for local storage
    #[serde(default)]
    pub connection_string: Option<String>,
}

/// Headroom for multipart framing on top of the file size limit.
pub const MULTIPART_OVERHEAD: u64 = 64 * 1024;

fn default_max_upload_size() -> u64 {
    100 * 1024 * 1024 // 100 MB
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_upload_size: default_max_upload_size(),
            storage: StorageSection::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse config from TOML text
    pub fn from_toml(content: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Largest request body accepted, the file limit plus multipart framing
    pub fn max_request_size(&self) -> u64 {
        self.max_upload_size.saturating_add(MULTIPART_OVERHEAD)
    }

    /// Override the connection string (CLI/env take precedence over the file)
    pub fn with_connection_string(mut self, connection_string: Option<String>) -> Self {
        if connection_string.is_some() {
            self.storage.connection_string = connection_string;
        }
        self
    }

    /// Storage backend selected by the connection string, if one is set
    pub fn storage_config(&self) -> Option<StorageConfig> {
        self.storage
            .connection_string
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(StorageConfig::from_connection_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_upload_size, 100 * 1024 * 1024);
        assert!(config.storage_config().is_none());
    }

    #[test]
    fn test_from_toml() {
        let config = Config::from_toml(
            r#"
max_upload_size = 1024

[storage]
connection_string = "file:///srv/contentfiles"
"#,
        )
        .unwrap();

        assert_eq!(config.max_upload_size, 1024);
        assert_eq!(
            config.storage_config(),
            Some(StorageConfig::Local(PathBuf::from("/srv/contentfiles")))
        );
    }

    #[test]
    fn test_request_size_leaves_room_for_framing() {
        let config = Config::from_toml("max_upload_size = 10").unwrap();
        assert_eq!(config.max_request_size(), 10 + MULTIPART_OVERHEAD);

        let config = Config {
            max_upload_size: u64::MAX,
            ..Config::default()
        };
        assert_eq!(config.max_request_size(), u64::MAX);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.max_upload_size, 100 * 1024 * 1024);
    }

    #[test]
    fn test_cli_overrides_file() {
        let config = Config::from_toml("[storage]\nconnection_string = \"file:///a\"")
            .unwrap()
            .with_connection_string(Some("file:///b".to_string()));
        assert_eq!(
            config.storage_config(),
            Some(StorageConfig::Local(PathBuf::from("/b")))
        );

        let config = config.with_connection_string(None);
        assert_eq!(
            config.storage_config(),
            Some(StorageConfig::Local(PathBuf::from("/b")))
        );
    }

    #[test]
    fn test_blank_connection_string_is_unset() {
        let config = Config::default().with_connection_string(Some("  ".to_string()));
        assert!(config.storage_config().is_none());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("contentfiles.toml");
        std::fs::write(&path, "max_upload_size = 42").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.max_upload_size, 42);
    }
}
