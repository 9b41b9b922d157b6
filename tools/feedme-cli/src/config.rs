//! CLI configuration.

use std::collections::HashMap;

use anyhow::{Context, Result};
use feedme_commerce::CommerceConfig;
use serde::{Deserialize, Serialize};

/// CLI configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Business rules handed to the storefront.
    #[serde(default)]
    pub commerce: CommerceConfig,

    /// Where state files live.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Environment-specific overrides.
    #[serde(default)]
    pub environments: HashMap<String, EnvironmentConfig>,
}

impl CliConfig {
    /// Load config from a file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        if path.ends_with(".json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path))
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path))
        }
    }

    /// Get environment-specific config.
    pub fn for_environment(&self, env: &str) -> Result<CliConfig> {
        let Some(env_config) = self.environments.get(env) else {
            anyhow::bail!("Unknown environment '{}'", env);
        };

        let mut config = self.clone();
        if let Some(ref commerce) = env_config.commerce {
            config.commerce = commerce.clone();
        }
        if let Some(ref data_dir) = env_config.data_dir {
            config.storage.data_dir = data_dir.clone();
        }
        Ok(config)
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for `backend.json` and `local-storage.json`.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String {
    ".feedme".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Environment-specific configuration overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Commerce rules override.
    #[serde(default)]
    pub commerce: Option<CommerceConfig>,

    /// Data directory override.
    #[serde(default)]
    pub data_dir: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedme_commerce::Currency;

    #[test]
    fn test_partial_toml() {
        let config: CliConfig = toml::from_str(
            r#"
            [commerce]
            cashback_percent = 3

            [environments.staging]
            data_dir = "/tmp/feedme-staging"

            [environments.staging.commerce]
            currency = "USD"
            "#,
        )
        .unwrap();

        assert_eq!(config.commerce.cashback_percent, 3);
        assert_eq!(config.commerce.max_quantity_per_line, 99);
        assert_eq!(config.storage.data_dir, ".feedme");

        let staging = config.for_environment("staging").unwrap();
        assert_eq!(staging.commerce.currency, Currency::USD);
        assert_eq!(staging.storage.data_dir, "/tmp/feedme-staging");
        assert!(config.for_environment("production").is_err());
    }

    #[test]
    fn test_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedme.json");
        std::fs::write(&path, r#"{ "storage": { "data_dir": "state" } }"#).unwrap();

        let config = CliConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.storage.data_dir, "state");
        assert_eq!(config.commerce, CommerceConfig::default());
    }
}
