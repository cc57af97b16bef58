// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
use crate::error::{ConfigError, ConfigResult};
use crate::schema::{Config, LocalStorage, StorageConfig};
use crate::validation::Validator;
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::{debug, info};

/// Configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("json") => Ok(ConfigFormat::Json),
            _ => Err(ConfigError::UnknownFormat(path.to_path_buf())),
        }
    }

    /// Get format name as string
    pub fn name(&self) -> &'static str {
        match self {
            ConfigFormat::Toml => "TOML",
            ConfigFormat::Yaml => "YAML",
            ConfigFormat::Json => "JSON",
        }
    }
}

/// Configuration loader
pub struct ConfigLoader {
    validate: bool,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        ConfigLoader { validate: true }
    }

    /// Create a loader without validation
    pub fn without_validation() -> Self {
        ConfigLoader { validate: false }
    }

    /// Load configuration from a file
    pub async fn load_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<Config> {
        let path = path.as_ref();
        debug!("Loading configuration from: {}", path.display());

        let format = ConfigFormat::from_path(path)?;
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::file(path, e))?;

        info!(
            "Loaded {} configuration file: {}",
            format.name(),
            path.display()
        );

        self.load_from_string(&content, format)
    }

    /// Load configuration from a string
    pub fn load_from_string(&self, content: &str, format: ConfigFormat) -> ConfigResult<Config> {
        let config: Config = match format {
            ConfigFormat::Toml => {
                toml::from_str(content).map_err(|e| ConfigError::parse(format.name(), e))?
            }
            ConfigFormat::Yaml => {
                serde_yaml::from_str(content).map_err(|e| ConfigError::parse(format.name(), e))?
            }
            ConfigFormat::Json => {
                serde_json::from_str(content).map_err(|e| ConfigError::parse(format.name(), e))?
            }
        };

        debug!("Configuration loaded from {}", format.name());

        if self.validate {
            config.validate()?;
        }

        Ok(config)
    }

    /// Load a file, then apply `BLOBSTAGE_*` environment overrides
    pub async fn load_with_overrides<P: AsRef<Path>>(&self, path: P) -> ConfigResult<Config> {
        let mut config = self.load_file(path).await?;
        self.apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// Defaults with `BLOBSTAGE_*` environment overrides, for runs without a config file
    pub fn load_defaults_with_overrides(&self) -> ConfigResult<Config> {
        let mut config = Config::default();
        self.apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&self, config: &mut Config) -> ConfigResult<()> {
        self.apply_overrides_from(config, |name| std::env::var(name).ok())
    }

    /// Apply overrides read through `lookup` instead of the process environment
    pub fn apply_overrides_from<F>(&self, config: &mut Config, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("BLOBSTAGE_BLOCK_SIZE") {
            config.transfer.block_size =
                parse_number("BLOBSTAGE_BLOCK_SIZE", &value, "expected block size in bytes")?;
        }
        if let Some(value) = lookup("BLOBSTAGE_SINGLE_SHOT_THRESHOLD") {
            config.transfer.single_shot_threshold = parse_number(
                "BLOBSTAGE_SINGLE_SHOT_THRESHOLD",
                &value,
                "expected threshold in bytes",
            )?;
        }
        if let Some(value) = lookup("BLOBSTAGE_MAX_CONCURRENCY") {
            config.transfer.max_concurrency =
                parse_number("BLOBSTAGE_MAX_CONCURRENCY", &value, "expected valid integer")?;
        }
        if let Some(value) = lookup("BLOBSTAGE_MAX_RETRIES") {
            config.retry.max_retries =
                parse_number("BLOBSTAGE_MAX_RETRIES", &value, "expected valid integer")?;
        }
        if let Some(value) = lookup("BLOBSTAGE_RETRY_JITTER") {
            config.retry.jitter = parse_bool("BLOBSTAGE_RETRY_JITTER", &value)?;
        }
        if let Some(value) = lookup("BLOBSTAGE_LOG_LEVEL") {
            config.observability.log_level = value;
        }
        if let Some(value) = lookup("BLOBSTAGE_LOG_FORMAT") {
            config.observability.log_format = value;
        }
        if let Some(value) = lookup("BLOBSTAGE_STORAGE_ROOT") {
            config.storage = StorageConfig::Local(LocalStorage { root: value });
        }

        if self.validate {
            config.validate()?;
        }
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_number<T: FromStr>(
    variable: &'static str,
    value: &str,
    reason: &'static str,
) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_override(variable, value, reason))
}

/// Parse boolean from string (accepts: true, false, yes, no, 1, 0, on, off)
fn parse_bool(variable: &'static str, value: &str) -> ConfigResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(ConfigError::env_override(
            variable,
            value,
            "expected 'true', 'false', 'yes', 'no', '1', '0', 'on', or 'off'",
        )),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ConfigFormat::from_path("config.toml").unwrap(), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path("config.yaml").unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path("config.yml").unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path("config.json").unwrap(), ConfigFormat::Json);
    }

    #[test]
    fn test_format_detection_error() {
        assert!(matches!(
            ConfigFormat::from_path("config.xml"),
            Err(ConfigError::UnknownFormat(_))
        ));
        assert!(ConfigFormat::from_path("config").is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("X", "true").unwrap());
        assert!(parse_bool("X", "on").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
        assert!(!parse_bool("X", "off").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }

    #[test]
    fn test_overrides_applied() {
        let loader = ConfigLoader::new();
        let mut config = Config::default();
        loader
            .apply_overrides_from(
                &mut config,
                lookup(&[
                    ("BLOBSTAGE_BLOCK_SIZE", "2097152"),
                    ("BLOBSTAGE_SINGLE_SHOT_THRESHOLD", "1024"),
                    ("BLOBSTAGE_MAX_CONCURRENCY", "8"),
                    ("BLOBSTAGE_MAX_RETRIES", "5"),
                    ("BLOBSTAGE_RETRY_JITTER", "no"),
                    ("BLOBSTAGE_LOG_LEVEL", "debug"),
                    ("BLOBSTAGE_STORAGE_ROOT", "/tmp/blobs"),
                ]),
            )
            .unwrap();

        assert_eq!(config.transfer.block_size, 2 * 1024 * 1024);
        assert_eq!(config.transfer.single_shot_threshold, 1024);
        assert_eq!(config.transfer.max_concurrency, 8);
        assert_eq!(config.retry.max_retries, 5);
        assert!(!config.retry.jitter);
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(
            config.storage,
            StorageConfig::Local(LocalStorage {
                root: "/tmp/blobs".to_string()
            })
        );
    }

    #[test]
    fn test_bad_override_reports_variable() {
        let loader = ConfigLoader::new();
        let mut config = Config::default();
        let err = loader
            .apply_overrides_from(&mut config, lookup(&[("BLOBSTAGE_MAX_CONCURRENCY", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("BLOBSTAGE_MAX_CONCURRENCY"));
        assert_eq!(err.field(), Some("BLOBSTAGE_MAX_CONCURRENCY"));
    }

    #[test]
    fn test_override_is_validated() {
        let loader = ConfigLoader::new();
        let mut config = Config::default();
        let result =
            loader.apply_overrides_from(&mut config, lookup(&[("BLOBSTAGE_MAX_CONCURRENCY", "0")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_toml() {
        let loader = ConfigLoader::new();
        let toml = r#"
        [transfer]
        block_size = 1048576
        max_concurrency = 4
        checksum = "crc64"
        "#;
        let config = loader.load_from_string(toml, ConfigFormat::Toml).unwrap();
        assert_eq!(config.transfer.block_size, 1024 * 1024);
        assert_eq!(config.transfer.max_concurrency, 4);
        assert_eq!(config.transfer.checksum, crate::ChecksumKind::Crc64);
        // Unset fields keep their defaults
        assert_eq!(config.retry.max_retries, 3);
    }
}
