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
//! Configuration management for blobstage
//!
//! Supports TOML, YAML and JSON files, `BLOBSTAGE_` environment variable
//! overrides, and validation with field-level error messages.
//!
//! # Example
//!
//! ```no_run
//! use blobstage_config::ConfigLoader;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let loader = ConfigLoader::new();
//!     let config = loader.load_with_overrides("blobstage.toml").await?;
//!
//!     println!("Block size: {} bytes", config.transfer.block_size);
//!     println!("Concurrency: {}", config.transfer.max_concurrency);
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigFormat, ConfigLoader};
pub use schema::*;
pub use validation::Validator;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = Config::default();
        assert_eq!(config.transfer.block_size, 4 * MIB);
        assert_eq!(config.transfer.single_shot_threshold, 4 * MIB);
        assert_eq!(config.transfer.max_concurrency, 3);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.transfer.checksum, ChecksumKind::Md5);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"backend\": \"local\""));
        assert!(json.contains(".blobstage"));
        assert!(!json.contains("overall_deadline_ms"));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.observability.log_level = "invalid_level".to_string();
        assert!(config.validate().is_err());
    }
}
