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
use crate::schema::*;

/// Configuration validation
pub trait Validator {
    /// Check the value, returning the first problem found
    fn validate(&self) -> ConfigResult<()>;
}

impl Validator for Config {
    fn validate(&self) -> ConfigResult<()> {
        self.transfer.validate()?;
        self.retry.validate()?;
        self.storage.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}

impl Validator for TransferConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(ConfigError::out_of_range(
                "transfer.block_size",
                1,
                MAX_BLOCK_SIZE,
                self.block_size,
            ));
        }

        if self.single_shot_threshold > MAX_SINGLE_SHOT_SIZE {
            return Err(ConfigError::out_of_range(
                "transfer.single_shot_threshold",
                0,
                MAX_SINGLE_SHOT_SIZE,
                self.single_shot_threshold,
            ));
        }

        if self.max_concurrency == 0 || self.max_concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::out_of_range(
                "transfer.max_concurrency",
                1,
                MAX_CONCURRENCY as u64,
                self.max_concurrency as u64,
            ));
        }

        if self.per_attempt_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "transfer.per_attempt_timeout_ms",
                "must be greater than 0",
            ));
        }

        if self.overall_deadline_ms == Some(0) {
            return Err(ConfigError::invalid(
                "transfer.overall_deadline_ms",
                "must be greater than 0 when set",
            ));
        }

        Ok(())
    }
}

impl Validator for RetryConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ConfigError::invalid(
                "retry.base_delay_ms",
                format!(
                    "must not exceed retry.max_delay_ms ({} > {})",
                    self.base_delay_ms, self.max_delay_ms
                ),
            ));
        }
        Ok(())
    }
}

impl Validator for StorageConfig {
    fn validate(&self) -> ConfigResult<()> {
        match self {
            StorageConfig::Memory => Ok(()),
            StorageConfig::Local(local) => local.validate(),
            StorageConfig::Azure(azure) => azure.validate(),
        }
    }
}

impl Validator for LocalStorage {
    fn validate(&self) -> ConfigResult<()> {
        if self.root.is_empty() {
            return Err(ConfigError::invalid("storage.root", "is required"));
        }
        Ok(())
    }
}

impl Validator for AzureStorage {
    fn validate(&self) -> ConfigResult<()> {
        if self.container.is_empty() {
            return Err(ConfigError::invalid("storage.container", "is required"));
        }

        // Azure container names are 3-63 lowercase letters, digits and hyphens
        if self.container.len() < 3
            || self.container.len() > 63
            || !self
                .container
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ConfigError::invalid(
                "storage.container",
                "must be 3-63 characters of lowercase letters, digits and hyphens",
            ));
        }

        if self.connection_string.is_some() {
            return Ok(());
        }

        if self.account.is_empty() {
            return Err(ConfigError::invalid("storage.account", "is required"));
        }

        if self.access_key.is_none() && self.sas_token.is_none() {
            return Err(ConfigError::invalid(
                "storage",
                "needs connection_string, access_key or sas_token for azure",
            ));
        }

        Ok(())
    }
}

impl Validator for ObservabilityConfig {
    fn validate(&self) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::invalid(
                "observability.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ConfigError::invalid(
                "observability.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        Ok(())
    }
}
