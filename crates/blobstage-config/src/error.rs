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
use std::fmt::Display;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be opened or read
    #[error("cannot read configuration file {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file extension names no supported format
    #[error("cannot tell the format of {} (expected .toml, .yaml, .yml or .json)", .0.display())]
    UnknownFormat(PathBuf),

    #[error("invalid {format} configuration: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    /// A numeric setting outside its accepted bounds
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: u64,
        max: u64,
        value: u64,
    },

    #[error("{field} {reason}")]
    Invalid { field: &'static str, reason: String },

    /// A `BLOBSTAGE_*` variable that could not be applied
    #[error("{variable}={value}: {reason}")]
    EnvOverride {
        variable: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl ConfigError {
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::File {
            path: path.into(),
            source,
        }
    }

    pub fn parse(format: &'static str, err: impl Display) -> Self {
        ConfigError::Parse {
            format,
            message: err.to_string(),
        }
    }

    pub fn out_of_range(field: &'static str, min: u64, max: u64, value: u64) -> Self {
        ConfigError::OutOfRange {
            field,
            min,
            max,
            value,
        }
    }

    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }

    pub fn env_override(variable: &'static str, value: &str, reason: &'static str) -> Self {
        ConfigError::EnvOverride {
            variable,
            value: value.to_string(),
            reason,
        }
    }

    /// Whether the configuration file does not exist
    pub fn is_missing_file(&self) -> bool {
        matches!(self, ConfigError::File { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }

    /// Setting the error refers to, if any
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ConfigError::OutOfRange { field, .. } | ConfigError::Invalid { field, .. } => {
                Some(*field)
            }
            ConfigError::EnvOverride { variable, .. } => Some(*variable),
            _ => None,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
