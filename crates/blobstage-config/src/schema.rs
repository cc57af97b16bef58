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
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One mebibyte
pub const MIB: u64 = 1024 * 1024;

/// Largest block a remote store accepts
pub const MAX_BLOCK_SIZE: u64 = 4000 * MIB;

/// Largest payload accepted by a single-shot put
pub const MAX_SINGLE_SHOT_SIZE: u64 = 5000 * MIB;

/// Upper bound on parallel block uploads
pub const MAX_CONCURRENCY: usize = 1024;

/// Top-level configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Chunking and concurrency
    pub transfer: TransferConfig,

    /// Retry policy shared by block writes and the final commit
    pub retry: RetryConfig,

    /// Storage backend
    pub storage: StorageConfig,

    /// Logging
    pub observability: ObservabilityConfig,
}

/// Chunking and concurrency settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransferConfig {
    /// Size of each staged block in bytes
    pub block_size: u64,

    /// Sources of at most this many bytes are sent in one request
    pub single_shot_threshold: u64,

    /// Maximum blocks in flight (also the buffer pool capacity)
    pub max_concurrency: usize,

    /// Timeout for a single store request; exceeding it is retried
    pub per_attempt_timeout_ms: u64,

    /// Deadline for the whole upload session; exceeding it is terminal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_deadline_ms: Option<u64>,

    /// Content checksum attached to every write
    pub checksum: ChecksumKind,
}

impl TransferConfig {
    /// Per-attempt timeout as a duration
    pub fn per_attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.per_attempt_timeout_ms)
    }

    /// Overall session deadline, if configured
    pub fn overall_deadline(&self) -> Option<Duration> {
        self.overall_deadline_ms.map(Duration::from_millis)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig {
            block_size: 4 * MIB,
            single_shot_threshold: 4 * MIB,
            max_concurrency: 3,
            per_attempt_timeout_ms: 300_000,
            overall_deadline_ms: None,
            checksum: ChecksumKind::default(),
        }
    }
}

/// Checksum algorithm names accepted in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumKind {
    None,
    #[default]
    Md5,
    Crc64,
}

/// Exponential backoff settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub base_delay_ms: u64,

    /// Ceiling for any single backoff delay
    pub max_delay_ms: u64,

    /// Randomize each delay to avoid synchronized retries
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 32_000,
            jitter: true,
        }
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "backend")]
pub enum StorageConfig {
    /// In-process memory store
    #[serde(rename = "memory")]
    Memory,

    /// Local filesystem
    #[serde(rename = "local")]
    Local(LocalStorage),

    /// Azure Blob Storage
    #[serde(rename = "azure")]
    Azure(AzureStorage),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Local(LocalStorage::default())
    }
}

/// Local filesystem storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalStorage {
    /// Root directory for staged blocks and committed objects
    #[serde(default = "default_local_root")]
    pub root: String,
}

impl Default for LocalStorage {
    fn default() -> Self {
        LocalStorage {
            root: default_local_root(),
        }
    }
}

/// Azure Blob Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AzureStorage {
    /// Storage account name
    #[serde(default)]
    pub account: String,

    /// Container holding uploaded objects
    pub container: String,

    /// Full connection string; takes precedence over the other credentials
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,

    /// Account access key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,

    /// SAS token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sas_token: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// trace, debug, info, warn or error
    pub log_level: String,

    /// pretty, compact or json
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        ObservabilityConfig {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

fn default_local_root() -> String {
    ".blobstage".to_string()
}
