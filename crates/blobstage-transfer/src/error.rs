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

//! Upload error taxonomy
//!
//! Store failures are classified once, at the point they leave the store:
//! transient failures are retried inside the block uploader, everything
//! else aborts the session and reaches the caller as exactly one error.

use blobstage_store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Result type for upload operations
pub type UploadResult<T> = Result<T, UploadError>;

/// Terminal failure of an upload session
#[derive(Error, Debug)]
pub enum UploadError {
    /// Network or 5xx-class failure that persisted through every retry
    #[error("{operation} failed after {attempts} attempts: {source}")]
    Transient {
        operation: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    /// The store rejected the content checksum
    #[error("integrity check failed{}: {source}", block_suffix(.index))]
    Integrity {
        index: Option<u64>,
        #[source]
        source: StoreError,
    },

    /// Authentication or 4xx-class rejection; retrying will not help
    #[error("request rejected by store: {0}")]
    PermanentClient(#[source] StoreError),

    /// Source ended before its declared length
    #[error("source ended after {actual} bytes but declared {declared}")]
    ShortRead { declared: u64, actual: u64 },

    /// Source produced more than its declared length
    #[error("source produced more than the {declared} bytes it declared")]
    OverLongRead { declared: u64 },

    #[error("upload cancelled")]
    Cancelled,

    #[error("upload exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("invalid upload configuration: {0}")]
    InvalidConfig(String),

    /// Reading the source failed
    #[error("source I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A block task panicked or was aborted unexpectedly
    #[error("upload task failed: {0}")]
    Task(String),
}

fn block_suffix(index: &Option<u64>) -> String {
    match index {
        Some(index) => format!(" for block {}", index),
        None => String::new(),
    }
}

impl UploadError {
    /// Classify a store error that will not be retried further
    pub fn from_store(err: StoreError, operation: &str, attempts: u32) -> Self {
        if err.is_integrity() {
            UploadError::Integrity {
                index: None,
                source: err,
            }
        } else if err.is_transient() {
            UploadError::Transient {
                operation: operation.to_string(),
                attempts,
                source: err,
            }
        } else {
            UploadError::PermanentClient(err)
        }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        UploadError::InvalidConfig(msg.into())
    }

    pub fn is_integrity(&self) -> bool {
        matches!(self, UploadError::Integrity { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::Cancelled)
    }

    /// Attach the block index to an integrity error
    pub(crate) fn for_block(self, block: u64) -> Self {
        match self {
            UploadError::Integrity { index: None, source } => UploadError::Integrity {
                index: Some(block),
                source,
            },
            other => other,
        }
    }
}

impl From<StoreError> for UploadError {
    fn from(err: StoreError) -> Self {
        UploadError::from_store(err, "store request", 1)
    }
}

impl From<blobstage_config::ConfigError> for UploadError {
    fn from(err: blobstage_config::ConfigError) -> Self {
        UploadError::InvalidConfig(err.to_string())
    }
}
