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

//! Store error types and failure classification

use std::io;
use thiserror::Error;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to a block store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Object not found in storage
    #[error("object not found: {0}")]
    NotFound(String),

    /// Authentication or authorization failure
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid key format (empty, path traversal, etc.)
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The store computed a different checksum over the bytes it received
    #[error("checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch {
        /// Checksum supplied with the request
        expected: String,
        /// Checksum the store computed
        actual: String,
    },

    /// Remote answered with an HTTP error status
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Service error message
        message: String,
    },

    /// Operation timed out
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Connection dropped mid-request
    #[error("connection reset: {0}")]
    ConnectionReset(String),

    /// A conditional request (append position, etag) did not hold
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// The backend does not implement this operation
    #[error("operation not supported: {0}")]
    Unsupported(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transparent error delegation for wrapped error types
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    /// Create a NotFound error with the given key
    pub fn not_found<S: Into<String>>(key: S) -> Self {
        StoreError::NotFound(key.into())
    }

    /// Create a PermissionDenied error with context
    pub fn permission_denied<S: Into<String>>(msg: S) -> Self {
        StoreError::PermissionDenied(msg.into())
    }

    /// Create an InvalidKey error with context
    pub fn invalid_key<S: Into<String>>(msg: S) -> Self {
        StoreError::InvalidKey(msg.into())
    }

    /// Create an HTTP status error
    pub fn http<S: Into<String>>(status: u16, msg: S) -> Self {
        StoreError::Http {
            status,
            message: msg.into(),
        }
    }

    /// Create a Timeout error with context
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        StoreError::Timeout(msg.into())
    }

    /// Create a PreconditionFailed error with context
    pub fn precondition_failed<S: Into<String>>(msg: S) -> Self {
        StoreError::PreconditionFailed(msg.into())
    }

    /// Create an Unsupported error naming the operation
    pub fn unsupported<S: Into<String>>(operation: S) -> Self {
        StoreError::Unsupported(operation.into())
    }

    /// Create a ChecksumMismatch error
    pub fn checksum_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        StoreError::ChecksumMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// HTTP status equivalent of this error, if it has one
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::NotFound(_) => Some(404),
            StoreError::PermissionDenied(_) => Some(403),
            StoreError::InvalidKey(_) | StoreError::ChecksumMismatch { .. } => Some(400),
            StoreError::Http { status, .. } => Some(*status),
            StoreError::Timeout(_) => Some(408),
            StoreError::PreconditionFailed(_) => Some(412),
            _ => None,
        }
    }

    /// Whether retrying the same request may succeed without caller intervention.
    ///
    /// Covers timeouts, dropped connections, throttling (408/429) and any
    /// 5xx answer. Everything else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Timeout(_) | StoreError::ConnectionReset(_) => true,
            StoreError::Http { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            StoreError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Whether the store rejected the payload because its checksum did not match
    pub fn is_integrity(&self) -> bool {
        matches!(self, StoreError::ChecksumMismatch { .. })
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
