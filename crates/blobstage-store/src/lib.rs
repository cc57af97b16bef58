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

//! Block-oriented object store boundary for blobstage
//!
//! The upload core never talks HTTP itself. It drives a [`BlockStore`]: a
//! remote object store that accepts independently staged blocks and makes
//! them visible with a single ordered commit.
//!
//! Backends:
//! - [`mock::MockStore`]: in-memory, with fault injection for tests
//! - [`local::LocalStore`]: local filesystem, atomic commits
//! - `azure::AzureStore`: Azure Blob Storage block blobs (feature `azure`)
//!
//! # Examples
//!
//! ```rust,no_run
//! use blobstage_store::{BlockId, BlockStore, Checksum, mock::MockStore};
//!
//! #[tokio::main]
//! async fn main() -> blobstage_store::StoreResult<()> {
//!     let store = MockStore::new();
//!
//!     let first = BlockId::new("session", 0);
//!     let second = BlockId::new("session", 1);
//!     store.put_block("video.bin", &first, b"hello ", Some(&Checksum::md5(b"hello "))).await?;
//!     store.put_block("video.bin", &second, b"world", None).await?;
//!
//!     let meta = store.commit_block_list("video.bin", &[first, second]).await?;
//!     assert_eq!(meta.size, 11);
//!     assert_eq!(store.get_object("video.bin").await?, b"hello world");
//!     Ok(())
//! }
//! ```
//!
//! # Implementation Guide
//!
//! When implementing `BlockStore`:
//!
//! 1. Use `#[async_trait]` on the impl block
//! 2. Staging a block id twice replaces the earlier bytes (idempotent retries)
//! 3. Verify the supplied checksum and answer [`StoreError::ChecksumMismatch`]
//! 4. Map service failures onto [`StoreError`] so [`StoreError::is_transient`] classifies them
//! 5. Deleting a missing object succeeds

#[cfg(feature = "azure")]
pub mod azure;
pub mod checksum;
pub mod error;
pub mod local;
pub mod mock;
pub mod types;

use async_trait::async_trait;
use std::fmt::Debug;

#[cfg(feature = "azure")]
pub use azure::AzureStore;
pub use checksum::{Checksum, ChecksumAlgorithm};
pub use error::{StoreError, StoreResult};
pub use local::LocalStore;
pub use mock::MockStore;
pub use types::{BlobKind, BlockAck, BlockId, ObjectMetadata, PAGE_SIZE};

/// A remote object store that accepts staged blocks and ordered commits
///
/// Block, append and page objects share one trait. Backends that only speak
/// block objects leave the append/page operations at their `Unsupported`
/// defaults.
#[async_trait]
pub trait BlockStore: Send + Sync + Debug {
    /// Stage one block of `key`
    ///
    /// Idempotent per `block_id`: staging the same id again replaces the
    /// previously staged bytes, so a retried block appears once in the commit.
    async fn put_block(
        &self,
        key: &str,
        block_id: &BlockId,
        data: &[u8],
        checksum: Option<&Checksum>,
    ) -> StoreResult<BlockAck>;

    /// Atomically assemble staged blocks into `key`, in the given order
    async fn commit_block_list(&self, key: &str, block_ids: &[BlockId])
        -> StoreResult<ObjectMetadata>;

    /// Write a whole object in one request
    async fn put_object(
        &self,
        key: &str,
        data: &[u8],
        checksum: Option<&Checksum>,
    ) -> StoreResult<ObjectMetadata>;

    /// Read a committed object
    async fn get_object(&self, key: &str) -> StoreResult<Vec<u8>>;

    /// Metadata of a committed object
    async fn object_metadata(&self, key: &str) -> StoreResult<ObjectMetadata>;

    /// Delete a committed object; missing objects are not an error
    async fn delete_object(&self, key: &str) -> StoreResult<()>;

    /// Create (or truncate) an empty append object
    async fn create_append_object(&self, key: &str) -> StoreResult<ObjectMetadata> {
        Err(StoreError::unsupported(format!("append objects ({})", key)))
    }

    /// Append `data` to `key`, provided the object is currently `append_position` bytes long
    ///
    /// Returns the object length after the append.
    async fn append_block(
        &self,
        key: &str,
        _data: &[u8],
        _checksum: Option<&Checksum>,
        _append_position: u64,
    ) -> StoreResult<u64> {
        Err(StoreError::unsupported(format!("append objects ({})", key)))
    }

    /// Create a zero-filled page object of `size` bytes (multiple of [`PAGE_SIZE`])
    async fn create_page_object(&self, key: &str, _size: u64) -> StoreResult<ObjectMetadata> {
        Err(StoreError::unsupported(format!("page objects ({})", key)))
    }

    /// Write pages at `offset`; offset and length are multiples of [`PAGE_SIZE`]
    async fn put_pages(
        &self,
        key: &str,
        _offset: u64,
        _data: &[u8],
        _checksum: Option<&Checksum>,
    ) -> StoreResult<()> {
        Err(StoreError::unsupported(format!("page objects ({})", key)))
    }
}

/// Reject empty keys and keys that could escape a filesystem root
pub(crate) fn validate_key(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::invalid_key("key cannot be empty"));
    }
    if key.starts_with('/') || key.split('/').any(|segment| segment == "..") {
        return Err(StoreError::invalid_key(format!(
            "key must be relative without '..' segments: {}",
            key
        )));
    }
    Ok(())
}

/// Verify an optional checksum against the bytes a store received
pub(crate) fn verify_checksum(data: &[u8], checksum: Option<&Checksum>) -> StoreResult<()> {
    if let Some(expected) = checksum {
        let actual = expected.recompute(data);
        if actual != *expected {
            return Err(StoreError::checksum_mismatch(
                expected.to_string(),
                actual.to_string(),
            ));
        }
    }
    Ok(())
}

/// Validate page alignment for a page write
pub(crate) fn validate_page_range(offset: u64, len: u64, object_size: u64) -> StoreResult<()> {
    if offset % PAGE_SIZE != 0 || len % PAGE_SIZE != 0 {
        return Err(StoreError::http(
            400,
            format!(
                "page range {}+{} is not aligned to {} bytes",
                offset, len, PAGE_SIZE
            ),
        ));
    }
    if offset + len > object_size {
        return Err(StoreError::http(
            416,
            format!(
                "page range {}+{} exceeds object size {}",
                offset, len, object_size
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trait_is_object_safe() {
        fn _check_object_safe(_: &dyn BlockStore) {}
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("a/../../b").is_err());
        assert!(validate_key("videos/2026/clip.mp4").is_ok());
        assert!(validate_key("name..with..dots").is_ok());
    }

    #[test]
    fn test_verify_checksum() {
        let good = Checksum::md5(b"payload");
        assert!(verify_checksum(b"payload", Some(&good)).is_ok());
        assert!(verify_checksum(b"payload", None).is_ok());

        let err = verify_checksum(b"pAyload", Some(&good)).unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn test_validate_page_range() {
        assert!(validate_page_range(0, 1024, 1024).is_ok());
        assert!(validate_page_range(512, 512, 1024).is_ok());
        assert_eq!(validate_page_range(1, 512, 1024).unwrap_err().status(), Some(400));
        assert_eq!(validate_page_range(0, 100, 1024).unwrap_err().status(), Some(400));
        assert_eq!(validate_page_range(512, 1024, 1024).unwrap_err().status(), Some(416));
    }
}
