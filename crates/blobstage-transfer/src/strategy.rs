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

//! How chunks map onto store requests for each object kind

use crate::error::{UploadError, UploadResult};
use blobstage_store::{
    BlobKind, BlockId, BlockStore, Checksum, ObjectMetadata, StoreError, StoreResult, PAGE_SIZE,
};
use tracing::debug;

/// Write strategy selected by the target [`BlobKind`]
///
/// * `Block`: chunks are staged in parallel, then committed as an ordered list.
/// * `Append`: chunks are appended one at a time at their source offset.
/// * `Page`: the object is created at full size and chunks are written at
///   their offsets in parallel; there is nothing to commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStrategy {
    Block,
    Append,
    Page,
}

impl UploadStrategy {
    pub fn for_kind(kind: BlobKind) -> Self {
        match kind {
            BlobKind::Block => UploadStrategy::Block,
            BlobKind::Append => UploadStrategy::Append,
            BlobKind::Page => UploadStrategy::Page,
        }
    }

    pub fn kind(&self) -> BlobKind {
        match self {
            UploadStrategy::Block => BlobKind::Block,
            UploadStrategy::Append => BlobKind::Append,
            UploadStrategy::Page => BlobKind::Page,
        }
    }

    /// Appends must land in order, so they never run in parallel
    pub fn effective_concurrency(&self, configured: usize) -> usize {
        match self {
            UploadStrategy::Append => 1,
            _ => configured.max(1),
        }
    }

    /// Check that a chunked upload of `total` bytes is possible
    pub fn validate(&self, block_size: u64, total: Option<u64>) -> UploadResult<()> {
        if *self != UploadStrategy::Page {
            return Ok(());
        }
        let total = total.ok_or_else(|| {
            UploadError::invalid_config("page uploads need a source of known length")
        })?;
        if total % PAGE_SIZE != 0 {
            return Err(UploadError::invalid_config(format!(
                "page object length {} is not a multiple of {}",
                total, PAGE_SIZE
            )));
        }
        if block_size % PAGE_SIZE != 0 {
            return Err(UploadError::invalid_config(format!(
                "block size {} is not a multiple of {} for page uploads",
                block_size, PAGE_SIZE
            )));
        }
        Ok(())
    }

    /// Prepare the target object before any chunk is written
    pub async fn begin(&self, store: &dyn BlockStore, key: &str, total: Option<u64>) -> StoreResult<()> {
        match self {
            UploadStrategy::Block => {}
            UploadStrategy::Append => {
                store.create_append_object(key).await?;
            }
            UploadStrategy::Page => {
                store.create_page_object(key, total.unwrap_or(0)).await?;
            }
        }
        Ok(())
    }

    /// Write one chunk. Safe to repeat after a failed or timed-out attempt.
    pub async fn write(
        &self,
        store: &dyn BlockStore,
        key: &str,
        block_id: &BlockId,
        offset: u64,
        data: &[u8],
        checksum: Option<&Checksum>,
    ) -> StoreResult<()> {
        match self {
            UploadStrategy::Block => {
                store.put_block(key, block_id, data, checksum).await?;
            }
            UploadStrategy::Append => {
                match store.append_block(key, data, checksum, offset).await {
                    Ok(_) => {}
                    Err(StoreError::PreconditionFailed(msg)) => {
                        // A previous attempt may have landed without us seeing the reply
                        let meta = store.object_metadata(key).await?;
                        if meta.size != offset + data.len() as u64 {
                            return Err(StoreError::PreconditionFailed(msg));
                        }
                        debug!(key, offset, "Append already applied");
                    }
                    Err(err) => return Err(err),
                }
            }
            UploadStrategy::Page => {
                store.put_pages(key, offset, data, checksum).await?;
            }
        }
        Ok(())
    }

    /// Make the written chunks visible as one object
    pub async fn commit(
        &self,
        store: &dyn BlockStore,
        key: &str,
        block_ids: &[BlockId],
    ) -> StoreResult<ObjectMetadata> {
        match self {
            UploadStrategy::Block => store.commit_block_list(key, block_ids).await,
            UploadStrategy::Append | UploadStrategy::Page => store.object_metadata(key).await,
        }
    }

    /// Write a small source in as few requests as the kind allows
    pub async fn single_shot(
        &self,
        store: &dyn BlockStore,
        key: &str,
        data: &[u8],
        checksum: Option<&Checksum>,
    ) -> StoreResult<ObjectMetadata> {
        match self {
            UploadStrategy::Block => store.put_object(key, data, checksum).await,
            UploadStrategy::Append => {
                store.create_append_object(key).await?;
                if !data.is_empty() {
                    store.append_block(key, data, checksum, 0).await?;
                }
                store.object_metadata(key).await
            }
            UploadStrategy::Page => {
                store.create_page_object(key, data.len() as u64).await?;
                if !data.is_empty() {
                    store.put_pages(key, 0, data, checksum).await?;
                }
                store.object_metadata(key).await
            }
        }
    }
}
