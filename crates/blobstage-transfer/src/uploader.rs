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

//! Per-block upload with retry and integrity recovery

use crate::error::{UploadError, UploadResult};
use crate::progress::ProgressTracker;
use crate::retry::RetryPolicy;
use crate::source::{Chunk, ReplayHandle};
use crate::strategy::UploadStrategy;
use blobstage_store::{BlockId, BlockStore, ChecksumAlgorithm};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A block the store has acknowledged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockReceipt {
    pub block_id: BlockId,
    pub index: u64,
    pub bytes: u64,
    /// Attempts across every retry loop, including integrity re-reads
    pub attempts: u32,
}

/// Uploads single chunks on behalf of a session
#[derive(Clone)]
pub struct BlockUploader {
    store: Arc<dyn BlockStore>,
    strategy: UploadStrategy,
    retry: RetryPolicy,
    checksum: ChecksumAlgorithm,
    per_attempt_timeout: Duration,
    progress: Arc<ProgressTracker>,
}

impl BlockUploader {
    pub fn new(
        store: Arc<dyn BlockStore>,
        strategy: UploadStrategy,
        retry: RetryPolicy,
        checksum: ChecksumAlgorithm,
        per_attempt_timeout: Duration,
        progress: Arc<ProgressTracker>,
    ) -> Self {
        BlockUploader {
            store,
            strategy,
            retry,
            checksum,
            per_attempt_timeout,
            progress,
        }
    }

    /// Upload `chunk` as block `index` of `session_id`.
    ///
    /// Transient failures are retried from the chunk's own buffer. An
    /// integrity failure is recovered once by re-reading the range from
    /// `replay`, when the source allows it. Progress is reported exactly
    /// once, after the store acknowledges the block. The chunk buffer goes
    /// back to the pool when this returns, whatever the outcome.
    pub async fn upload(
        &self,
        key: &str,
        session_id: &str,
        mut chunk: Chunk,
        replay: Option<&ReplayHandle>,
        cancel: &CancellationToken,
    ) -> UploadResult<BlockReceipt> {
        let index = chunk.index;
        let offset = chunk.offset;
        let block_id = BlockId::new(session_id, index);
        let mut attempts = 0u32;
        let mut reread = false;

        loop {
            let result = self.write_once(key, &block_id, &chunk, cancel).await;
            match result {
                Ok(done) => {
                    attempts += done;
                    break;
                }
                Err((err, tried)) => {
                    attempts += tried;
                    let replay = match replay {
                        Some(handle) if err.is_integrity() && !reread => handle,
                        _ => return Err(err.for_block(index)),
                    };

                    warn!(
                        index,
                        offset,
                        error = %err,
                        "Block failed integrity check, re-reading from source"
                    );
                    let len = chunk.len();
                    replay.read_range(offset, len, chunk.buffer_mut()).await?;
                    reread = true;
                }
            }
        }

        let bytes = chunk.len() as u64;
        drop(chunk);
        self.progress.on_chunk_acknowledged(bytes);
        debug!(index, bytes, attempts, "Block acknowledged");

        Ok(BlockReceipt {
            block_id,
            index,
            bytes,
            attempts,
        })
    }

    /// One retry loop over the chunk's current bytes; returns attempts used
    async fn write_once(
        &self,
        key: &str,
        block_id: &BlockId,
        chunk: &Chunk,
        cancel: &CancellationToken,
    ) -> Result<u32, (UploadError, u32)> {
        let checksum = self.checksum.compute(chunk.data());
        let store = self.store.as_ref();
        let strategy = self.strategy;

        let mut tried = 0u32;
        let outcome = self
            .retry
            .run("put_block", self.per_attempt_timeout, cancel, || {
                tried += 1;
                strategy.write(store, key, block_id, chunk.offset, chunk.data(), checksum.as_ref())
            })
            .await;

        match outcome {
            Ok(done) => Ok(done.attempts),
            Err(err) => Err((err, tried.max(1))),
        }
    }
}

impl std::fmt::Debug for BlockUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockUploader")
            .field("store", &self.store)
            .field("strategy", &self.strategy)
            .field("checksum", &self.checksum)
            .finish()
    }
}
