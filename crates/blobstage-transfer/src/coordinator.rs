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

//! Upload session orchestration
//!
//! [`ParallelUploadCoordinator`] owns the whole life of an upload: it picks
//! the single-shot or chunked path, keeps at most `max_concurrency` blocks
//! in flight through the [`BufferPool`], collects receipts as they complete
//! in any order, and commits the block list in source order. The first
//! terminal error stops chunk dispatch, cancels in-flight blocks and is
//! returned; later errors are only logged. Nothing is committed after a
//! failure or cancellation.

use crate::error::{UploadError, UploadResult};
use crate::pool::BufferPool;
use crate::progress::{ProgressListener, ProgressTracker};
use crate::retry::RetryPolicy;
use crate::source::{ChunkSource, ReplayHandle, SizeProbe, UploadSource};
use crate::strategy::UploadStrategy;
use crate::uploader::{BlockReceipt, BlockUploader};
use blobstage_config::{ChecksumKind, Config, RetryConfig, TransferConfig, Validator};
use blobstage_observability::{block_span, upload_span};
use blobstage_store::{BlobKind, BlockId, BlockStore, ChecksumAlgorithm, ObjectMetadata};
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// Per-upload options
#[derive(Clone, Default)]
pub struct UploadOptions {
    /// Kind of object to create
    pub kind: BlobKind,
    /// Cancels the upload; in-flight blocks stop at their next suspension point
    pub cancel: CancellationToken,
    /// Called with cumulative progress as blocks are acknowledged
    pub on_progress: Option<ProgressListener>,
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kind(mut self, kind: BlobKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, listener: ProgressListener) -> Self {
        self.on_progress = Some(listener);
        self
    }
}

impl fmt::Debug for UploadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadOptions")
            .field("kind", &self.kind)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Lifecycle of an upload session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    /// Reading the source and dispatching blocks
    Chunking,
    /// Source exhausted; waiting for in-flight blocks
    AwaitingCompletions,
    Committing,
    Done,
    Failed,
}

impl SessionState {
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (NotStarted, Chunking)
                | (Chunking, AwaitingCompletions)
                | (Chunking, Committing)
                | (Chunking, Failed)
                | (AwaitingCompletions, Committing)
                | (AwaitingCompletions, Failed)
                | (Committing, Done)
                | (Committing, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Failed)
    }
}

/// Bookkeeping for one upload
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub id: String,
    pub key: String,
    pub kind: BlobKind,
    pub block_size: u64,
    pub max_concurrency: usize,
    pub total_bytes: Option<u64>,
    /// Committed block ids in final order
    pub committed: Vec<BlockId>,
    state: SessionState,
}

impl UploadSession {
    fn new(key: &str, kind: BlobKind, block_size: u64, max_concurrency: usize) -> Self {
        UploadSession {
            id: uuid::Uuid::new_v4().to_string(),
            key: key.to_string(),
            kind,
            block_size,
            max_concurrency,
            total_bytes: None,
            committed: Vec::new(),
            state: SessionState::NotStarted,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        if self.state.can_transition_to(next) {
            debug!(session = %self.id, from = ?self.state, to = ?next, "Session state change");
            self.state = next;
        } else {
            warn!(session = %self.id, from = ?self.state, to = ?next, "Ignoring invalid session transition");
        }
    }

    fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.transition(SessionState::Failed);
        }
    }
}

/// Which path an upload took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPath {
    SingleShot,
    Chunked,
}

/// Result of a successful upload
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub session_id: String,
    pub metadata: ObjectMetadata,
    pub path: UploadPath,
    /// Committed block ids in source order; empty for single-shot uploads
    pub block_ids: Vec<BlockId>,
    pub bytes_uploaded: u64,
    /// Attempts beyond the first, summed over every request of the session
    pub retries: u32,
}

/// Drives chunked parallel uploads against a [`BlockStore`]
#[derive(Clone)]
pub struct ParallelUploadCoordinator {
    store: Arc<dyn BlockStore>,
    transfer: TransferConfig,
    retry: RetryPolicy,
}

impl ParallelUploadCoordinator {
    /// Create a coordinator; the settings are validated first
    pub fn new(
        store: Arc<dyn BlockStore>,
        transfer: TransferConfig,
        retry: &RetryConfig,
    ) -> UploadResult<Self> {
        transfer.validate()?;
        retry.validate()?;
        Ok(ParallelUploadCoordinator {
            store,
            transfer,
            retry: RetryPolicy::from_config(retry),
        })
    }

    pub fn from_config(store: Arc<dyn BlockStore>, config: &Config) -> UploadResult<Self> {
        Self::new(store, config.transfer.clone(), &config.retry)
    }

    pub fn store(&self) -> &Arc<dyn BlockStore> {
        &self.store
    }

    pub fn transfer_config(&self) -> &TransferConfig {
        &self.transfer
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Upload in-memory bytes to `key`
    pub async fn upload_bytes(
        &self,
        key: &str,
        data: impl Into<Bytes>,
        options: UploadOptions,
    ) -> UploadResult<UploadOutcome> {
        self.upload(key, UploadSource::from_bytes(data), options).await
    }

    /// Upload a file to `key`
    pub async fn upload_file(
        &self,
        key: &str,
        path: impl AsRef<Path>,
        options: UploadOptions,
    ) -> UploadResult<UploadOutcome> {
        let source = UploadSource::from_file(path).await?;
        self.upload(key, source, options).await
    }

    /// Upload `source` to `key`
    pub async fn upload(
        &self,
        key: &str,
        source: UploadSource,
        options: UploadOptions,
    ) -> UploadResult<UploadOutcome> {
        let strategy = UploadStrategy::for_kind(options.kind);
        let mut session = UploadSession::new(
            key,
            options.kind,
            self.transfer.block_size,
            strategy.effective_concurrency(self.transfer.max_concurrency),
        );
        let span = upload_span!(session.id, key, kind = %options.kind);

        session.transition(SessionState::Chunking);
        let result = {
            let run = self
                .run(&mut session, strategy, source, &options)
                .instrument(span.clone());
            match self.transfer.overall_deadline() {
                Some(limit) => match tokio::time::timeout(limit, run).await {
                    Ok(result) => result,
                    Err(_) => Err(UploadError::DeadlineExceeded(limit)),
                },
                None => run.await,
            }
        };

        let _entered = span.enter();
        match result {
            Ok(outcome) => {
                info!(
                    bytes = outcome.bytes_uploaded,
                    blocks = outcome.block_ids.len(),
                    retries = outcome.retries,
                    path = ?outcome.path,
                    "Upload complete"
                );
                Ok(outcome)
            }
            Err(err) => {
                session.fail();
                error!(error = %err, "Upload failed");
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        session: &mut UploadSession,
        strategy: UploadStrategy,
        source: UploadSource,
        options: &UploadOptions,
    ) -> UploadResult<UploadOutcome> {
        strategy.validate(self.transfer.block_size, source.declared_len())?;
        let block_size = usize::try_from(self.transfer.block_size).map_err(|_| {
            UploadError::invalid_config(format!(
                "block size {} does not fit in memory",
                self.transfer.block_size
            ))
        })?;

        let replay = source.replay_handle();
        let mut chunks = ChunkSource::new(source, block_size);

        let probe = tokio::select! {
            biased;
            _ = options.cancel.cancelled() => return Err(UploadError::Cancelled),
            probe = chunks.probe(self.transfer.single_shot_threshold) => probe?,
        };

        match probe {
            SizeProbe::SingleShot(data) => {
                session.total_bytes = Some(data.len() as u64);
                self.single_shot(session, strategy, data, replay.as_ref(), options)
                    .await
            }
            SizeProbe::Chunked { total } => {
                session.total_bytes = total;
                self.chunked(session, strategy, chunks, replay, options).await
            }
        }
    }

    async fn single_shot(
        &self,
        session: &mut UploadSession,
        strategy: UploadStrategy,
        mut data: Bytes,
        replay: Option<&ReplayHandle>,
        options: &UploadOptions,
    ) -> UploadResult<UploadOutcome> {
        let len = data.len() as u64;
        if strategy == UploadStrategy::Page {
            strategy.validate(self.transfer.block_size, Some(len))?;
        }
        debug!(bytes = len, "Single-shot upload");
        session.transition(SessionState::Committing);

        let progress = ProgressTracker::with_listener(Some(len), options.on_progress.clone());
        let algorithm = checksum_algorithm(self.transfer.checksum);
        let store = self.store.as_ref();
        let key = session.key.as_str();
        let mut retries = 0u32;
        let mut reread = false;

        let metadata = loop {
            let checksum = algorithm.compute(&data);
            let outcome = self
                .retry
                .run("put_object", self.transfer.per_attempt_timeout(), &options.cancel, || {
                    strategy.single_shot(store, key, &data, checksum.as_ref())
                })
                .await;

            match (outcome, replay) {
                (Ok(done), _) => {
                    retries += done.retries();
                    break done.value;
                }
                (Err(err), Some(handle)) if err.is_integrity() && !reread => {
                    warn!(error = %err, "Single-shot upload failed integrity check, re-reading source");
                    let mut buf = BytesMut::with_capacity(data.len());
                    handle.read_range(0, data.len(), &mut buf).await?;
                    data = buf.freeze();
                    retries += 1;
                    reread = true;
                }
                (Err(err), _) => return Err(err),
            }
        };

        progress.on_chunk_acknowledged(len);
        session.transition(SessionState::Done);

        Ok(UploadOutcome {
            session_id: session.id.clone(),
            metadata,
            path: UploadPath::SingleShot,
            block_ids: Vec::new(),
            bytes_uploaded: len,
            retries,
        })
    }

    async fn chunked(
        &self,
        session: &mut UploadSession,
        strategy: UploadStrategy,
        mut chunks: ChunkSource,
        replay: Option<ReplayHandle>,
        options: &UploadOptions,
    ) -> UploadResult<UploadOutcome> {
        let per_attempt = self.transfer.per_attempt_timeout();
        let store = self.store.as_ref();
        let key = session.key.clone();
        let mut retries = 0u32;

        let begun = self
            .retry
            .run("begin", per_attempt, &options.cancel, || {
                strategy.begin(store, &key, session.total_bytes)
            })
            .await?;
        retries += begun.retries();

        let pool = BufferPool::new(session.max_concurrency, chunks.block_size());
        let progress = Arc::new(ProgressTracker::with_listener(
            session.total_bytes,
            options.on_progress.clone(),
        ));
        let uploader = BlockUploader::new(
            Arc::clone(&self.store),
            strategy,
            self.retry.clone(),
            checksum_algorithm(self.transfer.checksum),
            per_attempt,
            Arc::clone(&progress),
        );

        info!(
            total = ?session.total_bytes,
            block_size = session.block_size,
            concurrency = session.max_concurrency,
            "Starting chunked upload"
        );

        // Child token: failing blocks cancel their siblings without touching the caller's token
        let block_cancel = options.cancel.child_token();
        let mut tasks: JoinSet<UploadResult<BlockReceipt>> = JoinSet::new();
        let mut receipts: Vec<BlockReceipt> = Vec::new();
        let mut failure: Option<UploadError> = None;

        loop {
            let buffer = tokio::select! {
                biased;
                _ = options.cancel.cancelled() => {
                    failure = Some(UploadError::Cancelled);
                    break;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    match flatten(joined) {
                        Ok(receipt) => receipts.push(receipt),
                        Err(err) => {
                            failure = Some(err);
                            break;
                        }
                    }
                    continue;
                }
                buffer = pool.acquire_with(&block_cancel, None) => match buffer {
                    Ok(buffer) => buffer,
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                },
            };

            let next = tokio::select! {
                biased;
                _ = options.cancel.cancelled() => Err(UploadError::Cancelled),
                next = chunks.next_chunk(buffer) => next,
            };

            let chunk = match next {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            };

            let span = block_span!(chunk.index, chunk.offset, chunk.len());
            let uploader = uploader.clone();
            let key = key.clone();
            let session_id = session.id.clone();
            let replay = replay.clone();
            let cancel = block_cancel.clone();
            tasks.spawn(
                async move {
                    uploader
                        .upload(&key, &session_id, chunk, replay.as_ref(), &cancel)
                        .await
                }
                .instrument(span),
            );
        }

        if failure.is_none() {
            session.transition(SessionState::AwaitingCompletions);
            while let Some(joined) = tasks.join_next().await {
                match flatten(joined) {
                    Ok(receipt) => receipts.push(receipt),
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                }
            }
        }

        if let Some(err) = failure {
            block_cancel.cancel();
            while let Some(joined) = tasks.join_next().await {
                match flatten(joined) {
                    Err(other) if !other.is_cancelled() => {
                        warn!(error = %other, "Suppressing error after upload already failed");
                    }
                    _ => {}
                }
            }
            debug!(
                acknowledged = receipts.len(),
                peak_buffers = pool.peak_checked_out(),
                "Chunked upload aborted without commit"
            );
            return Err(err);
        }

        if options.cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let acknowledged = progress.snapshot();
        debug!(
            bytes = acknowledged.bytes_transferred,
            speed = %acknowledged.speed_human(),
            "All blocks acknowledged"
        );

        receipts.sort_by_key(|receipt| receipt.index);
        retries += receipts
            .iter()
            .map(|receipt| receipt.attempts.saturating_sub(1))
            .sum::<u32>();
        let block_ids: Vec<BlockId> = receipts
            .into_iter()
            .map(|receipt| receipt.block_id)
            .collect();

        session.transition(SessionState::Committing);
        debug!(blocks = block_ids.len(), "Committing block list");
        let committed = self
            .retry
            .run("commit_block_list", per_attempt, &options.cancel, || {
                strategy.commit(store, &key, &block_ids)
            })
            .await?;
        retries += committed.retries();

        session.committed = block_ids.clone();
        session.transition(SessionState::Done);

        Ok(UploadOutcome {
            session_id: session.id.clone(),
            metadata: committed.value,
            path: UploadPath::Chunked,
            block_ids,
            bytes_uploaded: progress.current_total(),
            retries,
        })
    }
}

impl fmt::Debug for ParallelUploadCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelUploadCoordinator")
            .field("store", &self.store)
            .field("transfer", &self.transfer)
            .field("retry", &self.retry)
            .finish()
    }
}

fn flatten(joined: Result<UploadResult<BlockReceipt>, JoinError>) -> UploadResult<BlockReceipt> {
    match joined {
        Ok(result) => result,
        Err(err) if err.is_cancelled() => Err(UploadError::Cancelled),
        Err(err) => Err(UploadError::Task(err.to_string())),
    }
}

fn checksum_algorithm(kind: ChecksumKind) -> ChecksumAlgorithm {
    match kind {
        ChecksumKind::None => ChecksumAlgorithm::None,
        ChecksumKind::Md5 => ChecksumAlgorithm::Md5,
        ChecksumKind::Crc64 => ChecksumAlgorithm::Crc64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine() {
        use SessionState::*;
        assert!(NotStarted.can_transition_to(Chunking));
        assert!(Chunking.can_transition_to(AwaitingCompletions));
        assert!(AwaitingCompletions.can_transition_to(Committing));
        assert!(Committing.can_transition_to(Done));
        assert!(Committing.can_transition_to(Failed));

        assert!(!NotStarted.can_transition_to(Committing));
        assert!(!Done.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Chunking));
        assert!(Done.is_terminal() && Failed.is_terminal());
    }

    #[test]
    fn test_session_ignores_invalid_transition() {
        let mut session = UploadSession::new("k", BlobKind::Block, 8, 2);
        session.transition(SessionState::Done);
        assert_eq!(session.state(), SessionState::NotStarted);

        session.transition(SessionState::Chunking);
        session.fail();
        assert_eq!(session.state(), SessionState::Failed);
        session.fail();
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[test]
    fn test_checksum_mapping() {
        assert_eq!(checksum_algorithm(ChecksumKind::Crc64), ChecksumAlgorithm::Crc64);
        assert_eq!(checksum_algorithm(ChecksumKind::None), ChecksumAlgorithm::None);
    }
}
