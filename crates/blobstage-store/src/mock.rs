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

//! In-memory block store for testing
//!
//! Provides a thread-safe, in-memory implementation of [`BlockStore`](crate::BlockStore)
//! using `Arc<Mutex<..>>` for concurrent access, plus fault injection so
//! upload behaviour under transient failures, corruption and reordered
//! completions can be exercised deterministically.
//!
//! # Examples
//!
//! ```rust,no_run
//! use blobstage_store::mock::{Fault, MockStore};
//! use blobstage_store::{BlockId, BlockStore};
//!
//! #[tokio::main]
//! async fn main() -> blobstage_store::StoreResult<()> {
//!     let store = MockStore::new();
//!
//!     // Block 0 answers 503 once, then succeeds
//!     store.inject_block_fault(0, Fault::Unavailable, 1).await;
//!
//!     let id = BlockId::new("s", 0);
//!     assert!(store.put_block("k", &id, b"abc", None).await.is_err());
//!     store.put_block("k", &id, b"abc", None).await?;
//!     assert_eq!(store.put_block_calls(0).await, 2);
//!     Ok(())
//! }
//! ```

use crate::{
    validate_key, validate_page_range, verify_checksum, BlobKind, BlockAck, BlockId, BlockStore,
    Checksum, ObjectMetadata, StoreError, StoreResult, PAGE_SIZE,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// A failure the mock store can be told to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// HTTP 503 Server Busy
    Unavailable,
    /// HTTP 429 throttling
    Throttled,
    /// Request timed out
    Timeout,
    /// Connection dropped mid-request
    ConnectionReset,
    /// HTTP 403, e.g. bad signature
    Forbidden,
    /// HTTP 400
    BadRequest,
    /// Flip a byte of the received payload before checksum verification
    CorruptPayload,
    /// Sleep for the duration, then serve the request normally
    Stall(Duration),
}

impl Fault {
    fn to_error(self, context: &str) -> Option<StoreError> {
        match self {
            Fault::Unavailable => Some(StoreError::http(503, format!("ServerBusy: {}", context))),
            Fault::Throttled => Some(StoreError::http(429, format!("TooManyRequests: {}", context))),
            Fault::Timeout => Some(StoreError::timeout(context.to_string())),
            Fault::ConnectionReset => Some(StoreError::ConnectionReset(context.to_string())),
            Fault::Forbidden => Some(StoreError::permission_denied(format!(
                "AuthenticationFailed: {}",
                context
            ))),
            Fault::BadRequest => Some(StoreError::http(400, format!("InvalidInput: {}", context))),
            Fault::CorruptPayload | Fault::Stall(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    kind: BlobKind,
    block_count: usize,
    etag: String,
    content_md5: Option<String>,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MockState {
    staged: HashMap<String, HashMap<BlockId, Vec<u8>>>,
    objects: HashMap<String, StoredObject>,
    version: u64,

    block_faults: HashMap<u64, VecDeque<Fault>>,
    block_latency: HashMap<u64, Duration>,
    commit_faults: VecDeque<Fault>,
    put_object_faults: VecDeque<Fault>,

    put_block_calls: HashMap<u64, u32>,
    commit_calls: u32,
    put_object_calls: u32,
    append_calls: u32,
    put_pages_calls: u32,
    committed_lists: Vec<Vec<BlockId>>,
}

impl MockState {
    fn next_etag(&mut self) -> String {
        self.version += 1;
        format!("\"0x{:016X}\"", self.version)
    }

    fn store_object(
        &mut self,
        key: &str,
        data: Vec<u8>,
        kind: BlobKind,
        block_count: usize,
        content_md5: Option<String>,
    ) -> ObjectMetadata {
        let etag = self.next_etag();
        let object = StoredObject {
            data,
            kind,
            block_count,
            etag,
            content_md5,
            last_modified: Utc::now(),
        };
        let meta = metadata_of(key, &object);
        self.objects.insert(key.to_string(), object);
        meta
    }

    fn touch(&mut self, key: &str) -> Option<ObjectMetadata> {
        let etag = self.next_etag();
        let object = self.objects.get_mut(key)?;
        object.etag = etag;
        object.last_modified = Utc::now();
        Some(metadata_of(key, object))
    }
}

fn metadata_of(key: &str, object: &StoredObject) -> ObjectMetadata {
    ObjectMetadata {
        key: key.to_string(),
        size: object.data.len() as u64,
        etag: object.etag.clone(),
        kind: object.kind,
        block_count: object.block_count,
        content_md5: object.content_md5.clone(),
        last_modified: object.last_modified,
    }
}

/// Tracks concurrently executing requests; decrements on drop so cancelled
/// requests are accounted for too.
struct InFlight<'a> {
    current: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(current: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        InFlight { current }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory block store for testing
///
/// Thread-safe and cheap to clone; clones share state, so a test can keep a
/// handle for inspection while the upload core owns another.
#[derive(Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<MockState>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl MockStore {
    /// Create a new empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` writes of block `index` fail with `fault`
    pub async fn inject_block_fault(&self, index: u64, fault: Fault, times: u32) {
        let mut state = self.state.lock().await;
        let queue = state.block_faults.entry(index).or_default();
        for _ in 0..times {
            queue.push_back(fault);
        }
    }

    /// Delay every write of block `index` by `latency`
    ///
    /// Used to force completions to arrive out of sequence order.
    pub async fn set_block_latency(&self, index: u64, latency: Duration) {
        self.state.lock().await.block_latency.insert(index, latency);
    }

    /// Make the next `times` block-list commits fail with `fault`
    pub async fn inject_commit_fault(&self, fault: Fault, times: u32) {
        let mut state = self.state.lock().await;
        for _ in 0..times {
            state.commit_faults.push_back(fault);
        }
    }

    /// Make the next `times` single-shot writes fail with `fault`
    pub async fn inject_put_object_fault(&self, fault: Fault, times: u32) {
        let mut state = self.state.lock().await;
        for _ in 0..times {
            state.put_object_faults.push_back(fault);
        }
    }

    /// Number of `put_block` requests received for block `index`, failed ones included
    pub async fn put_block_calls(&self, index: u64) -> u32 {
        self.state
            .lock()
            .await
            .put_block_calls
            .get(&index)
            .copied()
            .unwrap_or(0)
    }

    /// Number of `put_block` requests received in total
    pub async fn total_put_block_calls(&self) -> u32 {
        self.state.lock().await.put_block_calls.values().sum()
    }

    /// Number of `commit_block_list` requests received
    pub async fn commit_calls(&self) -> u32 {
        self.state.lock().await.commit_calls
    }

    /// Number of `put_object` requests received
    pub async fn put_object_calls(&self) -> u32 {
        self.state.lock().await.put_object_calls
    }

    /// Number of `append_block` requests received
    pub async fn append_calls(&self) -> u32 {
        self.state.lock().await.append_calls
    }

    /// Number of `put_pages` requests received
    pub async fn put_pages_calls(&self) -> u32 {
        self.state.lock().await.put_pages_calls
    }

    /// Every block list that was successfully committed, in commit order
    pub async fn committed_block_lists(&self) -> Vec<Vec<BlockId>> {
        self.state.lock().await.committed_lists.clone()
    }

    /// Blocks staged for `key` and not yet committed
    pub async fn staged_block_count(&self, key: &str) -> usize {
        self.state
            .lock()
            .await
            .staged
            .get(key)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Highest number of store requests that were executing at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Number of committed objects
    pub async fn len(&self) -> usize {
        self.state.lock().await.objects.len()
    }

    /// Check if no object has been committed
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.objects.is_empty()
    }

    /// Keys of all committed objects, sorted
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.lock().await.objects.keys().cloned().collect();
        keys.sort();
        keys
    }

    async fn apply_fault(fault: Option<Fault>, context: &str) -> StoreResult<bool> {
        match fault {
            Some(Fault::Stall(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(false)
            }
            Some(Fault::CorruptPayload) => Ok(true),
            Some(other) => match other.to_error(context) {
                Some(err) => Err(err),
                None => Ok(false),
            },
            None => Ok(false),
        }
    }
}

fn corrupt(data: &[u8]) -> Vec<u8> {
    let mut copy = data.to_vec();
    if let Some(first) = copy.first_mut() {
        *first ^= 0xFF;
    }
    copy
}

impl fmt::Debug for MockStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockStore").finish()
    }
}

#[async_trait]
impl BlockStore for MockStore {
    async fn put_block(
        &self,
        key: &str,
        block_id: &BlockId,
        data: &[u8],
        checksum: Option<&Checksum>,
    ) -> StoreResult<BlockAck> {
        validate_key(key)?;
        let index = block_id.index();

        let (fault, latency) = {
            let mut state = self.state.lock().await;
            *state.put_block_calls.entry(index).or_default() += 1;
            let fault = state
                .block_faults
                .get_mut(&index)
                .and_then(VecDeque::pop_front);
            (fault, state.block_latency.get(&index).copied())
        };

        let _in_flight = InFlight::enter(&self.in_flight, &self.peak_in_flight);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let corrupted = Self::apply_fault(fault, &format!("put_block {} #{}", key, index)).await?;

        let received = if corrupted { corrupt(data) } else { data.to_vec() };
        verify_checksum(&received, checksum)?;

        let size = received.len() as u64;
        self.state
            .lock()
            .await
            .staged
            .entry(key.to_string())
            .or_default()
            .insert(block_id.clone(), received);

        Ok(BlockAck {
            block_id: block_id.clone(),
            size,
        })
    }

    async fn commit_block_list(
        &self,
        key: &str,
        block_ids: &[BlockId],
    ) -> StoreResult<ObjectMetadata> {
        validate_key(key)?;

        let fault = {
            let mut state = self.state.lock().await;
            state.commit_calls += 1;
            state.commit_faults.pop_front()
        };
        let _in_flight = InFlight::enter(&self.in_flight, &self.peak_in_flight);
        Self::apply_fault(fault, &format!("commit_block_list {}", key)).await?;

        let mut state = self.state.lock().await;
        let mut data = Vec::new();
        if !block_ids.is_empty() {
            let staged = state.staged.get(key).ok_or_else(|| {
                StoreError::http(400, format!("InvalidBlockList: nothing staged for {}", key))
            })?;
            for id in block_ids {
                let block = staged.get(id).ok_or_else(|| {
                    StoreError::http(400, format!("InvalidBlockList: unknown block {}", id))
                })?;
                data.extend_from_slice(block);
            }
        }

        state.committed_lists.push(block_ids.to_vec());
        state.staged.remove(key);
        Ok(state.store_object(key, data, BlobKind::Block, block_ids.len(), None))
    }

    async fn put_object(
        &self,
        key: &str,
        data: &[u8],
        checksum: Option<&Checksum>,
    ) -> StoreResult<ObjectMetadata> {
        validate_key(key)?;

        let fault = {
            let mut state = self.state.lock().await;
            state.put_object_calls += 1;
            state.put_object_faults.pop_front()
        };
        let _in_flight = InFlight::enter(&self.in_flight, &self.peak_in_flight);
        let corrupted = Self::apply_fault(fault, &format!("put_object {}", key)).await?;

        let received = if corrupted { corrupt(data) } else { data.to_vec() };
        verify_checksum(&received, checksum)?;

        let md5 = Checksum::md5(&received).to_base64();
        let mut state = self.state.lock().await;
        Ok(state.store_object(key, received, BlobKind::Block, 0, Some(md5)))
    }

    async fn get_object(&self, key: &str) -> StoreResult<Vec<u8>> {
        validate_key(key)?;
        let state = self.state.lock().await;
        state
            .objects
            .get(key)
            .map(|object| object.data.clone())
            .ok_or_else(|| StoreError::not_found(key))
    }

    async fn object_metadata(&self, key: &str) -> StoreResult<ObjectMetadata> {
        validate_key(key)?;
        let state = self.state.lock().await;
        state
            .objects
            .get(key)
            .map(|object| metadata_of(key, object))
            .ok_or_else(|| StoreError::not_found(key))
    }

    async fn delete_object(&self, key: &str) -> StoreResult<()> {
        validate_key(key)?;
        let mut state = self.state.lock().await;
        state.objects.remove(key);
        state.staged.remove(key);
        Ok(())
    }

    async fn create_append_object(&self, key: &str) -> StoreResult<ObjectMetadata> {
        validate_key(key)?;
        let mut state = self.state.lock().await;
        Ok(state.store_object(key, Vec::new(), BlobKind::Append, 0, None))
    }

    async fn append_block(
        &self,
        key: &str,
        data: &[u8],
        checksum: Option<&Checksum>,
        append_position: u64,
    ) -> StoreResult<u64> {
        validate_key(key)?;
        let _in_flight = InFlight::enter(&self.in_flight, &self.peak_in_flight);
        verify_checksum(data, checksum)?;

        let mut state = self.state.lock().await;
        state.append_calls += 1;
        let object = state
            .objects
            .get_mut(key)
            .ok_or_else(|| StoreError::not_found(key))?;
        if object.kind != BlobKind::Append {
            return Err(StoreError::http(
                409,
                format!("InvalidBlobType: {} is a {} object", key, object.kind),
            ));
        }
        let current = object.data.len() as u64;
        if current != append_position {
            return Err(StoreError::precondition_failed(format!(
                "AppendPositionConditionNotMet: {} is {} bytes, expected {}",
                key, current, append_position
            )));
        }
        object.data.extend_from_slice(data);
        object.block_count += 1;
        let len = object.data.len() as u64;
        state.touch(key);
        Ok(len)
    }

    async fn create_page_object(&self, key: &str, size: u64) -> StoreResult<ObjectMetadata> {
        validate_key(key)?;
        if size % PAGE_SIZE != 0 {
            return Err(StoreError::http(
                400,
                format!("page object size {} is not a multiple of {}", size, PAGE_SIZE),
            ));
        }
        let mut state = self.state.lock().await;
        Ok(state.store_object(key, vec![0u8; size as usize], BlobKind::Page, 0, None))
    }

    async fn put_pages(
        &self,
        key: &str,
        offset: u64,
        data: &[u8],
        checksum: Option<&Checksum>,
    ) -> StoreResult<()> {
        validate_key(key)?;
        let _in_flight = InFlight::enter(&self.in_flight, &self.peak_in_flight);
        verify_checksum(data, checksum)?;

        let mut state = self.state.lock().await;
        state.put_pages_calls += 1;
        let object = state
            .objects
            .get_mut(key)
            .ok_or_else(|| StoreError::not_found(key))?;
        if object.kind != BlobKind::Page {
            return Err(StoreError::http(
                409,
                format!("InvalidBlobType: {} is a {} object", key, object.kind),
            ));
        }
        validate_page_range(offset, data.len() as u64, object.data.len() as u64)?;
        let start = offset as usize;
        object.data[start..start + data.len()].copy_from_slice(data);
        object.block_count += 1;
        state.touch(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fault_queue_is_consumed_in_order() {
        let store = MockStore::new();
        store.inject_block_fault(2, Fault::Throttled, 1).await;
        store.inject_block_fault(2, Fault::Forbidden, 1).await;
        let id = BlockId::new("s", 2);

        let first = store.put_block("k", &id, b"x", None).await.unwrap_err();
        assert_eq!(first.status(), Some(429));
        let second = store.put_block("k", &id, b"x", None).await.unwrap_err();
        assert_eq!(second.status(), Some(403));
        store.put_block("k", &id, b"x", None).await.unwrap();
        assert_eq!(store.put_block_calls(2).await, 3);
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_caught_by_checksum() {
        let store = MockStore::new();
        store.inject_block_fault(0, Fault::CorruptPayload, 1).await;
        let id = BlockId::new("s", 0);
        let checksum = Checksum::md5(b"payload");

        let err = store
            .put_block("k", &id, b"payload", Some(&checksum))
            .await
            .unwrap_err();
        assert!(err.is_integrity());
        assert_eq!(store.staged_block_count("k").await, 0);
    }

    #[tokio::test]
    async fn test_restaging_block_replaces_bytes() {
        let store = MockStore::new();
        let id = BlockId::new("s", 0);
        store.put_block("k", &id, b"first", None).await.unwrap();
        store.put_block("k", &id, b"second", None).await.unwrap();
        assert_eq!(store.staged_block_count("k").await, 1);

        store.commit_block_list("k", &[id]).await.unwrap();
        assert_eq!(store.get_object("k").await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_in_flight_peak_tracks_concurrency() {
        let store = MockStore::new();
        store.set_block_latency(0, Duration::from_millis(50)).await;
        store.set_block_latency(1, Duration::from_millis(50)).await;

        let id0 = BlockId::new("s", 0);
        let id1 = BlockId::new("s", 1);
        let (a, b) = tokio::join!(
            store.put_block("k", &id0, b"a", None),
            store.put_block("k", &id1, b"b", None),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(store.peak_in_flight(), 2);
    }
}
