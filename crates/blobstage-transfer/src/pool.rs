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

//! Bounded pool of reusable block buffers
//!
//! The pool is the only admission control in an upload: a block cannot be
//! read from the source until a buffer is checked out, so at most
//! `capacity` blocks are ever in memory or in flight. Waiters are served
//! in FIFO order by the underlying `tokio` semaphore.
//!
//! Buffers are handed out as [`PooledBuffer`] guards and go back to the
//! pool when the guard drops, on success, error, panic or task abort alike.

use crate::error::{UploadError, UploadResult};
use bytes::BytesMut;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

struct PoolInner {
    semaphore: Arc<Semaphore>,
    free: Mutex<Vec<BytesMut>>,
    capacity: usize,
    block_size: usize,
    checked_out: AtomicUsize,
    peak: AtomicUsize,
    allocated: AtomicUsize,
}

impl PoolInner {
    fn free_list(&self) -> MutexGuard<'_, Vec<BytesMut>> {
        // The free list is a plain Vec; a panic elsewhere can't leave it inconsistent
        match self.free.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Fixed-capacity pool of `block_size` buffers
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Create a pool of `capacity` buffers, allocated lazily on first use
    pub fn new(capacity: usize, block_size: usize) -> Self {
        let capacity = capacity.max(1);
        BufferPool {
            inner: Arc::new(PoolInner {
                semaphore: Arc::new(Semaphore::new(capacity)),
                free: Mutex::new(Vec::with_capacity(capacity)),
                capacity,
                block_size,
                checked_out: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                allocated: AtomicUsize::new(0),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn block_size(&self) -> usize {
        self.inner.block_size
    }

    /// Buffers that can be acquired without waiting
    pub fn available(&self) -> usize {
        self.inner.semaphore.available_permits()
    }

    /// Buffers currently held by callers
    pub fn checked_out(&self) -> usize {
        self.inner.checked_out.load(Ordering::SeqCst)
    }

    /// Highest number of buffers held at once over the pool's life
    pub fn peak_checked_out(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }

    /// Buffers allocated so far; never exceeds capacity
    pub fn allocated(&self) -> usize {
        self.inner.allocated.load(Ordering::SeqCst)
    }

    /// Wait for a free buffer
    pub async fn acquire(&self) -> UploadResult<PooledBuffer> {
        let permit = Arc::clone(&self.inner.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| UploadError::Cancelled)?;
        Ok(self.check_out(permit))
    }

    /// Wait for a free buffer, giving up on cancellation or after `timeout`
    pub async fn acquire_with(
        &self,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> UploadResult<PooledBuffer> {
        let wait = async {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, self.acquire())
                    .await
                    .map_err(|_| UploadError::DeadlineExceeded(limit))?,
                None => self.acquire().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UploadError::Cancelled),
            buffer = wait => buffer,
        }
    }

    fn check_out(&self, permit: OwnedSemaphorePermit) -> PooledBuffer {
        let inner = &self.inner;
        let buf = inner.free_list().pop().unwrap_or_else(|| {
            inner.allocated.fetch_add(1, Ordering::SeqCst);
            BytesMut::with_capacity(inner.block_size)
        });

        let now = inner.checked_out.fetch_add(1, Ordering::SeqCst) + 1;
        inner.peak.fetch_max(now, Ordering::SeqCst);

        PooledBuffer {
            buf: Some(buf),
            pool: Arc::clone(inner),
            _permit: permit,
        }
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.capacity())
            .field("block_size", &self.block_size())
            .field("checked_out", &self.checked_out())
            .finish()
    }
}

/// Exclusive ownership of one pool buffer
///
/// Dropping the guard clears the buffer and returns it to the pool, then
/// releases the permit so the next waiter can proceed.
pub struct PooledBuffer {
    buf: Option<BytesMut>,
    pool: Arc<PoolInner>,
    // Dropped after `Drop::drop` has put the buffer back
    _permit: OwnedSemaphorePermit,
}

impl PooledBuffer {
    pub fn as_slice(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or_default()
    }

    /// Nominal size of buffers in this pool
    pub fn block_size(&self) -> usize {
        self.pool.block_size
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut BytesMut {
        self.buf.get_or_insert_with(BytesMut::new)
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(mut buf) = self.buf.take() {
            buf.clear();
            self.pool.free_list().push(buf);
        }
        self.pool.checked_out.fetch_sub(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_buffers_are_reused() {
        let pool = BufferPool::new(2, 1024);
        for _ in 0..10 {
            let mut buf = pool.acquire().await.unwrap();
            buf.bytes_mut().extend_from_slice(b"data");
            assert_eq!(&buf[..], b"data");
        }
        assert_eq!(pool.allocated(), 1);
        assert_eq!(pool.checked_out(), 0);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_returned_buffer_is_cleared() {
        let pool = BufferPool::new(1, 16);
        {
            let mut buf = pool.acquire().await.unwrap();
            buf.bytes_mut().extend_from_slice(b"stale");
        }
        let buf = pool.acquire().await.unwrap();
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let pool = BufferPool::new(1, 16);
        let held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.unwrap().unwrap();
        assert_eq!(pool.peak_checked_out(), 1);
    }

    #[tokio::test]
    async fn test_acquire_timeout() {
        let pool = BufferPool::new(1, 16);
        let _held = pool.acquire().await.unwrap();
        let err = pool
            .acquire_with(&CancellationToken::new(), Some(Duration::from_millis(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::DeadlineExceeded(_)));
    }

    #[tokio::test]
    async fn test_acquire_cancelled() {
        let pool = BufferPool::new(1, 16);
        let _held = pool.acquire().await.unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let err = pool.acquire_with(&token, None).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        let pool = BufferPool::new(0, 16);
        assert_eq!(pool.capacity(), 1);
        let _buf = pool.acquire().await.unwrap();
    }

    #[tokio::test]
    async fn test_buffer_released_when_task_aborted() {
        let pool = BufferPool::new(1, 16);
        let held = pool.acquire().await.unwrap();
        let task = tokio::spawn(async move {
            let _held = held;
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        task.abort();
        let _ = task.await;
        assert_eq!(pool.checked_out(), 0);
        assert_eq!(pool.available(), 1);
    }
}
