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

//! Cumulative progress across concurrent block uploads

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Callback receiving progress snapshots
pub type ProgressListener = Arc<dyn Fn(TransferProgress) + Send + Sync>;

/// Progress snapshot handed to listeners
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferProgress {
    /// Bytes acknowledged by the store so far
    pub bytes_transferred: u64,

    /// Total bytes, when the source declared a length
    pub total_bytes: Option<u64>,

    /// Time since the session started
    pub elapsed: Duration,
}

impl TransferProgress {
    /// Completion percentage, if the total is known
    pub fn percent(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(100.0),
            Some(total) => Some(self.bytes_transferred as f64 / total as f64 * 100.0),
            None => None,
        }
    }

    /// Average throughput in bytes per second
    pub fn speed_bps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes_transferred as f64 / secs
        } else {
            0.0
        }
    }

    pub fn speed_human(&self) -> String {
        format_bytes_per_sec(self.speed_bps())
    }
}

/// Aggregates acknowledged bytes from concurrent block completions
///
/// Accumulation is a single atomic add, so no update is lost. Listener
/// notification is serialized and skips any total not larger than the last
/// one reported, so listeners observe a strictly increasing sequence even
/// when completions race. An empty upload of known length reports once.
pub struct ProgressTracker {
    acknowledged: AtomicU64,
    total: Option<u64>,
    started: Instant,
    listener: Option<ProgressListener>,
    last_reported: Mutex<Option<u64>>,
}

impl ProgressTracker {
    pub fn new(total: Option<u64>) -> Self {
        Self::with_listener(total, None)
    }

    pub fn with_listener(total: Option<u64>, listener: Option<ProgressListener>) -> Self {
        ProgressTracker {
            acknowledged: AtomicU64::new(0),
            total,
            started: Instant::now(),
            listener,
            last_reported: Mutex::new(None),
        }
    }

    /// Record a block the store has acknowledged; returns the new total.
    ///
    /// Call once per block, after its final successful attempt.
    pub fn on_chunk_acknowledged(&self, bytes: u64) -> u64 {
        let total = self.acknowledged.fetch_add(bytes, Ordering::SeqCst) + bytes;

        if let Some(listener) = &self.listener {
            let mut last = match self.last_reported.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let current = self.acknowledged.load(Ordering::SeqCst);
            let advanced = match *last {
                Some(previous) => current > previous,
                None => current > 0 || self.total == Some(0),
            };
            if advanced {
                *last = Some(current);
                listener(self.progress_at(current));
            }
        }

        total
    }

    pub fn current_total(&self) -> u64 {
        self.acknowledged.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> TransferProgress {
        self.progress_at(self.current_total())
    }

    fn progress_at(&self, bytes: u64) -> TransferProgress {
        TransferProgress {
            bytes_transferred: bytes,
            total_bytes: self.total,
            elapsed: self.started.elapsed(),
        }
    }
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("acknowledged", &self.current_total())
            .field("total", &self.total)
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

fn format_bytes_per_sec(bps: f64) -> String {
    const UNITS: &[&str] = &["B/s", "KB/s", "MB/s", "GB/s"];
    let mut value = bps;
    let mut unit_idx = 0;

    while value >= 1024.0 && unit_idx < UNITS.len() - 1 {
        value /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", value, UNITS[unit_idx])
}
