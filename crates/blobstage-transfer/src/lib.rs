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

//! Chunked parallel uploads with bounded buffering and retry
//!
//! A source is split into fixed-size blocks that are read straight into a
//! fixed pool of buffers, uploaded concurrently (at most `max_concurrency`
//! at a time, so memory stays bounded whatever the source size) and
//! committed as one object in source order.
//!
//! # Example
//!
//! ```no_run
//! use blobstage_config::{RetryConfig, TransferConfig};
//! use blobstage_store::MockStore;
//! use blobstage_transfer::{ParallelUploadCoordinator, UploadOptions};
//! use std::sync::Arc;
//!
//! # async fn example() -> blobstage_transfer::UploadResult<()> {
//! let store = Arc::new(MockStore::new());
//! let coordinator =
//!     ParallelUploadCoordinator::new(store, TransferConfig::default(), &RetryConfig::default())?;
//!
//! let outcome = coordinator
//!     .upload_bytes("media/clip.mov", vec![0u8; 10 * 1024 * 1024], UploadOptions::new())
//!     .await?;
//! println!("committed {} blocks", outcome.block_ids.len());
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod error;
pub mod pool;
pub mod progress;
pub mod retry;
pub mod source;
pub mod strategy;
pub mod uploader;

pub use coordinator::{
    ParallelUploadCoordinator, SessionState, UploadOptions, UploadOutcome, UploadPath,
    UploadSession,
};
pub use error::{UploadError, UploadResult};
pub use pool::{BufferPool, PooledBuffer};
pub use progress::{ProgressListener, ProgressTracker, TransferProgress};
pub use retry::{Attempted, RetryPolicy};
pub use source::{Chunk, ChunkSource, ReplayHandle, SizeProbe, UploadSource};
pub use strategy::UploadStrategy;
pub use uploader::{BlockReceipt, BlockUploader};
