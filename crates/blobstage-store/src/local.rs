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

//! Local filesystem block store
//!
//! Implements [`BlockStore`](crate::BlockStore) on the local filesystem with:
//! - Sharded directory structure for committed objects
//! - A per-key staging area for uncommitted blocks
//! - Atomic commits using temp files and rename
//! - Async I/O using tokio::fs
//!
//! # Directory Structure
//!
//! Files are named after the hex MD5 digest of the key, so names stay at a
//! fixed length whatever the key. The key itself lives in the `.meta` file:
//! ```text
//! root/
//!   objects/
//!     9e/
//!       10/
//!         9e1087f6f0c7d4a5a2f5e41cf7ba4f2b          object bytes
//!         9e1087f6f0c7d4a5a2f5e41cf7ba4f2b.meta     JSON metadata
//!   staging/
//!     9e1087f6f0c7d4a5a2f5e41cf7ba4f2b/
//!       <hex block id>                            uncommitted block
//! ```
//!
//! Staged blocks are invisible to readers until `commit_block_list` assembles
//! them, in list order, into a temp file and renames it into place.

use crate::{
    validate_key, validate_page_range, verify_checksum, BlobKind, BlockAck, BlockId, BlockStore,
    Checksum, ObjectMetadata, StoreError, StoreResult, PAGE_SIZE,
};
use async_trait::async_trait;
use chrono::Utc;
use md5::{Digest, Md5};
use std::fmt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

const META_EXTENSION: &str = "meta";

/// Local filesystem block store
#[derive(Clone)]
pub struct LocalStore {
    root: PathBuf,
    // Serializes metadata read-modify-write cycles
    meta_lock: Arc<Mutex<()>>,
}

impl LocalStore {
    /// Create a new local store rooted at `root`
    ///
    /// The directory is created if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Fails if `root` exists but is not a directory.
    pub async fn new<P: AsRef<Path>>(root: P) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            fs::create_dir_all(&root).await?;
        } else if !root.is_dir() {
            return Err(StoreError::Other(anyhow::anyhow!(
                "path exists but is not a directory: {}",
                root.display()
            )));
        }

        Ok(LocalStore {
            root,
            meta_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Get the root path for this store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the committed object for `key`: `root/objects/AB/CD/<digest>`
    fn object_path(&self, key: &str) -> PathBuf {
        let digest = key_digest(key);
        self.root
            .join("objects")
            .join(&digest[0..2])
            .join(&digest[2..4])
            .join(digest)
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.object_path(key).with_extension(META_EXTENSION)
    }

    fn staging_dir(&self, key: &str) -> PathBuf {
        self.root.join("staging").join(key_digest(key))
    }

    fn staged_block_path(&self, key: &str, block_id: &BlockId) -> PathBuf {
        self.staging_dir(key)
            .join(hex::encode(block_id.as_str().as_bytes()))
    }

    async fn ensure_parent_dir(&self, path: &Path) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }

    /// Write `data` to `path` through a temp file and atomic rename
    async fn write_atomic(&self, path: &Path, data: &[u8]) -> StoreResult<()> {
        self.ensure_parent_dir(path).await?;
        let temp_path = temp_path_for(path);

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, path).await?;
        Ok(())
    }

    async fn read_metadata(&self, key: &str) -> StoreResult<ObjectMetadata> {
        match fs::read(self.meta_path(key)).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map_err(|e| StoreError::Other(anyhow::anyhow!("corrupt metadata for {}: {}", key, e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::not_found(key)),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_metadata(&self, meta: &ObjectMetadata) -> StoreResult<()> {
        let raw = serde_json::to_vec_pretty(meta)
            .map_err(|e| StoreError::Other(anyhow::anyhow!("metadata encoding failed: {}", e)))?;
        self.write_atomic(&self.meta_path(&meta.key), &raw).await
    }

    async fn expect_kind(&self, key: &str, kind: BlobKind) -> StoreResult<ObjectMetadata> {
        let meta = self.read_metadata(key).await?;
        if meta.kind != kind {
            return Err(StoreError::http(
                409,
                format!("InvalidBlobType: {} is a {} object", key, meta.kind),
            ));
        }
        Ok(meta)
    }

    /// Concatenate staged blocks, in list order, into `temp_path`
    async fn assemble_blocks(
        &self,
        key: &str,
        block_ids: &[BlockId],
        temp_path: &Path,
    ) -> StoreResult<(u64, [u8; 16])> {
        let mut hasher = Md5::new();
        let mut size = 0u64;
        let mut out = fs::File::create(temp_path).await?;
        for id in block_ids {
            let block = match fs::read(self.staged_block_path(key, id)).await {
                Ok(block) => block,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(StoreError::http(
                        400,
                        format!("InvalidBlockList: unknown block {}", id),
                    ));
                }
                Err(e) => return Err(e.into()),
            };
            hasher.update(&block);
            size += block.len() as u64;
            out.write_all(&block).await?;
        }
        out.sync_all().await?;
        Ok((size, hasher.finalize().into()))
    }

    fn new_metadata(
        key: &str,
        size: u64,
        kind: BlobKind,
        block_count: usize,
        content_md5: Option<String>,
    ) -> ObjectMetadata {
        ObjectMetadata {
            key: key.to_string(),
            size,
            etag: new_etag(),
            kind,
            block_count,
            content_md5,
            last_modified: Utc::now(),
        }
    }
}

fn key_digest(key: &str) -> String {
    hex::encode(Md5::digest(key.as_bytes()))
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    path.with_file_name(name)
}

fn new_etag() -> String {
    format!("\"{}\"", uuid::Uuid::new_v4().simple())
}

impl fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalStore")
            .field("root", &self.root)
            .finish()
    }
}

#[async_trait]
impl BlockStore for LocalStore {
    async fn put_block(
        &self,
        key: &str,
        block_id: &BlockId,
        data: &[u8],
        checksum: Option<&Checksum>,
    ) -> StoreResult<BlockAck> {
        validate_key(key)?;
        verify_checksum(data, checksum)?;

        let path = self.staged_block_path(key, block_id);
        self.write_atomic(&path, data).await?;
        debug!(key, block = block_id.index(), bytes = data.len(), "Staged block");

        Ok(BlockAck {
            block_id: block_id.clone(),
            size: data.len() as u64,
        })
    }

    async fn commit_block_list(
        &self,
        key: &str,
        block_ids: &[BlockId],
    ) -> StoreResult<ObjectMetadata> {
        validate_key(key)?;

        let path = self.object_path(key);
        self.ensure_parent_dir(&path).await?;
        let temp_path = temp_path_for(&path);

        let assembled = self.assemble_blocks(key, block_ids, &temp_path).await;
        let (size, digest) = match assembled {
            Ok(done) => done,
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                return Err(e);
            }
        };

        let content_md5 = Checksum::Md5(digest).to_base64();
        let meta = Self::new_metadata(key, size, BlobKind::Block, block_ids.len(), Some(content_md5));

        let _guard = self.meta_lock.lock().await;
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        self.write_metadata(&meta).await?;

        let staging = self.staging_dir(key);
        if staging.exists() {
            fs::remove_dir_all(&staging).await?;
        }

        debug!(key, blocks = block_ids.len(), size, "Committed block list");
        Ok(meta)
    }

    async fn put_object(
        &self,
        key: &str,
        data: &[u8],
        checksum: Option<&Checksum>,
    ) -> StoreResult<ObjectMetadata> {
        validate_key(key)?;
        verify_checksum(data, checksum)?;

        let content_md5 = Checksum::md5(data).to_base64();
        let meta = Self::new_metadata(key, data.len() as u64, BlobKind::Block, 0, Some(content_md5));

        let _guard = self.meta_lock.lock().await;
        self.write_atomic(&self.object_path(key), data).await?;
        self.write_metadata(&meta).await?;
        Ok(meta)
    }

    async fn get_object(&self, key: &str) -> StoreResult<Vec<u8>> {
        validate_key(key)?;
        match fs::read(self.object_path(key)).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::not_found(key)),
            Err(e) => Err(e.into()),
        }
    }

    async fn object_metadata(&self, key: &str) -> StoreResult<ObjectMetadata> {
        validate_key(key)?;
        self.read_metadata(key).await
    }

    async fn delete_object(&self, key: &str) -> StoreResult<()> {
        validate_key(key)?;
        let _guard = self.meta_lock.lock().await;
        for path in [self.object_path(key), self.meta_path(key)] {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        let staging = self.staging_dir(key);
        if staging.exists() {
            fs::remove_dir_all(&staging).await?;
        }
        Ok(())
    }

    async fn create_append_object(&self, key: &str) -> StoreResult<ObjectMetadata> {
        validate_key(key)?;
        let meta = Self::new_metadata(key, 0, BlobKind::Append, 0, None);

        let _guard = self.meta_lock.lock().await;
        self.write_atomic(&self.object_path(key), &[]).await?;
        self.write_metadata(&meta).await?;
        Ok(meta)
    }

    async fn append_block(
        &self,
        key: &str,
        data: &[u8],
        checksum: Option<&Checksum>,
        append_position: u64,
    ) -> StoreResult<u64> {
        validate_key(key)?;
        verify_checksum(data, checksum)?;

        let _guard = self.meta_lock.lock().await;
        let mut meta = self.expect_kind(key, BlobKind::Append).await?;
        if meta.size != append_position {
            return Err(StoreError::precondition_failed(format!(
                "AppendPositionConditionNotMet: {} is {} bytes, expected {}",
                key, meta.size, append_position
            )));
        }

        // Bytes past the recorded size are from an append whose metadata never landed
        let mut file = fs::OpenOptions::new()
            .write(true)
            .open(self.object_path(key))
            .await?;
        if file.metadata().await?.len() != meta.size {
            debug!(key, size = meta.size, "Discarding unrecorded append");
            file.set_len(meta.size).await?;
        }
        file.seek(SeekFrom::Start(meta.size)).await?;
        file.write_all(data).await?;
        file.sync_all().await?;

        meta.size += data.len() as u64;
        meta.block_count += 1;
        meta.etag = new_etag();
        meta.last_modified = Utc::now();
        self.write_metadata(&meta).await?;
        Ok(meta.size)
    }

    async fn create_page_object(&self, key: &str, size: u64) -> StoreResult<ObjectMetadata> {
        validate_key(key)?;
        if size % PAGE_SIZE != 0 {
            return Err(StoreError::http(
                400,
                format!("page object size {} is not a multiple of {}", size, PAGE_SIZE),
            ));
        }
        let meta = Self::new_metadata(key, size, BlobKind::Page, 0, None);

        let _guard = self.meta_lock.lock().await;
        let path = self.object_path(key);
        self.ensure_parent_dir(&path).await?;
        let file = fs::File::create(&path).await?;
        file.set_len(size).await?;
        file.sync_all().await?;
        self.write_metadata(&meta).await?;
        Ok(meta)
    }

    async fn put_pages(
        &self,
        key: &str,
        offset: u64,
        data: &[u8],
        checksum: Option<&Checksum>,
    ) -> StoreResult<()> {
        validate_key(key)?;
        verify_checksum(data, checksum)?;

        let meta = self.expect_kind(key, BlobKind::Page).await?;
        validate_page_range(offset, data.len() as u64, meta.size)?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .open(self.object_path(key))
            .await?;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        file.sync_all().await?;

        let _guard = self.meta_lock.lock().await;
        let mut meta = self.read_metadata(key).await?;
        meta.block_count += 1;
        meta.etag = new_etag();
        meta.last_modified = Utc::now();
        self.write_metadata(&meta).await
    }
}
