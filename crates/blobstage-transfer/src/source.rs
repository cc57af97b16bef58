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

//! Upload sources and the chunker that splits them into blocks
//!
//! Every source is reduced to a boxed `AsyncRead` and read exactly once.
//! Block bytes land directly in pool buffers, which the block uploader
//! keeps for the whole retry loop, so retrying a block never touches the
//! source again. Sources that can be re-read (in-memory bytes, files) also
//! expose a [`ReplayHandle`] used to recover from integrity failures.

use crate::error::{UploadError, UploadResult};
use crate::pool::PooledBuffer;
use bytes::{Bytes, BytesMut};
use futures::Stream;
use std::fmt;
use std::io::{self, Cursor, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use tokio_util::io::StreamReader;

type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;

/// Re-reads byte ranges of a replayable source
#[derive(Debug, Clone)]
pub enum ReplayHandle {
    Memory(Bytes),
    File(PathBuf),
}

impl ReplayHandle {
    /// Replace the contents of `buf` with `len` bytes starting at `offset`
    pub async fn read_range(&self, offset: u64, len: usize, buf: &mut BytesMut) -> io::Result<()> {
        buf.clear();
        match self {
            ReplayHandle::Memory(data) => {
                let start = usize::try_from(offset)
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset too large"))?;
                let end = start.checked_add(len).filter(|end| *end <= data.len());
                match end {
                    Some(end) => buf.extend_from_slice(&data[start..end]),
                    None => {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            format!("range {}+{} outside {} byte source", offset, len, data.len()),
                        ))
                    }
                }
            }
            ReplayHandle::File(path) => {
                let mut file = File::open(path).await?;
                file.seek(SeekFrom::Start(offset)).await?;
                buf.resize(len, 0);
                file.read_exact(&mut buf[..]).await?;
            }
        }
        Ok(())
    }
}

/// Bytes to upload
pub struct UploadSource {
    reader: BoxedReader,
    declared_len: Option<u64>,
    replay: Option<ReplayHandle>,
}

impl UploadSource {
    /// In-memory bytes; replayable, length known
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data: Bytes = data.into();
        UploadSource {
            declared_len: Some(data.len() as u64),
            replay: Some(ReplayHandle::Memory(data.clone())),
            reader: Box::pin(Cursor::new(data)),
        }
    }

    /// A file; replayable, length taken from its metadata
    pub async fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await?;
        let len = file.metadata().await?.len();
        Ok(UploadSource {
            reader: Box::pin(file),
            declared_len: Some(len),
            replay: Some(ReplayHandle::File(path)),
        })
    }

    /// Any async reader; read once, never replayed
    pub fn from_reader<R>(reader: R, declared_len: Option<u64>) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        UploadSource {
            reader: Box::pin(reader),
            declared_len,
            replay: None,
        }
    }

    /// A single-subscription byte stream; read once, never replayed
    pub fn from_stream<S, E>(stream: S, declared_len: Option<u64>) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<io::Error>,
    {
        Self::from_reader(StreamReader::new(stream), declared_len)
    }

    pub fn declared_len(&self) -> Option<u64> {
        self.declared_len
    }

    pub fn is_replayable(&self) -> bool {
        self.replay.is_some()
    }

    pub fn replay_handle(&self) -> Option<ReplayHandle> {
        self.replay.clone()
    }
}

impl fmt::Debug for UploadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadSource")
            .field("declared_len", &self.declared_len)
            .field("replay", &self.replay)
            .finish()
    }
}

/// One block's worth of source bytes, held in a pool buffer
#[derive(Debug)]
pub struct Chunk {
    /// Position in the block sequence, from 0
    pub index: u64,
    /// Byte offset of the first byte in the source
    pub offset: u64,
    buffer: PooledBuffer,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut BytesMut {
        self.buffer.bytes_mut()
    }
}

/// Outcome of looking ahead at the start of a source
#[derive(Debug)]
pub enum SizeProbe {
    /// The whole source, small enough for one request
    SingleShot(Bytes),
    /// Too large for one request; total is the declared length, if any
    Chunked { total: Option<u64> },
}

/// Splits a source into block-sized chunks in offset order
pub struct ChunkSource {
    reader: BoxedReader,
    block_size: usize,
    declared_len: Option<u64>,
    // Bytes consumed by `probe` but not yet handed out
    pending: Bytes,
    next_index: u64,
    offset: u64,
    exhausted: bool,
}

impl ChunkSource {
    pub fn new(source: UploadSource, block_size: usize) -> Self {
        ChunkSource {
            reader: source.reader,
            block_size: block_size.max(1),
            declared_len: source.declared_len,
            pending: Bytes::new(),
            next_index: 0,
            offset: 0,
            exhausted: false,
        }
    }

    pub fn declared_len(&self) -> Option<u64> {
        self.declared_len
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Decide between a single request and a chunked upload.
    ///
    /// With a declared length the decision is immediate (and a small source
    /// is read and length-checked). Without one, up to `threshold + 1` bytes
    /// are read ahead; anything read is kept for the first chunks.
    pub async fn probe(&mut self, threshold: u64) -> UploadResult<SizeProbe> {
        let limit = threshold.saturating_add(1);
        match self.declared_len {
            Some(declared) if declared > threshold => Ok(SizeProbe::Chunked {
                total: Some(declared),
            }),
            Some(declared) => {
                let data = self.read_ahead(declared.saturating_add(1)).await?;
                let actual = data.len() as u64;
                if actual > declared {
                    return Err(UploadError::OverLongRead { declared });
                }
                if actual < declared {
                    return Err(UploadError::ShortRead { declared, actual });
                }
                self.exhausted = true;
                Ok(SizeProbe::SingleShot(data))
            }
            None => {
                let data = self.read_ahead(limit).await?;
                if data.len() as u64 <= threshold {
                    self.exhausted = true;
                    Ok(SizeProbe::SingleShot(data))
                } else {
                    self.pending = data;
                    Ok(SizeProbe::Chunked { total: None })
                }
            }
        }
    }

    async fn read_ahead(&mut self, limit: u64) -> io::Result<Bytes> {
        let mut data = Vec::new();
        (&mut self.reader).take(limit).read_to_end(&mut data).await?;
        Ok(Bytes::from(data))
    }

    /// Fill `buffer` with the next chunk, or return `None` at end of source.
    ///
    /// The buffer is consumed either way; at end of source it goes straight
    /// back to the pool.
    pub async fn next_chunk(&mut self, mut buffer: PooledBuffer) -> UploadResult<Option<Chunk>> {
        if self.exhausted && self.pending.is_empty() {
            return Ok(None);
        }

        let want = self.block_size;
        let buf = buffer.bytes_mut();
        buf.clear();

        if !self.pending.is_empty() {
            let take = want.min(self.pending.len());
            buf.extend_from_slice(&self.pending.split_to(take));
        }

        while buf.len() < want && !self.exhausted {
            let remaining = (want - buf.len()) as u64;
            let n = (&mut self.reader).take(remaining).read_buf(buf).await?;
            if n == 0 {
                self.exhausted = true;
            }
        }

        let len = buf.len() as u64;
        let end = self.offset + len;
        if let Some(declared) = self.declared_len {
            if end > declared {
                return Err(UploadError::OverLongRead { declared });
            }
            if self.exhausted && end < declared {
                return Err(UploadError::ShortRead {
                    declared,
                    actual: end,
                });
            }
            if end == declared && !self.exhausted {
                // Confirm the source really ends here
                let mut probe = [0u8; 1];
                if self.reader.read(&mut probe).await? > 0 {
                    return Err(UploadError::OverLongRead { declared });
                }
                self.exhausted = true;
            }
        }

        if len == 0 {
            return Ok(None);
        }

        let chunk = Chunk {
            index: self.next_index,
            offset: self.offset,
            buffer,
        };
        self.next_index += 1;
        self.offset = end;
        Ok(Some(chunk))
    }
}

impl fmt::Debug for ChunkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkSource")
            .field("block_size", &self.block_size)
            .field("declared_len", &self.declared_len)
            .field("next_index", &self.next_index)
            .field("offset", &self.offset)
            .finish()
    }
}
