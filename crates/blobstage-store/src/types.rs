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
//! Identifiers and metadata shared by every store backend

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Page blobs are written in units of this many bytes
pub const PAGE_SIZE: u64 = 512;

/// Opaque identifier of one staged block
///
/// Encoded as `base64("{session}:{index:010}")`: every id of a session has
/// the same length (a store requirement) and embeds the session id, so two
/// sessions writing the same key never collide. The sequence index is kept
/// alongside so ordering never depends on the encoded text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId {
    index: u64,
    encoded: String,
}

impl BlockId {
    /// Block id for chunk `index` of upload session `session`
    pub fn new(session: &str, index: u64) -> Self {
        let raw = format!("{}:{:010}", session, index);
        BlockId {
            index,
            encoded: BASE64_STANDARD.encode(raw.as_bytes()),
        }
    }

    /// Sequence index of the chunk this block carries
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Wire form of the id
    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

/// Flavour of remote object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobKind {
    /// Staged blocks assembled by a block-list commit
    #[default]
    Block,
    /// Blocks appended strictly in order
    Append,
    /// Fixed-size object written in 512-byte pages at arbitrary offsets
    Page,
}

impl BlobKind {
    /// Parse a kind name
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "block" => Some(BlobKind::Block),
            "append" => Some(BlobKind::Append),
            "page" => Some(BlobKind::Page),
            _ => None,
        }
    }

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobKind::Block => "block",
            BlobKind::Append => "append",
            BlobKind::Page => "page",
        }
    }
}

impl fmt::Display for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acknowledgement of one staged block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockAck {
    /// Block that was staged
    pub block_id: BlockId,
    /// Bytes the store accepted
    pub size: u64,
}

/// Metadata of a committed object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Object key
    pub key: String,
    /// Total size in bytes
    pub size: u64,
    /// Entity tag, changes on every commit
    pub etag: String,
    /// Object flavour
    pub kind: BlobKind,
    /// Committed blocks (block list length, appended blocks); 0 for single-shot writes
    pub block_count: usize,
    /// Base64 MD5 of the whole object when the store computed one
    pub content_md5: Option<String>,
    /// Time of the last commit
    pub last_modified: DateTime<Utc>,
}
