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
//! Content checksums attached to block writes
//!
//! Stores recompute the checksum over the bytes they received and refuse the
//! write when it disagrees, so corruption in transit never reaches a
//! committed object.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use crc::{Crc, CRC_64_XZ};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fmt;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_XZ);

/// Algorithm used to checksum block payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// Send no checksum
    None,
    /// MD5 digest (Content-MD5)
    #[default]
    Md5,
    /// CRC-64 (XZ polynomial)
    Crc64,
}

impl ChecksumAlgorithm {
    /// Compute a checksum over `data`, or `None` when checksumming is disabled
    pub fn compute(&self, data: &[u8]) -> Option<Checksum> {
        match self {
            ChecksumAlgorithm::None => None,
            ChecksumAlgorithm::Md5 => Some(Checksum::md5(data)),
            ChecksumAlgorithm::Crc64 => Some(Checksum::crc64(data)),
        }
    }

    /// Parse an algorithm name
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Some(ChecksumAlgorithm::None),
            "md5" => Some(ChecksumAlgorithm::Md5),
            "crc64" => Some(ChecksumAlgorithm::Crc64),
            _ => None,
        }
    }
}

/// A computed content checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Checksum {
    /// 16-byte MD5 digest
    Md5([u8; 16]),
    /// CRC-64 value
    Crc64(u64),
}

impl Checksum {
    /// MD5 of `data`
    pub fn md5(data: &[u8]) -> Self {
        let digest = Md5::digest(data);
        let mut out = [0u8; 16];
        out.copy_from_slice(&digest);
        Checksum::Md5(out)
    }

    /// CRC-64 of `data`
    pub fn crc64(data: &[u8]) -> Self {
        Checksum::Crc64(CRC64.checksum(data))
    }

    /// Algorithm that produced this checksum
    pub fn algorithm(&self) -> ChecksumAlgorithm {
        match self {
            Checksum::Md5(_) => ChecksumAlgorithm::Md5,
            Checksum::Crc64(_) => ChecksumAlgorithm::Crc64,
        }
    }

    /// Recompute over `data` with the same algorithm
    pub fn recompute(&self, data: &[u8]) -> Checksum {
        match self {
            Checksum::Md5(_) => Checksum::md5(data),
            Checksum::Crc64(_) => Checksum::crc64(data),
        }
    }

    /// True when `data` hashes to this checksum
    pub fn verify(&self, data: &[u8]) -> bool {
        self.recompute(data) == *self
    }

    /// Base64 rendering, as sent in `Content-MD5` / `x-ms-content-crc64`
    pub fn to_base64(&self) -> String {
        match self {
            Checksum::Md5(bytes) => BASE64_STANDARD.encode(bytes),
            Checksum::Crc64(value) => BASE64_STANDARD.encode(value.to_le_bytes()),
        }
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Checksum::Md5(_) => write!(f, "md5:{}", self.to_base64()),
            Checksum::Crc64(_) => write!(f, "crc64:{}", self.to_base64()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_known_vector() {
        // RFC 1321 test suite: MD5("abc")
        let checksum = Checksum::md5(b"abc");
        let Checksum::Md5(bytes) = checksum else {
            panic!("expected md5");
        };
        assert_eq!(hex::encode(bytes), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(checksum.to_base64(), "kAFQmDzST7DWlj99KOF/cg==");
    }

    #[test]
    fn test_crc64_known_vector() {
        // CRC-64/XZ check value over "123456789"
        assert_eq!(
            Checksum::crc64(b"123456789"),
            Checksum::Crc64(0x995D_C9BB_DF19_39FA)
        );
    }

    #[test]
    fn test_verify_detects_corruption() {
        let data = vec![0x42u8; 4096];
        let mut corrupted = data.clone();
        corrupted[100] ^= 0xFF;

        for alg in [ChecksumAlgorithm::Md5, ChecksumAlgorithm::Crc64] {
            let checksum = alg.compute(&data).unwrap();
            assert!(checksum.verify(&data));
            assert!(!checksum.verify(&corrupted));
            assert_eq!(checksum.algorithm(), alg);
        }
    }

    #[test]
    fn test_none_algorithm_computes_nothing() {
        assert!(ChecksumAlgorithm::None.compute(b"data").is_none());
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!(ChecksumAlgorithm::parse("MD5"), Some(ChecksumAlgorithm::Md5));
        assert_eq!(ChecksumAlgorithm::parse("crc64"), Some(ChecksumAlgorithm::Crc64));
        assert_eq!(ChecksumAlgorithm::parse("none"), Some(ChecksumAlgorithm::None));
        assert_eq!(ChecksumAlgorithm::parse("sha1"), None);
    }

    #[test]
    fn test_display_prefixes_algorithm() {
        assert!(Checksum::md5(b"x").to_string().starts_with("md5:"));
        assert!(Checksum::crc64(b"x").to_string().starts_with("crc64:"));
    }
}
