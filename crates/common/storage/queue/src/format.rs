// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

//! On-disk header and frame formats.
//!
//! A queue file is a fixed-size header followed by a data region that is used
//! as a circular buffer of frames. All integers are big-endian.
//!
//! ## Versioned header, version 2 (36 bytes)
//!
//! ```text
//! ┌──────────────┬──────────────┬───────────┬──────────────┬──────────────┬───────────┐
//! │ version (4B) │ file len (8B)│ count (4B)│ first (8B)   │ last (8B)    │ crc32 (4B)│
//! │ 0x80000002   │ u64          │ u32       │ u64          │ u64          │ bytes 0..32│
//! └──────────────┴──────────────┴───────────┴──────────────┴──────────────┴───────────┘
//! ```
//!
//! Version 1 is the same layout without the checksum (32 bytes). Both are
//! read; new files are written as version 2.
//!
//! ## Legacy header (16 bytes)
//!
//! ```text
//! ┌──────────────┬───────────┬──────────────┬──────────────┐
//! │ file len (4B)│ count (4B)│ first (4B)   │ last (4B)    │
//! │ i32          │ i32       │ i32          │ i32          │
//! └──────────────┴───────────┴──────────────┴──────────────┘
//! ```
//!
//! The high bit of the first word tells legacy and versioned files apart: a
//! legacy file length is a non-negative `i32`, so its high bit is always
//! clear.
//!
//! ## Frame
//!
//! ```text
//! ┌──────────────┬──────────────────────┐
//! │ length (4B)  │ payload (length B)   │
//! └──────────────┴──────────────────────┘
//! ```
//!
//! Header positions point at the frame's length prefix.

use snafu::ensure;

use crate::{
    Result,
    crc::{calculate_header_crc, verify_header_crc},
    error::{CorruptedSnafu, ElementTooBigSnafu, UnsupportedVersionSnafu},
};

/// Size of the frame length prefix in bytes.
pub const FRAME_PREFIX_LEN: u64 = 4;

/// Size of the legacy header in bytes.
pub const LEGACY_HEADER_LEN: u64 = 16;

/// Size of the version 1 header in bytes.
pub const VERSIONED_HEADER_LEN: u64 = 32;

/// Size of the version 2 header in bytes.
pub const CHECKSUMMED_HEADER_LEN: u64 = 36;

/// Highest header version this build reads, and the one it writes.
pub const CURRENT_VERSION: u32 = 2;

const VERSIONED_FLAG: u32 = 0x8000_0000;

/// Bytes covered by the version 2 checksum.
const CRC_OFFSET: usize = 32;

/// Binary layout of a queue file, selected once when the file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum HeaderFormat {
    /// 32-bit file length and positions.
    Legacy,
    /// Version 1: 64-bit file length and positions.
    Versioned,
    /// Version 2: version 1 plus a header checksum.
    Checksummed,
}

impl HeaderFormat {
    /// Header size for this format.
    #[must_use]
    pub const fn header_len(self) -> u64 {
        match self {
            Self::Legacy => LEGACY_HEADER_LEN,
            Self::Versioned => VERSIONED_HEADER_LEN,
            Self::Checksummed => CHECKSUMMED_HEADER_LEN,
        }
    }

    /// Value stored in the first header word, `None` for legacy files.
    #[must_use]
    pub const fn version(self) -> Option<u32> {
        match self {
            Self::Legacy => None,
            Self::Versioned => Some(1),
            Self::Checksummed => Some(2),
        }
    }

    /// Largest file length the header can describe.
    #[must_use]
    pub const fn max_file_len(self) -> u64 {
        match self {
            Self::Legacy => i32::MAX as u64,
            Self::Versioned | Self::Checksummed => i64::MAX as u64,
        }
    }

    /// Largest payload a single frame can carry.
    #[must_use]
    pub const fn max_payload_len(self) -> u64 {
        match self {
            Self::Legacy => i32::MAX as u64,
            Self::Versioned | Self::Checksummed => u32::MAX as u64,
        }
    }

    /// Largest element count the header can describe.
    #[must_use]
    pub const fn max_elements(self) -> u64 {
        match self {
            Self::Legacy => i32::MAX as u64,
            Self::Versioned | Self::Checksummed => u32::MAX as u64,
        }
    }

    /// Selects the decoder from the first word of a file.
    pub fn detect(bytes: &[u8]) -> Result<Self> {
        ensure!(
            bytes.len() >= 4,
            CorruptedSnafu {
                reason: format!("file too short for a header: {} bytes", bytes.len()),
            }
        );
        let word = read_u32(bytes, 0);
        if word & VERSIONED_FLAG == 0 {
            return Ok(Self::Legacy);
        }
        match word & !VERSIONED_FLAG {
            1 => Ok(Self::Versioned),
            2 => Ok(Self::Checksummed),
            version => UnsupportedVersionSnafu {
                detected: version,
                supported: CURRENT_VERSION,
            }
            .fail(),
        }
    }
}

/// Location and payload length of one stored element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElementPointer {
    /// Absolute file offset of the length prefix.
    pub position: u64,
    pub length:   u32,
}

impl ElementPointer {
    /// Pointer used for an empty queue.
    pub const NULL: Self = Self {
        position: 0,
        length:   0,
    };

    #[must_use]
    pub const fn new(position: u64, length: u32) -> Self { Self { position, length } }

    /// Prefix plus payload size.
    #[must_use]
    pub const fn footprint(&self) -> u64 { FRAME_PREFIX_LEN + self.length as u64 }

    #[must_use]
    pub const fn is_null(&self) -> bool { self.position == 0 && self.length == 0 }
}

/// Decoded header fields. Positions are absolute file offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub format:         HeaderFormat,
    pub file_len:       u64,
    pub element_count:  u32,
    pub first_position: u64,
    pub last_position:  u64,
}

impl Header {
    /// Header of a freshly created, empty file.
    #[must_use]
    pub const fn empty(format: HeaderFormat, file_len: u64) -> Self {
        Self {
            format,
            file_len,
            element_count: 0,
            first_position: 0,
            last_position: 0,
        }
    }

    /// Encodes the header in its format's layout.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.format.header_len() as usize];
        match self.format.version() {
            None => {
                buf[0..4].copy_from_slice(&(self.file_len as u32).to_be_bytes());
                buf[4..8].copy_from_slice(&self.element_count.to_be_bytes());
                buf[8..12].copy_from_slice(&(self.first_position as u32).to_be_bytes());
                buf[12..16].copy_from_slice(&(self.last_position as u32).to_be_bytes());
            }
            Some(version) => {
                buf[0..4].copy_from_slice(&(VERSIONED_FLAG | version).to_be_bytes());
                buf[4..12].copy_from_slice(&self.file_len.to_be_bytes());
                buf[12..16].copy_from_slice(&self.element_count.to_be_bytes());
                buf[16..24].copy_from_slice(&self.first_position.to_be_bytes());
                buf[24..32].copy_from_slice(&self.last_position.to_be_bytes());
                if self.format == HeaderFormat::Checksummed {
                    let crc = calculate_header_crc(&buf[..CRC_OFFSET]);
                    buf[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&crc.to_be_bytes());
                }
            }
        }
        buf
    }

    /// Decodes a header, detecting its format from the first word.
    ///
    /// Validates the fields that can be checked without looking at the rest
    /// of the file: sign of legacy fields, version, and checksum.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let format = HeaderFormat::detect(bytes)?;
        ensure!(
            bytes.len() as u64 >= format.header_len(),
            CorruptedSnafu {
                reason: format!(
                    "{format} header needs {} bytes, found {}",
                    format.header_len(),
                    bytes.len()
                ),
            }
        );

        if format == HeaderFormat::Legacy {
            let file_len = read_i32(bytes, 0, "file length")?;
            let element_count = read_i32(bytes, 4, "element count")?;
            let first_position = read_i32(bytes, 8, "first position")?;
            let last_position = read_i32(bytes, 12, "last position")?;
            return Ok(Self {
                format,
                file_len,
                element_count: element_count as u32,
                first_position,
                last_position,
            });
        }

        if format == HeaderFormat::Checksummed {
            let stored_crc = read_u32(bytes, CRC_OFFSET);
            ensure!(
                verify_header_crc(&bytes[..CRC_OFFSET], stored_crc),
                CorruptedSnafu {
                    reason: "header checksum mismatch",
                }
            );
        }
        Ok(Self {
            format,
            file_len: read_u64(bytes, 4),
            element_count: read_u32(bytes, 12),
            first_position: read_u64(bytes, 16),
            last_position: read_u64(bytes, 24),
        })
    }
}

/// Encodes the length prefix for a payload of `len` bytes.
#[must_use]
pub const fn encode_prefix(len: u32) -> [u8; FRAME_PREFIX_LEN as usize] { len.to_be_bytes() }

/// Produces `[length prefix][payload]`.
///
/// Fails when the payload does not fit the format's prefix.
pub fn encode_frame(format: HeaderFormat, payload: &[u8]) -> Result<Vec<u8>> {
    let len = checked_payload_len(format, payload.len())?;
    let mut frame = Vec::with_capacity(FRAME_PREFIX_LEN as usize + payload.len());
    frame.extend_from_slice(&encode_prefix(len));
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Validates a payload length against the format's prefix width.
pub fn checked_payload_len(format: HeaderFormat, len: usize) -> Result<u32> {
    let max = format.max_payload_len();
    ensure!(
        len as u64 <= max,
        ElementTooBigSnafu {
            len: len as u64,
            max,
        }
    );
    Ok(len as u32)
}

/// Decodes a length prefix read from a data region of `data_len` bytes.
pub fn decode_prefix(
    format: HeaderFormat,
    prefix: [u8; FRAME_PREFIX_LEN as usize],
    data_len: u64,
) -> Result<u32> {
    let len = u32::from_be_bytes(prefix);
    ensure!(
        u64::from(len) <= format.max_payload_len(),
        CorruptedSnafu {
            reason: format!("negative element length {}", len as i32),
        }
    );
    ensure!(
        u64::from(len) + FRAME_PREFIX_LEN <= data_len,
        CorruptedSnafu {
            reason: format!("element length {len} exceeds data region of {data_len} bytes"),
        }
    );
    Ok(len)
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_be_bytes(buf)
}

fn read_i32(bytes: &[u8], at: usize, field: &str) -> Result<u64> {
    let value = read_u32(bytes, at) as i32;
    ensure!(
        value >= 0,
        CorruptedSnafu {
            reason: format!("negative {field} {value} in legacy header"),
        }
    );
    Ok(value as u64)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::QueueError;

    #[test_case(HeaderFormat::Legacy ; "legacy")]
    #[test_case(HeaderFormat::Versioned ; "versioned")]
    #[test_case(HeaderFormat::Checksummed ; "checksummed")]
    fn test_header_roundtrip(format: HeaderFormat) {
        let header = Header {
            format,
            file_len: 8192,
            element_count: 3,
            first_position: 100,
            last_position: 4000,
        };
        let encoded = header.encode();
        assert_eq!(encoded.len() as u64, format.header_len());
        assert_eq!(Header::decode(&encoded).unwrap(), header);
    }

    #[test]
    fn test_versioned_header_word() {
        let encoded = Header::empty(HeaderFormat::Versioned, 4096).encode();
        assert_eq!(&encoded[0..4], &[0x80, 0x00, 0x00, 0x01]);
        let encoded = Header::empty(HeaderFormat::Checksummed, 4096).encode();
        assert_eq!(&encoded[0..4], &[0x80, 0x00, 0x00, 0x02]);
    }

    #[test]
    fn test_version_one_has_no_checksum() {
        let header = Header {
            format:         HeaderFormat::Versioned,
            file_len:       4096,
            element_count:  1,
            first_position: VERSIONED_HEADER_LEN,
            last_position:  VERSIONED_HEADER_LEN,
        };
        // Data follows the 32-byte header directly; those bytes are a frame
        // prefix, not a checksum.
        let mut raw = header.encode();
        raw.extend_from_slice(&encode_prefix(5));
        raw.extend_from_slice(b"hello");
        assert_eq!(Header::decode(&raw).unwrap(), header);
    }

    #[test]
    fn test_legacy_layout_is_plain_big_endian() {
        let header = Header {
            format:         HeaderFormat::Legacy,
            file_len:       4096,
            element_count:  1,
            first_position: 16,
            last_position:  16,
        };
        let encoded = header.encode();
        assert_eq!(&encoded[0..4], &4096u32.to_be_bytes());
        assert_eq!(&encoded[8..12], &16u32.to_be_bytes());
        assert_eq!(HeaderFormat::detect(&encoded).unwrap(), HeaderFormat::Legacy);
    }

    #[test]
    fn test_unsupported_version() {
        let mut encoded = Header::empty(HeaderFormat::Versioned, 4096).encode();
        encoded[3] = 7;
        let err = Header::decode(&encoded).unwrap_err();
        assert!(matches!(
            err,
            QueueError::UnsupportedVersion {
                detected: 7,
                supported: 2
            }
        ));
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut encoded = Header::empty(HeaderFormat::Checksummed, 4096).encode();
        encoded[10] ^= 0xFF;
        let err = Header::decode(&encoded).unwrap_err();
        assert!(matches!(err, QueueError::Corrupted { .. }));
    }

    #[test]
    fn test_negative_legacy_field() {
        let mut encoded = Header::empty(HeaderFormat::Legacy, 4096).encode();
        encoded[4..8].copy_from_slice(&(-1i32).to_be_bytes());
        assert!(matches!(
            Header::decode(&encoded),
            Err(QueueError::Corrupted { .. })
        ));
    }

    #[test]
    fn test_short_header() {
        assert!(matches!(
            Header::decode(&[0x80, 0, 0, 1, 0, 0]),
            Err(QueueError::Corrupted { .. })
        ));
        assert!(matches!(
            Header::decode(&[0]),
            Err(QueueError::Corrupted { .. })
        ));
    }

    #[test]
    fn test_encode_frame() {
        let frame = encode_frame(HeaderFormat::Versioned, b"abc").unwrap();
        assert_eq!(frame, vec![0, 0, 0, 3, b'a', b'b', b'c']);
        let empty = encode_frame(HeaderFormat::Legacy, b"").unwrap();
        assert_eq!(empty, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_payload_limits() {
        assert!(checked_payload_len(HeaderFormat::Versioned, u32::MAX as usize).is_ok());
        assert!(matches!(
            checked_payload_len(HeaderFormat::Legacy, i32::MAX as usize + 1),
            Err(QueueError::ElementTooBig { .. })
        ));
    }

    #[test_case(10, 100, true ; "fits")]
    #[test_case(96, 100, true ; "exactly fills region")]
    #[test_case(97, 100, false ; "exceeds region")]
    fn test_decode_prefix_bounds(len: u32, data_len: u64, ok: bool) {
        let decoded = decode_prefix(HeaderFormat::Versioned, encode_prefix(len), data_len);
        assert_eq!(decoded.is_ok(), ok);
    }

    #[test]
    fn test_decode_prefix_negative_legacy_length() {
        let prefix = encode_prefix(0x8000_0010);
        assert!(matches!(
            decode_prefix(HeaderFormat::Legacy, prefix, u64::MAX),
            Err(QueueError::Corrupted { .. })
        ));
    }

    #[test]
    fn test_pointer_footprint() {
        assert_eq!(ElementPointer::new(36, 10).footprint(), 14);
        assert!(ElementPointer::NULL.is_null());
        assert!(!ElementPointer::new(36, 0).is_null());
    }
}
