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

#![allow(clippy::cast_possible_truncation)]

//! Wrap-aware I/O over the data region of a queue file.
//!
//! The data region spans `[header_len, file_len)`. A logical position at or
//! past `file_len` continues at `header_len`:
//!
//! ```text
//!  header_len                                   file_len
//!  ├─────────┬──────────────────────────┬──────────┤
//!  │ tail ►  │          free            │ ◄ head   │
//!  └─────────┴──────────────────────────┴──────────┘
//!       ▲ wrapped part of a frame          ▲ first element
//! ```
//!
//! `file_len` here is the *logical* length committed in the header. The
//! physical file can be longer after a growth that never got committed.

use bytes::Bytes;
use tracing::info;

use crate::{
    Result,
    error::CapacityExceededSnafu,
    file::DataFile,
    format::{ElementPointer, FRAME_PREFIX_LEN, HeaderFormat, decode_prefix},
};

/// Chunk size for zero-fill and relocation copies.
const COPY_CHUNK: usize = 64 * 1024;

const ZEROES: [u8; COPY_CHUNK] = [0u8; COPY_CHUNK];

/// Outcome of [`RingBuffer::grow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Growth {
    /// Pointer of the last element after relocation.
    pub last:      ElementPointer,
    /// Bytes copied from `[header_len, header_len + relocated)` to the old
    /// end of the file. The source range no longer holds live elements.
    pub relocated: u64,
}

/// Maps logical positions onto the circular data region and performs the
/// split reads and writes that straddle its end.
pub(crate) struct RingBuffer {
    file:       DataFile,
    format:     HeaderFormat,
    header_len: u64,
    file_len:   u64,
}

impl RingBuffer {
    pub fn new(file: DataFile, format: HeaderFormat, file_len: u64) -> Self {
        Self {
            file,
            format,
            header_len: format.header_len(),
            file_len,
        }
    }

    pub const fn file(&self) -> &DataFile { &self.file }

    pub const fn format(&self) -> HeaderFormat { self.format }

    pub const fn header_len(&self) -> u64 { self.header_len }

    pub const fn file_len(&self) -> u64 { self.file_len }

    /// Size of the circular data region.
    pub const fn data_len(&self) -> u64 { self.file_len - self.header_len }

    /// Replaces the logical length: rollback after a failed transaction, or
    /// the shorter length a truncating clear committed.
    pub const fn set_file_len(&mut self, file_len: u64) { self.file_len = file_len; }

    /// Maps a logical position to its physical offset.
    #[inline]
    pub const fn wrap(&self, position: u64) -> u64 {
        if position < self.file_len {
            position
        } else {
            self.header_len + position - self.file_len
        }
    }

    /// Bytes occupied by the elements between `first` and `last`, header
    /// included.
    pub const fn used_bytes(&self, count: u32, first: ElementPointer, last: ElementPointer) -> u64 {
        if count == 0 {
            return self.header_len;
        }
        if last.position >= first.position {
            (last.position - first.position) + last.footprint() + self.header_len
        } else {
            last.position + last.footprint() + self.file_len - first.position
        }
    }

    /// Free bytes in the data region.
    pub const fn remaining(&self, used: u64) -> u64 { self.file_len - used }

    /// Writes `data` at a logical position, splitting at the region end.
    pub fn write(&self, position: u64, data: &[u8]) -> Result<()> {
        let position = self.wrap(position);
        let len = data.len() as u64;
        if position + len <= self.file_len {
            self.file.write_at(position, data)
        } else {
            let before_eof = (self.file_len - position) as usize;
            self.file.write_at(position, &data[..before_eof])?;
            self.file.write_at(self.header_len, &data[before_eof..])
        }
    }

    /// Fills `buf` from a logical position, splitting at the region end.
    pub fn read(&self, position: u64, buf: &mut [u8]) -> Result<()> {
        let position = self.wrap(position);
        let len = buf.len() as u64;
        if position + len <= self.file_len {
            self.file.read_at(position, buf)
        } else {
            let before_eof = (self.file_len - position) as usize;
            let (head, tail) = buf.split_at_mut(before_eof);
            self.file.read_at(position, head)?;
            self.file.read_at(self.header_len, tail)
        }
    }

    /// Overwrites `len` bytes from a logical position with zeroes.
    pub fn erase(&self, position: u64, len: u64) -> Result<()> {
        let mut position = position;
        let mut left = len;
        while left > 0 {
            let chunk = left.min(COPY_CHUNK as u64);
            self.write(position, &ZEROES[..chunk as usize])?;
            position = self.wrap(position + chunk);
            left -= chunk;
        }
        Ok(())
    }

    /// Reads the length prefix of the frame at `position`.
    pub fn read_prefix(&self, position: u64) -> Result<u32> {
        let mut prefix = [0u8; FRAME_PREFIX_LEN as usize];
        self.read(position, &mut prefix)?;
        decode_prefix(self.format, prefix, self.data_len())
    }

    /// Reads the pointer of the frame whose prefix starts at `position`.
    pub fn read_pointer(&self, position: u64) -> Result<ElementPointer> {
        Ok(ElementPointer::new(position, self.read_prefix(position)?))
    }

    /// Reads the payload of the frame at `pointer`.
    pub fn read_payload(&self, pointer: ElementPointer) -> Result<Bytes> {
        let mut payload = vec![0u8; pointer.length as usize];
        self.read(pointer.position + FRAME_PREFIX_LEN, &mut payload)?;
        Ok(Bytes::from(payload))
    }

    /// Decodes the frame at `position` and returns its payload together with
    /// the position of the following frame.
    pub fn read_frame(&self, position: u64) -> Result<(Bytes, u64)> {
        let pointer = self.read_pointer(position)?;
        let payload = self.read_payload(pointer)?;
        Ok((payload, self.next_position(pointer)))
    }

    /// Position right after the frame at `pointer`.
    #[inline]
    pub const fn next_position(&self, pointer: ElementPointer) -> u64 {
        self.wrap(pointer.position + pointer.footprint())
    }

    /// Grows the file until `required` more bytes fit.
    ///
    /// Doubles the logical length (repeatedly, if needed), extends the
    /// physical file, and when the used region wraps copies the wrapped
    /// prefix `[header_len, end_of_last)` to the start of the new space so
    /// the elements become contiguous again.
    ///
    /// Nothing is committed here: the caller's header commit publishes the
    /// new length. Until then the old header still describes the original
    /// bytes, which relocation copies rather than moves. The source copy is
    /// left for the caller to zero once the commit is done.
    pub fn grow(
        &mut self,
        required: u64,
        count: u32,
        first: ElementPointer,
        last: ElementPointer,
    ) -> Result<Growth> {
        let used = self.used_bytes(count, first, last);
        let mut remaining = self.remaining(used);
        if remaining >= required {
            return Ok(Growth {
                last,
                relocated: 0,
            });
        }

        let old_len = self.file_len;
        let max = self.format.max_file_len();
        let mut new_len = old_len;
        while remaining < required {
            remaining += new_len;
            new_len = new_len.checked_mul(2).filter(|len| *len <= max).ok_or_else(|| {
                CapacityExceededSnafu {
                    required: used + required,
                    max,
                }
                .build()
            })?;
        }

        if self.file.size() < new_len {
            self.file.resize(new_len)?;
        }

        let mut growth = Growth {
            last,
            relocated: 0,
        };
        if count > 0 {
            // Computed against the old length: the end of the last frame as
            // it sits on disk right now.
            let end_of_last = self.next_position(last);
            if end_of_last <= first.position {
                growth.relocated = end_of_last - self.header_len;
                self.copy(self.header_len, old_len, growth.relocated)?;
            }
            if last.position < first.position {
                growth.last.position = old_len + last.position - self.header_len;
            }
        }

        self.file_len = new_len;

        info!(
            path = ?self.file.path(),
            from = old_len,
            to = new_len,
            relocated = growth.relocated,
            "Grew queue file"
        );

        Ok(growth)
    }

    /// Shrinks the physical file to the current logical length.
    pub fn truncate(&mut self) -> Result<()> { self.file.resize(self.file_len) }

    /// Copies `len` physical bytes from `src` to `dst` without wrapping.
    fn copy(&self, src: u64, dst: u64, len: u64) -> Result<()> {
        let mut buf = vec![0u8; (len as usize).min(COPY_CHUNK)];
        let mut done = 0u64;
        while done < len {
            let chunk = (len - done).min(COPY_CHUNK as u64) as usize;
            self.file.read_at(src + done, &mut buf[..chunk])?;
            self.file.write_at(dst + done, &buf[..chunk])?;
            done += chunk as u64;
        }
        Ok(())
    }
}
