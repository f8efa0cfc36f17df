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

//! Header journal: load, validate and commit the queue metadata.
//!
//! The header is the only record of which bytes in the data region are
//! live. Every transaction writes its frames first and the header last:
//!
//! 1. Write (or relocate, or zero) data region bytes
//! 2. With `sync_writes`: flush the data region
//! 3. Write the header
//! 4. With `sync_writes`: flush the header range
//!
//! Crash behavior:
//! - Before step 3 completes: the old header still describes the old
//!   elements, untouched by the transaction
//! - After step 3: the file opens at the new state

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use snafu::{ResultExt, ensure};
use tracing::{debug, info, warn};

use crate::{
    Result,
    error::{CorruptedSnafu, IoSnafu},
    file::DataFile,
    format::{CHECKSUMMED_HEADER_LEN, ElementPointer, Header, HeaderFormat},
    ring::RingBuffer,
};

/// In-memory view of the committed header with element lengths resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueueState {
    pub file_len:      u64,
    pub element_count: u32,
    pub first:         ElementPointer,
    pub last:          ElementPointer,
}

impl QueueState {
    pub const fn empty(file_len: u64) -> Self {
        Self {
            file_len,
            element_count: 0,
            first: ElementPointer::NULL,
            last: ElementPointer::NULL,
        }
    }

    pub const fn to_header(&self, format: HeaderFormat) -> Header {
        Header {
            format,
            file_len: self.file_len,
            element_count: self.element_count,
            first_position: self.first.position,
            last_position: self.last.position,
        }
    }
}

/// Commits headers under the configured durability policy.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Journal {
    sync_writes: bool,
}

impl Journal {
    pub const fn new(sync_writes: bool) -> Self { Self { sync_writes } }

    pub const fn sync_writes(&self) -> bool { self.sync_writes }

    pub const fn set_sync_writes(&mut self, value: bool) { self.sync_writes = value; }

    /// Creates a new, empty queue file at `path` with a checksummed header.
    ///
    /// The file is built under a temporary sibling name and renamed into
    /// place, so a crash mid-creation never leaves a headerless file at
    /// `path`.
    pub fn create(path: &Path, file_len: u64) -> Result<DataFile> {
        let tmp = tmp_path(path);
        {
            let file = DataFile::create(&tmp, file_len)?;
            let header = Header::empty(HeaderFormat::Checksummed, file_len);
            file.write_at(0, &header.encode())?;
            file.flush()?;
        }
        std::fs::rename(&tmp, path).context(IoSnafu { path })?;

        info!(path = ?path, file_len, "Created queue file");
        DataFile::open(path)
    }

    /// Reads and structurally validates the header of an opened file.
    pub fn read_header(file: &DataFile) -> Result<Header> {
        let head_len = file.size().min(CHECKSUMMED_HEADER_LEN) as usize;
        let mut buf = vec![0u8; head_len];
        file.read_at(0, &mut buf)?;

        let header = Header::decode(&buf).inspect_err(|e| {
            warn!(path = ?file.path(), error = %e, "Rejected queue file header");
        })?;
        let header_len = header.format.header_len();

        ensure!(
            header.file_len <= file.size(),
            CorruptedSnafu {
                reason: format!(
                    "header claims {} bytes but the file has {}",
                    header.file_len,
                    file.size()
                ),
            }
        );
        ensure!(
            header.file_len > header_len,
            CorruptedSnafu {
                reason: format!("file length {} leaves no data region", header.file_len),
            }
        );

        let null_pointers = header.first_position == 0 && header.last_position == 0;
        ensure!(
            (header.element_count == 0) == null_pointers,
            CorruptedSnafu {
                reason: format!(
                    "element count {} disagrees with pointers ({}, {})",
                    header.element_count, header.first_position, header.last_position
                ),
            }
        );
        if header.element_count > 0 {
            for position in [header.first_position, header.last_position] {
                ensure!(
                    position >= header_len && position < header.file_len,
                    CorruptedSnafu {
                        reason: format!(
                            "element position {position} outside data region [{header_len}, {})",
                            header.file_len
                        ),
                    }
                );
            }
        }

        Ok(header)
    }

    /// Resolves element lengths for a validated header.
    pub fn resolve(ring: &RingBuffer, header: &Header) -> Result<QueueState> {
        if header.element_count == 0 {
            return Ok(QueueState::empty(header.file_len));
        }

        let first = ring.read_pointer(header.first_position)?;
        let last = ring.read_pointer(header.last_position)?;
        let state = QueueState {
            file_len: header.file_len,
            element_count: header.element_count,
            first,
            last,
        };

        let used = ring.used_bytes(state.element_count, first, last);
        ensure!(
            used <= header.file_len,
            CorruptedSnafu {
                reason: format!(
                    "elements occupy {used} bytes of a {} byte file",
                    header.file_len
                ),
            }
        );
        Ok(state)
    }

    /// Publishes `state` as the committed header.
    ///
    /// Frame bytes referenced by `state` must already be written.
    pub fn commit(&self, ring: &RingBuffer, state: &QueueState) -> Result<()> {
        let header = state.to_header(ring.format());
        let file = ring.file();
        if self.sync_writes {
            file.flush()?;
        }
        file.write_at(0, &header.encode())?;
        if self.sync_writes {
            file.flush_range(0, ring.header_len())?;
        }

        debug!(
            count = state.element_count,
            first = state.first.position,
            last = state.last.position,
            file_len = state.file_len,
            "Committed header"
        );
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}
