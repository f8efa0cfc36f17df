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

//! Memory-mapped backing file operations using mmap-io.

use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
};

use mmap_io::MemoryMappedFile;
use snafu::ResultExt;
use tracing::debug;

use crate::{
    QueueError, Result,
    error::{IoSnafu, MmapFailedSnafu},
};

/// Read/write memory-mapped queue file.
///
/// Wraps mmap-io's MemoryMappedFile with positioned reads and writes. The
/// mapping always covers the whole physical file; [`resize`](Self::resize)
/// changes the file length and remaps.
pub struct DataFile {
    mmap: MemoryMappedFile,
    path: PathBuf,
    size: u64,
}

impl DataFile {
    /// Create a new file pre-allocated to `size` bytes.
    pub fn create<P: AsRef<Path>>(path: P, size: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context(IoSnafu { path: parent })?;
        }

        let mmap = MemoryMappedFile::create_rw(&path, size).map_err(mmap_failed)?;

        Ok(Self { mmap, path, size })
    }

    /// Open an existing file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mmap = MemoryMappedFile::open_rw(&path).map_err(mmap_failed)?;
        let size = mmap.len();

        Ok(Self { mmap, path, size })
    }

    /// Write data at the specified offset.
    #[inline]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.mmap.update_region(offset, data).map_err(mmap_failed)
    }

    /// Read data from the specified offset into the provided buffer.
    #[inline]
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        self.mmap.read_into(offset, buf).map_err(mmap_failed)
    }

    /// Physical file size.
    pub const fn size(&self) -> u64 { self.size }

    pub fn path(&self) -> &Path { &self.path }

    /// Flush the whole mapping to disk.
    pub fn flush(&self) -> Result<()> { self.mmap.flush().map_err(mmap_failed) }

    /// Flush a specific range to disk.
    pub fn flush_range(&self, offset: u64, len: u64) -> Result<()> {
        self.mmap.flush_range(offset, len).map_err(mmap_failed)
    }

    /// Change the physical file length and remap.
    ///
    /// The current mapping is only replaced once the new one exists, so a
    /// failure leaves `self` usable at its old size.
    pub fn resize(&mut self, new_size: u64) -> Result<()> {
        if new_size == self.size {
            return Ok(());
        }

        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .context(IoSnafu { path: &self.path })?;
        file.set_len(new_size)
            .context(IoSnafu { path: &self.path })?;
        file.sync_all().context(IoSnafu { path: &self.path })?;

        let mmap = MemoryMappedFile::open_rw(&self.path).map_err(mmap_failed)?;

        debug!(path = ?self.path, from = self.size, to = new_size, "Resized queue file");

        self.mmap = mmap;
        self.size = new_size;
        Ok(())
    }
}

fn mmap_failed(e: impl std::fmt::Display) -> QueueError {
    MmapFailedSnafu {
        message: e.to_string(),
    }
    .build()
}
