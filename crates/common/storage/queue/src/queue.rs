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

//! The queue engine.
//!
//! ## Transactions
//!
//! Every mutation follows the same shape:
//!
//! ```text
//! copy committed state ─► grow / write / zero ─► commit header ─► install state
//!                                  │                   │
//!                                  └──── on error ─────┴─► restore logical length,
//!                                                          keep committed state
//! ```
//!
//! The in-memory state only changes once the header carrying it is written,
//! so a failed operation leaves the queue exactly as it was, both on disk
//! and in memory.

use std::{ops::Range, path::Path};

use bytes::Bytes;
use snafu::{ResultExt, ensure};
use tracing::{debug, info, warn};

use crate::{
    QueueBuilder, QueueConfig, Result,
    cache::OffsetCache,
    config::OffsetCachePolicy,
    error::{CorruptedSnafu, InvalidArgumentSnafu, IoSnafu, NoSuchElementSnafu, TooManyElementsSnafu},
    file::DataFile,
    format::{ElementPointer, HeaderFormat, LEGACY_HEADER_LEN, checked_payload_len, encode_prefix},
    header::{Journal, QueueState},
    iter::Iter,
    ring::RingBuffer,
};

/// A transactional FIFO queue of byte arrays stored in a single file.
///
/// Elements live in a circular data region that doubles in size when full.
/// Every operation either fully commits or leaves file and queue untouched.
///
/// A `QueueFile` is single-owner. Share one between threads through
/// [`SerializedQueue`](crate::SerializedQueue).
///
/// ```no_run
/// use spool_queue::QueueFile;
///
/// let mut queue = QueueFile::open("/tmp/events.qf")?;
/// queue.add(b"hello")?;
/// assert_eq!(queue.peek()?.as_deref(), Some(&b"hello"[..]));
/// queue.remove()?;
/// # Ok::<(), spool_queue::QueueError>(())
/// ```
pub struct QueueFile {
    ring:                RingBuffer,
    journal:             Journal,
    state:               QueueState,
    cache:               OffsetCache,
    overwrite_on_remove: bool,
    truncate_on_clear:   bool,
    /// Length a truncating clear shrinks back to.
    initial_len:         u64,
}

impl QueueFile {
    /// Opens the queue file at `path`, creating it with default settings when
    /// it does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        QueueBuilder::new(path.as_ref()).open()
    }

    /// Opens or creates the queue file at `path`; a new file starts at
    /// `capacity` bytes.
    pub fn with_capacity<P: AsRef<Path>>(path: P, capacity: u64) -> Result<Self> {
        QueueBuilder::new(path.as_ref())
            .initial_capacity(capacity)
            .open()
    }

    pub(crate) fn with_config(config: &QueueConfig) -> Result<Self> {
        let path = config.path.as_path();
        let initial_len = config.effective_capacity();

        let exists = path.try_exists().context(IoSnafu { path })?;
        let file = if exists {
            let physical = std::fs::metadata(path).context(IoSnafu { path })?.len();
            ensure!(
                physical >= LEGACY_HEADER_LEN,
                CorruptedSnafu {
                    reason: format!("file of {physical} bytes is too short for a header"),
                }
            );
            DataFile::open(path)?
        } else {
            Journal::create(path, initial_len)?
        };

        let header = Journal::read_header(&file)?;
        let ring = RingBuffer::new(file, header.format, header.file_len);
        let state = Journal::resolve(&ring, &header)?;

        info!(
            path = ?path,
            format = ?header.format,
            count = state.element_count,
            file_len = state.file_len,
            "Opened queue file"
        );

        let mut queue = Self {
            ring,
            journal: Journal::new(config.sync_writes),
            state,
            cache: OffsetCache::new(OffsetCachePolicy::None),
            overwrite_on_remove: config.overwrite_on_remove,
            truncate_on_clear: config.truncate_on_clear,
            initial_len,
        };
        queue.set_cache_offset_policy(config.offset_cache)?;
        Ok(queue)
    }

    /// Appends one element.
    pub fn add(&mut self, data: &[u8]) -> Result<()> {
        let len = checked_payload_len(self.ring.format(), data.len())?;
        self.push_frames(&[&encode_prefix(len), data], &[(0, len)])
    }

    /// Appends all elements in order as a single transaction.
    ///
    /// Either every element is added or none is. An empty batch is a no-op.
    pub fn add_n<I, B>(&mut self, payloads: I) -> Result<()>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let format = self.ring.format();
        let mut batch = Vec::new();
        let mut frames = Vec::new();
        for payload in payloads {
            let payload = payload.as_ref();
            let len = checked_payload_len(format, payload.len())?;
            frames.push((batch.len() as u64, len));
            batch.extend_from_slice(&encode_prefix(len));
            batch.extend_from_slice(payload);
        }
        if frames.is_empty() {
            return Ok(());
        }
        self.push_frames(&[&batch], &frames)
    }

    /// Commits encoded frames after the current tail.
    ///
    /// `parts` are written back to back; `frames` holds the offset of each
    /// frame within them and its payload length.
    fn push_frames(&mut self, parts: &[&[u8]], frames: &[(u64, u32)]) -> Result<()> {
        let format = self.ring.format();
        let count = u64::from(self.state.element_count) + frames.len() as u64;
        ensure!(
            count <= format.max_elements(),
            TooManyElementsSnafu {
                count,
                max: format.max_elements(),
            }
        );

        let before = self.state;
        let mut appended = Vec::with_capacity(frames.len());
        let mut stale = 0..0;
        self.transact(|queue, next| {
            (appended, stale) = queue.append(next, parts, frames)?;
            Ok(())
        })?;

        if self.state.file_len != before.file_len {
            self.cache.relocate(
                before.first.position,
                before.file_len,
                self.ring.header_len(),
            );
        }
        self.cache
            .on_append(before.element_count as usize, &appended);

        debug!(
            added = frames.len(),
            count = self.state.element_count,
            "Added elements"
        );

        // Growth copied these bytes elsewhere; the originals are free now.
        if self.overwrite_on_remove && !stale.is_empty() {
            self.ring.erase(stale.start, stale.end - stale.start)?;
        }
        Ok(())
    }

    /// Writes frames after the current tail, growing the file first if
    /// needed.
    ///
    /// Returns the new element pointers and the range left behind by
    /// relocation that the new frames did not overwrite.
    fn append(
        &mut self,
        next: &mut QueueState,
        parts: &[&[u8]],
        frames: &[(u64, u32)],
    ) -> Result<(Vec<ElementPointer>, Range<u64>)> {
        let len: u64 = parts.iter().map(|part| part.len() as u64).sum();
        let growth = self
            .ring
            .grow(len, next.element_count, next.first, next.last)?;
        next.last = growth.last;
        next.file_len = self.ring.file_len();

        let start = if next.element_count == 0 {
            self.ring.header_len()
        } else {
            self.ring.next_position(next.last)
        };
        let mut at = start;
        for part in parts {
            self.ring.write(at, part)?;
            at += part.len() as u64;
        }

        let header_len = self.ring.header_len();
        let wrapped = (start + len).saturating_sub(self.ring.file_len());
        let stale = (header_len + wrapped)..(header_len + growth.relocated);

        let pointers: Vec<_> = frames
            .iter()
            .map(|&(offset, len)| ElementPointer::new(self.ring.wrap(start + offset), len))
            .collect();

        if next.element_count == 0 {
            next.first = pointers[0];
        }
        next.last = pointers[pointers.len() - 1];
        next.element_count += pointers.len() as u32;
        Ok((pointers, stale))
    }

    /// Returns the head element without removing it.
    pub fn peek(&self) -> Result<Option<Bytes>> {
        if self.is_empty() {
            return Ok(None);
        }
        self.ring.read_payload(self.state.first).map(Some)
    }

    /// Removes the head element.
    pub fn remove(&mut self) -> Result<()> { self.remove_n(1) }

    /// Removes the `n` oldest elements as a single transaction.
    ///
    /// Fails with `InvalidArgument` for `n == 0` and with `NoSuchElement`
    /// when fewer than `n` elements are queued.
    pub fn remove_n(&mut self, n: usize) -> Result<()> {
        ensure!(
            n > 0,
            InvalidArgumentSnafu {
                message: "cannot remove zero elements",
            }
        );
        let count = self.size();
        ensure!(
            n <= count,
            NoSuchElementSnafu {
                requested: n as u64,
                available: count as u64,
            }
        );

        let first = self.state.first;
        let (new_first, freed) = if n == count {
            let used = self.used_bytes() - self.ring.header_len();
            (ElementPointer::NULL, used)
        } else {
            let new_first = self.pointer_after(n)?;
            (new_first, self.distance(first.position, new_first.position))
        };

        self.transact(|queue, next| {
            if queue.overwrite_on_remove {
                queue.ring.erase(first.position, freed)?;
            }
            next.element_count -= n as u32;
            next.first = new_first;
            if next.element_count == 0 {
                next.last = ElementPointer::NULL;
            }
            Ok(())
        })?;
        self.cache.on_remove(n);

        debug!(removed = n, freed, count = self.state.element_count, "Removed elements");
        Ok(())
    }

    /// Removes every element.
    ///
    /// With `truncate_on_clear` a file that grew past its initial length is
    /// shrunk back to it.
    pub fn clear(&mut self) -> Result<()> {
        let file_len = self.state.file_len;
        let shrink = self.truncate_on_clear && file_len > self.initial_len;
        let new_len = if shrink { self.initial_len } else { file_len };

        self.transact(|queue, next| {
            if queue.overwrite_on_remove {
                queue
                    .ring
                    .erase(queue.ring.header_len(), queue.ring.data_len())?;
            }
            *next = QueueState::empty(new_len);
            Ok(())
        })?;
        self.cache.clear();

        if shrink {
            self.ring.set_file_len(new_len);
            // The header already describes the shorter file, and a longer
            // physical file stays valid.
            if let Err(e) = self.ring.truncate() {
                warn!(path = ?self.path(), error = %e, "Failed to shrink cleared queue file");
            }
        }

        info!(path = ?self.path(), file_len = new_len, "Cleared queue");
        Ok(())
    }

    /// Iterates over the elements from head to tail.
    pub fn iter(&mut self) -> Iter<'_> { Iter::new(self) }

    /// Reads every element, head first.
    pub fn get_all(&mut self) -> Result<Vec<Bytes>> { self.iter().collect() }

    pub const fn is_empty(&self) -> bool { self.state.element_count == 0 }

    /// Number of queued elements.
    pub const fn size(&self) -> usize { self.state.element_count as usize }

    /// Logical file length recorded in the header.
    pub const fn file_len(&self) -> u64 { self.state.file_len }

    /// Bytes occupied by header and live elements.
    pub const fn used_bytes(&self) -> u64 {
        self.ring
            .used_bytes(self.state.element_count, self.state.first, self.state.last)
    }

    /// Header layout of the underlying file.
    pub const fn format(&self) -> HeaderFormat { self.ring.format() }

    pub fn path(&self) -> &Path { self.ring.file().path() }

    /// Flushes all mapped data to disk regardless of `sync_writes`.
    pub fn sync_all(&self) -> Result<()> { self.ring.file().flush() }

    pub const fn sync_writes(&self) -> bool { self.journal.sync_writes() }

    pub const fn set_sync_writes(&mut self, value: bool) { self.journal.set_sync_writes(value); }

    pub const fn overwrite_on_remove(&self) -> bool { self.overwrite_on_remove }

    pub const fn set_overwrite_on_remove(&mut self, value: bool) {
        self.overwrite_on_remove = value;
    }

    pub const fn truncate_on_clear(&self) -> bool { self.truncate_on_clear }

    pub const fn set_truncate_on_clear(&mut self, value: bool) { self.truncate_on_clear = value; }

    pub const fn cache_offset_policy(&self) -> OffsetCachePolicy { self.cache.policy() }

    /// Switches the offset cache policy.
    ///
    /// Switching to [`OffsetCachePolicy::Eager`] walks the whole queue once.
    pub fn set_cache_offset_policy(&mut self, policy: OffsetCachePolicy) -> Result<()> {
        self.cache.set_policy(policy);
        if policy == OffsetCachePolicy::Eager {
            let mut position = self.state.first.position;
            for index in 0..self.size() {
                let pointer = self.pointer_at(index, position)?;
                position = self.ring.next_position(pointer);
            }
        }
        Ok(())
    }

    /// Pointer of the element at `index`, whose frame starts at `position`.
    ///
    /// Served from the cache when possible, otherwise read and recorded.
    pub(crate) fn pointer_at(&mut self, index: usize, position: u64) -> Result<ElementPointer> {
        if let Some(pointer) = self.cache.get(index) {
            return Ok(pointer);
        }
        let pointer = self.ring.read_pointer(position)?;
        self.cache.record(index, pointer);
        Ok(pointer)
    }

    /// Pointer of the element `n` places after the head.
    ///
    /// Walks frame prefixes from the closest cached pointer.
    pub(crate) fn pointer_after(&mut self, n: usize) -> Result<ElementPointer> {
        let (mut index, mut pointer) = self.cache.nearest(n).unwrap_or((0, self.state.first));
        while index < n {
            let position = self.ring.next_position(pointer);
            index += 1;
            pointer = self.pointer_at(index, position)?;
        }
        Ok(pointer)
    }

    pub(crate) const fn ring(&self) -> &RingBuffer { &self.ring }

    pub(crate) const fn head(&self) -> ElementPointer { self.state.first }

    /// Bytes from `from` forward to `to` around the ring.
    const fn distance(&self, from: u64, to: u64) -> u64 {
        if to >= from {
            to - from
        } else {
            to + self.ring.data_len() - from
        }
    }

    /// Runs `f` against a copy of the committed state, commits the result,
    /// and installs it. On failure the committed state stays in place.
    fn transact<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self, &mut QueueState) -> Result<()>,
    {
        let mut next = self.state;
        let result = f(self, &mut next).and_then(|()| self.journal.commit(&self.ring, &next));
        match result {
            Ok(()) => {
                self.state = next;
                Ok(())
            }
            Err(e) => {
                self.ring.set_file_len(self.state.file_len);
                warn!(path = ?self.path(), error = %e, "Queue transaction rolled back");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for QueueFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueFile")
            .field("path", &self.path())
            .field("format", &self.format())
            .field("file_len", &self.state.file_len)
            .field("size", &self.state.element_count)
            .field("first", &self.state.first)
            .field("last", &self.state.last)
            .finish_non_exhaustive()
    }
}

impl<'a> IntoIterator for &'a mut QueueFile {
    type IntoIter = Iter<'a>;
    type Item = Result<Bytes>;

    fn into_iter(self) -> Self::IntoIter { self.iter() }
}
