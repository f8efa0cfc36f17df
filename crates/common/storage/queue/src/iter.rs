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

use std::iter::FusedIterator;

use bytes::Bytes;

use crate::{QueueFile, Result};

/// Head-to-tail iterator over queued payloads.
///
/// Holds the queue mutably, so the queue cannot change underneath it. A read
/// error is yielded once and ends the iteration.
pub struct Iter<'a> {
    queue:     &'a mut QueueFile,
    index:     usize,
    position:  u64,
    remaining: usize,
}

impl<'a> Iter<'a> {
    pub(crate) fn new(queue: &'a mut QueueFile) -> Self {
        let position = queue.head().position;
        let remaining = queue.size();
        Self {
            queue,
            index: 0,
            position,
            remaining,
        }
    }

    /// Advances over `n` elements reading only their length prefixes.
    fn advance(&mut self, n: usize) -> Result<()> {
        for _ in 0..n {
            let pointer = self.queue.pointer_at(self.index, self.position)?;
            self.position = self.queue.ring().next_position(pointer);
            self.index += 1;
            self.remaining -= 1;
        }
        Ok(())
    }

    fn read_next(&mut self) -> Result<Bytes> {
        let pointer = self.queue.pointer_at(self.index, self.position)?;
        let payload = self.queue.ring().read_payload(pointer)?;
        self.position = self.queue.ring().next_position(pointer);
        Ok(payload)
    }
}

impl Iterator for Iter<'_> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        match self.read_next() {
            Ok(payload) => {
                self.index += 1;
                self.remaining -= 1;
                Some(Ok(payload))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) { (self.remaining, Some(self.remaining)) }

    /// Skips ahead without reading the skipped payloads.
    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        if n >= self.remaining {
            self.remaining = 0;
            return None;
        }
        if n > 0
            && let Err(e) = self.advance(n)
        {
            self.remaining = 0;
            return Some(Err(e));
        }
        self.next()
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl FusedIterator for Iter<'_> {}
