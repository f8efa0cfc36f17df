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

//! Cache of element pointers counted from the head of the queue.
//!
//! Entry `i` is the pointer of the `i`-th element after the current head, and
//! the cached entries always form an unbroken run starting at index 0. That
//! keeps bookkeeping trivial: removing `n` elements pops `n` entries from the
//! front, appending extends the back only when the run already reaches the
//! tail.

use std::collections::VecDeque;

use crate::{config::OffsetCachePolicy, format::ElementPointer};

#[derive(Debug, Default)]
pub(crate) struct OffsetCache {
    policy: OffsetCachePolicy,
    known:  VecDeque<ElementPointer>,
}

impl OffsetCache {
    pub const fn new(policy: OffsetCachePolicy) -> Self {
        Self {
            policy,
            known: VecDeque::new(),
        }
    }

    pub const fn policy(&self) -> OffsetCachePolicy { self.policy }

    /// Switches policy, dropping every entry.
    pub fn set_policy(&mut self, policy: OffsetCachePolicy) {
        self.policy = policy;
        self.known.clear();
    }

    pub fn len(&self) -> usize { self.known.len() }

    pub fn get(&self, index: usize) -> Option<ElementPointer> { self.known.get(index).copied() }

    /// Closest cached entry at or before `index`.
    pub fn nearest(&self, index: usize) -> Option<(usize, ElementPointer)> {
        let at = index.min(self.known.len().checked_sub(1)?);
        Some((at, self.known[at]))
    }

    /// Records a pointer discovered while reading, if it extends the run.
    pub fn record(&mut self, index: usize, pointer: ElementPointer) {
        if self.policy != OffsetCachePolicy::None && index == self.known.len() {
            self.known.push_back(pointer);
        }
    }

    /// Extends a complete eager run with freshly appended elements.
    ///
    /// `count_before` is the element count before the append.
    pub fn on_append(&mut self, count_before: usize, appended: &[ElementPointer]) {
        if self.policy == OffsetCachePolicy::Eager && self.known.len() == count_before {
            self.known.extend(appended.iter().copied());
        }
    }

    /// Rewrites entries that growth moved from the wrapped part of the data
    /// region to the newly extended space.
    pub fn relocate(&mut self, first_position: u64, old_len: u64, header_len: u64) {
        for pointer in &mut self.known {
            if pointer.position < first_position {
                pointer.position = old_len + pointer.position - header_len;
            }
        }
    }

    /// Drops the entries of the `n` removed head elements.
    pub fn on_remove(&mut self, n: usize) {
        let n = n.min(self.known.len());
        self.known.drain(..n);
    }

    pub fn clear(&mut self) { self.known.clear(); }
}
