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

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Initial file length for new queue files.
pub const DEFAULT_CAPACITY: u64 = 4096;

/// Smallest file length a queue file is created with.
pub const MIN_CAPACITY: u64 = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct QueueConfig {
    /// Location of the queue file.
    #[default(_code = "PathBuf::from(\"./queue.qf\")")]
    pub path:                PathBuf,
    /// File length used when the file is created, and the length a
    /// truncating clear shrinks back to.
    #[default(DEFAULT_CAPACITY)]
    pub initial_capacity:    u64,
    /// Flush data and header on every commit.
    #[default = true]
    pub sync_writes:         bool,
    /// Zero the bytes of removed elements.
    #[default = true]
    pub overwrite_on_remove: bool,
    pub offset_cache:        OffsetCachePolicy,
    /// Shrink the file back to `initial_capacity` on clear.
    #[default = false]
    pub truncate_on_clear:   bool,
}

impl QueueConfig {
    /// File length a new file gets, never below [`MIN_CAPACITY`].
    #[must_use]
    pub fn effective_capacity(&self) -> u64 { self.initial_capacity.max(MIN_CAPACITY) }
}

/// Whether element pointers are cached to speed up iteration and removal.
///
/// Only the cost of walking the queue changes; results never do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetCachePolicy {
    /// Every walk re-reads frame prefixes.
    #[default]
    None,
    /// Pointers are remembered as iteration discovers them.
    Lazy,
    /// Pointers for all elements are computed up front and kept current.
    Eager,
}
