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

use crate::{OffsetCachePolicy, QueueConfig, QueueFile, Result, SerializedQueue};

pub struct QueueBuilder {
    config: QueueConfig,
}

impl QueueBuilder {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config: QueueConfig {
                path: path.into(),
                ..Default::default()
            },
        }
    }

    pub fn from_config(config: QueueConfig) -> Self { Self { config } }

    pub fn initial_capacity(mut self, capacity: u64) -> Self {
        self.config.initial_capacity = capacity;
        self
    }

    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.config.sync_writes = sync;
        self
    }

    pub fn overwrite_on_remove(mut self, overwrite: bool) -> Self {
        self.config.overwrite_on_remove = overwrite;
        self
    }

    pub fn offset_cache(mut self, policy: OffsetCachePolicy) -> Self {
        self.config.offset_cache = policy;
        self
    }

    pub fn truncate_on_clear(mut self, truncate: bool) -> Self {
        self.config.truncate_on_clear = truncate;
        self
    }

    pub const fn config(&self) -> &QueueConfig { &self.config }

    /// Opens the queue for single-owner use.
    pub fn open(self) -> Result<QueueFile> { QueueFile::with_config(&self.config) }

    /// Opens the queue and hands it to a dedicated worker thread.
    pub fn spawn(self) -> Result<SerializedQueue> { SerializedQueue::spawn(self.open()?) }
}
