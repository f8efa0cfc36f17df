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

//! A transactional, file-backed FIFO queue of byte arrays.
//!
//! ## File layout
//!
//! ```text
//! ┌──────────┬───────────────────────────────────────────────────┐
//! │  header  │  data region (circular)                           │
//! └──────────┴───────────────────────────────────────────────────┘
//!             [len][payload] [len][payload] ...
//! ```
//!
//! - The header records file length, element count and the positions of the
//!   first and last elements. It is written last in every transaction, so
//!   what it describes is always fully on disk.
//! - Elements are framed with a 4-byte big-endian length prefix and may wrap
//!   around the end of the data region.
//! - When an append does not fit, the file doubles in length and any wrapped
//!   elements are relocated so the queue is contiguous again.
//!
//! Three header layouts exist: the 16-byte legacy layout, the 32-byte
//! version 1 layout and the 36-byte version 2 layout, which appends a CRC-32
//! of the header. New files use version 2; existing files keep whatever
//! layout they were created with.
//!
//! ## Entry points
//!
//! - [`QueueFile`]: single-owner engine
//! - [`SerializedQueue`] / [`QueueHandle`]: the engine on its own thread,
//!   shared through cloneable handles
//! - [`TypedQueue`]: serde values instead of raw bytes

mod builder;
mod cache;
pub mod config;
mod crc;
pub mod error;
mod file;
pub mod format;
mod header;
mod iter;
mod queue;
mod ring;
pub mod typed;
mod worker;

pub use builder::QueueBuilder;
pub use config::{OffsetCachePolicy, QueueConfig};
pub use error::{ErrorKind, QueueError, Result};
pub use format::HeaderFormat;
pub use iter::Iter;
pub use queue::QueueFile;
pub use typed::{BincodeCodec, Codec, JsonCodec, TypedQueue, TypedQueueError};
pub use worker::{QueueHandle, SerializedQueue};
