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

use std::{io, path::PathBuf};

use snafu::Snafu;

/// Coarse classification of a [`QueueError`].
///
/// Callers that only need to decide between "retry / recreate / fix the
/// input" can match on this instead of the individual variants.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display, strum_macros::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Storage unreadable, unwritable or unavailable.
    Io,
    /// On-disk header or frame data failed validation.
    Corruption,
    /// Caller supplied an argument the queue cannot accept.
    IllegalArgument,
    /// Caller asked for more elements than the queue holds.
    NoSuchElement,
}

/// Queue operation errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum QueueError {
    /// Filesystem I/O failure.
    #[snafu(display("IO error on {}: {source}", path.display()))]
    Io { path: PathBuf, source: io::Error },

    /// Memory mapping operation failed.
    #[snafu(display("Mmap operation failed: {message}"))]
    MmapFailed { message: String },

    /// Header or element data failed validation.
    #[snafu(display("Corrupted queue file: {reason}"))]
    Corrupted { reason: String },

    /// The header carries a version this build does not understand.
    #[snafu(display("Unsupported version: detected {detected}, supported {supported}"))]
    UnsupportedVersion { detected: u32, supported: u32 },

    /// Payload does not fit the length prefix of the file's format.
    #[snafu(display("Element of {len} bytes exceeds the maximum of {max} bytes"))]
    ElementTooBig { len: u64, max: u64 },

    /// Element count would overflow the header's count field.
    #[snafu(display("Too many elements: {count} exceeds the maximum of {max}"))]
    TooManyElements { count: u64, max: u64 },

    /// Growing the file would exceed the format's maximum file length.
    #[snafu(display("Cannot grow to hold {required} bytes: maximum file length is {max}"))]
    CapacityExceeded { required: u64, max: u64 },

    /// Fewer elements than requested are queued.
    #[snafu(display("Requested {requested} elements but the queue holds {available}"))]
    NoSuchElement { requested: u64, available: u64 },

    /// Argument rejected before touching the file.
    #[snafu(display("Invalid argument: {message}"))]
    InvalidArgument { message: String },

    /// The worker thread owning the queue has stopped.
    #[snafu(display("Queue worker has stopped"))]
    WorkerStopped,
}

impl QueueError {
    /// Maps the error onto the coarse [`ErrorKind`] taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } | Self::MmapFailed { .. } | Self::WorkerStopped => ErrorKind::Io,
            Self::Corrupted { .. } | Self::UnsupportedVersion { .. } => ErrorKind::Corruption,
            Self::ElementTooBig { .. }
            | Self::TooManyElements { .. }
            | Self::CapacityExceeded { .. }
            | Self::InvalidArgument { .. } => ErrorKind::IllegalArgument,
            Self::NoSuchElement { .. } => ErrorKind::NoSuchElement,
        }
    }
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
