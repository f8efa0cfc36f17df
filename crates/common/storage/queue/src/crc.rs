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

//! CRC32 checksum for the version 2 header.
//!
//! Uses CRC-32 (IEEE polynomial) via crc32fast. The checksum lets `open`
//! tell a torn or overwritten header apart from a valid one.

use crc32fast::Hasher;

/// Calculates the CRC32 of the header bytes preceding the checksum field.
#[inline]
pub(crate) fn calculate_header_crc(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Verifies the header bytes against a stored checksum.
#[inline]
pub(crate) fn verify_header_crc(bytes: &[u8], expected: u32) -> bool {
    calculate_header_crc(bytes) == expected
}
