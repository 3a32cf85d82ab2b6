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

//! CRC32 checksum utilities for header and element integrity.
//!
//! Uses CRC-32 (IEEE polynomial) via crc32fast. All integers are fed to the
//! hasher big-endian, the same byte order the queue file is stored in, so the
//! checksum only depends on field values and never on host layout.

use crc32fast::Hasher;

/// Calculates the header checksum from its five semantic fields.
///
/// CRC-32 detects every single-bit error in its input, so any single flipped
/// bit in the encoded fields changes the result.
#[inline]
pub(crate) fn calculate_header_crc(
    version: i32,
    length: u64,
    count: u32,
    first_position: u64,
    last_position: u64,
) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&version.to_be_bytes());
    hasher.update(&length.to_be_bytes());
    hasher.update(&count.to_be_bytes());
    hasher.update(&first_position.to_be_bytes());
    hasher.update(&last_position.to_be_bytes());
    hasher.finalize()
}

/// Calculates CRC32 checksum for an element.
///
/// Covers the length prefix as well as the payload so that a corrupted
/// length is caught before the payload is trusted.
#[inline]
pub(crate) fn calculate_element_crc(length: u32, data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&length.to_be_bytes());
    hasher.update(data);
    hasher.finalize()
}

/// Verifies an element's CRC32 checksum.
#[inline]
pub(crate) fn verify_element_crc(length: u32, data: &[u8], expected: u32) -> bool {
    calculate_element_crc(length, data) == expected
}
