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

use crate::header::HEADER_SIZE;

/// Queue file errors.
///
/// Header validation failures are fatal for the file they were raised on.
/// Use [`QueueError::kind`] to decide between recreating the file and
/// reporting the failure upward.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum QueueError {
    /// Fresh storage cannot hold even the header block.
    #[snafu(display(
        "Storage of {length} bytes does not contain a header of {} bytes",
        HEADER_SIZE
    ))]
    StorageTooSmall { length: u64 },

    /// Stored length leaves no room for the header block.
    #[snafu(display("File length {length} in header is smaller than the header itself"))]
    HeaderLengthTooSmall { length: u64 },

    /// Stored version tag is not the supported one.
    #[snafu(display("Storage is not recognized as a queue file (version {version})"))]
    UnrecognizedVersion { version: i32 },

    /// Storage was shrunk below the length recorded in the header.
    #[snafu(display("File is truncated. Expected length: {expected}, Actual length: {actual}"))]
    Truncated { expected: u64, actual: u64 },

    #[snafu(display("First element offset {position} points outside of storage of length {length}"))]
    FirstPositionOutOfBounds { position: u64, length: u64 },

    #[snafu(display("Last element offset {position} points outside of storage of length {length}"))]
    LastPositionOutOfBounds { position: u64, length: u64 },

    /// Count does not fit a signed 32-bit integer.
    #[snafu(display("Number of elements {count} must not be negative"))]
    NegativeCount { count: i64 },

    #[snafu(display(
        "A queue of size {count} has inconsistent first {first} and last {last} positions"
    ))]
    InconsistentPositions { count: u32, first: u64, last: u64 },

    /// Recomputed header checksum differs from the stored one.
    #[snafu(display(
        "Queue storage was corrupted: checksum does not match (stored={stored:#x}, \
         computed={computed:#x})"
    ))]
    ChecksumMismatch { stored: u32, computed: u32 },

    /// Element frame or payload failed verification.
    #[snafu(display("Corrupted element at offset {position}"))]
    CorruptedElement { position: u64 },

    /// Growing the file would exceed the configured maximum.
    #[snafu(display("Queue is full: {required} bytes required, maximum size is {max_size}"))]
    QueueFull { required: u64, max_size: u64 },

    /// Read or write outside the storage bounds.
    #[snafu(display("Access of {len} bytes at offset {offset} exceeds storage length {length}"))]
    OutOfRange { offset: u64, len: u64, length: u64 },

    #[snafu(display("Invalid queue file configuration: {reason}"))]
    InvalidConfig { reason: String },

    #[snafu(display("Invalid argument: {reason}"))]
    InvalidArgument { reason: String },

    #[snafu(display("Invalid file path: {}", path.display()))]
    InvalidPath { path: PathBuf },

    /// Filesystem I/O failure.
    #[snafu(display("IO error: {source}"), context(false))]
    Io { source: io::Error },

    /// Memory mapping operation failed.
    #[snafu(display("Mmap operation failed: {message}"))]
    Mmap { message: String },
}

/// Coarse classification of [`QueueError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum ErrorKind {
    /// Storage or header length cannot hold the header block.
    Structural,
    /// Not a queue file of the supported version.
    FormatMismatch,
    /// Storage shorter than the header claims.
    Truncation,
    /// Element position outside the storage.
    Bounds,
    /// Header fields contradict each other.
    Consistency,
    /// Checksum or element verification failed.
    Corruption,
    /// Not enough room left under the maximum size.
    Capacity,
    /// Caller supplied an unusable argument or configuration.
    InvalidInput,
    /// The storage medium failed.
    Io,
}

impl ErrorKind {
    /// Whether the file contents themselves are unusable.
    ///
    /// Recreating the queue file is a valid recovery for these kinds.
    #[must_use]
    pub const fn is_corruption(self) -> bool {
        matches!(
            self,
            Self::Structural
                | Self::FormatMismatch
                | Self::Truncation
                | Self::Bounds
                | Self::Consistency
                | Self::Corruption
        )
    }
}

impl QueueError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::StorageTooSmall { .. } | Self::HeaderLengthTooSmall { .. } => {
                ErrorKind::Structural
            }
            Self::UnrecognizedVersion { .. } => ErrorKind::FormatMismatch,
            Self::Truncated { .. } => ErrorKind::Truncation,
            Self::FirstPositionOutOfBounds { .. } | Self::LastPositionOutOfBounds { .. } => {
                ErrorKind::Bounds
            }
            Self::NegativeCount { .. } | Self::InconsistentPositions { .. } => {
                ErrorKind::Consistency
            }
            Self::ChecksumMismatch { .. } | Self::CorruptedElement { .. } => ErrorKind::Corruption,
            Self::QueueFull { .. } => ErrorKind::Capacity,
            Self::InvalidConfig { .. } | Self::InvalidArgument { .. } | Self::InvalidPath { .. } => {
                ErrorKind::InvalidInput
            }
            Self::OutOfRange { .. } | Self::Io { .. } | Self::Mmap { .. } => ErrorKind::Io,
        }
    }
}

/// Result type for queue file operations.
pub type Result<T> = std::result::Result<T, QueueError>;
