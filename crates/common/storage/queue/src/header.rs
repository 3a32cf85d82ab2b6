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

//! Queue file header.
//!
//! The header is a fixed 36-byte block at offset 0 of the storage. It anchors
//! the ring buffer that follows it: total file length, element count and the
//! offsets of the first and last element.
//!
//! ## Binary Format
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │ Header (36 bytes, big-endian)                          │
//! ├────────────────────────┬───────────────────────────────┤
//! │ version: i32           │ Format version, currently 1   │
//! │ length: u64            │ Storage length incl. header   │
//! │ count: u32             │ Number of elements            │
//! │ first_position: u64    │ Offset of the oldest element  │
//! │ last_position: u64     │ Offset of the newest element  │
//! │ checksum: u32          │ CRC32 of the five fields      │
//! └────────────────────────┴───────────────────────────────┘
//! ```
//!
//! A position of zero means "absent": it is only valid when the queue is
//! empty, since element data always starts after the header.

use std::fmt;

use bytes::{Buf, BufMut};
use snafu::ensure;
use tracing::{debug, warn};

use crate::{
    Result,
    crc::calculate_header_crc,
    error::{
        ChecksumMismatchSnafu, FirstPositionOutOfBoundsSnafu, HeaderLengthTooSmallSnafu,
        InconsistentPositionsSnafu, LastPositionOutOfBoundsSnafu, NegativeCountSnafu,
        StorageTooSmallSnafu, TruncatedSnafu, UnrecognizedVersionSnafu,
    },
    storage::QueueStorage,
};

/// Size of the header block in bytes.
pub const HEADER_SIZE: u64 = 36;

/// The only supported header version.
pub const QUEUE_VERSION: i32 = 1;

const HEADER_LEN: usize = HEADER_SIZE as usize;

/// In-memory copy of the queue file header.
///
/// The header never owns the storage; every I/O operation borrows it. The
/// owning queue file mutates the fields and then calls
/// [`write`](Self::write) to persist them.
#[derive(Debug, Clone)]
pub struct QueueFileHeader {
    version:        i32,
    /// Cached file length. Setting it does not resize the storage.
    length:         u64,
    count:          u32,
    first_position: u64,
    last_position:  u64,
    /// Buffer the header is serialized into before every write.
    buffer:         [u8; HEADER_LEN],
}

impl QueueFileHeader {
    /// Header that matches `storage`.
    ///
    /// Pre-existing storage has its header read and validated. Otherwise the
    /// header is initialized to the empty state, sized to the current storage
    /// length, and written out immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read or written, or if the
    /// stored header fails validation.
    pub fn open<S: QueueStorage + ?Sized>(storage: &mut S) -> Result<Self> {
        if storage.is_pre_existing() {
            return Self::read(storage);
        }

        let length = storage.length();
        ensure!(length >= HEADER_SIZE, StorageTooSmallSnafu { length });

        let mut header = Self::empty(length);
        header.write(storage)?;
        debug!(length, "Initialized fresh queue file header");
        Ok(header)
    }

    pub(crate) fn empty(length: u64) -> Self {
        Self {
            version: QUEUE_VERSION,
            length,
            count: 0,
            first_position: 0,
            last_position: 0,
            buffer: [0u8; HEADER_LEN],
        }
    }

    fn read<S: QueueStorage + ?Sized>(storage: &S) -> Result<Self> {
        let length = storage.length();
        ensure!(length >= HEADER_SIZE, StorageTooSmallSnafu { length });

        let mut buffer = [0u8; HEADER_LEN];
        storage.read_at(0, &mut buffer)?;

        let header = Self::decode(&buffer, storage.length()).inspect_err(|e| {
            warn!(error = %e, storage_length = storage.length(), "Invalid queue file header");
        })?;

        debug!(%header, "Read queue file header");
        Ok(header)
    }

    /// Decodes and validates a header block against the actual storage
    /// length.
    ///
    /// The checksum is verified before any other field so that a damaged
    /// block is always reported as corruption, whichever bit was hit. The
    /// field checks then run in order on a block that is known to be intact.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    pub fn decode(block: &[u8; HEADER_LEN], storage_length: u64) -> Result<Self> {
        let mut cursor = &block[..];
        let version = cursor.get_i32();
        let length = cursor.get_u64();
        let count = cursor.get_u32();
        let first_position = cursor.get_u64();
        let last_position = cursor.get_u64();
        let stored = cursor.get_u32();

        let computed =
            calculate_header_crc(version, length, count, first_position, last_position);
        ensure!(stored == computed, ChecksumMismatchSnafu { stored, computed });

        ensure!(
            version == QUEUE_VERSION,
            UnrecognizedVersionSnafu { version }
        );
        ensure!(
            length <= storage_length,
            TruncatedSnafu {
                expected: length,
                actual:   storage_length,
            }
        );
        ensure!(length >= HEADER_SIZE, HeaderLengthTooSmallSnafu { length });
        ensure!(
            first_position <= length,
            FirstPositionOutOfBoundsSnafu {
                position: first_position,
                length,
            }
        );
        ensure!(
            last_position <= length,
            LastPositionOutOfBoundsSnafu {
                position: last_position,
                length,
            }
        );
        // Older writers stored the count as a signed integer.
        ensure!(
            i32::try_from(count).is_ok(),
            NegativeCountSnafu {
                count: i64::from(count as i32),
            }
        );
        let consistent = if count == 0 {
            first_position == 0 && last_position == 0
        } else {
            first_position != 0 && last_position != 0
        };
        ensure!(
            consistent,
            InconsistentPositionsSnafu {
                count,
                first: first_position,
                last: last_position,
            }
        );

        Ok(Self {
            version,
            length,
            count,
            first_position,
            last_position,
            buffer: *block,
        })
    }

    /// Encodes the current fields, checksum last.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut block = [0u8; HEADER_LEN];
        let mut cursor = &mut block[..];
        cursor.put_i32(self.version);
        cursor.put_u64(self.length);
        cursor.put_u32(self.count);
        cursor.put_u64(self.first_position);
        cursor.put_u64(self.last_position);
        cursor.put_u32(self.checksum());
        block
    }

    /// Writes the header to storage in a single write and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write or the flush fails.
    pub fn write<S: QueueStorage + ?Sized>(&mut self, storage: &mut S) -> Result<()> {
        self.buffer = self.encode();
        storage.write_at(0, &self.buffer)?;
        storage.flush()
    }

    /// Resets the count and positions. Leaves the length alone and performs
    /// no I/O.
    pub const fn clear(&mut self) {
        self.count = 0;
        self.first_position = 0;
        self.last_position = 0;
    }

    /// Checksum of the current fields. Always recomputed.
    #[must_use]
    pub fn checksum(&self) -> u32 {
        calculate_header_crc(
            self.version,
            self.length,
            self.count,
            self.first_position,
            self.last_position,
        )
    }

    #[must_use]
    pub const fn version(&self) -> i32 { self.version }

    /// Total storage length, header included.
    #[must_use]
    pub const fn length(&self) -> u64 { self.length }

    pub const fn set_length(&mut self, length: u64) { self.length = length; }

    /// Usable payload capacity, excluding the header block.
    #[must_use]
    pub const fn data_length(&self) -> u64 { self.length.saturating_sub(HEADER_SIZE) }

    /// Number of elements.
    #[must_use]
    pub const fn count(&self) -> u32 { self.count }

    pub const fn set_count(&mut self, count: u32) { self.count = count; }

    #[must_use]
    pub const fn first_position(&self) -> u64 { self.first_position }

    pub const fn set_first_position(&mut self, position: u64) { self.first_position = position; }

    #[must_use]
    pub const fn last_position(&self) -> u64 { self.last_position }

    pub const fn set_last_position(&mut self, position: u64) { self.last_position = position; }
}

impl PartialEq for QueueFileHeader {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.length == other.length
            && self.count == other.count
            && self.first_position == other.first_position
            && self.last_position == other.last_position
    }
}

impl Eq for QueueFileHeader {}

impl fmt::Display for QueueFileHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "QueueFileHeader[length={}, size={}, first={}, last={}]",
            self.length, self.count, self.first_position, self.last_position
        )
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::{ErrorKind, QueueError, storage::MemoryStorage};

    fn header(length: u64, count: u32, first: u64, last: u64) -> QueueFileHeader {
        QueueFileHeader {
            version: QUEUE_VERSION,
            length,
            count,
            first_position: first,
            last_position: last,
            buffer: [0u8; HEADER_LEN],
        }
    }

    /// Storage holding `header` as written, reopened as pre-existing.
    fn written(mut header: QueueFileHeader, storage_length: u64) -> MemoryStorage {
        let mut storage = MemoryStorage::new(storage_length);
        header.write(&mut storage).unwrap();
        storage.reopen()
    }

    /// Memory storage that records the calls made on it.
    struct RecordingStorage {
        inner:      MemoryStorage,
        calls:      Vec<&'static str>,
        fail_flush: bool,
    }

    impl QueueStorage for RecordingStorage {
        fn is_pre_existing(&self) -> bool { self.inner.is_pre_existing() }

        fn length(&self) -> u64 { self.inner.length() }

        fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
            self.inner.read_at(offset, buf)
        }

        fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
            self.calls.push("write");
            self.inner.write_at(offset, buf)
        }

        fn flush(&mut self) -> Result<()> {
            self.calls.push("flush");
            if self.fail_flush {
                return Err(std::io::Error::other("flush failed").into());
            }
            self.inner.flush()
        }

        fn resize(&mut self, new_length: u64) -> Result<()> { self.inner.resize(new_length) }
    }

    #[test]
    fn test_fresh_storage_initializes_empty_header() {
        let mut storage = MemoryStorage::new(4096);
        let header = QueueFileHeader::open(&mut storage).unwrap();

        assert_eq!(header.version(), QUEUE_VERSION);
        assert_eq!(header.length(), 4096);
        assert_eq!(header.count(), 0);
        assert_eq!(header.first_position(), 0);
        assert_eq!(header.last_position(), 0);
        assert_eq!(header.data_length(), 4060);
    }

    #[test]
    fn test_fresh_header_is_persisted_and_reread() {
        let mut storage = MemoryStorage::new(4096);
        let fresh = QueueFileHeader::open(&mut storage).unwrap();

        let mut storage = storage.reopen();
        let reread = QueueFileHeader::open(&mut storage).unwrap();
        assert_eq!(fresh, reread);
    }

    #[test]
    fn test_fresh_storage_too_small() {
        let mut storage = MemoryStorage::new(HEADER_SIZE - 1);
        let err = QueueFileHeader::open(&mut storage).unwrap_err();
        assert!(matches!(err, QueueError::StorageTooSmall { length: 35 }));
        assert_eq!(err.kind(), ErrorKind::Structural);
    }

    #[test]
    fn test_existing_storage_too_small() {
        let mut storage = MemoryStorage::from_bytes(vec![0u8; 10]);
        let err = QueueFileHeader::open(&mut storage).unwrap_err();
        assert!(matches!(err, QueueError::StorageTooSmall { length: 10 }));
    }

    #[test]
    fn test_fresh_storage_of_exactly_header_size() {
        let mut storage = MemoryStorage::new(HEADER_SIZE);
        let header = QueueFileHeader::open(&mut storage).unwrap();
        assert_eq!(header.data_length(), 0);
    }

    #[test]
    fn test_roundtrip_non_empty() {
        let mut storage = written(header(4096, 3, 40, 4000), 4096);
        let read = QueueFileHeader::open(&mut storage).unwrap();

        assert_eq!(read.length(), 4096);
        assert_eq!(read.count(), 3);
        assert_eq!(read.first_position(), 40);
        assert_eq!(read.last_position(), 4000);
        assert_eq!(read, header(4096, 3, 40, 4000));
    }

    #[test]
    fn test_write_is_single_write_then_flush() {
        let mut storage = RecordingStorage {
            inner:      MemoryStorage::new(4096),
            calls:      Vec::new(),
            fail_flush: false,
        };
        let mut header = QueueFileHeader::open(&mut storage).unwrap();
        assert_eq!(storage.calls, ["write", "flush"]);

        header.set_count(1);
        header.set_first_position(HEADER_SIZE);
        header.set_last_position(HEADER_SIZE);
        header.write(&mut storage).unwrap();
        assert_eq!(storage.calls, ["write", "flush", "write", "flush"]);
    }

    #[test]
    fn test_flush_failure_propagates() {
        let mut storage = RecordingStorage {
            inner:      MemoryStorage::new(4096),
            calls:      Vec::new(),
            fail_flush: true,
        };
        let err = QueueFileHeader::open(&mut storage).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_corrupted_count_byte_is_checksum_mismatch() {
        let mut storage = written(header(4096, 3, 40, 4000), 4096);
        storage.as_bytes_mut()[15] = 0x07;

        let err = QueueFileHeader::open(&mut storage).unwrap_err();
        assert!(matches!(err, QueueError::ChecksumMismatch { .. }));
        assert_eq!(err.kind(), ErrorKind::Corruption);
    }

    #[test]
    fn test_every_single_bit_flip_is_detected() {
        let block = header(4096, 3, 40, 4000).encode();
        for byte in 0..HEADER_LEN {
            for bit in 0..8 {
                let mut damaged = block;
                damaged[byte] ^= 1 << bit;
                let err = QueueFileHeader::decode(&damaged, 4096).unwrap_err();
                assert!(
                    matches!(err, QueueError::ChecksumMismatch { .. }),
                    "bit {bit} of byte {byte} gave {err}"
                );
            }
        }
    }

    #[test]
    fn test_truncated_storage() {
        let mut bytes = written(header(4096, 3, 40, 4000), 4096).into_bytes();
        bytes.truncate(2048);
        let mut storage = MemoryStorage::from_bytes(bytes);

        let err = QueueFileHeader::open(&mut storage).unwrap_err();
        assert!(matches!(
            err,
            QueueError::Truncated {
                expected: 4096,
                actual:   2048,
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Truncation);
    }

    #[test]
    fn test_storage_larger_than_header_length_is_accepted() {
        let mut storage = written(header(4096, 0, 0, 0), 8192);
        let read = QueueFileHeader::open(&mut storage).unwrap();
        assert_eq!(read.length(), 4096);
    }

    #[test_case(header(4096, 0, 40, 0), ErrorKind::Consistency ; "empty with first position")]
    #[test_case(header(4096, 0, 0, 40), ErrorKind::Consistency ; "empty with last position")]
    #[test_case(header(4096, 3, 0, 4000), ErrorKind::Consistency ; "non-empty without first")]
    #[test_case(header(4096, 3, 40, 0), ErrorKind::Consistency ; "non-empty without last")]
    #[test_case(header(4096, 0x8000_0000, 40, 40), ErrorKind::Consistency ; "negative count")]
    #[test_case(header(4096, 1, 4097, 40), ErrorKind::Bounds ; "first past end")]
    #[test_case(header(4096, 1, 40, 5000), ErrorKind::Bounds ; "last past end")]
    #[test_case(header(20, 0, 0, 0), ErrorKind::Structural ; "length below header size")]
    #[test_case(header(8192, 0, 0, 0), ErrorKind::Truncation ; "length past storage")]
    fn test_invalid_header_rejected(invalid: QueueFileHeader, kind: ErrorKind) {
        let block = invalid.encode();
        let err = QueueFileHeader::decode(&block, 4096).unwrap_err();
        assert_eq!(err.kind(), kind, "unexpected error: {err}");
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut future = header(4096, 0, 0, 0);
        future.version = 2;
        let err = QueueFileHeader::decode(&future.encode(), 4096).unwrap_err();
        assert!(matches!(err, QueueError::UnrecognizedVersion { version: 2 }));
        assert_eq!(err.kind(), ErrorKind::FormatMismatch);
    }

    #[test]
    fn test_positions_at_length_are_in_bounds() {
        let block = header(4096, 1, 4096, 4096).encode();
        assert!(QueueFileHeader::decode(&block, 4096).is_ok());
    }

    #[test]
    fn test_clear_keeps_length_and_skips_io() {
        let mut storage = RecordingStorage {
            inner:      MemoryStorage::new(4096),
            calls:      Vec::new(),
            fail_flush: false,
        };
        let mut header = QueueFileHeader::open(&mut storage).unwrap();
        header.set_count(2);
        header.set_first_position(100);
        header.set_last_position(200);

        header.clear();
        assert_eq!(header.count(), 0);
        assert_eq!(header.first_position(), 0);
        assert_eq!(header.last_position(), 0);
        assert_eq!(header.length(), 4096);
        assert_eq!(storage.calls, ["write", "flush"]);
    }

    #[test]
    fn test_checksum_tracks_mutations() {
        let mut header = header(4096, 0, 0, 0);
        let before = header.checksum();
        header.set_count(1);
        header.set_first_position(HEADER_SIZE);
        header.set_last_position(HEADER_SIZE);
        assert_ne!(before, header.checksum());
    }

    #[test]
    fn test_equality_ignores_buffer() {
        let mut a = header(4096, 3, 40, 4000);
        let b = header(4096, 3, 40, 4000);
        a.buffer = a.encode();
        assert_eq!(a, b);
        assert_ne!(a, header(4096, 2, 40, 4000));
    }

    #[test]
    fn test_display() {
        let header = header(4096, 3, 40, 4000);
        assert_eq!(
            header.to_string(),
            "QueueFileHeader[length=4096, size=3, first=40, last=4000]"
        );
    }

    #[test]
    fn test_encode_layout_is_big_endian() {
        let block = header(4096, 3, 40, 4000).encode();
        assert_eq!(&block[0..4], &[0, 0, 0, 1]);
        assert_eq!(&block[4..12], &4096u64.to_be_bytes());
        assert_eq!(&block[12..16], &3u32.to_be_bytes());
        assert_eq!(&block[16..24], &40u64.to_be_bytes());
        assert_eq!(&block[24..32], &4000u64.to_be_bytes());
        assert_eq!(
            &block[32..36],
            &calculate_header_crc(1, 4096, 3, 40, 4000).to_be_bytes()
        );
    }
}
