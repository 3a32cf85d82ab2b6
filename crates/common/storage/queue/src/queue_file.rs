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

//! Persistent ring buffer of variable-length elements.
//!
//! The [`QueueFile`] owns its storage and the [`QueueFileHeader`] at the
//! start of it. Elements live in the region after the header and wrap around
//! from the end of the file back to [`HEADER_SIZE`].
//!
//! ## Element Format
//!
//! ```text
//! ┌─────────────────┬─────────────────┬──────────────────────┐
//! │  Length (4B)    │   CRC32 (4B)    │   Payload (variable) │
//! │  big-endian     │   big-endian    │   raw bytes          │
//! └─────────────────┴─────────────────┴──────────────────────┘
//! ```
//!
//! Any part of an element, its frame included, may be split across the end
//! of the file.
//!
//! ## Usage
//!
//! ```ignore
//! let mut queue = QueueFileBuilder::new("/path/to/queue.dat").build()?;
//!
//! queue.push(b"hello")?;
//! while let Some(payload) = queue.pop()? {
//!     println!("{payload:?}");
//! }
//! ```

use std::fmt;

use bytes::{Buf, BufMut, Bytes};
use snafu::{OptionExt, ensure};
use tracing::{debug, info, warn};

use crate::{
    HEADER_SIZE, QueueFileConfig, Result, StorageKind,
    crc::{calculate_element_crc, verify_element_crc},
    error::{CorruptedElementSnafu, InvalidArgumentSnafu, QueueFullSnafu},
    header::QueueFileHeader,
    storage::{DirectFileStorage, MappedFileStorage, QueueStorage},
};

/// Size of the frame preceding every element payload.
pub const ELEMENT_HEADER_SIZE: u64 = 8;

const ELEMENT_HEADER_LEN: usize = ELEMENT_HEADER_SIZE as usize;

/// Storage selected at runtime from a [`QueueFileConfig`].
pub type BoxedStorage = Box<dyn QueueStorage>;

/// Location and frame of a stored element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Element {
    position: u64,
    length:   u32,
    checksum: u32,
}

impl Element {
    const fn total_size(&self) -> u64 { ELEMENT_HEADER_SIZE + self.length as u64 }

    const fn data_position(&self) -> u64 { self.position + ELEMENT_HEADER_SIZE }
}

/// A persistent FIFO queue stored in a single file.
///
/// Not internally synchronized. Callers sharing a queue between threads must
/// wrap it in a lock so that at most one mutation is in flight.
pub struct QueueFile<S: QueueStorage = BoxedStorage> {
    storage:      S,
    header:       QueueFileHeader,
    /// Cached frame of the oldest element. `None` when empty.
    first:        Option<Element>,
    /// Cached frame of the newest element. `None` when empty.
    last:         Option<Element>,
    initial_size: u64,
    max_size:     u64,
}

impl QueueFile<BoxedStorage> {
    /// Opens or creates the queue file described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the file cannot be
    /// opened, or its header (or any element, with `verify_on_open`) is
    /// corrupt.
    pub fn open(config: &QueueFileConfig) -> Result<Self> {
        config.validate()?;

        let storage: BoxedStorage = match config.storage_kind {
            StorageKind::Direct => {
                Box::new(DirectFileStorage::open(&config.path, config.initial_size)?)
            }
            StorageKind::Mapped => {
                Box::new(MappedFileStorage::open(&config.path, config.initial_size)?)
            }
        };
        let queue = Self::with_storage(storage, config.initial_size, config.max_size)?;

        if config.verify_on_open {
            queue.verify()?;
        }

        info!(
            path = ?config.path,
            storage = %config.storage_kind,
            count = queue.len(),
            file_size = queue.file_size(),
            "Queue file opened"
        );
        Ok(queue)
    }
}

impl<S: QueueStorage> QueueFile<S> {
    /// Builds a queue on top of `storage`.
    ///
    /// `initial_size` is the length the file shrinks back to on
    /// [`clear`](Self::clear); `max_size` bounds its growth.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is invalid or the first and last
    /// element frames cannot be read.
    pub fn with_storage(mut storage: S, initial_size: u64, max_size: u64) -> Result<Self> {
        let header = QueueFileHeader::open(&mut storage)?;

        let mut queue = Self {
            storage,
            header,
            first: None,
            last: None,
            initial_size,
            max_size,
        };

        if queue.header.count() > 0 {
            queue.first = Some(queue.read_element(queue.header.first_position())?);
            queue.last = Some(queue.read_element(queue.header.last_position())?);
        }

        if queue.header.length() > max_size {
            warn!(
                file_size = queue.header.length(),
                max_size, "Queue file is larger than the configured maximum"
            );
        }

        debug!(header = %queue.header, "Queue file ready");
        Ok(queue)
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize { self.header.count() as usize }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.header.count() == 0 }

    /// Current file length, header included.
    #[must_use]
    pub const fn file_size(&self) -> u64 { self.header.length() }

    /// Bytes taken by the header and all elements.
    #[must_use]
    pub fn used_bytes(&self) -> u64 {
        match (self.first, self.last) {
            (Some(first), Some(last)) if last.position >= first.position => {
                last.position - first.position + last.total_size() + HEADER_SIZE
            }
            (Some(first), Some(last)) => {
                last.position + last.total_size() + self.header.length() - first.position
            }
            _ => HEADER_SIZE,
        }
    }

    /// Free bytes before the file has to grow.
    #[must_use]
    pub fn remaining_bytes(&self) -> u64 { self.header.length() - self.used_bytes() }

    #[must_use]
    pub const fn header(&self) -> &QueueFileHeader { &self.header }

    #[must_use]
    pub const fn storage(&self) -> &S { &self.storage }

    /// Releases the underlying storage.
    #[must_use]
    pub fn into_storage(self) -> S { self.storage }

    /// Appends one element.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot grow enough or the write fails.
    pub fn push(&mut self, data: impl AsRef<[u8]>) -> Result<()> { self.push_all([data]) }

    /// Appends several elements with a single header update.
    ///
    /// Either all elements become visible or, on failure, none do.
    ///
    /// # Errors
    ///
    /// Returns an error if an element is too large, the queue cannot grow
    /// enough, or the write fails.
    pub fn push_all<I, B>(&mut self, elements: I) -> Result<()>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let elements: Vec<B> = elements.into_iter().collect();
        if elements.is_empty() {
            return Ok(());
        }

        let mut lengths = Vec::with_capacity(elements.len());
        for data in &elements {
            let len = data.as_ref().len();
            let length = u32::try_from(len).ok().context(InvalidArgumentSnafu {
                reason: format!("element of {len} bytes is too large"),
            })?;
            lengths.push(length);
        }
        let count = u32::try_from(elements.len())
            .ok()
            .and_then(|added| self.header.count().checked_add(added))
            .filter(|count| i32::try_from(*count).is_ok())
            .context(InvalidArgumentSnafu {
                reason: format!("cannot add {} elements", elements.len()),
            })?;

        let required = lengths
            .iter()
            .map(|length| ELEMENT_HEADER_SIZE + u64::from(*length))
            .sum();
        self.ensure_capacity(required)?;

        let mut position = self.last.map_or(HEADER_SIZE, |last| {
            self.wrap_position(last.position + last.total_size())
        });
        let mut first = self.first;
        let mut last = self.last;

        for (data, length) in elements.iter().zip(lengths) {
            let data = data.as_ref();
            let element = Element {
                position,
                length,
                checksum: calculate_element_crc(length, data),
            };

            let mut frame = [0u8; ELEMENT_HEADER_LEN];
            let mut cursor = &mut frame[..];
            cursor.put_u32(element.length);
            cursor.put_u32(element.checksum);

            self.ring_write(element.position, &frame)?;
            self.ring_write(element.data_position(), data)?;

            first.get_or_insert(element);
            last = Some(element);
            position = self.wrap_position(element.position + element.total_size());
        }

        // Element data must be durable before the header points at it.
        self.storage.flush()?;

        if let (Some(first), Some(last)) = (first, last) {
            self.header.set_count(count);
            self.header.set_first_position(first.position);
            self.header.set_last_position(last.position);
            self.header.write(&mut self.storage)?;
        }
        self.first = first;
        self.last = last;

        debug!(added = elements.len(), count, "Pushed elements");
        Ok(())
    }

    /// Reads the oldest element without removing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the element cannot be read or fails its checksum.
    pub fn peek(&self) -> Result<Option<Bytes>> {
        self.first
            .map(|element| self.read_payload(element))
            .transpose()
    }

    /// Removes and returns the oldest element.
    ///
    /// # Errors
    ///
    /// Returns an error if the element cannot be read or the header cannot be
    /// written.
    pub fn pop(&mut self) -> Result<Option<Bytes>> {
        let Some(data) = self.peek()? else {
            return Ok(None);
        };
        self.remove(1)?;
        Ok(Some(data))
    }

    /// Iterates over all elements from oldest to newest without removing
    /// them.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, S> {
        Iter {
            queue:     self,
            position:  self.first.map_or(HEADER_SIZE, |first| first.position),
            remaining: self.len(),
        }
    }

    /// Removes the `n` oldest elements.
    ///
    /// # Errors
    ///
    /// Returns an error if `n` exceeds the number of elements, or if reading
    /// frames or writing the header fails.
    pub fn remove(&mut self, n: usize) -> Result<()> {
        let len = self.len();
        ensure!(
            n <= len,
            InvalidArgumentSnafu {
                reason: format!("cannot remove {n} of {len} elements"),
            }
        );
        if n == 0 {
            return Ok(());
        }
        if n == len {
            return self.clear();
        }
        let Some(mut element) = self.first else {
            return Ok(());
        };

        for _ in 0..n {
            element = self.read_element(self.wrap_position(element.position + element.total_size()))?;
        }

        // n < len, which fits the stored count.
        self.header.set_count(self.header.count() - n as u32);
        self.header.set_first_position(element.position);
        self.header.write(&mut self.storage)?;
        self.first = Some(element);

        debug!(removed = n, count = self.len(), "Removed elements");
        Ok(())
    }

    /// Removes all elements and shrinks the file back to its initial size.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be written or the storage cannot
    /// be resized.
    pub fn clear(&mut self) -> Result<()> {
        self.header.clear();

        let shrink = self.header.length() > self.initial_size;
        if shrink {
            self.header.set_length(self.initial_size);
        }
        // The header must never claim more than the storage holds, so it is
        // written before the storage shrinks.
        self.header.write(&mut self.storage)?;
        if shrink {
            self.storage.resize(self.initial_size)?;
        }

        self.first = None;
        self.last = None;

        info!(file_size = self.file_size(), "Queue file cleared");
        Ok(())
    }

    /// Reads every element and checks its checksum.
    ///
    /// # Errors
    ///
    /// Returns the first read or checksum failure.
    pub fn verify(&self) -> Result<()> {
        for element in self {
            element?;
        }
        Ok(())
    }

    /// Flushes the storage and releases the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn close(mut self) -> Result<()> {
        self.storage.flush()?;
        debug!(header = %self.header, "Queue file closed");
        Ok(())
    }

    /// Maps a position past the end of the file back into the ring.
    const fn wrap_position(&self, position: u64) -> u64 {
        let length = self.header.length();
        if position < length {
            position
        } else {
            HEADER_SIZE + position - length
        }
    }

    fn ring_write(&mut self, position: u64, buf: &[u8]) -> Result<()> {
        let position = self.wrap_position(position);
        let length = self.header.length();
        if position + buf.len() as u64 <= length {
            self.storage.write_at(position, buf)
        } else {
            let (head, tail) = buf.split_at((length - position) as usize);
            self.storage.write_at(position, head)?;
            self.storage.write_at(HEADER_SIZE, tail)
        }
    }

    fn ring_read(&self, position: u64, buf: &mut [u8]) -> Result<()> {
        let position = self.wrap_position(position);
        let length = self.header.length();
        if position + buf.len() as u64 <= length {
            self.storage.read_at(position, buf)
        } else {
            let (head, tail) = buf.split_at_mut((length - position) as usize);
            self.storage.read_at(position, head)?;
            self.storage.read_at(HEADER_SIZE, tail)
        }
    }

    fn read_element(&self, position: u64) -> Result<Element> {
        ensure!(
            position >= HEADER_SIZE && self.header.data_length() >= ELEMENT_HEADER_SIZE,
            CorruptedElementSnafu { position }
        );
        let position = self.wrap_position(position);

        let mut frame = [0u8; ELEMENT_HEADER_LEN];
        self.ring_read(position, &mut frame)?;
        let mut cursor = &frame[..];
        let element = Element {
            position,
            length: cursor.get_u32(),
            checksum: cursor.get_u32(),
        };

        ensure!(
            element.total_size() <= self.header.data_length(),
            CorruptedElementSnafu { position }
        );
        Ok(element)
    }

    fn read_payload(&self, element: Element) -> Result<Bytes> {
        let mut data = vec![0u8; element.length as usize];
        self.ring_read(element.data_position(), &mut data)?;
        ensure!(
            verify_element_crc(element.length, &data, element.checksum),
            CorruptedElementSnafu {
                position: element.position,
            }
        );
        Ok(Bytes::from(data))
    }

    fn ensure_capacity(&mut self, required: u64) -> Result<()> {
        if self.remaining_bytes() >= required {
            return Ok(());
        }

        let needed = self.used_bytes() + required;
        let full = QueueFullSnafu {
            required: needed,
            max_size: self.max_size,
        };
        let mut new_length = self.header.length();
        while new_length < needed {
            new_length = new_length.checked_mul(2).context(full)?;
        }
        ensure!(new_length <= self.max_size, full);

        self.grow(new_length)
    }

    /// Extends the file to `new_length`, moving wrapped data past the old end
    /// so the ring stays contiguous.
    fn grow(&mut self, new_length: u64) -> Result<()> {
        let old_length = self.header.length();
        self.storage.resize(new_length)?;

        if let (Some(first), Some(last)) = (self.first, self.last) {
            let end_of_last = self.wrap_position(last.position + last.total_size());
            if end_of_last <= first.position {
                self.storage
                    .move_within(HEADER_SIZE, old_length, end_of_last - HEADER_SIZE)?;
            }
            if last.position < first.position {
                let moved = Element {
                    position: old_length + last.position - HEADER_SIZE,
                    ..last
                };
                self.header.set_last_position(moved.position);
                self.last = Some(moved);
            }
        }

        self.storage.flush()?;
        self.header.set_length(new_length);
        self.header.write(&mut self.storage)?;

        info!(old_length, new_length, "Queue file expanded");
        Ok(())
    }
}

impl<S: QueueStorage> fmt::Debug for QueueFile<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueFile")
            .field("header", &self.header)
            .field("first", &self.first)
            .field("last", &self.last)
            .field("initial_size", &self.initial_size)
            .field("max_size", &self.max_size)
            .finish_non_exhaustive()
    }
}

/// Iterator over the elements of a [`QueueFile`], oldest first.
///
/// Stops after the first error.
pub struct Iter<'a, S: QueueStorage> {
    queue:     &'a QueueFile<S>,
    position:  u64,
    remaining: usize,
}

impl<S: QueueStorage> Iter<'_, S> {
    fn advance(&mut self) -> Result<Bytes> {
        let element = self.queue.read_element(self.position)?;
        let data = self.queue.read_payload(element)?;
        self.position = self
            .queue
            .wrap_position(element.position + element.total_size());
        Ok(data)
    }
}

impl<S: QueueStorage> Iterator for Iter<'_, S> {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let item = self.advance();
        self.remaining = if item.is_ok() { self.remaining - 1 } else { 0 };
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) { (0, Some(self.remaining)) }
}

impl<'a, S: QueueStorage> IntoIterator for &'a QueueFile<S> {
    type IntoIter = Iter<'a, S>;
    type Item = Result<Bytes>;

    fn into_iter(self) -> Self::IntoIter { self.iter() }
}
