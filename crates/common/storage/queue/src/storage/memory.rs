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

use super::{QueueStorage, check_range};
use crate::Result;

/// Storage held entirely in memory.
///
/// Nothing survives the process. Use [`reopen`](Self::reopen) to simulate
/// closing and reopening the same medium.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    data:         Vec<u8>,
    pre_existing: bool,
    flushes:      usize,
}

impl MemoryStorage {
    /// Fresh, zero-filled storage of `length` bytes.
    #[must_use]
    pub fn new(length: u64) -> Self {
        Self {
            data:         vec![0u8; length as usize],
            pre_existing: false,
            flushes:      0,
        }
    }

    /// Pre-existing storage holding `bytes`.
    #[must_use]
    pub const fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            data:         bytes,
            pre_existing: true,
            flushes:      0,
        }
    }

    /// The same bytes, as if the medium had been closed and opened again.
    #[must_use]
    pub fn reopen(self) -> Self { Self::from_bytes(self.data) }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] { &self.data }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] { &mut self.data }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> { self.data }

    /// Number of completed flushes.
    #[must_use]
    pub const fn flush_count(&self) -> usize { self.flushes }
}

impl QueueStorage for MemoryStorage {
    fn is_pre_existing(&self) -> bool { self.pre_existing }

    fn length(&self) -> u64 { self.data.len() as u64 }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let end = check_range(offset, buf.len(), self.length())?;
        buf.copy_from_slice(&self.data[offset as usize..end as usize]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        let end = check_range(offset, buf.len(), self.length())?;
        self.data[offset as usize..end as usize].copy_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }

    fn resize(&mut self, new_length: u64) -> Result<()> {
        self.data.resize(new_length as usize, 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_and_reopened() {
        let storage = MemoryStorage::new(128);
        assert!(!storage.is_pre_existing());
        assert_eq!(storage.length(), 128);

        let storage = storage.reopen();
        assert!(storage.is_pre_existing());
        assert_eq!(storage.length(), 128);
    }

    #[test]
    fn test_read_past_end_fails() {
        let storage = MemoryStorage::new(16);
        let mut buf = [0u8; 8];
        assert!(storage.read_at(9, &mut buf).is_err());
        assert!(storage.read_at(8, &mut buf).is_ok());
    }

    #[test]
    fn test_write_past_end_fails_without_partial_write() {
        let mut storage = MemoryStorage::new(16);
        assert!(storage.write_at(12, b"too long").is_err());
        assert!(storage.as_bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_flush_is_counted() {
        let mut storage = MemoryStorage::new(16);
        storage.flush().unwrap();
        storage.flush().unwrap();
        assert_eq!(storage.flush_count(), 2);
    }

    #[test]
    fn test_resize_keeps_prefix() {
        let mut storage = MemoryStorage::new(8);
        storage.write_at(0, b"abcdefgh").unwrap();
        storage.resize(16).unwrap();
        assert_eq!(&storage.as_bytes()[..8], b"abcdefgh");
        storage.resize(4).unwrap();
        assert_eq!(storage.as_bytes(), b"abcd");
    }
}
