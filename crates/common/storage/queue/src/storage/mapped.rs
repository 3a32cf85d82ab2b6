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

//! Memory-mapped queue storage using mmap-io.

use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
};

use mmap_io::MemoryMappedFile;
use tracing::debug;

use super::{QueueStorage, check_range};
use crate::{QueueError, Result};

/// Queue storage on a memory-mapped file.
///
/// Resizing flushes the current mapping, changes the file length and maps
/// the file again.
pub struct MappedFileStorage {
    mmap:         MemoryMappedFile,
    path:         PathBuf,
    length:       u64,
    pre_existing: bool,
}

fn mmap_error(e: &impl std::fmt::Display) -> QueueError {
    QueueError::Mmap {
        message: e.to_string(),
    }
}

impl MappedFileStorage {
    /// Maps `path`, creating it with `initial_length` bytes if it does not
    /// exist or is empty.
    pub fn open<P: AsRef<Path>>(path: P, initial_length: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let pre_existing = super::prepare_path(&path)?;

        if !pre_existing {
            super::create_initialized(&path, initial_length)?;
        }
        let mmap = MemoryMappedFile::open_rw(&path).map_err(|e| mmap_error(&e))?;
        let length = mmap.len();

        debug!(path = ?path, length, pre_existing, "Opened mapped file storage");

        Ok(Self {
            mmap,
            path,
            length,
            pre_existing,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path { &self.path }
}

impl QueueStorage for MappedFileStorage {
    fn is_pre_existing(&self) -> bool { self.pre_existing }

    fn length(&self) -> u64 { self.length }

    #[inline]
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_range(offset, buf.len(), self.length)?;
        self.mmap.read_into(offset, buf).map_err(|e| mmap_error(&e))
    }

    #[inline]
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        check_range(offset, buf.len(), self.length)?;
        self.mmap
            .update_region(offset, buf)
            .map_err(|e| mmap_error(&e))
    }

    fn flush(&mut self) -> Result<()> { self.mmap.flush().map_err(|e| mmap_error(&e)) }

    fn resize(&mut self, new_length: u64) -> Result<()> {
        self.mmap.flush().map_err(|e| mmap_error(&e))?;

        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(new_length)?;
        file.sync_all()?;

        self.mmap = MemoryMappedFile::open_rw(&self.path).map_err(|e| mmap_error(&e))?;
        self.length = new_length;
        Ok(())
    }
}
