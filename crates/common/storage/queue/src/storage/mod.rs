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

//! Byte-addressable storage media backing a queue file.
//!
//! - [`MemoryStorage`]: in-memory buffer, mainly for tests
//! - [`DirectFileStorage`]: plain file with positioned reads and writes
//! - [`MappedFileStorage`]: memory-mapped file via mmap-io

mod direct;
mod mapped;
mod memory;

pub use direct::DirectFileStorage;
pub use mapped::MappedFileStorage;
pub use memory::MemoryStorage;
use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use snafu::{OptionExt, ensure};
use tracing::debug;

use crate::{
    HEADER_SIZE, Result,
    error::{InvalidPathSnafu, OutOfRangeSnafu, StorageTooSmallSnafu},
    header::QueueFileHeader,
};

/// Chunk size used when moving data within a storage.
const MOVE_CHUNK_SIZE: u64 = 8 * 1024;

/// Random-access medium a queue file is stored on.
///
/// Implementations are synchronous and perform no locking; the owning queue
/// file serializes all access.
pub trait QueueStorage {
    /// Whether the medium already held data before it was opened.
    fn is_pre_existing(&self) -> bool;

    /// Current total byte length of the medium.
    fn length(&self) -> u64;

    /// Fills `buf` from `offset`. Fails if fewer bytes are available.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Writes all of `buf` at `offset`. Fails if it does not fit.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()>;

    /// Durability barrier for all previous writes.
    fn flush(&mut self) -> Result<()>;

    /// Grows or shrinks the medium to `new_length` bytes.
    fn resize(&mut self, new_length: u64) -> Result<()>;

    /// Copies `count` bytes from `source` to `destination`.
    ///
    /// The two ranges must not overlap.
    fn move_within(&mut self, source: u64, destination: u64, count: u64) -> Result<()> {
        let mut buf = vec![0u8; count.min(MOVE_CHUNK_SIZE) as usize];
        let mut moved = 0u64;
        while moved < count {
            let n = (count - moved).min(buf.len() as u64) as usize;
            self.read_at(source + moved, &mut buf[..n])?;
            self.write_at(destination + moved, &buf[..n])?;
            moved += n as u64;
        }
        Ok(())
    }
}

impl<S: QueueStorage + ?Sized> QueueStorage for Box<S> {
    fn is_pre_existing(&self) -> bool { (**self).is_pre_existing() }

    fn length(&self) -> u64 { (**self).length() }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        (**self).write_at(offset, buf)
    }

    fn flush(&mut self) -> Result<()> { (**self).flush() }

    fn resize(&mut self, new_length: u64) -> Result<()> { (**self).resize(new_length) }

    fn move_within(&mut self, source: u64, destination: u64, count: u64) -> Result<()> {
        (**self).move_within(source, destination, count)
    }
}

/// Checks that `len` bytes at `offset` fit in `length` and returns the end
/// offset.
pub(crate) fn check_range(offset: u64, len: usize, length: u64) -> Result<u64> {
    let len = len as u64;
    offset
        .checked_add(len)
        .filter(|end| *end <= length)
        .context(OutOfRangeSnafu {
            offset,
            len,
            length,
        })
}

/// Creates the parent directory of `path` and reports whether the file
/// already holds data.
pub(crate) fn prepare_path(path: &Path) -> Result<bool> {
    ensure!(
        path.file_name().is_some() && !path.is_dir(),
        InvalidPathSnafu { path }
    );
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::metadata(path) {
        Ok(metadata) => Ok(metadata.len() > 0),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Name a new queue file is built under before it is renamed into place.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Makes a rename within the parent directory durable.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<()> { Ok(()) }

/// Creates the queue file at `path` with `length` bytes and an empty header.
///
/// The file is sized and its header flushed under a staging name, then
/// renamed onto `path`. A crash at any point leaves either no file at `path`
/// or a complete, valid one.
pub(crate) fn create_initialized(path: &Path, length: u64) -> Result<()> {
    ensure!(length >= HEADER_SIZE, StorageTooSmallSnafu { length });

    let staging = staging_path(path);
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&staging)?;
    file.set_len(length)?;
    file.write_all(&QueueFileHeader::empty(length).encode())?;
    file.sync_all()?;
    drop(file);

    fs::rename(&staging, path)?;
    sync_parent_dir(path)?;

    debug!(path = ?path, length, "Created queue file");
    Ok(())
}
