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

use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use tracing::debug;

use super::{QueueStorage, check_range};
use crate::Result;

/// Queue storage on a regular file using positioned reads and writes.
#[derive(Debug)]
pub struct DirectFileStorage {
    file:         File,
    path:         PathBuf,
    length:       u64,
    pre_existing: bool,
}

impl DirectFileStorage {
    /// Opens `path`, creating it with `initial_length` bytes if it does not
    /// exist or is empty.
    pub fn open<P: AsRef<Path>>(path: P, initial_length: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let pre_existing = super::prepare_path(&path)?;
        if !pre_existing {
            super::create_initialized(&path, initial_length)?;
        }

        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let length = file.metadata()?.len();

        debug!(path = ?path, length, pre_existing, "Opened direct file storage");

        Ok(Self {
            file,
            path,
            length,
            pre_existing,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path { &self.path }
}

impl QueueStorage for DirectFileStorage {
    fn is_pre_existing(&self) -> bool { self.pre_existing }

    fn length(&self) -> u64 { self.length }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_range(offset, buf.len(), self.length)?;
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        check_range(offset, buf.len(), self.length)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    fn resize(&mut self, new_length: u64) -> Result<()> {
        self.file.set_len(new_length)?;
        self.file.sync_all()?;
        self.length = new_length;
        Ok(())
    }
}
