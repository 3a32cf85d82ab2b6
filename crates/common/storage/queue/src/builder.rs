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

use std::path::PathBuf;

use crate::{QueueFile, QueueFileConfig, Result, StorageKind};

/// Fluent construction of a [`QueueFile`].
pub struct QueueFileBuilder {
    config: QueueFileConfig,
}

impl QueueFileBuilder {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config: QueueFileConfig {
                path: path.into(),
                ..Default::default()
            },
        }
    }

    #[must_use]
    pub const fn initial_size(mut self, size: u64) -> Self {
        self.config.initial_size = size;
        self
    }

    #[must_use]
    pub const fn max_size(mut self, size: u64) -> Self {
        self.config.max_size = size;
        self
    }

    #[must_use]
    pub const fn storage_kind(mut self, kind: StorageKind) -> Self {
        self.config.storage_kind = kind;
        self
    }

    #[must_use]
    pub const fn verify_on_open(mut self, verify: bool) -> Self {
        self.config.verify_on_open = verify;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &QueueFileConfig { &self.config }

    /// Validates the configuration and opens the queue file.
    ///
    /// # Errors
    ///
    /// See [`QueueFile::open`].
    pub fn build(self) -> Result<QueueFile> { QueueFile::open(&self.config) }
}
