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

//! Durable FIFO queue kept in a single file.
//!
//! The file starts with a fixed 36-byte [`QueueFileHeader`] describing the
//! ring of elements that follows it. Every header write carries a CRC-32 so a
//! torn or corrupted header is rejected on open instead of being trusted.

pub mod builder;
pub mod config;
mod crc;
pub mod error;
pub mod header;
pub mod queue_file;
pub mod storage;

pub use builder::QueueFileBuilder;
pub use config::{DEFAULT_INITIAL_SIZE, DEFAULT_MAX_SIZE, QueueFileConfig, StorageKind};
pub use error::{ErrorKind, QueueError, Result};
pub use header::{HEADER_SIZE, QUEUE_VERSION, QueueFileHeader};
pub use queue_file::{BoxedStorage, ELEMENT_HEADER_SIZE, Iter, QueueFile};
pub use storage::{DirectFileStorage, MappedFileStorage, MemoryStorage, QueueStorage};
