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

use snafu::ensure;

use crate::{HEADER_SIZE, Result, error::InvalidConfigSnafu};

/// Default size of a newly created queue file.
pub const DEFAULT_INITIAL_SIZE: u64 = 4096;

/// Default upper bound a queue file may grow to.
pub const DEFAULT_MAX_SIZE: u64 = 32 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct QueueFileConfig {
    pub path:           PathBuf,
    pub initial_size:   u64,
    pub max_size:       u64,
    pub storage_kind:   StorageKind,
    pub verify_on_open: bool,
}

impl Default for QueueFileConfig {
    fn default() -> Self {
        Self {
            path:           PathBuf::from("./queue.dat"),
            initial_size:   DEFAULT_INITIAL_SIZE,
            max_size:       DEFAULT_MAX_SIZE,
            storage_kind:   StorageKind::default(),
            verify_on_open: false,
        }
    }
}

impl QueueFileConfig {
    /// Checks that both sizes are powers of two that can hold a header, and
    /// that the initial size does not exceed the maximum.
    pub fn validate(&self) -> Result<()> {
        for (name, size) in [
            ("initial_size", self.initial_size),
            ("max_size", self.max_size),
        ] {
            ensure!(
                size.is_power_of_two(),
                InvalidConfigSnafu {
                    reason: format!("{name} {size} is not a power of two"),
                }
            );
            ensure!(
                size >= HEADER_SIZE,
                InvalidConfigSnafu {
                    reason: format!("{name} {size} is smaller than the header"),
                }
            );
        }
        ensure!(
            self.initial_size <= self.max_size,
            InvalidConfigSnafu {
                reason: format!(
                    "initial_size {} exceeds max_size {}",
                    self.initial_size, self.max_size
                ),
            }
        );
        Ok(())
    }
}

/// Medium the queue file is kept on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, derive_more::Display)]
pub enum StorageKind {
    /// Regular file with positioned reads and writes.
    #[default]
    Direct,
    /// Memory-mapped file.
    Mapped,
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = QueueFileConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage_kind, StorageKind::Direct);
    }

    #[test_case(4096, 8192 ; "distinct sizes")]
    #[test_case(64, 64 ; "equal sizes")]
    fn test_valid_sizes(initial_size: u64, max_size: u64) {
        let config = QueueFileConfig {
            initial_size,
            max_size,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test_case(4000, 8192 ; "initial not power of two")]
    #[test_case(4096, 10_000 ; "max not power of two")]
    #[test_case(32, 4096 ; "initial below header")]
    #[test_case(8192, 4096 ; "initial above max")]
    fn test_invalid_sizes(initial_size: u64, max_size: u64) {
        let config = QueueFileConfig {
            initial_size,
            max_size,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(crate::QueueError::InvalidConfig { .. })
        ));
    }
}
