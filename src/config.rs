// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Runtime parameters for the transfer engine.
//!
//! Nothing here is persisted; the defaults are the product. The struct
//! exists so tests and embedders can tune chunking and destinations.

use std::path::PathBuf;

/// Default chunk size for streaming payload bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Maximum header line length before the read is treated as a protocol
/// error.
pub const DEFAULT_MAX_HEADER_LEN: usize = 2048;

/// Tunables for transfer sessions.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Payload chunk size in bytes. Must be greater than zero.
    pub chunk_size: usize,

    /// Upper bound on the header line, terminator included.
    pub max_header_len: usize,

    /// Directory where received files are written. Created on demand.
    pub download_dir: PathBuf,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_header_len: DEFAULT_MAX_HEADER_LEN,
            download_dir: dirs::download_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("btdrop"),
        }
    }
}

impl TransferConfig {
    /// Config writing received files into `dir`.
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = TransferConfig::default();
        assert!(config.chunk_size > 0);
        assert!(config.max_header_len > 0);
    }

    #[test]
    fn test_with_download_dir() {
        let config = TransferConfig::default().with_download_dir("/tmp/recv");
        assert_eq!(config.download_dir, PathBuf::from("/tmp/recv"));
    }
}
