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

//! Error taxonomy for transfers.
//!
//! Three families: transport I/O failures (recoverable, reported to the
//! event sink), protocol violations (terminate the current transfer),
//! and cancellation (user-initiated, never reported as a failure with a
//! misleading reason).

use std::io;
use thiserror::Error;

/// Top-level error for connection and transfer operations.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Connect/accept/stream I/O failure.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// Malformed or out-of-contract data from the peer.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The operation was cancelled by `stop()` or an explicit cancel.
    #[error("operation cancelled")]
    Cancelled,
}

impl TransferError {
    /// Whether this error is a user-initiated cancellation rather than
    /// a genuine failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferError::Cancelled)
    }
}

/// Violations of the wire protocol. Always terminate the current
/// transfer; never corrupt other sessions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// No `\n` terminator within the allowed header length.
    #[error("header exceeds {limit} bytes without terminator")]
    HeaderTooLong { limit: usize },

    /// Line carries the header marker but does not parse.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// Declared size is zero or not a decimal number. Empty files are
    /// deliberately unsupported.
    #[error("invalid declared file size: {0}")]
    InvalidFileSize(String),

    /// File name contains a path separator or a reserved character.
    #[error("invalid file name: {0:?}")]
    InvalidFileName(String),

    /// Stream ended in the middle of a line, before the terminator.
    #[error("stream ended before line terminator")]
    TruncatedLine,

    /// Stream ended before the declared byte count was transferred.
    #[error("stream ended after {got} of {expected} bytes")]
    UnexpectedEof { expected: u64, got: u64 },
}
