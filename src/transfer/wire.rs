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

//! Wire format for the transfer protocol.
//!
//! A transfer is one ASCII header line
//! `FILE_NAME:<name>|FILE_SIZE:<decimal-bytes>\n` followed immediately
//! by exactly `<decimal-bytes>` raw payload bytes. Lines without the
//! header marker are plain text messages. There is no trailer.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{ProtocolError, TransferError};

/// Marker that distinguishes a file header from a text message.
pub const HEADER_MARKER: &str = "FILE_NAME:";

const SIZE_MARKER: &str = "FILE_SIZE:";

/// The header frame preceding a file's payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHeader {
    pub file_name: String,
    pub file_size: u64,
}

impl TransferHeader {
    /// Build a header, rejecting names that cannot travel in the frame
    /// and sizes the protocol does not support.
    pub fn new(file_name: impl Into<String>, file_size: u64) -> Result<Self, ProtocolError> {
        let file_name = file_name.into();
        validate_file_name(&file_name)?;
        if file_size == 0 {
            return Err(ProtocolError::InvalidFileSize("0".to_string()));
        }
        Ok(Self {
            file_name,
            file_size,
        })
    }

    /// Serialize to the newline-terminated header line.
    pub fn encode(&self) -> String {
        format!(
            "{}{}|{}{}\n",
            HEADER_MARKER, self.file_name, SIZE_MARKER, self.file_size
        )
    }

    /// Parse a header line (terminator already stripped).
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut file_name = None;
        let mut file_size = None;

        for part in line.split('|') {
            if let Some(name) = part.strip_prefix(HEADER_MARKER) {
                file_name = Some(name.to_string());
            } else if let Some(size) = part.strip_prefix(SIZE_MARKER) {
                file_size = Some(size.to_string());
            }
        }

        let file_name =
            file_name.ok_or_else(|| ProtocolError::MalformedHeader(line.to_string()))?;
        let size_field =
            file_size.ok_or_else(|| ProtocolError::MalformedHeader(line.to_string()))?;

        validate_file_name(&file_name)?;
        let file_size: u64 = size_field
            .parse()
            .map_err(|_| ProtocolError::InvalidFileSize(size_field.clone()))?;

        Ok(Self {
            file_name,
            file_size,
        })
    }

    /// Check the size invariant before any payload byte is read.
    ///
    /// Parsing is kept structural so a rejected transfer still knows its
    /// file name for the terminal callback; the `file_size > 0`
    /// requirement is enforced here.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.file_size == 0 {
            return Err(ProtocolError::InvalidFileSize("0".to_string()));
        }
        Ok(())
    }
}

/// A decoded inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// A file transfer follows: exactly `header.file_size` payload bytes.
    File(TransferHeader),
    /// A plain text message.
    Text(String),
}

/// Classify a received line as a file header or a text message.
///
/// A line carrying the header marker that fails to parse is a protocol
/// error, not a text message.
pub fn classify_line(line: &str) -> Result<InboundFrame, ProtocolError> {
    if line.starts_with(HEADER_MARKER) {
        Ok(InboundFrame::File(TransferHeader::parse(line)?))
    } else {
        Ok(InboundFrame::Text(line.to_string()))
    }
}

/// Read one `\n`-terminated line byte by byte, bounded by `max_len`.
///
/// Returns `Ok(None)` on a clean end-of-stream before any byte of a new
/// line. A stream that ends mid-line, or that exceeds `max_len` without
/// a terminator, is a protocol error rather than an indefinite block on
/// a misbehaving peer.
pub async fn read_line_bounded<R>(
    reader: &mut R,
    max_len: usize,
) -> Result<Option<String>, TransferError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();

    loop {
        let byte = match reader.read_u8().await {
            Ok(byte) => byte,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                if buf.is_empty() {
                    return Ok(None);
                }
                return Err(ProtocolError::TruncatedLine.into());
            }
            Err(e) => return Err(e.into()),
        };

        if byte == b'\n' {
            return Ok(Some(String::from_utf8_lossy(&buf).into_owned()));
        }

        buf.push(byte);
        if buf.len() >= max_len {
            return Err(ProtocolError::HeaderTooLong { limit: max_len }.into());
        }
    }
}

fn validate_file_name(name: &str) -> Result<(), ProtocolError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name
            .chars()
            .any(|c| matches!(c, '|' | '\n' | '\r' | '/' | '\\' | '\0'));
    if invalid {
        return Err(ProtocolError::InvalidFileName(name.to_string()));
    }
    Ok(())
}
