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

//! Transfer session over an established stream.
//!
//! A session exclusively owns its stream and is either the sender for
//! one file or the receiver of whatever arrives next, never both
//! (half-duplex at the application layer). A file transfer, success or
//! failure, is terminal for the session; text lines are not. Dropping
//! the session closes the stream.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TransferConfig;
use crate::error::{ProtocolError, TransferError};
use crate::events::{EventSender, ServiceEvent};
use crate::transfer::wire::{self, InboundFrame, TransferHeader};
use crate::transport::StreamSocket;

/// Which side of the stream handshake this session is.
///
/// The initiator is the sender in the canonical protocol; the listener
/// reads whatever arrives next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    Initiator,
    Listener,
}

/// Work orders for a sender-role session.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    SendFile(PathBuf),
    SendText(String),
}

/// One established connection running the transfer protocol.
pub(crate) struct TransferSession<S: StreamSocket> {
    stream: S,
    peer_label: String,
    events: EventSender,
    config: TransferConfig,
    cancel: CancellationToken,
}

impl<S: StreamSocket> TransferSession<S> {
    pub(crate) fn new(
        stream: S,
        peer_label: String,
        events: EventSender,
        config: TransferConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            stream,
            peer_label,
            events,
            config,
            cancel,
        }
    }

    /// Sender side: execute commands until a file transfer terminates
    /// the session, the command channel closes, or cancellation fires.
    pub(crate) async fn run_sender(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        debug!(peer = %self.peer_label, "sender session started");
        let cancel = self.cancel.clone();

        loop {
            let command = tokio::select! {
                _ = cancel.cancelled() => break,
                cmd = commands.recv() => cmd,
            };

            match command {
                None => break,
                Some(SessionCommand::SendText(text)) => {
                    if let Err(e) = self.send_text(&text).await {
                        if !e.is_cancelled() {
                            self.events.message(format!("Failed to send message: {}", e));
                        }
                        break;
                    }
                }
                Some(SessionCommand::SendFile(path)) => {
                    self.send_file(&path).await;
                    break;
                }
            }
        }

        debug!(peer = %self.peer_label, "sender session ended");
    }

    /// Receiver side: read lines until a file transfer terminates the
    /// session, the peer goes away, or cancellation fires. Text lines
    /// are forwarded and reading continues.
    pub(crate) async fn run_receiver(mut self) {
        debug!(peer = %self.peer_label, "receiver session started");
        let cancel = self.cancel.clone();

        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                r = wire::read_line_bounded(&mut self.stream, self.config.max_header_len) => r,
            };

            match line {
                Ok(None) => {
                    self.events.message("Connection closed by peer.");
                    break;
                }
                Ok(Some(line)) => match wire::classify_line(&line) {
                    Ok(InboundFrame::Text(text)) => {
                        self.events.emit(ServiceEvent::Message(text));
                    }
                    Ok(InboundFrame::File(header)) => {
                        self.receive_file(header).await;
                        break;
                    }
                    Err(e) => {
                        warn!(peer = %self.peer_label, error = %e, "protocol violation");
                        self.events.message(format!("Protocol error from peer: {}", e));
                        break;
                    }
                },
                Err(TransferError::Cancelled) => break,
                Err(e) => {
                    self.events.message(format!("Connection error while reading: {}", e));
                    break;
                }
            }
        }

        debug!(peer = %self.peer_label, "receiver session ended");
    }

    /// Send one file: header line, then exactly `file_size` raw bytes.
    async fn send_file(&mut self, path: &Path) {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.events.emit(ServiceEvent::FileTransferStarted {
            file_name: file_name.clone(),
        });

        match self.stream_file_out(path, &file_name).await {
            Ok(total) => {
                info!(peer = %self.peer_label, file = %file_name, bytes = total, "file sent");
                self.events.emit(ServiceEvent::FileTransferComplete {
                    file_name: file_name.clone(),
                    success: true,
                });
                self.events.message(format!(
                    "File '{}' sent successfully ({} bytes).",
                    file_name, total
                ));
            }
            Err(e) => self.report_transfer_failure(&file_name, "send", e),
        }
    }

    async fn stream_file_out(
        &mut self,
        path: &Path,
        file_name: &str,
    ) -> Result<u64, TransferError> {
        let mut file = fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let header = TransferHeader::new(file_name, size)?;

        self.write_cancellable(header.encode().as_bytes()).await?;

        let mut buf = vec![0u8; self.config.chunk_size];
        let mut sent: u64 = 0;
        let mut last_percent = None;

        loop {
            if self.cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            self.write_cancellable(&buf[..n]).await?;
            sent += n as u64;
            self.report_progress(file_name, sent, size, &mut last_percent);
        }
        self.flush_cancellable().await?;

        Ok(sent)
    }

    /// Receive one file announced by `header`, writing payload chunks
    /// to the download directory as they arrive.
    async fn receive_file(&mut self, header: TransferHeader) {
        if let Err(e) = header.validate() {
            // Rejected before any payload byte is read.
            self.events.message(format!(
                "Rejected incoming file '{}': {}",
                header.file_name, e
            ));
            self.events.emit(ServiceEvent::FileTransferComplete {
                file_name: header.file_name.clone(),
                success: false,
            });
            return;
        }

        self.events.emit(ServiceEvent::FileTransferStarted {
            file_name: header.file_name.clone(),
        });

        match self.stream_file_in(&header).await {
            Ok(dest) => {
                info!(
                    peer = %self.peer_label,
                    file = %header.file_name,
                    bytes = header.file_size,
                    "file received"
                );
                self.events.emit(ServiceEvent::FileTransferComplete {
                    file_name: header.file_name.clone(),
                    success: true,
                });
                self.events.message(format!(
                    "File '{}' received at {} ({} bytes).",
                    header.file_name,
                    dest.display(),
                    header.file_size
                ));
            }
            Err(e) => self.report_transfer_failure(&header.file_name, "receive", e),
        }
    }

    async fn stream_file_in(&mut self, header: &TransferHeader) -> Result<PathBuf, TransferError> {
        fs::create_dir_all(&self.config.download_dir).await?;
        // The name was validated at parse time: no path separators.
        let dest = self.config.download_dir.join(&header.file_name);
        let mut file = fs::File::create(&dest).await?;

        let mut buf = vec![0u8; self.config.chunk_size];
        let mut received: u64 = 0;
        let mut last_percent = None;

        while received < header.file_size {
            let want = (header.file_size - received).min(buf.len() as u64) as usize;
            let n = self.read_cancellable(&mut buf[..want]).await?;
            if n == 0 {
                return Err(ProtocolError::UnexpectedEof {
                    expected: header.file_size,
                    got: received,
                }
                .into());
            }
            file.write_all(&buf[..n]).await?;
            received += n as u64;
            self.report_progress(&header.file_name, received, header.file_size, &mut last_percent);
        }
        file.flush().await?;

        Ok(dest)
    }

    /// Transmit a short text line. A text line must never masquerade as
    /// a header, and must not contain the line terminator.
    async fn send_text(&mut self, text: &str) -> Result<(), TransferError> {
        let mut line = text.replace(['\r', '\n'], " ");
        if line.starts_with(wire::HEADER_MARKER) {
            line.insert(0, ' ');
        }
        line.push('\n');
        self.write_cancellable(line.as_bytes()).await?;
        self.flush_cancellable().await
    }

    fn report_progress(&self, file_name: &str, transferred: u64, total: u64, last: &mut Option<u8>) {
        let percent = (transferred.min(total) * 100 / total) as u8;
        if *last != Some(percent) {
            self.events.emit(ServiceEvent::FileTransferProgress {
                file_name: file_name.to_string(),
                percent,
            });
            *last = Some(percent);
        }
    }

    /// Exactly one terminal callback per transfer; cancellation is
    /// reported as user-initiated, not as a misleading I/O failure.
    fn report_transfer_failure(&self, file_name: &str, direction: &str, error: TransferError) {
        self.events.emit(ServiceEvent::FileTransferComplete {
            file_name: file_name.to_string(),
            success: false,
        });
        if error.is_cancelled() {
            self.events
                .message(format!("Transfer of '{}' cancelled.", file_name));
        } else {
            warn!(peer = %self.peer_label, file = %file_name, error = %error, "transfer failed");
            self.events
                .message(format!("Failed to {} '{}': {}", direction, file_name, error));
        }
    }

    async fn read_cancellable(&mut self, buf: &mut [u8]) -> Result<usize, TransferError> {
        let cancel = self.cancel.clone();
        tokio::select! {
            _ = cancel.cancelled() => Err(TransferError::Cancelled),
            r = self.stream.read(buf) => Ok(r?),
        }
    }

    async fn write_cancellable(&mut self, buf: &[u8]) -> Result<(), TransferError> {
        let cancel = self.cancel.clone();
        tokio::select! {
            _ = cancel.cancelled() => Err(TransferError::Cancelled),
            r = self.stream.write_all(buf) => Ok(r?),
        }
    }

    async fn flush_cancellable(&mut self) -> Result<(), TransferError> {
        let cancel = self.cancel.clone();
        tokio::select! {
            _ = cancel.cancelled() => Err(TransferError::Cancelled),
            r = self.stream.flush() => Ok(r?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventSender;

    fn test_config(dir: &Path) -> TransferConfig {
        TransferConfig {
            chunk_size: 4096,
            max_header_len: 2048,
            download_dir: dir.to_path_buf(),
        }
    }

    fn session<S: StreamSocket>(
        stream: S,
        config: TransferConfig,
    ) -> (
        TransferSession<S>,
        tokio::sync::mpsc::UnboundedReceiver<ServiceEvent>,
    ) {
        let (events, rx) = EventSender::channel();
        let session = TransferSession::new(
            stream,
            "peer".to_string(),
            events,
            config,
            CancellationToken::new(),
        );
        (session, rx)
    }

    fn drain(
        rx: &mut tokio::sync::mpsc::UnboundedReceiver<ServiceEvent>,
    ) -> Vec<ServiceEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_receive_reports_chunked_progress_and_success() {
        let dir = tempfile::tempdir().unwrap();
        let (local, mut remote) = tokio::io::duplex(64 * 1024);
        let (session, mut rx) = session(local, test_config(dir.path()));

        let payload = vec![0xA5u8; 10_000];
        let sender = tokio::spawn(async move {
            remote
                .write_all(b"FILE_NAME:report.txt|FILE_SIZE:10000\n")
                .await
                .unwrap();
            remote.write_all(&payload).await.unwrap();
            remote
        });

        session.run_receiver().await;
        let _remote = sender.await.unwrap();

        let events = drain(&mut rx);
        let progress: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                ServiceEvent::FileTransferProgress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![40, 81, 100]);
        assert!(events.contains(&ServiceEvent::FileTransferComplete {
            file_name: "report.txt".to_string(),
            success: true,
        }));

        let written = std::fs::read(dir.path().join("report.txt")).unwrap();
        assert_eq!(written.len(), 10_000);
        assert!(written.iter().all(|&b| b == 0xA5));
    }

    #[tokio::test]
    async fn test_receive_exact_bytes_with_odd_sender_chunking() {
        let dir = tempfile::tempdir().unwrap();
        let (local, mut remote) = tokio::io::duplex(64 * 1024);
        let (session, mut rx) = session(local, test_config(dir.path()));

        let payload: Vec<u8> = (0..9_999u32).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();
        let writer = tokio::spawn(async move {
            remote
                .write_all(b"FILE_NAME:odd.bin|FILE_SIZE:9999\n")
                .await
                .unwrap();
            // Irregular write sizes; the receiver's chunking must not care.
            let mut offset = 0;
            let mut step = 1;
            while offset < payload.len() {
                let end = (offset + step).min(payload.len());
                remote.write_all(&payload[offset..end]).await.unwrap();
                offset = end;
                step = step % 1709 + 37;
            }
            drop(remote);
        });

        session.run_receiver().await;
        writer.await.unwrap();

        let events = drain(&mut rx);
        assert!(events.contains(&ServiceEvent::FileTransferComplete {
            file_name: "odd.bin".to_string(),
            success: true,
        }));
        let written = std::fs::read(dir.path().join("odd.bin")).unwrap();
        assert_eq!(written, expected);
    }

    #[tokio::test]
    async fn test_zero_size_header_rejected_before_payload() {
        let dir = tempfile::tempdir().unwrap();
        let (local, mut remote) = tokio::io::duplex(1024);
        let (session, mut rx) = session(local, test_config(dir.path()));

        let writer = tokio::spawn(async move {
            remote.write_all(b"FILE_NAME:x|FILE_SIZE:0\n").await.unwrap();
            drop(remote);
        });

        session.run_receiver().await;
        writer.await.unwrap();

        let events = drain(&mut rx);
        assert!(events.contains(&ServiceEvent::FileTransferComplete {
            file_name: "x".to_string(),
            success: false,
        }));
        assert!(!events
            .iter()
            .any(|e| matches!(e, ServiceEvent::FileTransferStarted { .. })));
        assert!(!dir.path().join("x").exists());
    }

    #[tokio::test]
    async fn test_premature_eof_fails_transfer_and_keeps_partial_closed() {
        let dir = tempfile::tempdir().unwrap();
        let (local, mut remote) = tokio::io::duplex(64 * 1024);
        let (session, mut rx) = session(local, test_config(dir.path()));

        let writer = tokio::spawn(async move {
            remote
                .write_all(b"FILE_NAME:big.bin|FILE_SIZE:10000\n")
                .await
                .unwrap();
            remote.write_all(&vec![1u8; 3000]).await.unwrap();
            drop(remote);
        });

        session.run_receiver().await;
        writer.await.unwrap();

        let events = drain(&mut rx);
        assert!(events.contains(&ServiceEvent::FileTransferComplete {
            file_name: "big.bin".to_string(),
            success: false,
        }));
        // Partial output exists, is closed, and holds the bytes that arrived.
        let partial = std::fs::read(dir.path().join("big.bin")).unwrap();
        assert_eq!(partial.len(), 3000);
    }

    #[tokio::test]
    async fn test_text_lines_forwarded_and_session_keeps_reading() {
        let dir = tempfile::tempdir().unwrap();
        let (local, mut remote) = tokio::io::duplex(1024);
        let (session, mut rx) = session(local, test_config(dir.path()));

        let writer = tokio::spawn(async move {
            remote.write_all(b"hello\nworld\n").await.unwrap();
            drop(remote);
        });

        session.run_receiver().await;
        writer.await.unwrap();

        let events = drain(&mut rx);
        assert!(events.contains(&ServiceEvent::Message("hello".to_string())));
        assert!(events.contains(&ServiceEvent::Message("world".to_string())));
    }

    #[tokio::test]
    async fn test_sender_transmits_header_then_exact_payload() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("notes.txt");
        std::fs::write(&src, vec![7u8; 5000]).unwrap();

        let (local, mut remote) = tokio::io::duplex(64 * 1024);
        let (session, mut rx) = session(local, test_config(dir.path()));
        let (cmd_tx, cmd_rx) = mpsc::channel(4);

        cmd_tx
            .send(SessionCommand::SendFile(src.clone()))
            .await
            .unwrap();

        let reader = tokio::spawn(async move {
            let mut bytes = Vec::new();
            remote.read_to_end(&mut bytes).await.unwrap();
            bytes
        });

        session.run_sender(cmd_rx).await;
        drop(cmd_tx);
        let bytes = reader.await.unwrap();

        let header_end = bytes.iter().position(|&b| b == b'\n').unwrap();
        let header = String::from_utf8_lossy(&bytes[..header_end]);
        assert_eq!(header, "FILE_NAME:notes.txt|FILE_SIZE:5000");
        assert_eq!(bytes.len() - header_end - 1, 5000);

        let events = drain(&mut rx);
        assert!(events.contains(&ServiceEvent::FileTransferComplete {
            file_name: "notes.txt".to_string(),
            success: true,
        }));
        let progress: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                ServiceEvent::FileTransferProgress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(progress.last(), Some(&100));
    }

    #[tokio::test]
    async fn test_sender_missing_file_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (local, remote) = tokio::io::duplex(1024);
        let (session, mut rx) = session(local, test_config(dir.path()));
        let (cmd_tx, cmd_rx) = mpsc::channel(4);

        cmd_tx
            .send(SessionCommand::SendFile(dir.path().join("missing.txt")))
            .await
            .unwrap();
        session.run_sender(cmd_rx).await;
        drop(remote);

        let events = drain(&mut rx);
        assert!(events.contains(&ServiceEvent::FileTransferComplete {
            file_name: "missing.txt".to_string(),
            success: false,
        }));
    }

    #[tokio::test]
    async fn test_text_round_trip_between_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let (local, remote) = tokio::io::duplex(1024);

        let (sender, _sender_rx) = session(local, test_config(dir.path()));
        let (receiver, mut receiver_rx) = session(remote, test_config(dir.path()));
        let (cmd_tx, cmd_rx) = mpsc::channel(4);

        let recv_task = tokio::spawn(receiver.run_receiver());
        cmd_tx
            .send(SessionCommand::SendText("ping from the other side".into()))
            .await
            .unwrap();
        drop(cmd_tx);
        sender.run_sender(cmd_rx).await;
        recv_task.await.unwrap();

        let events = drain(&mut receiver_rx);
        assert!(events.contains(&ServiceEvent::Message(
            "ping from the other side".to_string()
        )));
    }
}
