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

//! Service events delivered to the UI.
//!
//! The UI consumes one channel per service instance. Events for a peer
//! or transfer arrive in causal order: `ConnectionAttempt` before
//! `Connected`, progress values non-decreasing, and
//! `FileTransferComplete` last for its transfer.

use tokio::sync::mpsc;

use crate::peer::PeerAddress;

/// Events emitted by the transfer service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
    /// A peer was found during discovery. Duplicates by address are
    /// possible; de-duplication is the consumer's responsibility.
    DeviceFound(PeerAddress),
    /// The current discovery scan ended, naturally or by cancellation.
    ScanFinished,
    /// An outbound connection attempt started.
    ConnectionAttempt { label: String },
    /// A stream connection was established.
    Connected { label: String },
    /// A connect or accept attempt failed.
    ConnectionFailed { label: String, reason: String },
    /// A file transfer (send or receive) started.
    FileTransferStarted { file_name: String },
    /// Transfer progress, 0-100.
    FileTransferProgress { file_name: String, percent: u8 },
    /// Terminal event for a transfer.
    FileTransferComplete { file_name: String, success: bool },
    /// A text message from the peer, or an advisory status line.
    Message(String),
}

/// Sending half of the service event channel.
///
/// Emission never blocks and never fails the caller: once the UI drops
/// its receiver the service keeps running and events fall on the floor.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<ServiceEvent>,
}

impl EventSender {
    /// Create a connected sender/receiver pair.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServiceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit an event.
    pub fn emit(&self, event: ServiceEvent) {
        let _ = self.tx.send(event);
    }

    /// Emit an advisory status message.
    pub fn message(&self, text: impl Into<String>) {
        self.emit(ServiceEvent::Message(text.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_emission_order() {
        let (events, mut rx) = EventSender::channel();

        events.emit(ServiceEvent::ConnectionAttempt {
            label: "peer".into(),
        });
        events.emit(ServiceEvent::Connected {
            label: "peer".into(),
        });

        assert_eq!(
            rx.recv().await,
            Some(ServiceEvent::ConnectionAttempt {
                label: "peer".into()
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(ServiceEvent::Connected {
                label: "peer".into()
            })
        );
    }

    #[test]
    fn test_emit_after_receiver_dropped_is_silent() {
        let (events, rx) = EventSender::channel();
        drop(rx);
        events.message("nobody listening");
    }
}
