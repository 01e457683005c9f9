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

//! Connection lifecycle management.
//!
//! At most one outbound connect attempt, one inbound accept attempt,
//! and one active session exist at a time. Whichever attempt
//! establishes a stream first wins; installing the session cancels both
//! attempt paths under the same lock, so a second session can never be
//! created. Every slot transition happens under one mutex and no lock
//! is held across an await.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TransferConfig;
use crate::events::{EventSender, ServiceEvent};
use crate::peer::PeerAddress;
use crate::transfer::session::{ConnectionRole, SessionCommand, TransferSession};
use crate::transport::{Acceptor, Transport};

/// Externally observable manager state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Idle,
    Connecting,
    Listening,
    SessionActive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptKind {
    Connect,
    Accept,
}

struct Attempt {
    id: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct ActiveSession {
    id: u64,
    role: ConnectionRole,
    commands: mpsc::Sender<SessionCommand>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Slots {
    connecting: Option<Attempt>,
    accepting: Option<Attempt>,
    session: Option<ActiveSession>,
    next_id: u64,
}

impl Slots {
    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn attempt_mut(&mut self, kind: AttemptKind) -> &mut Option<Attempt> {
        match kind {
            AttemptKind::Connect => &mut self.connecting,
            AttemptKind::Accept => &mut self.accepting,
        }
    }
}

struct Inner<T: Transport> {
    transport: Arc<T>,
    events: EventSender,
    config: TransferConfig,
    slots: Mutex<Slots>,
}

/// Owns the connect/accept/session slots and enforces the
/// exactly-one-active-session invariant.
pub struct ConnectionManager<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for ConnectionManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: Arc<T>, events: EventSender, config: TransferConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                events,
                config,
                slots: Mutex::new(Slots::default()),
            }),
        }
    }

    /// Begin an outbound connection attempt to `peer` (role Initiator).
    ///
    /// Last caller wins: any prior outbound attempt is cancelled first.
    /// Returns immediately; the outcome arrives as `Connected` or
    /// `ConnectionFailed`.
    pub fn connect(&self, peer: PeerAddress) {
        let inner = self.inner.clone();
        let label = peer.label().to_string();
        inner.events.emit(ServiceEvent::ConnectionAttempt {
            label: label.clone(),
        });

        let mut slots = inner.slots.lock();
        let id = slots.alloc_id();
        let cancel = CancellationToken::new();
        // Last caller wins; cancelled under the lock so a prior attempt
        // that just established cannot slip a session in.
        if let Some(prior) = slots.connecting.take() {
            prior.cancel.cancel();
        }

        let task = {
            let inner = inner.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                debug!(peer = %peer, "connecting");
                let result = tokio::select! {
                    _ = cancel.cancelled() => return,
                    r = inner.transport.connect(&peer) => r,
                };
                match result {
                    Ok(stream) => {
                        inner.install_session(stream, label, ConnectionRole::Initiator, &cancel)
                    }
                    Err(e) => {
                        warn!(peer = %peer, error = %e, "connect failed");
                        inner.remove_attempt(AttemptKind::Connect, id);
                        inner.events.emit(ServiceEvent::ConnectionFailed {
                            label,
                            reason: e.to_string(),
                        });
                    }
                }
            })
        };
        slots.connecting = Some(Attempt { id, cancel, task });
    }

    /// Begin listening for one inbound connection (role Listener).
    ///
    /// Any prior accept attempt is cancelled first. The listener stops
    /// after a single accepted connection; it is not a multi-client
    /// server.
    pub fn start_accepting(&self) {
        let inner = self.inner.clone();
        inner.events.message("Waiting for incoming connections...");

        let mut slots = inner.slots.lock();
        let id = slots.alloc_id();
        let cancel = CancellationToken::new();
        if let Some(prior) = slots.accepting.take() {
            prior.cancel.cancel();
        }

        let task = {
            let inner = inner.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let bound = tokio::select! {
                    _ = cancel.cancelled() => return,
                    r = inner.transport.listen() => r,
                };
                let mut acceptor = match bound {
                    Ok(acceptor) => acceptor,
                    Err(e) => {
                        warn!(error = %e, "listen failed");
                        inner.remove_attempt(AttemptKind::Accept, id);
                        inner.events.emit(ServiceEvent::ConnectionFailed {
                            label: "incoming".to_string(),
                            reason: e.to_string(),
                        });
                        return;
                    }
                };
                let accepted = tokio::select! {
                    _ = cancel.cancelled() => return,
                    r = acceptor.accept() => r,
                };
                // One-shot listener: dropped here either way.
                drop(acceptor);
                match accepted {
                    Ok((stream, peer)) => {
                        let label = peer.label().to_string();
                        inner.install_session(stream, label, ConnectionRole::Listener, &cancel)
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        inner.remove_attempt(AttemptKind::Accept, id);
                        inner.events.emit(ServiceEvent::ConnectionFailed {
                            label: "incoming".to_string(),
                            reason: e.to_string(),
                        });
                    }
                }
            })
        };
        slots.accepting = Some(Attempt { id, cancel, task });
    }

    /// Queue a file for sending on the active session.
    ///
    /// Valid only on the initiating side (the sender in this protocol);
    /// otherwise an advisory message is emitted.
    pub fn send_file(&self, path: impl Into<PathBuf>) {
        self.dispatch(SessionCommand::SendFile(path.into()), "file");
    }

    /// Send a short text message on the active session.
    pub fn send_message(&self, text: impl Into<String>) {
        self.dispatch(SessionCommand::SendText(text.into()), "message");
    }

    fn dispatch(&self, command: SessionCommand, what: &str) {
        let target = {
            let slots = self.inner.slots.lock();
            slots
                .session
                .as_ref()
                .map(|s| (s.role, s.commands.clone()))
        };
        match target {
            Some((ConnectionRole::Initiator, commands)) => {
                if commands.try_send(command).is_err() {
                    self.inner
                        .events
                        .message(format!("Connection busy; the {} was not queued.", what));
                }
            }
            Some((ConnectionRole::Listener, _)) => {
                self.inner.events.message(format!(
                    "This side is receiving; cannot send a {} on this connection.",
                    what
                ));
            }
            None => {
                self.inner
                    .events
                    .message(format!("No active connection to send the {}.", what));
            }
        }
    }

    /// Cancel all in-flight attempts and the active session. Idempotent
    /// and safe from any context; every spawned task terminates within
    /// bounded time.
    pub async fn stop(&self) {
        // Tokens are cancelled while the lock is held, so an attempt
        // that already won the transport race observes the cancellation
        // before it can install a session that would outlive stop().
        let (connecting, accepting, session) = {
            let mut slots = self.inner.slots.lock();
            let connecting = slots.connecting.take();
            let accepting = slots.accepting.take();
            let session = slots.session.take();
            for attempt in [&connecting, &accepting].into_iter().flatten() {
                attempt.cancel.cancel();
            }
            if let Some(session) = &session {
                session.cancel.cancel();
            }
            (connecting, accepting, session)
        };

        for attempt in [connecting, accepting].into_iter().flatten() {
            let _ = attempt.task.await;
        }
        if let Some(session) = session {
            drop(session.commands);
            let _ = session.task.await;
            debug!("session stopped");
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ManagerState {
        let slots = self.inner.slots.lock();
        if slots.session.is_some() {
            ManagerState::SessionActive
        } else if slots.connecting.is_some() {
            ManagerState::Connecting
        } else if slots.accepting.is_some() {
            ManagerState::Listening
        } else {
            ManagerState::Idle
        }
    }
}

impl<T: Transport> Inner<T> {
    /// Install the winning stream as the single active session.
    ///
    /// Runs entirely under the slot lock: checking for an existing
    /// session, cancelling both attempt paths, and publishing the new
    /// session are one atomic step, so concurrent connect/accept
    /// completions cannot both win. The losing stream is dropped, which
    /// closes it.
    fn install_session(
        self: &Arc<Self>,
        stream: T::Stream,
        label: String,
        role: ConnectionRole,
        winner: &CancellationToken,
    ) {
        let mut slots = self.slots.lock();
        if winner.is_cancelled() {
            // Raced with stop() or a replacement attempt after the
            // transport handshake already succeeded.
            debug!(peer = %label, "attempt cancelled after establishing; dropping stream");
            return;
        }
        if slots.session.is_some() {
            info!(peer = %label, "stream established but a session is already active; dropping");
            return;
        }

        if let Some(attempt) = slots.connecting.take() {
            attempt.cancel.cancel();
        }
        if let Some(attempt) = slots.accepting.take() {
            attempt.cancel.cancel();
        }

        let id = slots.alloc_id();
        let cancel = CancellationToken::new();
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        info!(peer = %label, ?role, "connected");
        self.events.emit(ServiceEvent::Connected {
            label: label.clone(),
        });

        let session = TransferSession::new(
            stream,
            label,
            self.events.clone(),
            self.config.clone(),
            cancel.clone(),
        );
        let task = {
            let inner = self.clone();
            tokio::spawn(async move {
                match role {
                    ConnectionRole::Initiator => session.run_sender(cmd_rx).await,
                    ConnectionRole::Listener => session.run_receiver().await,
                }
                inner.clear_session(id);
            })
        };

        slots.session = Some(ActiveSession {
            id,
            role,
            commands: cmd_tx,
            cancel,
            task,
        });
    }

    /// Drop an attempt slot, but only if it still holds attempt `id`
    /// (a newer attempt may have replaced it).
    fn remove_attempt(&self, kind: AttemptKind, id: u64) {
        let mut slots = self.slots.lock();
        let slot = slots.attempt_mut(kind);
        if slot.as_ref().map(|a| a.id) == Some(id) {
            slot.take();
        }
    }

    /// Return to idle when a session ends on its own. Guarded by id so
    /// a finished session never clears a successor installed after
    /// `stop()`.
    fn clear_session(&self, id: u64) {
        let mut slots = self.slots.lock();
        if slots.session.as_ref().map(|s| s.id) == Some(id) {
            slots.session.take();
            debug!("session ended; manager idle");
        }
    }
}
