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

//! The service facade the UI talks to.
//!
//! Bundles the discovery scanner and the connection manager over one
//! transport and one event channel.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::TransferConfig;
use crate::discovery::DiscoveryScanner;
use crate::events::{EventSender, ServiceEvent};
use crate::peer::PeerAddress;
use crate::transfer::manager::{ConnectionManager, ManagerState};
use crate::transport::{Discovery, Transport};

/// Discovery, rendezvous, and transfer behind one object.
///
/// All operations return immediately; outcomes arrive on the event
/// channel handed out at construction.
pub struct TransferService<T: Transport + Discovery> {
    scanner: DiscoveryScanner<T>,
    manager: ConnectionManager<T>,
}

impl<T: Transport + Discovery> TransferService<T> {
    /// Create a service over `transport` and return it with the
    /// receiving end of its event channel.
    pub fn new(
        transport: T,
        config: TransferConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ServiceEvent>) {
        let (events, rx) = EventSender::channel();
        let transport = Arc::new(transport);
        let scanner = DiscoveryScanner::new(transport.clone(), events.clone());
        let manager = ConnectionManager::new(transport, events, config);
        (Self { scanner, manager }, rx)
    }

    /// Begin asynchronous peer enumeration.
    pub fn start_discovery(&self) {
        self.scanner.start_discovery();
    }

    /// Cancel the scan in progress, if any. Idempotent.
    pub fn cancel_discovery(&self) {
        self.scanner.cancel_discovery();
    }

    /// Begin an outbound connection attempt to `peer`.
    pub fn connect(&self, peer: PeerAddress) {
        self.manager.connect(peer);
    }

    /// Begin listening for one inbound connection.
    pub fn start_accepting(&self) {
        self.manager.start_accepting();
    }

    /// Queue a file for sending on the active session.
    pub fn send_file(&self, path: impl Into<PathBuf>) {
        self.manager.send_file(path);
    }

    /// Send a short text message on the active session.
    pub fn send_message(&self, text: impl Into<String>) {
        self.manager.send_message(text);
    }

    /// Current connection lifecycle state.
    pub fn state(&self) -> ManagerState {
        self.manager.state()
    }

    /// Cancel discovery, all connection attempts, and the active
    /// session. Idempotent; leaves no task running.
    pub async fn stop(&self) {
        self.scanner.cancel_discovery();
        self.manager.stop().await;
    }
}
