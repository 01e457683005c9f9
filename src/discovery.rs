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

//! Peer discovery.
//!
//! One scan at a time: starting a new scan cancels the previous one.
//! Every scan that starts emits `ScanFinished` exactly once, whether it
//! ends naturally or by cancellation. `cancel_discovery` is idempotent.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::events::{EventSender, ServiceEvent};
use crate::transport::{Discovery, PeerScan};

struct ScanHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Drives discovery scans and forwards found peers to the event sink.
pub struct DiscoveryScanner<D: Discovery> {
    discovery: Arc<D>,
    events: EventSender,
    active: Mutex<Option<ScanHandle>>,
}

impl<D: Discovery> DiscoveryScanner<D> {
    pub fn new(discovery: Arc<D>, events: EventSender) -> Self {
        Self {
            discovery,
            events,
            active: Mutex::new(None),
        }
    }

    /// Begin asynchronous peer enumeration.
    ///
    /// Emits `DeviceFound` per discovered peer (duplicates possible)
    /// and `ScanFinished` exactly once when enumeration ends. A scan
    /// already in progress is cancelled first.
    pub fn start_discovery(&self) {
        let events = self.events.clone();
        let discovery = self.discovery.clone();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let mut active = self.active.lock();
        if let Some(prior) = active.take() {
            prior.cancel.cancel();
        }

        let task = tokio::spawn(async move {
            let mut scan = tokio::select! {
                _ = token.cancelled() => {
                    events.emit(ServiceEvent::ScanFinished);
                    return;
                }
                r = discovery.start_scan() => match r {
                    Ok(scan) => scan,
                    Err(e) => {
                        warn!(error = %e, "could not start discovery");
                        events.message(format!("Discovery unavailable: {}", e));
                        return;
                    }
                },
            };
            events.message("Scanning for devices...");

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    peer = scan.next_peer() => match peer {
                        Some(peer) => {
                            debug!(%peer, "device found");
                            events.emit(ServiceEvent::DeviceFound(peer));
                        }
                        None => break,
                    },
                }
            }

            // Stopping a scan that already ended is a benign race; the
            // error is swallowed, not propagated.
            if let Err(e) = scan.stop().await {
                debug!(error = %e, "ignoring error while stopping scan");
            }
            events.emit(ServiceEvent::ScanFinished);
        });

        *active = Some(ScanHandle { cancel, task });
    }

    /// Cancel the scan in progress, if any. Idempotent: repeated calls,
    /// or calls with no active scan, do nothing and emit nothing extra.
    pub fn cancel_discovery(&self) {
        if let Some(handle) = self.active.lock().take() {
            handle.cancel.cancel();
        }
    }

    /// Whether a scan task is currently installed.
    pub fn is_scanning(&self) -> bool {
        self.active.lock().is_some()
    }
}
