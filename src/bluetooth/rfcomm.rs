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

//! Bluetooth RFCOMM transport backed by BlueZ.

use std::future::Future;
use std::io;

use anyhow::Result;
use bluer::rfcomm::{Listener, SocketAddr, Stream};
use bluer::{Adapter, AdapterEvent, Address};
use futures::stream::{BoxStream, StreamExt};
use tracing::{debug, info};

use super::constants::{RFCOMM_CHANNEL, SERVICE_NAME, SERVICE_UUID};
use crate::peer::PeerAddress;
use crate::transport::{Acceptor, Discovery, Transport};

fn dbus_err(e: bluer::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

/// RFCOMM transport over the default Bluetooth adapter.
pub struct RfcommTransport {
    adapter: Adapter,
    // Keeps the BlueZ connection alive for the adapter's lifetime.
    _session: bluer::Session,
}

impl RfcommTransport {
    /// Connect to BlueZ and power on the default adapter.
    pub async fn new() -> Result<Self> {
        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        info!("Using Bluetooth adapter: {}", adapter.name());

        if !adapter.is_powered().await? {
            info!("Powering on Bluetooth adapter...");
            adapter.set_powered(true).await?;
        }

        Ok(Self {
            adapter,
            _session: session,
        })
    }

    /// Make this device visible to scanning peers under the fixed
    /// service name.
    pub async fn make_discoverable(&self) -> Result<()> {
        self.adapter.set_alias(SERVICE_NAME.to_string()).await?;
        self.adapter.set_discoverable(true).await?;
        self.adapter.set_pairable(true).await?;
        info!("Adapter is discoverable as '{}'", SERVICE_NAME);
        Ok(())
    }

    /// Address of the local adapter.
    pub async fn address(&self) -> Result<Address> {
        Ok(self.adapter.address().await?)
    }
}

impl Transport for RfcommTransport {
    type Stream = Stream;
    type Acceptor = RfcommAcceptor;

    fn connect<'a>(
        &'a self,
        peer: &'a PeerAddress,
    ) -> impl Future<Output = io::Result<Stream>> + Send + 'a {
        async move {
            let address: Address = peer.address.parse().map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, "invalid peer address")
            })?;
            debug!(peer = %peer, channel = RFCOMM_CHANNEL, "opening RFCOMM stream");
            Stream::connect(SocketAddr::new(address, RFCOMM_CHANNEL)).await
        }
    }

    fn listen(&self) -> impl Future<Output = io::Result<RfcommAcceptor>> + Send + '_ {
        async move {
            let listener =
                Listener::bind(SocketAddr::new(Address::any(), RFCOMM_CHANNEL)).await?;
            info!(
                "RFCOMM service {} listening on channel {}",
                SERVICE_UUID, RFCOMM_CHANNEL
            );
            Ok(RfcommAcceptor { listener })
        }
    }
}

/// One-shot acceptor for inbound RFCOMM connections.
pub struct RfcommAcceptor {
    listener: Listener,
}

impl Acceptor for RfcommAcceptor {
    type Stream = Stream;

    fn accept(&mut self) -> impl Future<Output = io::Result<(Stream, PeerAddress)>> + Send + '_ {
        async move {
            let (stream, remote) = self.listener.accept().await?;
            info!("Connection from {}", remote.addr);
            Ok((stream, PeerAddress::new(remote.addr.to_string())))
        }
    }
}

impl Discovery for RfcommTransport {
    type Scan = RfcommScan;

    fn start_scan(&self) -> impl Future<Output = io::Result<RfcommScan>> + Send + '_ {
        async move {
            let events = self
                .adapter
                .discover_devices()
                .await
                .map_err(dbus_err)?
                .boxed();
            debug!("discovery session started");
            Ok(RfcommScan {
                adapter: self.adapter.clone(),
                events: Some(events),
            })
        }
    }
}

/// An in-progress BlueZ discovery session. Dropping the event stream
/// ends the platform scan.
pub struct RfcommScan {
    adapter: Adapter,
    events: Option<BoxStream<'static, AdapterEvent>>,
}

impl crate::transport::PeerScan for RfcommScan {
    fn next_peer(&mut self) -> impl Future<Output = Option<PeerAddress>> + Send + '_ {
        async move {
            let events = self.events.as_mut()?;
            loop {
                match events.next().await? {
                    AdapterEvent::DeviceAdded(addr) => {
                        let name = match self.adapter.device(addr) {
                            Ok(device) => device.name().await.ok().flatten(),
                            Err(_) => None,
                        };
                        let mut peer = PeerAddress::new(addr.to_string());
                        if let Some(name) = name {
                            peer = peer.with_name(name);
                        }
                        return Some(peer);
                    }
                    _ => continue,
                }
            }
        }
    }

    fn stop(&mut self) -> impl Future<Output = io::Result<()>> + Send + '_ {
        async move {
            // Dropping the event stream releases the discovery session;
            // stopping twice, or after a natural finish, is a no-op.
            self.events.take();
            Ok(())
        }
    }
}
