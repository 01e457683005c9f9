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

//! Transport abstraction.
//!
//! The engine is generic over these traits so it can run on the real
//! RFCOMM transport in production and on in-memory pipes in tests.
//! A transport only opens, accepts, and enumerates; framing and
//! lifecycle live above it.

use std::future::Future;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::peer::PeerAddress;

/// A connected bidirectional byte stream.
///
/// Exclusively owned by one transfer session at a time; dropping it is
/// the only way to end its lifetime, and closing it is the reliable
/// mechanism for unblocking a pending read or write on the other task.
pub trait StreamSocket: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> StreamSocket for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Opens outbound stream connections to addressable peers.
pub trait Transport: Send + Sync + 'static {
    /// The concrete stream type produced by this transport.
    type Stream: StreamSocket;

    /// The concrete acceptor type produced by [`listen`](Transport::listen).
    type Acceptor: Acceptor<Stream = Self::Stream>;

    /// Opens a connection to `peer`. Blocks until the transport-level
    /// handshake completes or fails; bounded only by cancellation.
    fn connect<'a>(
        &'a self,
        peer: &'a PeerAddress,
    ) -> impl Future<Output = io::Result<Self::Stream>> + Send + 'a;

    /// Binds a listener for inbound connections on the service's
    /// well-known endpoint.
    fn listen(&self) -> impl Future<Output = io::Result<Self::Acceptor>> + Send + '_;
}

/// Accepts inbound stream connections.
pub trait Acceptor: Send + 'static {
    /// The concrete stream type produced by [`accept`](Acceptor::accept).
    type Stream: StreamSocket;

    /// Waits for the next inbound connection and returns the stream
    /// together with the remote peer's identity.
    fn accept(
        &mut self,
    ) -> impl Future<Output = io::Result<(Self::Stream, PeerAddress)>> + Send + '_;
}

/// Enumerates nearby addressable peers.
pub trait Discovery: Send + Sync + 'static {
    /// The concrete scan type produced by [`start_scan`](Discovery::start_scan).
    type Scan: PeerScan;

    /// Begins a platform scan and returns a handle to drain it.
    fn start_scan(&self) -> impl Future<Output = io::Result<Self::Scan>> + Send + '_;
}

/// An in-progress discovery scan.
pub trait PeerScan: Send + 'static {
    /// The next discovered peer, or `None` when enumeration ends
    /// naturally. Uniqueness of addresses is not guaranteed.
    fn next_peer(&mut self) -> impl Future<Output = Option<PeerAddress>> + Send + '_;

    /// Stops the platform scan. Must be idempotent: stopping a scan
    /// that already ended is not an error worth surfacing.
    fn stop(&mut self) -> impl Future<Output = io::Result<()>> + Send + '_;
}
