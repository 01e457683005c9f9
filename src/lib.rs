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

//! Point-to-point Bluetooth file transfer.
//!
//! `btdrop` discovers nearby peers, establishes exactly one stream
//! connection at a time (outbound connect or inbound accept, first
//! established wins), and moves files and short text messages over it
//! with a newline-delimited header protocol. Lifecycle and progress are
//! reported through a single event channel.
//!
//! The engine is generic over the transport traits in [`transport`];
//! [`bluetooth::RfcommTransport`] is the production implementation.

pub mod bluetooth;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod peer;
pub mod service;
pub mod transfer;
pub mod transport;

pub use config::TransferConfig;
pub use error::{ProtocolError, TransferError};
pub use events::{EventSender, ServiceEvent};
pub use peer::PeerAddress;
pub use service::TransferService;
pub use transfer::{ConnectionManager, ConnectionRole, ManagerState, TransferHeader};
