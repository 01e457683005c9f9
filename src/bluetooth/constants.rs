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

//! Static transport addressing. Not configurable: both sides must
//! agree on these for rendezvous to work.

use uuid::Uuid;

/// Standard SPP UUID under which the service is reachable.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// Service name announced to the platform.
pub const SERVICE_NAME: &str = "btdrop";

/// RFCOMM channel to use.
pub const RFCOMM_CHANNEL: u8 = 1;
