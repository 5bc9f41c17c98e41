// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device-side interfaces consumed by the bridge loops.
//!
//! The physical device protocol (framing, encryption, handshake) is not part
//! of this crate. The bridge only needs the small async surface below; a
//! concrete implementation wraps whatever protocol library speaks to the
//! actual hardware, and tests supply scripted implementations.

use crate::datapoint::{DpId, DpValue, StatusUpdate};
use crate::error::ProtocolError;

/// One open session with the device.
///
/// The push bridge keeps a single session alive for its whole lifetime; the
/// poll bridge opens a fresh session per operation and drops it to close.
/// A session is never used from more than one logical flow at a time.
#[allow(async_fn_in_trait)]
pub trait DeviceClient {
    /// Asks the device to push a full status message.
    ///
    /// The response arrives through [`receive`](Self::receive); this only
    /// sends the request.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the request cannot be sent.
    async fn query_status(&mut self) -> Result<(), ProtocolError>;

    /// Polls for an unsolicited or requested status message.
    ///
    /// Returns `Ok(None)` when no data is currently available; this is not
    /// an error and callers simply try again later.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` on connection failure.
    async fn receive(&mut self) -> Result<Option<StatusUpdate>, ProtocolError>;

    /// Reads the complete device status in one round trip.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the read fails.
    async fn full_status(&mut self) -> Result<StatusUpdate, ProtocolError>;

    /// Writes one data point with no-wait semantics.
    ///
    /// The call returns once the write has been sent; it does not block on a
    /// device acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the write cannot be sent.
    async fn set_value(&mut self, id: DpId, value: DpValue) -> Result<(), ProtocolError>;

    /// Sends a keep-alive heartbeat on a persistent session.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the heartbeat cannot be sent.
    async fn heartbeat(&mut self) -> Result<(), ProtocolError>;
}

/// Factory for short-lived device sessions.
///
/// Models the acquire/release-on-every-use policy of the poll bridge: each
/// command dispatch and each periodic refresh opens its own session and pays
/// the full connection-setup cost. Acceptable at single-device scale.
#[allow(async_fn_in_trait)]
pub trait DeviceConnector {
    /// The session type produced by this connector.
    type Client: DeviceClient;

    /// Opens a new session with the device.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the connection cannot be established.
    async fn connect(&self) -> Result<Self::Client, ProtocolError>;
}
