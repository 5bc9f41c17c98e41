// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Message-bus interfaces and topic layout.
//!
//! The bridge publishes retained state under a configurable topic root and
//! consumes free-text control messages from the `set` topics. The concrete
//! MQTT implementation lives in [`mqtt`]; tests use an in-memory bus.

#[cfg(feature = "mqtt")]
pub mod mqtt;

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ProtocolError;

/// Payload published on the `running` topic while the bridge is alive.
pub const RUNNING: &str = "1";
/// Payload published on the `running` topic on shutdown and as last will.
pub const NOT_RUNNING: &str = "0";

/// The publish/subscribe channel the bridge loops drive.
///
/// Publications marked retained must be delivered by the broker to late
/// subscribers without waiting for the next change.
#[allow(async_fn_in_trait)]
pub trait StatusBus {
    /// Publishes a payload to a topic.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the publish fails.
    async fn publish(&self, topic: &str, payload: String, retain: bool)
    -> Result<(), ProtocolError>;

    /// Pops the oldest pending inbound control message, if any.
    ///
    /// Non-blocking: the bridge loop drains this between device operations.
    fn poll_command(&self) -> Option<String>;
}

/// FIFO of inbound control payloads.
///
/// Producer is the bus subscription callback, consumer is the bridge loop;
/// depth is unbounded, entries are small text payloads.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    inner: Arc<Mutex<VecDeque<String>>>,
}

impl CommandQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an inbound payload.
    pub fn push(&self, payload: String) {
        self.inner.lock().push_back(payload);
    }

    /// Pops the oldest payload, if any.
    #[must_use]
    pub fn pop(&self) -> Option<String> {
        self.inner.lock().pop_front()
    }

    /// Returns the number of queued payloads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// The bridge's topic layout under a configurable root.
///
/// # Examples
///
/// ```
/// use dpbridge::BridgeTopics;
///
/// let topics = BridgeTopics::new("poolhouse");
/// assert_eq!(topics.status(), "poolhouse/status");
/// assert_eq!(topics.set_command(), "poolhouse/set/command");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeTopics {
    root: String,
}

impl BridgeTopics {
    /// Creates the topic layout for a root.
    #[must_use]
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the topic root.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Retained liveness flag, `"1"` while running, `"0"` otherwise.
    #[must_use]
    pub fn running(&self) -> String {
        format!("{}/running", self.root)
    }

    /// Retained renamed view of the snapshot.
    #[must_use]
    pub fn status(&self) -> String {
        format!("{}/status", self.root)
    }

    /// Retained raw snapshot with numeric keys.
    #[must_use]
    pub fn status_raw(&self) -> String {
        format!("{}/status_raw", self.root)
    }

    /// Retained unix timestamp of the last update.
    #[must_use]
    pub fn last(&self) -> String {
        format!("{}/last", self.root)
    }

    /// Subscribed control input (push-variant form).
    #[must_use]
    pub fn set(&self) -> String {
        format!("{}/set", self.root)
    }

    /// Subscribed control input (poll-variant form).
    #[must_use]
    pub fn set_command(&self) -> String {
        format!("{}/set/command", self.root)
    }

    /// Retained echo of the last accepted raw command text.
    #[must_use]
    pub fn set_lastcommand(&self) -> String {
        format!("{}/set/lastcommand", self.root)
    }

    /// Returns `true` if the given topic is one of the control inputs.
    #[must_use]
    pub fn is_command_topic(&self, topic: &str) -> bool {
        topic == self.set() || topic == self.set_command()
    }
}
