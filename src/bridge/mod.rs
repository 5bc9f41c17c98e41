// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The bridge loop variants.
//!
//! Two loops connect a device to the status bus:
//!
//! - [`PushBridge`]: one persistent device session; the device pushes
//!   incremental deltas which are merged into the snapshot as they arrive.
//! - [`PollBridge`]: a fresh session per operation; the full status is read
//!   on a fixed interval, or immediately after a command.
//!
//! Both share the publication step (retained `status` / `status_raw` / `last`
//! per [`PublishSet`]), the command dispatch step (translate, write, reset
//! the retained command topic to the sentinel, echo `set/lastcommand`), and
//! the shutdown signalling below.

pub mod poll;
pub mod push;

pub use poll::PollBridge;
pub use push::PushBridge;

use std::sync::Arc;

use tokio::sync::watch;

use crate::bus::{BridgeTopics, StatusBus};
use crate::command::{COMMAND_SENTINEL, Translation, translate};
use crate::device::DeviceClient;
use crate::error::ProtocolError;
use crate::reconcile::PublishSet;
use crate::schema::DeviceSchema;

/// Receiver side of the shutdown channel; bridge loops watch this.
pub type ShutdownSignal = watch::Receiver<bool>;

/// Sender side of the shutdown channel.
///
/// Cloneable so the signal task and the embedding application can both
/// request shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Requests shutdown of every loop watching the paired signal.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Creates a linked shutdown handle and signal.
#[must_use]
pub fn shutdown_channel() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx: Arc::new(tx) }, rx)
}

/// Arms process signal handlers that trigger the given shutdown handle.
///
/// Listens for Ctrl-C on all platforms and additionally SIGTERM on unix, so
/// both interactive and service-manager stops shut the bridge down cleanly.
pub fn shutdown_on_signals(handle: ShutdownHandle) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut terminate = match signal(SignalKind::terminate()) {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::error!(error = %e, "Cannot install SIGTERM handler");
                    return;
                }
            };

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }

        tracing::info!("Shutdown signal received");
        handle.shutdown();
    });
}

/// Current wall-clock time as a unix timestamp.
pub(crate) fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Emits one round of retained publications.
pub(crate) async fn emit_publish_set<B: StatusBus>(
    bus: &B,
    topics: &BridgeTopics,
    publish: &PublishSet,
) -> Result<(), ProtocolError> {
    bus.publish(&topics.status(), publish.status.to_string(), true)
        .await?;
    if let Some(raw) = &publish.status_raw {
        bus.publish(&topics.status_raw(), raw.to_string(), true)
            .await?;
    }
    bus.publish(&topics.last(), publish.last.to_string(), true)
        .await
}

/// Translates and dispatches one inbound control payload.
///
/// Returns `Ok(true)` when a device write happened. Translation failures are
/// logged and reported as `Ok(false)`: a malformed command never stops the
/// loop. After a successful write the retained command topic is reset to the
/// sentinel and the raw text is echoed to `set/lastcommand`, so a retained
/// re-delivery cannot re-trigger the write.
pub(crate) async fn dispatch_command<D: DeviceClient, B: StatusBus>(
    payload: &str,
    schema: &DeviceSchema,
    device: &mut D,
    bus: &B,
    topics: &BridgeTopics,
) -> Result<bool, ProtocolError> {
    let command = match translate(payload, schema) {
        Ok(Translation::Command(command)) => command,
        Ok(Translation::Sentinel) => {
            tracing::debug!("Ignoring consumed-command sentinel");
            return Ok(false);
        }
        Ok(Translation::NotACommand) => {
            tracing::debug!(payload = %payload, "Ignoring non-command payload");
            return Ok(false);
        }
        Err(e) => {
            tracing::error!(payload = %payload, error = %e, "Rejected command");
            return Ok(false);
        }
    };

    tracing::info!(id = %command.id, value = ?command.value, "Dispatching command");
    device.set_value(command.id, command.value).await?;

    bus.publish(
        &topics.set_command(),
        COMMAND_SENTINEL.to_string(),
        true,
    )
    .await?;
    bus.publish(&topics.set_lastcommand(), command.raw, true)
        .await?;

    Ok(true)
}
