// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The push-variant bridge loop.
//!
//! Keeps one persistent device session for its whole lifetime. The device
//! pushes incremental deltas; the loop merges them into the snapshot and
//! republishes after each one. A heartbeat on every iteration keeps the
//! session alive.

use std::sync::Arc;

use crate::bridge::{ShutdownSignal, dispatch_command, emit_publish_set, unix_now};
use crate::bus::{BridgeTopics, StatusBus};
use crate::config::BridgeConfig;
use crate::datapoint::StatusUpdate;
use crate::device::DeviceClient;
use crate::error::{Error, ProtocolError, Result};
use crate::reconcile::Reconciler;
use crate::schema::DeviceSchema;

/// Bridge loop over a persistent device session.
///
/// Startup performs a bounded-retry initial full read; nothing is published
/// before that read succeeds. Steady state drains inbound commands, polls
/// the session for pushed deltas, and heartbeats.
///
/// # Examples
///
/// ```no_run
/// # use std::sync::Arc;
/// # use dpbridge::{BridgeConfig, DeviceSchema, PushBridge, shutdown_channel};
/// # async fn example<D, B>(config: BridgeConfig, device: D, bus: B) -> dpbridge::Result<()>
/// # where
/// #     D: dpbridge::DeviceClient,
/// #     B: dpbridge::StatusBus,
/// # {
/// let schema = Arc::new(DeviceSchema::load("/etc/dpbridge/device_type.json")?);
/// let (handle, signal) = shutdown_channel();
/// dpbridge::shutdown_on_signals(handle);
///
/// PushBridge::new(config, schema, device, bus).run(signal).await
/// # }
/// ```
#[derive(Debug)]
pub struct PushBridge<D, B> {
    device: D,
    bus: B,
    topics: BridgeTopics,
    schema: Arc<DeviceSchema>,
    reconciler: Reconciler,
    config: BridgeConfig,
}

impl<D: DeviceClient, B: StatusBus> PushBridge<D, B> {
    /// Creates a push bridge over an already-connected device session.
    #[must_use]
    pub fn new(config: BridgeConfig, schema: Arc<DeviceSchema>, device: D, bus: B) -> Self {
        Self {
            device,
            bus,
            topics: BridgeTopics::new(&config.topic_root),
            reconciler: Reconciler::new(Arc::clone(&schema), config.raw_publish),
            schema,
            config,
        }
    }

    /// Runs the bridge until the shutdown signal fires.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RetriesExhausted`] if the initial status read never
    /// succeeds within the startup retry budget, or a protocol error if a
    /// publication fails. Transient device errors in steady state are logged
    /// and retried, never returned.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) -> Result<()> {
        tracing::info!(root = %self.topics.root(), "Push bridge starting");

        let initial = self.initial_status(&mut shutdown).await?;
        let publish = self.reconciler.observe_full(&initial, unix_now());
        emit_publish_set(&self.bus, &self.topics, &publish)
            .await
            .map_err(Error::from)?;
        tracing::info!(entries = initial.dps.len(), "Initial status published");

        loop {
            if *shutdown.borrow() {
                break;
            }

            while let Some(payload) = self.bus.poll_command() {
                match dispatch_command(
                    &payload,
                    &self.schema,
                    &mut self.device,
                    &self.bus,
                    &self.topics,
                )
                .await
                {
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "Command dispatch failed"),
                }
            }

            match self.device.receive().await {
                Ok(Some(update)) if !update.is_empty() => {
                    if let Some(publish) = self.reconciler.observe_delta(&update, unix_now()) {
                        emit_publish_set(&self.bus, &self.topics, &publish)
                            .await
                            .map_err(Error::from)?;
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Device receive failed"),
            }

            if let Err(e) = self.device.heartbeat().await {
                tracing::warn!(error = %e, "Heartbeat failed");
            }

            tokio::select! {
                _ = shutdown.changed() => {}
                () = tokio::time::sleep(self.config.idle_sleep) => {}
            }
        }

        tracing::info!("Push bridge stopped");
        Ok(())
    }

    /// Reads the first full status, retrying within the startup budget.
    ///
    /// The shutdown signal is honored between attempts so a stop request
    /// does not have to wait out the whole budget.
    async fn initial_status(&mut self, shutdown: &mut ShutdownSignal) -> Result<StatusUpdate> {
        let policy = self.config.startup_retry.clone();
        let mut attempt = 0;

        loop {
            match self.request_full().await {
                Ok(Some(update)) if !update.is_empty() => return Ok(update),
                Ok(_) => tracing::info!(attempt, "Waiting for initial status"),
                Err(e) => tracing::warn!(attempt, error = %e, "Initial status read failed"),
            }

            attempt += 1;
            if !policy.should_retry(attempt) {
                return Err(Error::RetriesExhausted {
                    what: "initial status read".to_string(),
                    attempts: attempt,
                });
            }

            tokio::select! {
                _ = shutdown.changed() => {}
                () = tokio::time::sleep(policy.delay_for_attempt(attempt)) => {}
            }
            if *shutdown.borrow() {
                return Err(Error::RetriesExhausted {
                    what: "initial status read (interrupted by shutdown)".to_string(),
                    attempts: attempt,
                });
            }
        }
    }

    /// Requests a status push and polls the session once for the response.
    async fn request_full(&mut self) -> std::result::Result<Option<StatusUpdate>, ProtocolError> {
        self.device.query_status().await?;
        self.device.receive().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::{BrokerSettings, DeviceIdentity, RetryPolicy};

    #[derive(Debug, Default)]
    struct DeadDevice;

    impl DeviceClient for DeadDevice {
        async fn query_status(&mut self) -> std::result::Result<(), ProtocolError> {
            Err(ProtocolError::Device("no route to device".to_string()))
        }

        async fn receive(
            &mut self,
        ) -> std::result::Result<Option<StatusUpdate>, ProtocolError> {
            Ok(None)
        }

        async fn full_status(&mut self) -> std::result::Result<StatusUpdate, ProtocolError> {
            Err(ProtocolError::Device("no route to device".to_string()))
        }

        async fn set_value(
            &mut self,
            _id: crate::DpId,
            _value: crate::DpValue,
        ) -> std::result::Result<(), ProtocolError> {
            Ok(())
        }

        async fn heartbeat(&mut self) -> std::result::Result<(), ProtocolError> {
            Ok(())
        }
    }

    #[derive(Debug, Default, Clone)]
    struct NullBus;

    impl StatusBus for NullBus {
        async fn publish(
            &self,
            _topic: &str,
            _payload: String,
            _retain: bool,
        ) -> std::result::Result<(), ProtocolError> {
            Ok(())
        }

        fn poll_command(&self) -> Option<String> {
            None
        }
    }

    fn config() -> BridgeConfig {
        BridgeConfig::new(
            "outlet",
            BrokerSettings::new("localhost", 1883),
            DeviceIdentity::new("dev", "key", "3.3"),
        )
        .with_startup_retry(RetryPolicy::fixed(3, Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn unreachable_device_exhausts_startup_budget() {
        let schema = Arc::new(DeviceSchema::from_pairs([(1, "pump")]));
        let bridge = PushBridge::new(config(), schema, DeadDevice, NullBus);
        let (_handle, signal) = crate::bridge::shutdown_channel();

        let err = bridge.run(signal).await.unwrap_err();
        assert!(matches!(
            err,
            Error::RetriesExhausted { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn shutdown_interrupts_startup_retries() {
        let schema = Arc::new(DeviceSchema::from_pairs([(1, "pump")]));
        let bridge = PushBridge::new(
            config().with_startup_retry(RetryPolicy::fixed(1000, Duration::from_secs(30))),
            schema,
            DeadDevice,
            NullBus,
        );
        let (handle, signal) = crate::bridge::shutdown_channel();
        handle.shutdown();

        let err = tokio::time::timeout(Duration::from_secs(1), bridge.run(signal))
            .await
            .expect("shutdown must interrupt the retry sleep")
            .unwrap_err();
        assert!(matches!(err, Error::RetriesExhausted { .. }));
    }
}
