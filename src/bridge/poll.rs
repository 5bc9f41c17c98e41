// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The poll-variant bridge loop.
//!
//! Opens a fresh device session for every operation and drops it afterwards.
//! The full status is read on a fixed interval; dispatching a command forces
//! an immediate refresh so the published state reflects the write without
//! waiting out the interval.

use std::sync::Arc;
use std::time::Instant;

use crate::bridge::{ShutdownSignal, dispatch_command, emit_publish_set, unix_now};
use crate::bus::{BridgeTopics, StatusBus};
use crate::config::BridgeConfig;
use crate::device::{DeviceClient, DeviceConnector};
use crate::error::{Error, Result};
use crate::reconcile::Reconciler;
use crate::schema::DeviceSchema;

/// Bridge loop over short-lived device sessions.
///
/// Every command dispatch and every refresh opens its own session, paying
/// the full connection-setup cost each time. Acceptable at single-device
/// scale, and it sidesteps session-liveness tracking entirely.
#[derive(Debug)]
pub struct PollBridge<C, B> {
    connector: C,
    bus: B,
    topics: BridgeTopics,
    schema: Arc<DeviceSchema>,
    reconciler: Reconciler,
    config: BridgeConfig,
}

impl<C: DeviceConnector, B: StatusBus> PollBridge<C, B> {
    /// Creates a poll bridge over a session factory.
    #[must_use]
    pub fn new(config: BridgeConfig, schema: Arc<DeviceSchema>, connector: C, bus: B) -> Self {
        Self {
            connector,
            bus,
            topics: BridgeTopics::new(&config.topic_root),
            reconciler: Reconciler::new(Arc::clone(&schema), config.raw_publish),
            schema,
            config,
        }
    }

    /// Runs the bridge until the shutdown signal fires.
    ///
    /// The first refresh happens immediately and uses the startup retry
    /// budget; nothing is published until it succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RetriesExhausted`] if the initial refresh never
    /// succeeds within the budget, or a protocol error if a publication
    /// fails. Failed steady-state refreshes are logged and retried on the
    /// next interval.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) -> Result<()> {
        tracing::info!(root = %self.topics.root(), "Poll bridge starting");

        self.initial_refresh(&mut shutdown).await?;
        let mut last_refresh = Instant::now();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let mut force = false;
            while let Some(payload) = self.bus.poll_command() {
                if self.dispatch(&payload).await {
                    force = true;
                }
            }

            if force || last_refresh.elapsed() >= self.config.poll_interval {
                match self.refresh().await {
                    Ok(()) => {}
                    // A failed refresh waits out the next interval rather
                    // than hammering an unreachable device every iteration.
                    Err(e) => tracing::warn!(error = %e, "Status refresh failed"),
                }
                last_refresh = Instant::now();
            }

            tokio::select! {
                _ = shutdown.changed() => {}
                () = tokio::time::sleep(self.config.idle_sleep) => {}
            }
        }

        tracing::info!("Poll bridge stopped");
        Ok(())
    }

    /// Dispatches one command over its own session.
    ///
    /// Returns `true` when a device write happened, which forces a refresh.
    async fn dispatch(&mut self, payload: &str) -> bool {
        let mut client = match self.connector.connect().await {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot open device session for command");
                return false;
            }
        };

        match dispatch_command(payload, &self.schema, &mut client, &self.bus, &self.topics).await
        {
            Ok(dispatched) => dispatched,
            Err(e) => {
                tracing::warn!(error = %e, "Command dispatch failed");
                false
            }
        }
    }

    /// Reads the full status over a fresh session and publishes it.
    async fn refresh(&mut self) -> Result<()> {
        let mut client = self.connector.connect().await?;
        let update = client.full_status().await?;

        let publish = self.reconciler.observe_full(&update, unix_now());
        emit_publish_set(&self.bus, &self.topics, &publish)
            .await
            .map_err(Error::from)?;

        tracing::debug!(entries = update.dps.len(), "Refreshed full status");
        Ok(())
    }

    /// Performs the first refresh, retrying within the startup budget.
    async fn initial_refresh(&mut self, shutdown: &mut ShutdownSignal) -> Result<()> {
        let policy = self.config.startup_retry.clone();
        let mut attempt = 0;

        loop {
            match self.refresh().await {
                Ok(()) => return Ok(()),
                Err(e) => tracing::warn!(attempt, error = %e, "Initial refresh failed"),
            }

            attempt += 1;
            if !policy.should_retry(attempt) {
                return Err(Error::RetriesExhausted {
                    what: "initial status refresh".to_string(),
                    attempts: attempt,
                });
            }

            tokio::select! {
                _ = shutdown.changed() => {}
                () = tokio::time::sleep(policy.delay_for_attempt(attempt)) => {}
            }
            if *shutdown.borrow() {
                return Err(Error::RetriesExhausted {
                    what: "initial status refresh (interrupted by shutdown)".to_string(),
                    attempts: attempt,
                });
            }
        }
    }
}
