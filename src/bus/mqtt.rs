// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT implementation of the status bus.
//!
//! Maintains one persistent broker connection per bridge process. The
//! connection announces liveness on the `running` topic: `"1"` retained on
//! every successful connect, `"0"` retained as the broker-side last will and
//! again explicitly on clean shutdown, so subscribers always see liveness go
//! false.
//!
//! # Examples
//!
//! ```no_run
//! use dpbridge::bus::mqtt::MqttBus;
//! use dpbridge::BridgeTopics;
//!
//! # async fn example() -> dpbridge::Result<()> {
//! let bus = MqttBus::builder(BridgeTopics::new("outlet"))
//!     .host("192.168.1.50")
//!     .port(1883)
//!     .credentials("user", "password")
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use rumqttc::{AsyncClient, EventLoop, LastWill, MqttOptions, QoS};
use tokio::sync::oneshot;

use crate::bus::{BridgeTopics, CommandQueue, NOT_RUNNING, RUNNING, StatusBus};
use crate::config::{BrokerSettings, RetryPolicy};
use crate::error::{Error, ProtocolError};

/// Global counter for generating unique client IDs.
static BUS_CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A connected MQTT status bus.
///
/// Cheaply cloneable (via `Arc`); the background event task and the bridge
/// loop share one instance.
#[derive(Clone)]
pub struct MqttBus {
    inner: Arc<MqttBusInner>,
}

struct MqttBusInner {
    /// The MQTT async client for publishing.
    client: AsyncClient,
    /// Topic layout this bus serves.
    topics: BridgeTopics,
    /// FIFO fed by the event task with inbound control payloads.
    queue: CommandQueue,
    /// Connection status.
    connected: AtomicBool,
}

impl MqttBus {
    /// Creates a new builder for the given topic layout.
    #[must_use]
    pub fn builder(topics: BridgeTopics) -> MqttBusBuilder {
        MqttBusBuilder::new(topics)
    }

    /// Connects with a bounded retry budget.
    ///
    /// Each failed connection attempt is logged and retried after the
    /// policy's delay; once the budget is exhausted the error is fatal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RetriesExhausted`] when the budget runs out.
    pub async fn connect_with_retry(
        settings: &BrokerSettings,
        topics: BridgeTopics,
        policy: &RetryPolicy,
    ) -> Result<Self, Error> {
        let mut attempt = 0;
        loop {
            let mut builder = Self::builder(topics.clone())
                .host(&settings.host)
                .port(settings.port);
            if let Some((username, password)) = &settings.credentials {
                builder = builder.credentials(username, password);
            }

            match builder.build().await {
                Ok(bus) => return Ok(bus),
                Err(e) => {
                    attempt += 1;
                    if !policy.should_retry(attempt) {
                        tracing::error!(
                            host = %settings.host,
                            port = settings.port,
                            error = %e,
                            "Cannot connect to broker, retry budget exhausted"
                        );
                        return Err(Error::RetriesExhausted {
                            what: format!("broker connection to {}:{}", settings.host, settings.port),
                            attempts: attempt,
                        });
                    }
                    tracing::info!(attempt, error = %e, "Waiting for broker connection");
                    tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                }
            }
        }
    }

    /// Returns whether the bus is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Returns the topic layout this bus serves.
    #[must_use]
    pub fn topics(&self) -> &BridgeTopics {
        &self.inner.topics
    }

    /// Disconnects cleanly.
    ///
    /// Publishes the retained `"0"` liveness payload before closing so
    /// subscribers see the bridge go down even though the last will is not
    /// triggered by a clean disconnect.
    ///
    /// # Errors
    ///
    /// Returns error if the final publish or the disconnect fails.
    pub async fn disconnect(&self) -> Result<(), ProtocolError> {
        tracing::info!("Disconnecting from broker");

        self.inner
            .client
            .publish(
                self.inner.topics.running(),
                QoS::AtLeastOnce,
                true,
                NOT_RUNNING,
            )
            .await
            .map_err(ProtocolError::Mqtt)?;

        self.inner
            .client
            .disconnect()
            .await
            .map_err(ProtocolError::Mqtt)?;

        self.inner.connected.store(false, Ordering::Release);
        Ok(())
    }
}

impl StatusBus for MqttBus {
    async fn publish(
        &self,
        topic: &str,
        payload: String,
        retain: bool,
    ) -> Result<(), ProtocolError> {
        tracing::debug!(topic = %topic, payload = %payload, retain, "Publishing");
        self.inner
            .client
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .await
            .map_err(ProtocolError::Mqtt)
    }

    fn poll_command(&self) -> Option<String> {
        self.inner.queue.pop()
    }
}

impl std::fmt::Debug for MqttBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttBus")
            .field("root", &self.inner.topics.root())
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Builder for an MQTT bus connection.
#[derive(Debug)]
pub struct MqttBusBuilder {
    topics: BridgeTopics,
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    keep_alive: Duration,
    connection_timeout: Duration,
}

impl MqttBusBuilder {
    /// Creates a builder with default timing settings.
    #[must_use]
    pub fn new(topics: BridgeTopics) -> Self {
        Self {
            topics,
            host: String::new(),
            port: 1883,
            credentials: None,
            keep_alive: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
        }
    }

    /// Sets the broker host address.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the broker port (default: 1883).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets authentication credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets the keep-alive interval (default: 30 seconds).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.keep_alive = duration;
        self
    }

    /// Sets the connection timeout (default: 10 seconds).
    #[must_use]
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.connection_timeout = duration;
        self
    }

    /// Builds and connects the bus.
    ///
    /// Subscribes both control topics and waits for the broker's ConnAck
    /// before returning, so a returned bus is ready to publish.
    ///
    /// # Errors
    ///
    /// Returns error if the host is missing, the connection fails, or the
    /// ConnAck does not arrive within the timeout.
    pub async fn build(self) -> Result<MqttBus, ProtocolError> {
        if self.host.is_empty() {
            return Err(ProtocolError::InvalidAddress(
                "broker host is required".to_string(),
            ));
        }

        let counter = BUS_CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let client_id = format!("dpbridge_{}_{}", std::process::id(), counter);

        let mut mqtt_options = MqttOptions::new(&client_id, &self.host, self.port);
        mqtt_options.set_keep_alive(self.keep_alive);
        mqtt_options.set_clean_session(true);
        mqtt_options.set_last_will(LastWill::new(
            self.topics.running(),
            NOT_RUNNING,
            QoS::AtLeastOnce,
            true,
        ));

        if let Some((ref username, ref password)) = self.credentials {
            mqtt_options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);

        // Queue the control subscriptions; they take effect once connected.
        client
            .subscribe(self.topics.set(), QoS::AtLeastOnce)
            .await
            .map_err(ProtocolError::Mqtt)?;
        client
            .subscribe(self.topics.set_command(), QoS::AtLeastOnce)
            .await
            .map_err(ProtocolError::Mqtt)?;

        let inner = MqttBusInner {
            client,
            topics: self.topics,
            queue: CommandQueue::new(),
            connected: AtomicBool::new(false),
        };
        let bus = MqttBus {
            inner: Arc::new(inner),
        };

        // Channel to signal when ConnAck is received
        let (connack_tx, connack_rx) = oneshot::channel();

        let bus_clone = bus.clone();
        tokio::spawn(async move {
            handle_bus_events(event_loop, bus_clone, Some(connack_tx)).await;
        });

        match tokio::time::timeout(self.connection_timeout, connack_rx).await {
            Ok(Ok(())) => {
                tracing::info!(host = %self.host, port = self.port, "Connected to broker");
            }
            Ok(Err(_)) => {
                return Err(ProtocolError::ConnectionFailed(
                    "MQTT event loop terminated unexpectedly".to_string(),
                ));
            }
            Err(_) => {
                return Err(ProtocolError::ConnectionFailed(format!(
                    "MQTT connection timeout after {}s",
                    self.connection_timeout.as_secs()
                )));
            }
        }

        Ok(bus)
    }
}

/// Handles MQTT events for the bus connection.
async fn handle_bus_events(
    mut event_loop: EventLoop,
    bus: MqttBus,
    connack_tx: Option<oneshot::Sender<()>>,
) {
    use rumqttc::{Event, Packet};

    let mut connack_tx = connack_tx;

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "Broker connected");
                bus.inner.connected.store(true, Ordering::Release);

                // Liveness goes true on every (re)connect.
                if let Err(e) = bus
                    .inner
                    .client
                    .publish(
                        bus.inner.topics.running(),
                        QoS::AtLeastOnce,
                        true,
                        RUNNING,
                    )
                    .await
                {
                    tracing::warn!(error = %e, "Failed to publish liveness");
                }

                if let Some(tx) = connack_tx.take() {
                    let _ = tx.send(());
                }
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::debug!(?suback, "Subscription acknowledged");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if !bus.inner.topics.is_command_topic(&publish.topic) {
                    continue;
                }
                match String::from_utf8(publish.payload.to_vec()) {
                    Ok(payload) => {
                        tracing::debug!(topic = %publish.topic, payload = %payload, "Queued command");
                        bus.inner.queue.push(payload);
                    }
                    Err(e) => {
                        tracing::error!(topic = %publish.topic, error = %e, "Non-UTF-8 command payload");
                    }
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::info!("Broker disconnected");
                bus.inner.connected.store(false, Ordering::Release);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "Bus event loop error");
                bus.inner.connected.store(false, Ordering::Release);
                break;
            }
        }
    }
}
