// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `dpbridge` - A bridge between a data-point smart device and MQTT.
//!
//! This library connects a single local smart device that reports its state
//! as numbered data points (sparse `{"dps": {...}}` updates) to an MQTT
//! broker, publishing a human-readable view of the device state and
//! accepting free-text write commands.
//!
//! # What the bridge does
//!
//! - **State reconciliation**: full reads and incremental deltas are merged
//!   into one cached snapshot; nothing is published before the first
//!   complete read.
//! - **Key renaming**: numeric data-point ids are projected through a
//!   per-device-type schema into named JSON keys (`{"1": true}` becomes
//!   `{"pump": true}`); unknown ids pass through numerically.
//! - **Command translation**: inbound `<key>,<value>` messages are resolved
//!   against the same schema and written to the device, with a retained
//!   sentinel reset so re-delivered commands are not re-applied.
//! - **Liveness**: a retained `running` flag with a broker-side last will.
//!
//! # Bridge variants
//!
//! Two loop variants cover the two device session styles:
//!
//! - [`PushBridge`] holds one persistent session and merges deltas the
//!   device pushes on its own.
//! - [`PollBridge`] opens a short-lived session per operation and reads the
//!   full status on an interval, or immediately after a command.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use dpbridge::{
//!     BridgeConfig, BrokerSettings, BridgeTopics, DeviceRegistry, DeviceSchema,
//!     PollBridge, bus::mqtt::MqttBus, shutdown_channel, shutdown_on_signals,
//! };
//!
//! # async fn example<C: dpbridge::DeviceConnector>(connector: C) -> dpbridge::Result<()> {
//! let topic_root = dpbridge::load_topic_root("/etc/dpbridge/plugin.json")?;
//! let registry = DeviceRegistry::load("/etc/dpbridge/devices.json")?;
//! let device = registry.resolve("bf3a1f8e")?;
//! let schema = Arc::new(DeviceSchema::load("/etc/dpbridge/device_type.json")?);
//!
//! let config = BridgeConfig::new(
//!     &topic_root,
//!     BrokerSettings::new("192.168.1.50", 1883),
//!     device,
//! );
//!
//! let bus = MqttBus::connect_with_retry(
//!     &config.broker,
//!     BridgeTopics::new(&config.topic_root),
//!     &config.startup_retry,
//! )
//! .await?;
//!
//! let (handle, signal) = shutdown_channel();
//! shutdown_on_signals(handle);
//!
//! let result = PollBridge::new(config, schema, connector, bus.clone())
//!     .run(signal)
//!     .await;
//!
//! bus.disconnect().await?;
//! result
//! # }
//! ```
//!
//! The device wire protocol itself is not part of this crate: the bridge
//! loops are generic over the [`DeviceClient`] / [`DeviceConnector`] traits,
//! and an embedding binary supplies the implementation that speaks to the
//! actual hardware.

pub mod bridge;
pub mod bus;
pub mod command;
pub mod config;
pub mod datapoint;
pub mod device;
pub mod error;
pub mod reconcile;
pub mod schema;
pub mod state;

pub use bridge::{
    PollBridge, PushBridge, ShutdownHandle, ShutdownSignal, shutdown_channel, shutdown_on_signals,
};
pub use bus::{BridgeTopics, CommandQueue, NOT_RUNNING, RUNNING, StatusBus};
pub use command::{COMMAND_SENTINEL, PendingCommand, Translation, translate};
pub use config::{
    BridgeConfig, BrokerSettings, DEFAULT_TOPIC_ROOT, DeviceIdentity, DeviceRegistry,
    RegistryEntry, RetryPolicy, load_topic_root,
};
pub use datapoint::{DpId, DpMap, DpValue, StatusUpdate};
pub use device::{DeviceClient, DeviceConnector};
pub use error::{
    CommandError, ConfigError, Error, ParseError, ProtocolError, Result, StateError,
};
pub use reconcile::{PublishSet, RawPublishPolicy, Reconciler, renamed_view};
pub use schema::{DeviceSchema, SchemaEntry};
pub use state::StateCache;
