// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bridge configuration.
//!
//! Configuration is assembled once at startup from small JSON files (topic
//! root, device registry, device-type profile) plus broker settings supplied
//! by the host environment, and then passed explicitly to the components
//! that need it. There is no process-wide mutable configuration state.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::reconcile::RawPublishPolicy;

/// Topic root used when the plugin configuration leaves it unset.
pub const DEFAULT_TOPIC_ROOT: &str = "outlet";

/// Complete configuration for one bridge process.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use dpbridge::{BridgeConfig, BrokerSettings, DeviceIdentity};
///
/// let config = BridgeConfig::new(
///     "poolhouse",
///     BrokerSettings::new("192.168.1.50", 1883),
///     DeviceIdentity::new("bf3a1f8e", "f00dfeed", "3.3"),
/// )
/// .with_poll_interval(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Topic root all bus topics hang under.
    pub topic_root: String,
    /// Message-bus broker settings.
    pub broker: BrokerSettings,
    /// Identity of the single bridged device.
    pub device: DeviceIdentity,
    /// Retry budget for startup blocking points (bus connect, first read).
    pub startup_retry: RetryPolicy,
    /// Interval between periodic full status reads (poll variant).
    pub poll_interval: Duration,
    /// Sleep between steady-state loop iterations.
    pub idle_sleep: Duration,
    /// Cadence of the raw snapshot publication.
    pub raw_publish: RawPublishPolicy,
}

impl BridgeConfig {
    /// Creates a configuration with default timing and retry settings.
    #[must_use]
    pub fn new(
        topic_root: impl Into<String>,
        broker: BrokerSettings,
        device: DeviceIdentity,
    ) -> Self {
        Self {
            topic_root: topic_root.into(),
            broker,
            device,
            startup_retry: RetryPolicy::default(),
            poll_interval: Duration::from_secs(60),
            idle_sleep: Duration::from_millis(100),
            raw_publish: RawPublishPolicy::default(),
        }
    }

    /// Sets the startup retry policy.
    #[must_use]
    pub fn with_startup_retry(mut self, policy: RetryPolicy) -> Self {
        self.startup_retry = policy;
        self
    }

    /// Sets the periodic poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the steady-state idle sleep.
    #[must_use]
    pub fn with_idle_sleep(mut self, sleep: Duration) -> Self {
        self.idle_sleep = sleep;
        self
    }

    /// Sets the raw publication cadence.
    #[must_use]
    pub fn with_raw_publish(mut self, policy: RawPublishPolicy) -> Self {
        self.raw_publish = policy;
        self
    }
}

/// Message-bus broker settings.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// Broker host name or address.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Optional (username, password) credentials.
    pub credentials: Option<(String, String)>,
}

impl BrokerSettings {
    /// Creates broker settings without credentials.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            credentials: None,
        }
    }

    /// Sets broker credentials.
    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }
}

/// Identity of the bridged device, resolved from the registry.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    /// Device id on the local network.
    pub id: String,
    /// Local encryption key.
    pub key: String,
    /// Protocol version string (e.g. `"3.3"`).
    pub version: String,
    /// Friendly name, if the registry carries one.
    pub name: Option<String>,
}

impl DeviceIdentity {
    /// Creates a device identity.
    #[must_use]
    pub fn new(id: impl Into<String>, key: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            version: version.into(),
            name: None,
        }
    }

    /// Sets the friendly name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Bounded retry policy for startup blocking points.
///
/// Expressed as configuration rather than inlined sleep counts so the policy
/// is independently testable. The default matches the historical behavior:
/// 60 attempts paced one second apart, no backoff.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use dpbridge::RetryPolicy;
///
/// let policy = RetryPolicy::default();
/// assert!(policy.should_retry(0));
/// assert!(!policy.should_retry(60));
/// assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts before escalating to fatal.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap on the delay between attempts.
    pub max_delay: Duration,
    /// Multiplier applied to the delay per attempt (1.0 = fixed interval).
    pub backoff_multiplier: f32,
}

impl RetryPolicy {
    /// Creates a fixed-interval policy.
    #[must_use]
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: interval,
            max_delay: interval,
            backoff_multiplier: 1.0,
        }
    }

    /// Returns `true` if another attempt is within budget.
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Calculates the delay before the given retry attempt.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let multiplier = self
            .backoff_multiplier
            .powi(i32::try_from(attempt).unwrap_or(i32::MAX));

        // Safe: startup delays are seconds, nowhere near precision limits
        #[allow(clippy::cast_precision_loss)]
        let delay_ms = self.initial_delay.as_millis() as f32 * multiplier;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let delay = Duration::from_millis(delay_ms as u64);

        delay.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(60, Duration::from_secs(1))
    }
}

/// Loads the topic root from the plugin configuration file.
///
/// An unset or empty topic falls back to [`DEFAULT_TOPIC_ROOT`] with a
/// warning, matching the historical behavior.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file cannot be read or parsed.
pub fn load_topic_root(path: impl AsRef<Path>) -> Result<String, ConfigError> {
    #[derive(Deserialize)]
    struct PluginConfig {
        #[serde(default)]
        topic: String,
    }

    let plugin: PluginConfig = read_json(path.as_ref())?;
    if plugin.topic.is_empty() {
        tracing::warn!(
            default = DEFAULT_TOPIC_ROOT,
            "Topic root is not set, using default"
        );
        Ok(DEFAULT_TOPIC_ROOT.to_string())
    } else {
        Ok(plugin.topic)
    }
}

/// One entry of the device registry file.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryEntry {
    /// Device id.
    pub id: String,
    /// Local encryption key.
    #[serde(default)]
    pub key: String,
    /// Friendly name.
    #[serde(default)]
    pub name: Option<String>,
    /// Protocol version string.
    #[serde(default)]
    pub version: Option<String>,
    /// Product name reported by the vendor registry.
    #[serde(default)]
    pub product_name: Option<String>,
}

/// The device registry: every locally known device with its key.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    entries: Vec<RegistryEntry>,
}

impl DeviceRegistry {
    /// Loads the registry from its JSON file (an array of entries).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let entries: Vec<RegistryEntry> = read_json(path.as_ref())?;
        tracing::info!(devices = entries.len(), "Loaded device registry");
        Ok(Self { entries })
    }

    /// Resolves a device id to a usable identity.
    ///
    /// The first registry entry with a matching id wins.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownDevice`] if no entry matches or the
    /// matching entry has no key. Fatal: without the key there is no way to
    /// talk to the device.
    pub fn resolve(&self, device_id: &str) -> Result<DeviceIdentity, ConfigError> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.id == device_id)
            .ok_or_else(|| ConfigError::UnknownDevice(device_id.to_string()))?;

        if entry.key.is_empty() {
            return Err(ConfigError::UnknownDevice(device_id.to_string()));
        }

        let mut identity = DeviceIdentity::new(
            &entry.id,
            &entry.key,
            entry.version.as_deref().unwrap_or("3.3"),
        );
        if let Some(name) = &entry.name {
            identity = identity.with_name(name);
        }
        Ok(identity)
    }

    /// Returns the number of registry entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reads and parses one JSON config file.
fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Json {
        path: path.display().to_string(),
        source,
    })
}
