// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the bridge.
//!
//! This module provides the error hierarchy for failures across the crate:
//! configuration loading, bus/device communication, command translation, and
//! payload parsing.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred while loading or validating configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Error occurred during bus or device communication.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error occurred while translating an inbound command.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// Error occurred while parsing a payload.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Error occurred in the state cache.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// The startup retry budget was exhausted.
    #[error("gave up after {attempts} attempts: {what}")]
    RetriesExhausted {
        /// What was being retried.
        what: String,
        /// Number of attempts made before giving up.
        attempts: u32,
    },
}

/// Errors related to configuration files and lookups.
///
/// Every variant here is fatal for the bridge: without a complete
/// configuration there is no safe operation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Path of the file that failed to load.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration file could not be parsed.
    #[error("cannot parse {path}: {source}")]
    Json {
        /// Path of the file that failed to parse.
        path: String,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// A required configuration value is empty or missing.
    #[error("{0} is not defined")]
    MissingValue(&'static str),

    /// The configured device id has no entry in the device registry.
    #[error("no registry entry for device {0}")]
    UnknownDevice(String),
}

/// Errors related to bus and device communication.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// MQTT connection or communication failed.
    #[cfg(feature = "mqtt")]
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Connection could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation timed out.
    #[error("timed out after {0} ms")]
    Timeout(u64),

    /// Invalid broker or device address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Internal channel was closed.
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// The device reported or caused a failure.
    #[error("device error: {0}")]
    Device(String),
}

/// Errors produced by the command translator.
///
/// These are always recoverable: the bridge logs them and keeps running.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The command key is neither numeric nor a known schema name.
    #[error("cannot resolve command key: {0}")]
    UnresolvedKey(String),

    /// A quoted value is missing its closing quote.
    #[error("unterminated quoted value: {0}")]
    UnterminatedValue(String),

    /// The command has a delimiter but no key.
    #[error("empty command key")]
    EmptyKey,
}

/// Errors related to parsing device payloads.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Expected field is missing from the payload.
    #[error("missing field: {0}")]
    MissingField(String),
}

/// Errors related to the state cache.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    /// A delta arrived before any full status read.
    #[error("state cache is not initialized")]
    NotInitialized,
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
