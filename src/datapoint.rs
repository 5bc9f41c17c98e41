// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Data-point types shared across the bridge.
//!
//! A smart-outlet style device reports its state as a set of numbered
//! *data points* (`dps`). Each data point pairs a small numeric id with a
//! dynamically typed value; the meaning of an id is device-type specific and
//! resolved through a [`DeviceSchema`](crate::schema::DeviceSchema).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Numeric identifier of a single data point.
///
/// On the wire data-point ids appear as decimal strings (JSON object keys),
/// so this type serializes transparently as its inner number.
///
/// # Examples
///
/// ```
/// use dpbridge::DpId;
///
/// let id: DpId = "20".parse().unwrap();
/// assert_eq!(id, DpId::new(20));
/// assert_eq!(id.to_string(), "20");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DpId(u32);

impl DpId {
    /// Creates a data-point id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw numeric id.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for DpId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl From<u32> for DpId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Value of a single data point.
///
/// The value type is determined by the device schema, not statically fixed;
/// a data point may carry a boolean, an integer, or a string. JSON
/// round-trips preserve the variant: booleans stay booleans, integers stay
/// integers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DpValue {
    /// A boolean value (e.g. relay on/off).
    Bool(bool),
    /// An integer value (e.g. a temperature or countdown).
    Int(i64),
    /// A string value (e.g. a mode name).
    Text(String),
}

impl DpValue {
    /// Returns the boolean value, if this is a boolean.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer value, if this is an integer.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the string value, if this is a string.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for DpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => b.fmt(f),
            Self::Int(i) => i.fmt(f),
            Self::Text(s) => s.fmt(f),
        }
    }
}

impl From<bool> for DpValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for DpValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<&str> for DpValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for DpValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Ordered mapping from data-point id to value.
///
/// Used both for full snapshots and for partial deltas; ordering keeps the
/// published JSON deterministic.
pub type DpMap = BTreeMap<DpId, DpValue>;

/// One status message from the device.
///
/// Full reads and incremental deltas share this envelope: a `dps` object
/// keyed by data-point id, plus an optional device-reported unix timestamp
/// (`t`) that unsolicited delta pushes carry.
///
/// # Examples
///
/// ```
/// use dpbridge::StatusUpdate;
///
/// let update: StatusUpdate =
///     serde_json::from_str(r#"{"dps":{"1":true,"2":21},"t":1700000000}"#).unwrap();
/// assert_eq!(update.dps.len(), 2);
/// assert_eq!(update.t, Some(1_700_000_000));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Data points carried by this message.
    pub dps: DpMap,

    /// Device-reported unix timestamp, if present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<i64>,
}

impl StatusUpdate {
    /// Creates a status update from a list of (id, value) pairs.
    #[must_use]
    pub fn from_pairs(pairs: impl IntoIterator<Item = (u32, DpValue)>) -> Self {
        Self {
            dps: pairs
                .into_iter()
                .map(|(id, value)| (DpId::new(id), value))
                .collect(),
            t: None,
        }
    }

    /// Parses a status payload from its JSON text.
    ///
    /// Devices occasionally answer with JSON that carries no `dps` object
    /// (error frames, empty keep-alive replies); those are rejected
    /// explicitly instead of being decoded as an empty update. Intended for
    /// [`DeviceClient`](crate::device::DeviceClient) implementations that
    /// receive raw payload text.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Json`] for malformed JSON and
    /// [`ParseError::MissingField`] when the `dps` object is absent.
    ///
    /// # Examples
    ///
    /// ```
    /// use dpbridge::StatusUpdate;
    ///
    /// let update = StatusUpdate::from_json(r#"{"dps":{"2":21},"t":1700000000}"#).unwrap();
    /// assert_eq!(update.t, Some(1_700_000_000));
    ///
    /// assert!(StatusUpdate::from_json(r#"{"Error":"905"}"#).is_err());
    /// ```
    pub fn from_json(text: &str) -> Result<Self, ParseError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if value.get("dps").is_none() {
            return Err(ParseError::MissingField("dps".to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Sets the device-reported timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, t: i64) -> Self {
        self.t = Some(t);
        self
    }

    /// Returns `true` if this update carries no data points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dps.is_empty()
    }
}
