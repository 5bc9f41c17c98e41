// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device-type schema: numeric data-point id to human-readable name.
//!
//! Each device type ships a JSON profile listing its data points. The schema
//! is loaded once at startup and stays read-only for the process lifetime;
//! a missing or unparseable profile is fatal because without it neither
//! renaming nor name-based commands are possible.

use std::path::Path;

use serde::Deserialize;

use crate::datapoint::DpId;
use crate::error::ConfigError;

/// One (id, name) entry of a device-type schema.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchemaEntry {
    /// The numeric data-point id. Profiles written by hand sometimes quote
    /// the id, so both `1` and `"1"` are accepted.
    #[serde(deserialize_with = "deserialize_id")]
    pub id: DpId,
    /// The human-readable name published in place of the id.
    pub name: String,
}

/// Ordered id ↔ name mapping for one device type.
///
/// Both lookup directions are linear scans where the *first* match wins: if a
/// profile accidentally defines duplicate ids or names, the earliest entry in
/// load order silently shadows later ones.
///
/// # Examples
///
/// ```
/// use dpbridge::{DeviceSchema, DpId};
///
/// let schema = DeviceSchema::from_pairs([(1, "pump"), (2, "temp")]);
/// assert_eq!(schema.id_to_name(DpId::new(1)), Some("pump"));
/// assert_eq!(schema.name_to_id("temp"), Some(DpId::new(2)));
/// assert_eq!(schema.id_to_name(DpId::new(9)), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSchema {
    entries: Vec<SchemaEntry>,
}

impl DeviceSchema {
    /// Creates a schema from an ordered entry list.
    #[must_use]
    pub fn new(entries: Vec<SchemaEntry>) -> Self {
        Self { entries }
    }

    /// Creates a schema from (id, name) pairs, mostly useful in tests.
    #[must_use]
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (u32, &'a str)>) -> Self {
        Self {
            entries: pairs
                .into_iter()
                .map(|(id, name)| SchemaEntry {
                    id: DpId::new(id),
                    name: name.to_string(),
                })
                .collect(),
        }
    }

    /// Loads the schema from a device-type JSON profile.
    ///
    /// The profile format matches the per-type device files:
    /// `{"primary_entity":{"dps":[{"id":1,"name":"pump"},...]}}`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed. This is
    /// fatal for the bridge.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let profile: DeviceProfile =
            serde_json::from_str(&text).map_err(|source| ConfigError::Json {
                path: path.display().to_string(),
                source,
            })?;

        tracing::info!(
            path = %path.display(),
            entries = profile.primary_entity.dps.len(),
            "Loaded device schema"
        );

        Ok(Self::new(profile.primary_entity.dps))
    }

    /// Resolves a data-point id to its schema name.
    ///
    /// Returns `None` for ids the schema does not know; callers leave those
    /// numeric.
    #[must_use]
    pub fn id_to_name(&self, id: DpId) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.name.as_str())
    }

    /// Resolves a schema name to its data-point id.
    #[must_use]
    pub fn name_to_id(&self, name: &str) -> Option<DpId> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.id)
    }

    /// Returns the number of schema entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the schema has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates the entries in load order.
    pub fn entries(&self) -> impl Iterator<Item = &SchemaEntry> {
        self.entries.iter()
    }
}

/// On-disk shape of a device-type profile.
#[derive(Debug, Deserialize)]
struct DeviceProfile {
    primary_entity: PrimaryEntity,
}

#[derive(Debug, Deserialize)]
struct PrimaryEntity {
    dps: Vec<SchemaEntry>,
}

/// Accepts a data-point id written either as a number or as a string.
fn deserialize_id<'de, D>(deserializer: D) -> Result<DpId, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Num(u32),
        Str(String),
    }

    match IdRepr::deserialize(deserializer)? {
        IdRepr::Num(id) => Ok(DpId::new(id)),
        IdRepr::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
