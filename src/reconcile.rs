// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The reconciliation core: merge device updates into the snapshot and
//! decide what to publish.
//!
//! After every device observation the reconciler merges the incoming data
//! into the [`StateCache`], projects the merged snapshot through the device
//! schema into a renamed view, and produces a [`PublishSet`] describing the
//! retained publications the bridge loop must emit.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::datapoint::{DpId, DpMap, StatusUpdate};
use crate::schema::DeviceSchema;
use crate::state::StateCache;

/// When the raw (numeric-key) snapshot is republished.
///
/// The renamed view goes out on every update; the raw view historically went
/// out only on full reads. That asymmetry is kept as an explicit policy
/// rather than silently unified, since it differs between the two observed
/// bridge variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RawPublishPolicy {
    /// Publish the raw snapshot only on the initial read and forced
    /// refreshes, not on incremental deltas (push-variant behavior).
    #[default]
    FullReadsOnly,
    /// Publish the raw snapshot on every update, deltas included.
    EveryUpdate,
}

/// One round of retained publications produced by the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishSet {
    /// The renamed view of the snapshot, for the `status` topic.
    pub status: Value,
    /// The raw snapshot envelope for the `status_raw` topic, when the
    /// [`RawPublishPolicy`] calls for it.
    pub status_raw: Option<Value>,
    /// Unix timestamp for the `last` topic: the device-reported delta
    /// timestamp when present, else the wall clock of the read.
    pub last: i64,
}

/// Merges device updates into the snapshot and shapes publications.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use dpbridge::{DeviceSchema, DpValue, Reconciler, StatusUpdate};
///
/// let schema = Arc::new(DeviceSchema::from_pairs([(1, "pump"), (2, "temp")]));
/// let mut reconciler = Reconciler::new(schema, Default::default());
///
/// let first = StatusUpdate::from_pairs([(1, DpValue::Bool(true)), (2, DpValue::Int(20))]);
/// let publish = reconciler.observe_full(&first, 1_700_000_000);
/// assert_eq!(publish.status["pump"], serde_json::json!(true));
/// assert!(publish.status_raw.is_some());
/// ```
#[derive(Debug)]
pub struct Reconciler {
    cache: StateCache,
    schema: Arc<DeviceSchema>,
    raw_policy: RawPublishPolicy,
}

impl Reconciler {
    /// Creates a reconciler with an empty cache.
    #[must_use]
    pub fn new(schema: Arc<DeviceSchema>, raw_policy: RawPublishPolicy) -> Self {
        Self {
            cache: StateCache::new(),
            schema,
            raw_policy,
        }
    }

    /// Returns `true` once at least one full status read has been observed.
    ///
    /// No publication happens before that point.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.cache.is_initialized()
    }

    /// Read-only view of the cached snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Option<&DpMap> {
        self.cache.current()
    }

    /// Observes a full status read (initial read or forced refresh).
    ///
    /// The first read installs the snapshot; later full reads are merged so
    /// the key set stays monotonic. The raw publication is always included
    /// for full reads, under either policy.
    pub fn observe_full(&mut self, update: &StatusUpdate, now: i64) -> PublishSet {
        if self.cache.is_initialized() {
            // A full read is a superset of itself; merging keeps keys that
            // the device may have stopped reporting.
            let _ = self.cache.merge(&update.dps);
        } else {
            self.cache.initialize(update.dps.clone());
        }

        tracing::debug!(entries = update.dps.len(), "Observed full status");
        self.publish_set(true, update.t, now)
    }

    /// Observes an incremental delta.
    ///
    /// Returns `None` before the first full read: a delta alone is not a
    /// complete state and must not be published. Unknown ids are merged like
    /// any other and published under their numeric key.
    pub fn observe_delta(&mut self, update: &StatusUpdate, now: i64) -> Option<PublishSet> {
        if self.cache.merge(&update.dps).is_err() {
            tracing::warn!("Dropping delta received before first full status read");
            return None;
        }

        tracing::debug!(entries = update.dps.len(), "Merged delta");
        let include_raw = self.raw_policy == RawPublishPolicy::EveryUpdate;
        Some(self.publish_set(include_raw, update.t, now))
    }

    /// Builds the publish set for the current snapshot.
    fn publish_set(&self, include_raw: bool, reported: Option<i64>, now: i64) -> PublishSet {
        let snapshot = self
            .cache
            .current()
            .expect("publish_set is only called after the cache is populated");

        let status = Value::Object(renamed_view(snapshot, &self.schema));
        let status_raw = include_raw.then(|| {
            serde_json::to_value(StatusUpdate {
                dps: snapshot.clone(),
                t: None,
            })
            .expect("snapshot serialization cannot fail")
        });

        PublishSet {
            status,
            status_raw,
            last: reported.unwrap_or(now),
        }
    }
}

/// Projects a snapshot through the schema into a fresh renamed view.
///
/// Ids with a schema entry are keyed by their name; unknown ids keep their
/// decimal key. The view always has the same number of entries as the
/// snapshot: every id's decimal key is reserved for that id, so a rename may
/// not claim the decimal form of a *different* snapshot id, and a rename
/// whose target key is unavailable (duplicate schema names, or a name equal
/// to another id's decimal form) falls back to the entry's own decimal key,
/// which is guaranteed free.
#[must_use]
pub fn renamed_view(snapshot: &DpMap, schema: &DeviceSchema) -> Map<String, Value> {
    let mut view = Map::with_capacity(snapshot.len());
    let to_json =
        |value| serde_json::to_value(value).expect("data-point value is always valid JSON");

    // Unnamed ids first, so their decimal keys are taken before renames.
    for (id, value) in snapshot {
        if schema.id_to_name(*id).is_none() {
            view.insert(id.to_string(), to_json(value));
        }
    }

    for (id, value) in snapshot {
        let Some(name) = schema.id_to_name(*id) else {
            continue;
        };

        // The decimal key of every snapshot id is reserved for that id,
        // whether it is renamed or not.
        let reserved_for_other = name
            .parse::<DpId>()
            .is_ok_and(|named| named != *id && snapshot.contains_key(&named));

        let key = if view.contains_key(name) || reserved_for_other {
            tracing::warn!(id = %id, name = %name, "Schema name collision, keeping numeric key");
            id.to_string()
        } else {
            name.to_owned()
        };

        view.insert(key, to_json(value));
    }

    view
}
