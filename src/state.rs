// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The single in-process snapshot of device state.

use crate::datapoint::{DpId, DpMap, DpValue};
use crate::error::StateError;

/// Cache of the last known complete device state.
///
/// Exactly one cache exists per bridge. It starts empty; the first successful
/// full status read installs the snapshot, and every later delta is merged in
/// place. Keys are never removed and entries never expire: the cache models
/// "always the latest known value per id". The bridge loop is the sole reader
/// and writer, so no locking is needed.
///
/// # Examples
///
/// ```
/// use dpbridge::{DpValue, StateCache, StatusUpdate};
///
/// let mut cache = StateCache::new();
/// cache.initialize(StatusUpdate::from_pairs([(1, DpValue::Bool(true))]).dps);
///
/// cache.merge(&StatusUpdate::from_pairs([(2, DpValue::Int(20))]).dps).unwrap();
/// assert_eq!(cache.current().unwrap().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateCache {
    snapshot: Option<DpMap>,
}

impl StateCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once a full status read has been installed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Installs a full status read, replacing any prior snapshot.
    pub fn initialize(&mut self, full: DpMap) {
        tracing::debug!(entries = full.len(), "Installing full snapshot");
        self.snapshot = Some(full);
    }

    /// Merges a delta into the snapshot.
    ///
    /// Every (id, value) pair in the delta overwrites the snapshot entry with
    /// that id, inserting it if new. The key set only ever grows.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::NotInitialized`] if no full status read has been
    /// installed yet.
    pub fn merge(&mut self, delta: &DpMap) -> Result<(), StateError> {
        let snapshot = self.snapshot.as_mut().ok_or(StateError::NotInitialized)?;
        for (id, value) in delta {
            snapshot.insert(*id, value.clone());
        }
        Ok(())
    }

    /// Read-only view of the snapshot, if one exists.
    #[must_use]
    pub fn current(&self) -> Option<&DpMap> {
        self.snapshot.as_ref()
    }

    /// Convenience lookup of a single data point.
    #[must_use]
    pub fn get(&self, id: DpId) -> Option<&DpValue> {
        self.snapshot.as_ref()?.get(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datapoint::StatusUpdate;

    fn dps(pairs: &[(u32, DpValue)]) -> DpMap {
        StatusUpdate::from_pairs(pairs.iter().cloned()).dps
    }

    #[test]
    fn new_cache_is_uninitialized() {
        let cache = StateCache::new();
        assert!(!cache.is_initialized());
        assert!(cache.current().is_none());
    }

    #[test]
    fn merge_before_initialize_is_rejected() {
        let mut cache = StateCache::new();
        let err = cache.merge(&dps(&[(1, DpValue::Bool(true))])).unwrap_err();
        assert_eq!(err, StateError::NotInitialized);
    }

    #[test]
    fn merge_overwrites_and_inserts() {
        let mut cache = StateCache::new();
        cache.initialize(dps(&[(1, DpValue::Bool(true)), (2, DpValue::Int(20))]));

        cache
            .merge(&dps(&[(2, DpValue::Int(21)), (9, DpValue::Text("eco".into()))]))
            .unwrap();

        let snapshot = cache.current().unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(cache.get(DpId::new(1)), Some(&DpValue::Bool(true)));
        assert_eq!(cache.get(DpId::new(2)), Some(&DpValue::Int(21)));
        assert_eq!(cache.get(DpId::new(9)), Some(&DpValue::Text("eco".into())));
    }

    #[test]
    fn merge_keys_only_grow() {
        let mut cache = StateCache::new();
        cache.initialize(dps(&[(1, DpValue::Bool(true)), (2, DpValue::Int(20))]));
        let before: Vec<DpId> = cache.current().unwrap().keys().copied().collect();

        cache.merge(&dps(&[(2, DpValue::Int(25))])).unwrap();

        let after = cache.current().unwrap();
        for id in before {
            assert!(after.contains_key(&id));
        }
    }

    #[test]
    fn delta_value_wins() {
        let mut cache = StateCache::new();
        cache.initialize(dps(&[(2, DpValue::Int(20))]));

        let delta = dps(&[(2, DpValue::Int(21))]);
        cache.merge(&delta).unwrap();

        for (id, value) in &delta {
            assert_eq!(cache.get(*id), Some(value));
        }
    }

    #[test]
    fn reinitialize_replaces_snapshot() {
        let mut cache = StateCache::new();
        cache.initialize(dps(&[(1, DpValue::Bool(true)), (2, DpValue::Int(20))]));
        cache.initialize(dps(&[(1, DpValue::Bool(false))]));

        // A fresh full read is authoritative.
        assert_eq!(cache.current().unwrap().len(), 1);
        assert_eq!(cache.get(DpId::new(1)), Some(&DpValue::Bool(false)));
    }
}
