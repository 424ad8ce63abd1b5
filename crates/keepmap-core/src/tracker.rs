// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Change tracking against the last loaded or saved contents.
//!
//! The tracker compares top-level entries by value equality. Values are owned,
//! so edits made through [`PersistentMap::get_mut`](crate::PersistentMap::get_mut)
//! are visible too. What the tracker cannot see is state outside the map: an
//! external edit of the backing file, or anything whose persisted form depends
//! on more than the map's own values. Use `save(true)` for those.

use crate::value::Mapping;

/// Baseline snapshot plus the dirty comparison.
#[derive(Debug, Clone)]
pub struct ChangeTracker {
    enabled: bool,
    baseline: Option<Mapping>,
}

impl ChangeTracker {
    /// Create a tracker. A disabled tracker keeps no baseline and always
    /// reports dirty, so every save writes.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            baseline: None,
        }
    }

    /// Returns `true` if change tracking is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Capture the current contents as the persisted baseline.
    pub fn mark_baseline(&mut self, mapping: &Mapping) {
        if self.enabled {
            self.baseline = Some(mapping.clone());
        }
    }

    /// Forget the baseline; the next `is_dirty` reports true.
    pub fn reset(&mut self) {
        self.baseline = None;
    }

    /// Returns `true` on any top-level addition, removal, or replacement since
    /// the last [`mark_baseline`](Self::mark_baseline).
    pub fn is_dirty(&self, mapping: &Mapping) -> bool {
        match &self.baseline {
            Some(baseline) if self.enabled => {
                baseline.len() != mapping.len()
                    || baseline
                        .iter()
                        .zip(mapping)
                        .any(|((bk, bv), (k, v))| bk != k || bv != v)
            }
            _ => true,
        }
    }
}
