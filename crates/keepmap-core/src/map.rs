// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The persistent map: container semantics plus load/save against a backing store.
//!
//! # Lifecycle
//!
//! 1. [`PersistentMap::builder`] binds the store, policy, format, and defaults.
//!    Contents start as a copy of the defaults.
//! 2. With `auto_load` and a bound path, [`open`](Builder::open) loads.
//! 3. Mutations change memory only; nothing is written until a save.
//! 4. [`save`](PersistentMap::save) writes when forced or dirty.
//! 5. End of life: [`close`](PersistentMap::close) performs the final save and
//!    returns its error; otherwise `Drop` attempts it once and logs any failure.
//!
//! # Threading
//!
//! No internal locking. Mutation takes `&mut self`; callers sharing a map
//! across threads wrap it themselves (e.g. in a `Mutex`). Two live maps bound
//! to the same path interleave writes unpredictably and must be avoided.

use std::collections::btree_map;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use crate::cast;
use crate::codec::{default_format, Format};
use crate::config::{MissingFile, Policy};
use crate::error::{Error, Result};
use crate::guard::{SavePhase, ShutdownGuard};
use crate::modules::ModuleTable;
use crate::store::BackingStore;
use crate::tracker::ChangeTracker;
use crate::value::{fmt_entries, Key, Mapping, Value};

/// Key-value container mirrored to a single backing file.
pub struct PersistentMap<S: BackingStore> {
    store: S,
    policy: Policy,
    format: Format,
    modules: ModuleTable,
    defaults: Mapping,
    data: Mapping,
    tracker: ChangeTracker,
    loaded: bool,
    /// Whether `Drop` still owes the end-of-life save.
    armed: bool,
}

/// Construction-time options for a [`PersistentMap`].
pub struct Builder<S: BackingStore> {
    store: S,
    policy: Policy,
    modules: Option<ModuleTable>,
    seeds: Mapping,
}

impl<S: BackingStore> Builder<S> {
    /// Replace the policy.
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Override the policy's format.
    pub fn format(mut self, format: Format) -> Self {
        self.policy.format = Some(format);
        self
    }

    /// Resolve record types against `modules` instead of the global table.
    pub fn modules(mut self, modules: ModuleTable) -> Self {
        self.modules = Some(modules);
        self
    }

    /// Add a string-keyed default on top of the policy's template.
    pub fn seed(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.seeds.insert(Key::Text(key.into()), value.into());
        self
    }

    /// Build the map, loading first when `auto_load` is set and a path is bound.
    pub fn open(self) -> Result<PersistentMap<S>> {
        let Self {
            store,
            policy,
            modules,
            seeds,
        } = self;
        let mut defaults = policy.default_content.clone();
        defaults.extend(seeds);
        let format = policy.format.unwrap_or_else(default_format);
        let mut map = PersistentMap {
            store,
            format,
            modules: modules.unwrap_or_else(ModuleTable::global),
            data: defaults.clone(),
            defaults,
            tracker: ChangeTracker::new(policy.track_changes),
            policy,
            loaded: false,
            armed: false,
        };
        if map.policy.auto_load && map.store.path().is_some() {
            map.load()?;
        }
        map.armed = true;
        Ok(map)
    }
}

impl<S: BackingStore> PersistentMap<S> {
    /// Start building a map over `store` with the default policy.
    pub fn builder(store: S) -> Builder<S> {
        Builder {
            store,
            policy: Policy::default(),
            modules: None,
            seeds: Mapping::new(),
        }
    }

    /// Build with `policy` and no extra seeds.
    pub fn open(store: S, policy: Policy) -> Result<Self> {
        Self::builder(store).policy(policy).open()
    }

    // ── Persistence ─────────────────────────────────────────────────────

    /// Replace the contents with the file's.
    ///
    /// A missing file (under [`MissingFile::Seed`]) or an empty file yields the
    /// instance defaults. Otherwise the decoded contents are merged over a fresh
    /// copy of the defaults when `include_defaults` is set, or used alone.
    /// On error the contents are left untouched.
    pub fn load(&mut self) -> Result<()> {
        if self.store.path().is_none() {
            return Err(Error::NotFound { path: None });
        }
        let bytes = match self.store.read_all() {
            Ok(bytes) => Some(bytes),
            Err(Error::NotFound { .. }) if self.policy.missing_file == MissingFile::Seed => None,
            Err(err) => return Err(err),
        };
        let contents = match bytes {
            Some(bytes) if !bytes.is_empty() => {
                let decoded = self.format.decode(&bytes, &self.modules)?;
                if self.policy.include_defaults {
                    let mut merged = self.defaults.clone();
                    merged.extend(decoded);
                    merged
                } else {
                    decoded
                }
            }
            _ => self.defaults.clone(),
        };
        self.data = contents;
        self.tracker.mark_baseline(&self.data);
        self.loaded = true;
        debug!(
            path = ?self.store.path(),
            format = self.format.name(),
            entries = self.data.len(),
            "loaded"
        );
        Ok(())
    }

    /// Bind to `path`, then [`load`](Self::load).
    pub fn load_from(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        self.bind_path(path)?;
        self.load()
    }

    /// Write the contents when `force` is set or the map is dirty.
    ///
    /// Returns whether a write happened. A skipped save still succeeds.
    pub fn save(&mut self, force: bool) -> Result<bool> {
        self.save_in(force, SavePhase::Working)
    }

    /// Bind to `path`, then [`save`](Self::save).
    pub fn save_to(&mut self, path: impl Into<PathBuf>, force: bool) -> Result<bool> {
        self.bind_path(path)?;
        self.save(force)
    }

    /// Explicit end of life: perform the final save per policy and surface its
    /// error. `Drop` then has nothing left to do.
    pub fn close(mut self) -> Result<bool> {
        self.armed = false;
        self.final_save()
    }

    fn final_save(&mut self) -> Result<bool> {
        if !self.policy.save_on_drop || self.store.path().is_none() {
            return Ok(false);
        }
        self.save_in(self.policy.force_on_drop, SavePhase::EndOfLife)
    }

    fn save_in(&mut self, force: bool, phase: SavePhase) -> Result<bool> {
        if self.store.path().is_none() {
            return Err(Error::NotFound { path: None });
        }
        if !force && !self.tracker.is_dirty(&self.data) {
            debug!(path = ?self.store.path(), "save skipped; nothing changed");
            return Ok(false);
        }
        let guard = ShutdownGuard::arm(self.format, &self.modules, &self.policy.ark_modules, phase);
        guard.check(&self.data)?;
        let bytes = self.format.encode(&self.data, &self.modules)?;
        self.store.ensure_path(self.policy.auto_mkdir)?;
        self.store.write_all(&bytes)?;
        self.tracker.mark_baseline(&self.data);
        debug!(
            path = ?self.store.path(),
            format = self.format.name(),
            bytes = bytes.len(),
            ?phase,
            "saved"
        );
        Ok(true)
    }

    /// Rebind the backing store. When the store reports a changed binding,
    /// change tracking resets so the next save writes to the new file.
    pub fn bind_path(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        if self.store.bind(path.into())? {
            self.tracker.reset();
        }
        Ok(())
    }

    /// `true` when the contents differ from what was last loaded or saved
    /// (always `true` with change tracking disabled).
    pub fn changed(&self) -> bool {
        self.tracker.is_dirty(&self.data)
    }

    /// `true` when at least one top-level value is a container.
    pub fn has_mutables(&self) -> bool {
        self.data.values().any(|v| v.kind().is_container())
    }

    /// `true` once a load has completed.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Format fixed at construction.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Bound path, if any.
    pub fn path(&self) -> Option<&Path> {
        self.store.path()
    }

    /// Policy this map was built with.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Module table used for record types.
    pub fn modules(&self) -> &ModuleTable {
        &self.modules
    }

    /// Instance defaults (policy template plus seeds).
    pub fn defaults(&self) -> &Mapping {
        &self.defaults
    }

    // ── Container ───────────────────────────────────────────────────────

    /// Value under `key`.
    pub fn get(&self, key: impl Into<Key>) -> Option<&Value> {
        self.data.get(&key.into())
    }

    /// Mutable value under `key`. Edits are visible to change tracking.
    pub fn get_mut(&mut self, key: impl Into<Key>) -> Option<&mut Value> {
        self.data.get_mut(&key.into())
    }

    /// `true` if `key` is present.
    pub fn contains_key(&self, key: impl Into<Key>) -> bool {
        self.data.contains_key(&key.into())
    }

    /// Assign `value` to `key`, returning the previous value.
    ///
    /// With `auto_cast`, text assigned over a non-text value is parsed into the
    /// stored kind first; a failed parse leaves the map unchanged.
    pub fn insert(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Result<Option<Value>> {
        let key = key.into();
        let mut value = value.into();
        if self.policy.auto_cast {
            if let Some(existing) = self.data.get(&key) {
                value = cast::coerce(existing, value)?;
            }
        }
        Ok(self.data.insert(key, value))
    }

    /// Insert every pair, stopping at the first cast failure.
    pub fn extend<I, K, V>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<Value>,
    {
        for (k, v) in entries {
            self.insert(k, v)?;
        }
        Ok(())
    }

    /// Remove `key`, returning its value.
    pub fn remove(&mut self, key: impl Into<Key>) -> Option<Value> {
        self.data.remove(&key.into())
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Entries in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, Key, Value> {
        self.data.iter()
    }

    /// Keys in order.
    pub fn keys(&self) -> btree_map::Keys<'_, Key, Value> {
        self.data.keys()
    }

    /// Values in key order.
    pub fn values(&self) -> btree_map::Values<'_, Key, Value> {
        self.data.values()
    }

    /// Borrow the whole contents.
    pub fn as_mapping(&self) -> &Mapping {
        &self.data
    }
}

impl<'a, S: BackingStore> IntoIterator for &'a PersistentMap<S> {
    type Item = (&'a Key, &'a Value);
    type IntoIter = btree_map::Iter<'a, Key, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

impl<S: BackingStore> fmt::Display for PersistentMap<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_entries(f, self.data.iter())
    }
}

impl<S: BackingStore> fmt::Debug for PersistentMap<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentMap")
            .field("path", &self.store.path())
            .field("format", &self.format)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

impl<S: BackingStore> Drop for PersistentMap<S> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        match self.final_save() {
            Ok(wrote) => debug!(path = ?self.store.path(), wrote, "final save on drop"),
            Err(err) => error!(
                path = ?self.store.path(),
                error = %err,
                "final save on drop failed; unsaved changes are lost"
            ),
        }
    }
}
