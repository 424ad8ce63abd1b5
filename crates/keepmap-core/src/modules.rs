// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Module resolution table consulted by formats that embed type references.
//!
//! Binary formats write a [`Record`](crate::Record)'s [`TypeRef`] symbolically
//! and resolve it here on encode and decode. Hosts populate the table at
//! startup and may [`teardown`](ModuleTable::teardown) it on their way out;
//! a map saved after that point needs the
//! [`ShutdownGuard`](crate::ShutdownGuard) to put the allowlisted modules back.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::value::TypeRef;

/// A named module and the type names it exports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleHandle {
    /// Module name as written in type references.
    pub name: String,
    /// Exported type names.
    pub types: BTreeSet<String>,
}

impl ModuleHandle {
    /// Create a handle exporting `types`.
    pub fn new<I, T>(name: impl Into<String>, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            name: name.into(),
            types: types.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` if the module exports `name`.
    pub fn exports(&self, name: &str) -> bool {
        self.types.contains(name)
    }
}

/// Shared, cloneable handle over a module resolution table.
///
/// Clones share the same table. Maps default to [`ModuleTable::global`]; tests
/// and embedders can inject an isolated table instead.
#[derive(Clone, Debug, Default)]
pub struct ModuleTable {
    inner: Arc<RwLock<BTreeMap<String, ModuleHandle>>>,
}

static GLOBAL: OnceLock<ModuleTable> = OnceLock::new();

impl ModuleTable {
    /// Create an empty, isolated table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide table.
    pub fn global() -> Self {
        GLOBAL.get_or_init(Self::new).clone()
    }

    /// Register (or replace) a module.
    pub fn register(&self, module: ModuleHandle) {
        self.inner.write().insert(module.name.clone(), module);
    }

    /// Register every module in `modules`.
    pub fn extend<I: IntoIterator<Item = ModuleHandle>>(&self, modules: I) {
        let mut table = self.inner.write();
        for module in modules {
            table.insert(module.name.clone(), module);
        }
    }

    /// Returns `true` if `type_ref` names a registered module exporting that type.
    pub fn resolve(&self, type_ref: &TypeRef) -> bool {
        self.inner
            .read()
            .get(&type_ref.module)
            .is_some_and(|m| m.exports(&type_ref.name))
    }

    /// Returns `true` if a module called `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().contains_key(name)
    }

    /// Number of registered modules.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns `true` when nothing is registered (e.g. after teardown).
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Drop every registration, as a host does while shutting down.
    pub fn teardown(&self) {
        self.inner.write().clear();
    }

    /// Returns `true` if both handles point at the same table.
    pub fn same_table(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
