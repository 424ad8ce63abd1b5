// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shutdown guard for end-of-life saves.
//!
//! A host may tear down the [`ModuleTable`] before its maps are dropped. A final
//! save in a format that resolves record types would then fail on every record.
//! The guard detects that window (teardown risk), puts back exactly the
//! modules the caller allowlisted, and reports anything still unresolvable as
//! [`Error::ShutdownResolution`]. It attempts no other recovery.

use tracing::info;

use crate::codec::Format;
use crate::error::{Error, Result};
use crate::modules::{ModuleHandle, ModuleTable};
use crate::value::{Mapping, Value};

/// When a save is happening.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SavePhase {
    /// An explicit `save` during the map's working life.
    Working,
    /// The final save from `close` or `Drop`.
    EndOfLife,
}

/// Guard state for one save attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardState {
    /// Module table trusted as-is.
    Normal,
    /// End-of-life save found the table empty; ark modules were re-registered.
    TeardownRisk,
}

/// Per-save guard.
#[derive(Debug)]
pub struct ShutdownGuard<'a> {
    state: GuardState,
    modules: &'a ModuleTable,
}

impl<'a> ShutdownGuard<'a> {
    /// Evaluate the transition for one save.
    ///
    /// Enters [`GuardState::TeardownRisk`] only for an end-of-life save, in a
    /// format that resolves types, against an empty table. The transition
    /// registers `ark` into the table.
    pub fn arm(
        format: Format,
        modules: &'a ModuleTable,
        ark: &[ModuleHandle],
        phase: SavePhase,
    ) -> Self {
        let at_risk =
            phase == SavePhase::EndOfLife && format.resolves_types() && modules.is_empty();
        if !at_risk {
            return Self {
                state: GuardState::Normal,
                modules,
            };
        }
        info!(
            format = format.name(),
            ark = ark.len(),
            "module table torn down before final save; restoring ark modules"
        );
        modules.extend(ark.iter().cloned());
        Self {
            state: GuardState::TeardownRisk,
            modules,
        }
    }

    /// Current state.
    pub fn state(&self) -> GuardState {
        self.state
    }

    /// Under teardown risk, check that every record type in `mapping` resolves.
    /// Always succeeds in the normal state.
    pub fn check(&self, mapping: &Mapping) -> Result<()> {
        if self.state == GuardState::Normal {
            return Ok(());
        }
        mapping.values().try_for_each(|v| self.check_value(v))
    }

    fn check_value(&self, value: &Value) -> Result<()> {
        match value {
            Value::Record(record) => {
                if !self.modules.resolve(&record.type_ref) {
                    return Err(Error::ShutdownResolution {
                        type_ref: record.type_ref.clone(),
                    });
                }
                record.fields.values().try_for_each(|v| self.check_value(v))
            }
            Value::List(items) => items.iter().try_for_each(|v| self.check_value(v)),
            Value::Map(entries) => entries.values().try_for_each(|v| self.check_value(v)),
            _ => Ok(()),
        }
    }
}
