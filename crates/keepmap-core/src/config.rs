// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-map policy.
//!
//! A [`Policy`] is passed to the map at construction; there is no ambient
//! per-type configuration. The only process-wide knob is
//! [`set_default_format`](crate::set_default_format), read when `format` is
//! left unset.

use crate::codec::Format;
use crate::modules::ModuleHandle;
use crate::value::{Key, Mapping, Value};

/// What `load` does when the bound path has no file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MissingFile {
    /// Seed the instance defaults and succeed.
    #[default]
    Seed,
    /// Fail with [`Error::NotFound`](crate::Error::NotFound).
    Fail,
}

/// Behavior switches for one persistent map.
#[derive(Clone, Debug)]
pub struct Policy {
    /// File format; `None` uses the process-wide default at construction.
    pub format: Option<Format>,
    /// Load from the bound path during construction.
    pub auto_load: bool,
    /// Create missing parent directories before writing.
    pub auto_mkdir: bool,
    /// Attempt one final save at end of life.
    pub save_on_drop: bool,
    /// Make the final save unconditional instead of dirty-only.
    pub force_on_drop: bool,
    /// Keep a baseline and skip saves when nothing changed.
    pub track_changes: bool,
    /// On load, merge file contents over the defaults instead of replacing them.
    pub include_defaults: bool,
    /// Behavior of `load` when the file does not exist.
    pub missing_file: MissingFile,
    /// Template copied into every new instance.
    pub default_content: Mapping,
    /// Expand a leading `~` in paths (honored by filesystem stores).
    pub expand_home: bool,
    /// Parse text assigned over a non-text value into the stored kind.
    pub auto_cast: bool,
    /// Modules re-registered if an end-of-life save finds the module table torn down.
    pub ark_modules: Vec<ModuleHandle>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            format: None,
            auto_load: true,
            auto_mkdir: true,
            save_on_drop: true,
            force_on_drop: true,
            track_changes: true,
            include_defaults: true,
            missing_file: MissingFile::Seed,
            default_content: Mapping::new(),
            expand_home: true,
            auto_cast: false,
            ark_modules: Vec::new(),
        }
    }
}

impl Policy {
    /// Set the file format.
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    /// Toggle construction-time loading.
    pub fn with_auto_load(mut self, on: bool) -> Self {
        self.auto_load = on;
        self
    }

    /// Toggle parent-directory creation.
    pub fn with_auto_mkdir(mut self, on: bool) -> Self {
        self.auto_mkdir = on;
        self
    }

    /// Configure the end-of-life save: whether it happens and whether it is forced.
    pub fn with_save_on_drop(mut self, on: bool, force: bool) -> Self {
        self.save_on_drop = on;
        self.force_on_drop = force;
        self
    }

    /// Toggle change tracking.
    pub fn with_track_changes(mut self, on: bool) -> Self {
        self.track_changes = on;
        self
    }

    /// Toggle defaults merging on load.
    pub fn with_include_defaults(mut self, on: bool) -> Self {
        self.include_defaults = on;
        self
    }

    /// Set the missing-file behavior.
    pub fn with_missing_file(mut self, missing: MissingFile) -> Self {
        self.missing_file = missing;
        self
    }

    /// Add one entry to the default template.
    pub fn with_default(mut self, key: impl Into<Key>, value: impl Into<Value>) -> Self {
        self.default_content.insert(key.into(), value.into());
        self
    }

    /// Replace the default template.
    pub fn with_default_content(mut self, content: Mapping) -> Self {
        self.default_content = content;
        self
    }

    /// Toggle `~` expansion.
    pub fn with_expand_home(mut self, on: bool) -> Self {
        self.expand_home = on;
        self
    }

    /// Toggle auto-cast on assignment.
    pub fn with_auto_cast(mut self, on: bool) -> Self {
        self.auto_cast = on;
        self
    }

    /// Add a module to the end-of-life allowlist.
    pub fn with_ark_module(mut self, module: ModuleHandle) -> Self {
        self.ark_modules.push(module);
        self
    }
}
