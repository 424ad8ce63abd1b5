// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error taxonomy shared by every keepmap operation.

use std::path::PathBuf;

use thiserror::Error;

use crate::value::{TypeRef, ValueKind};

/// Errors produced by loading, saving, encoding, and mutating a persistent map.
///
/// Low-level failures (I/O, CBOR/JSON parser errors) are always wrapped into one
/// of these variants; callers never see a foreign error type at the top level.
#[derive(Debug, Error)]
pub enum Error {
    /// Nothing to load from: no path is bound, or no file exists at the bound path.
    #[error("not found: {}", display_path(.path.as_ref()))]
    NotFound {
        /// Bound path, if any.
        path: Option<PathBuf>,
    },
    /// Path resolution or directory creation failed.
    #[error("path error at {}: {source}", .path.display())]
    Path {
        /// Path that could not be prepared.
        path: PathBuf,
        /// Underlying filesystem failure.
        #[source]
        source: std::io::Error,
    },
    /// Reading or writing the backing file failed.
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        /// Path of the backing file.
        path: PathBuf,
        /// Underlying filesystem failure.
        #[source]
        source: std::io::Error,
    },
    /// Bytes do not match the grammar of the selected format.
    #[error("corrupt {format} data: {reason}")]
    CorruptData {
        /// Format name.
        format: &'static str,
        /// What was wrong with the input.
        reason: String,
    },
    /// A key or value cannot be represented in the selected format.
    #[error("{format} cannot represent {reason}")]
    UnsupportedValue {
        /// Format name.
        format: &'static str,
        /// Offending key or value description.
        reason: String,
    },
    /// Auto-cast could not coerce the assigned value into the stored kind.
    #[error("cannot cast {from} to {to}: {reason}")]
    Cast {
        /// Kind of the assigned value.
        from: ValueKind,
        /// Kind of the value already stored under the key.
        to: ValueKind,
        /// Parser message or explanation.
        reason: String,
    },
    /// A type reference could not be resolved while the module table was torn down,
    /// and the module was not part of the caller's ark allowlist.
    #[error("type {type_ref} unresolvable during teardown (module not in ark allowlist)")]
    ShutdownResolution {
        /// Reference the encoder failed to resolve.
        type_ref: TypeRef,
    },
}

/// Result alias used throughout keepmap.
pub type Result<T> = std::result::Result<T, Error>;

fn display_path(path: Option<&PathBuf>) -> String {
    path.map_or_else(|| "<no path bound>".to_owned(), |p| p.display().to_string())
}

impl Error {
    pub(crate) fn corrupt(format: &'static str, reason: impl Into<String>) -> Self {
        Self::CorruptData {
            format,
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(format: &'static str, reason: impl Into<String>) -> Self {
        Self::UnsupportedValue {
            format,
            reason: reason.into(),
        }
    }

    /// Returns `true` for [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_without_path_renders_placeholder() {
        let err = Error::NotFound { path: None };
        assert_eq!(err.to_string(), "not found: <no path bound>");
        assert!(err.is_not_found());
    }

    #[test]
    fn shutdown_resolution_names_the_type() {
        let err = Error::ShutdownResolution {
            type_ref: TypeRef::new("geometry", "Point"),
        };
        assert!(err.to_string().contains("geometry::Point"));
        assert!(!err.is_not_found());
    }
}
