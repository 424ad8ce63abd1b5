// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Codec registry: the fixed set of file formats a map can be stored in.
//!
//! | Format | Fidelity | Notes |
//! |--------|----------|-------|
//! | [`Format::CborBinary`] | lossless | deterministic CBOR, resolves record types |
//! | [`Format::CborHex`] | lossless | same CBOR bytes as hex text, inspectable |
//! | [`Format::Json`] | lossy | string keys, JSON grammar only |
//! | [`Format::JsonPretty`] | lossy | as `Json`, indented |
//!
//! Text formats coerce `Int`/`Bool` keys to strings and reject everything else
//! outside the JSON grammar with [`Error::UnsupportedValue`]: bytes keys, bytes,
//! sets, records, and non-finite floats. Distinct keys that stringify to the
//! same name also fail. They never narrow silently on encode. On decode, JSON
//! numbers become `Int` when they fit `i64` and `Float` otherwise, so integers
//! beyond the `i64` range come back as (possibly rounded) floats.

mod cbor;
mod json;

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

pub use cbor::{CborBinary, CborHex};
pub use json::{Json, JsonPretty};

use crate::error::{Error, Result};
use crate::modules::ModuleTable;
use crate::value::Mapping;

/// Byte-level encoding strategy for a whole mapping.
///
/// Implementations are stateless. `modules` is only consulted by formats that
/// embed type references.
pub trait Codec: Send + Sync {
    /// Encode `mapping`. Output is deterministic for a given mapping.
    fn encode(&self, mapping: &Mapping, modules: &ModuleTable) -> Result<Vec<u8>>;

    /// Decode bytes previously produced by [`Codec::encode`]. Empty input
    /// decodes to an empty mapping; anything malformed is
    /// [`Error::CorruptData`].
    fn decode(&self, bytes: &[u8], modules: &ModuleTable) -> Result<Mapping>;
}

/// Whether a format round-trips every supported key and value kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fidelity {
    /// Every key and value kind survives a round trip.
    Lossless,
    /// Only string keys and JSON-grammar values survive.
    Lossy,
}

/// Named file formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    /// Compact deterministic CBOR.
    CborBinary,
    /// CBOR rendered as hex lines.
    CborHex,
    /// Compact JSON.
    Json,
    /// JSON indented with four spaces.
    JsonPretty,
}

impl Format {
    /// Every registered format.
    pub const ALL: [Self; 4] = [Self::CborBinary, Self::CborHex, Self::Json, Self::JsonPretty];

    /// Stable name, also accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            Self::CborBinary => "cbor",
            Self::CborHex => "cbor-hex",
            Self::Json => "json",
            Self::JsonPretty => "json-pretty",
        }
    }

    /// Parse a name produced by [`Format::name`], ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(name))
    }

    /// Advisory fidelity class.
    pub fn fidelity(self) -> Fidelity {
        match self {
            Self::CborBinary | Self::CborHex => Fidelity::Lossless,
            Self::Json | Self::JsonPretty => Fidelity::Lossy,
        }
    }

    /// Returns `true` for formats whose payload is not human-readable text.
    pub fn is_binary(self) -> bool {
        matches!(self, Self::CborBinary)
    }

    /// Returns `true` when encode/decode resolve record type references against
    /// the module table.
    pub fn resolves_types(self) -> bool {
        matches!(self, Self::CborBinary | Self::CborHex)
    }

    /// Codec implementing this format.
    pub fn codec(self) -> &'static dyn Codec {
        match self {
            Self::CborBinary => &CborBinary,
            Self::CborHex => &CborHex,
            Self::Json => &Json,
            Self::JsonPretty => &JsonPretty,
        }
    }

    /// Shorthand for `self.codec().encode(..)`.
    pub fn encode(self, mapping: &Mapping, modules: &ModuleTable) -> Result<Vec<u8>> {
        self.codec().encode(mapping, modules)
    }

    /// Shorthand for `self.codec().decode(..)`.
    pub fn decode(self, bytes: &[u8], modules: &ModuleTable) -> Result<Mapping> {
        self.codec().decode(bytes, modules)
    }

    fn to_tag(self) -> u8 {
        match self {
            Self::CborBinary => 0,
            Self::CborHex => 1,
            Self::Json => 2,
            Self::JsonPretty => 3,
        }
    }

    fn from_tag(tag: u8) -> Self {
        match tag {
            1 => Self::CborHex,
            2 => Self::Json,
            3 => Self::JsonPretty,
            _ => Self::CborBinary,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown format name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown format: {0}")]
pub struct UnknownFormat(pub String);

impl FromStr for Format {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| UnknownFormat(s.to_owned()))
    }
}

static DEFAULT_FORMAT: AtomicU8 = AtomicU8::new(0);

/// Process-wide format used by maps whose policy leaves `format` unset.
///
/// Read once at construction: changing it affects only maps built afterwards.
pub fn default_format() -> Format {
    Format::from_tag(DEFAULT_FORMAT.load(Ordering::Relaxed))
}

/// Replace the process-wide default format.
pub fn set_default_format(format: Format) {
    DEFAULT_FORMAT.store(format.to_tag(), Ordering::Relaxed);
}

/// Wrap a parser failure into [`Error::CorruptData`].
fn corrupt(format: Format, err: impl fmt::Display) -> Error {
    Error::corrupt(format.name(), err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for format in Format::ALL {
            assert_eq!(format.name().parse::<Format>(), Ok(format));
        }
        assert_eq!("JSON".parse::<Format>(), Ok(Format::Json));
        assert_eq!(
            "pickle".parse::<Format>(),
            Err(UnknownFormat("pickle".into()))
        );
    }

    #[test]
    fn fidelity_classes() {
        assert_eq!(Format::CborBinary.fidelity(), Fidelity::Lossless);
        assert_eq!(Format::CborHex.fidelity(), Fidelity::Lossless);
        assert_eq!(Format::Json.fidelity(), Fidelity::Lossy);
        assert!(Format::CborHex.resolves_types());
        assert!(!Format::JsonPretty.resolves_types());
        assert!(!Format::CborHex.is_binary());
    }

    #[test]
    fn tags_are_stable() {
        for format in Format::ALL {
            assert_eq!(Format::from_tag(format.to_tag()), format);
        }
    }
}
