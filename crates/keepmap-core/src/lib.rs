// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Persistent key-value maps mirrored to a single file.
//!
//! `keepmap-core` provides [`PersistentMap`], an ordinary ordered map whose
//! contents are loaded from and saved to one file through a [`BackingStore`].
//! The filesystem store lives in `keepmap-fs`; [`MemoryStore`] here serves tests
//! and embedders that want instrumentation.
//!
//! # Formats
//!
//! A map's [`Format`] is fixed at construction. CBOR formats are lossless and
//! carry [`Record`] values resolved through the [`ModuleTable`]; JSON formats
//! are lossy and reject what they cannot express. See [`codec`] for the table.
//!
//! # Saving
//!
//! Saves are explicit or end-of-life. With change tracking on, a save whose
//! contents equal the last loaded/saved state writes nothing. The end-of-life
//! save runs from [`PersistentMap::close`] (errors returned) or `Drop` (errors
//! logged at `error` level and swallowed).
//!
//! ```
//! use keepmap_core::{Format, MemoryStore, PersistentMap, Policy};
//!
//! # fn main() -> keepmap_core::Result<()> {
//! let store = MemoryStore::at("/settings.json");
//! let policy = Policy::default().with_format(Format::Json).with_default("volume", 5);
//! let mut map = PersistentMap::open(store.clone(), policy)?;
//! map.insert("volume", 7)?;
//! assert!(map.save(false)?);
//! assert_eq!(store.contents().unwrap_or_default(), br#"{"volume":7}"#);
//! # Ok(())
//! # }
//! ```

pub mod cast;
pub mod codec;
pub mod config;
pub mod error;
pub mod guard;
pub mod map;
pub mod modules;
pub mod store;
pub mod tracker;
pub mod value;

pub use cast::coerce;
pub use codec::{
    default_format, set_default_format, CborBinary, CborHex, Codec, Fidelity, Format, Json,
    JsonPretty, UnknownFormat,
};
pub use config::{MissingFile, Policy};
pub use error::{Error, Result};
pub use guard::{GuardState, SavePhase, ShutdownGuard};
pub use map::{Builder, PersistentMap};
pub use modules::{ModuleHandle, ModuleTable};
pub use store::{BackingStore, MemoryStore};
pub use tracker::ChangeTracker;
pub use value::{Key, Mapping, Record, TypeRef, Value, ValueKind};
