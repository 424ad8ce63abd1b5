// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Deterministic CBOR codec and its hex rendering.
//!
//! Encoding rules:
//! - definite lengths only, integers and lengths in the shortest width;
//! - map entries ordered by their encoded key bytes;
//! - floats in the shortest width that round-trips exactly (never collapsed to
//!   integers, so `Float(1.0)` stays a float);
//! - sets as tag 258 over an array of keys;
//! - records as tag 27 over `[ "module::name", { field: value } ]`, resolved
//!   against the module table.
//!
//! Decoding goes through `ciborium`, so any well-formed CBOR with a top-level
//! map is accepted, not only the canonical form written here.

use std::collections::{BTreeMap, BTreeSet};

use ciborium::value::Value as Cbor;
use half::f16;

use super::{corrupt, Codec, Format};
use crate::error::{Error, Result};
use crate::modules::ModuleTable;
use crate::value::{Key, Mapping, Record, TypeRef, Value};

/// CBOR tag for sets (IANA registry, "mathematical finite set").
const TAG_SET: u64 = 258;
/// CBOR tag for typed objects (IANA registry, "serialised language-independent object").
const TAG_RECORD: u64 = 27;

/// Hex digits per line in the [`CborHex`] rendering (32 bytes).
const HEX_LINE: usize = 64;

/// Compact deterministic CBOR.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborBinary;

/// The [`CborBinary`] bytes rendered as lowercase hex lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborHex;

impl Codec for CborBinary {
    fn encode(&self, mapping: &Mapping, modules: &ModuleTable) -> Result<Vec<u8>> {
        Encoder {
            format: Format::CborBinary,
            modules,
        }
        .mapping(mapping)
    }

    fn decode(&self, bytes: &[u8], modules: &ModuleTable) -> Result<Mapping> {
        decode_cbor(Format::CborBinary, bytes, modules)
    }
}

impl Codec for CborHex {
    fn encode(&self, mapping: &Mapping, modules: &ModuleTable) -> Result<Vec<u8>> {
        let raw = Encoder {
            format: Format::CborHex,
            modules,
        }
        .mapping(mapping)?;
        let digits = hex::encode(raw);
        let mut out = Vec::with_capacity(digits.len() + digits.len() / HEX_LINE + 1);
        for line in digits.as_bytes().chunks(HEX_LINE) {
            out.extend_from_slice(line);
            out.push(b'\n');
        }
        Ok(out)
    }

    fn decode(&self, bytes: &[u8], modules: &ModuleTable) -> Result<Mapping> {
        let digits: Vec<u8> = bytes
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        let raw = hex::decode(digits).map_err(|e| corrupt(Format::CborHex, e))?;
        decode_cbor(Format::CborHex, &raw, modules)
    }
}

// ── Encoding ────────────────────────────────────────────────────────────

struct Encoder<'a> {
    format: Format,
    modules: &'a ModuleTable,
}

impl Encoder<'_> {
    fn mapping(&self, mapping: &Mapping) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.entries(mapping.iter().map(|(k, v)| (EncKey::Key(k), v)), &mut out)?;
        Ok(out)
    }

    fn value(&self, v: &Value, out: &mut Vec<u8>) -> Result<()> {
        match v {
            Value::Null => out.push(0xf6),
            Value::Bool(b) => out.push(if *b { 0xf5 } else { 0xf4 }),
            Value::Int(n) => enc_int(i128::from(*n), out),
            Value::Float(f) => enc_float(*f, out),
            Value::Text(s) => enc_text(s, out),
            Value::Bytes(b) => enc_bytes(b, out),
            Value::List(items) => {
                enc_len(4, items.len(), out);
                for item in items {
                    self.value(item, out)?;
                }
            }
            Value::Set(keys) => {
                write_major(6, u128::from(TAG_SET), out);
                let mut encoded: Vec<Vec<u8>> = keys
                    .iter()
                    .map(|k| {
                        let mut kb = Vec::new();
                        enc_key(k, &mut kb);
                        kb
                    })
                    .collect();
                encoded.sort();
                enc_len(4, encoded.len(), out);
                for kb in encoded {
                    out.extend_from_slice(&kb);
                }
            }
            Value::Map(entries) => {
                self.entries(entries.iter().map(|(k, v)| (EncKey::Key(k), v)), out)?;
            }
            Value::Record(record) => self.record(record, out)?,
        }
        Ok(())
    }

    fn record(&self, record: &Record, out: &mut Vec<u8>) -> Result<()> {
        if !self.modules.resolve(&record.type_ref) {
            return Err(Error::unsupported(
                self.format.name(),
                format!("record of unregistered type {}", record.type_ref),
            ));
        }
        write_major(6, u128::from(TAG_RECORD), out);
        enc_len(4, 2, out);
        enc_text(&record.type_ref.to_string(), out);
        self.entries(
            record
                .fields
                .iter()
                .map(|(name, v)| (EncKey::Field(name), v)),
            out,
        )
    }

    /// Write a map whose entries are ordered by encoded key bytes.
    fn entries<'v, I>(&self, entries: I, out: &mut Vec<u8>) -> Result<()>
    where
        I: Iterator<Item = (EncKey<'v>, &'v Value)>,
    {
        let mut buf: Vec<(Vec<u8>, &Value)> = entries
            .map(|(k, v)| {
                let mut kb = Vec::new();
                match k {
                    EncKey::Key(key) => enc_key(key, &mut kb),
                    EncKey::Field(name) => enc_text(name, &mut kb),
                }
                (kb, v)
            })
            .collect();
        buf.sort_by(|a, b| a.0.cmp(&b.0));

        enc_len(5, buf.len(), out);
        for (kb, v) in buf {
            out.extend_from_slice(&kb);
            self.value(v, out)?;
        }
        Ok(())
    }
}

enum EncKey<'a> {
    Key(&'a Key),
    Field(&'a str),
}

fn enc_key(k: &Key, out: &mut Vec<u8>) {
    match k {
        Key::Bool(b) => out.push(if *b { 0xf5 } else { 0xf4 }),
        Key::Int(n) => enc_int(i128::from(*n), out),
        Key::Text(s) => enc_text(s, out),
        Key::Bytes(b) => enc_bytes(b, out),
    }
}

fn enc_len(major: u8, len: usize, out: &mut Vec<u8>) {
    write_major(major, len as u128, out);
}

fn enc_int(n: i128, out: &mut Vec<u8>) {
    if n >= 0 {
        write_major(0, n.unsigned_abs(), out);
    } else {
        write_major(1, (-1 - n).unsigned_abs(), out);
    }
}

#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn enc_float(f: f64, out: &mut Vec<u8>) {
    if f.is_nan() {
        write_half(f16::NAN, out);
        return;
    }
    let h = f16::from_f64(f);
    if h.to_f64() == f {
        write_half(h, out);
        return;
    }
    let single = f as f32;
    if f64::from(single) == f {
        out.push(0xfa);
        out.extend_from_slice(&single.to_be_bytes());
    } else {
        out.push(0xfb);
        out.extend_from_slice(&f.to_be_bytes());
    }
}

fn write_half(h: f16, out: &mut Vec<u8>) {
    out.push(0xf9);
    out.extend_from_slice(&h.to_bits().to_be_bytes());
}

fn enc_bytes(b: &[u8], out: &mut Vec<u8>) {
    enc_len(2, b.len(), out);
    out.extend_from_slice(b);
}

fn enc_text(s: &str, out: &mut Vec<u8>) {
    enc_len(3, s.len(), out);
    out.extend_from_slice(s.as_bytes());
}

#[allow(clippy::cast_possible_truncation)]
fn write_major(major: u8, n: u128, out: &mut Vec<u8>) {
    debug_assert!(major <= 7);
    match n {
        0..=23 => out.push((major << 5) | n as u8),
        24..=0xff => {
            out.push((major << 5) | 24);
            out.push(n as u8);
        }
        0x100..=0xffff => {
            out.push((major << 5) | 25);
            out.extend_from_slice(&(n as u16).to_be_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push((major << 5) | 26);
            out.extend_from_slice(&(n as u32).to_be_bytes());
        }
        _ => {
            out.push((major << 5) | 27);
            out.extend_from_slice(&(n as u64).to_be_bytes());
        }
    }
}

// ── Decoding ────────────────────────────────────────────────────────────

fn decode_cbor(format: Format, bytes: &[u8], modules: &ModuleTable) -> Result<Mapping> {
    if bytes.is_empty() {
        return Ok(Mapping::new());
    }
    let mut rest = bytes;
    let doc: Cbor = ciborium::from_reader(&mut rest).map_err(|e| corrupt(format, e))?;
    if !rest.is_empty() {
        return Err(Error::corrupt(
            format.name(),
            format!("{} trailing bytes after document", rest.len()),
        ));
    }
    let decoder = Decoder { format, modules };
    match doc {
        Cbor::Map(entries) => decoder.entries(entries),
        other => Err(Error::corrupt(
            format.name(),
            format!("top-level item is {}, expected a map", describe(&other)),
        )),
    }
}

struct Decoder<'a> {
    format: Format,
    modules: &'a ModuleTable,
}

impl Decoder<'_> {
    fn corrupt(&self, reason: impl Into<String>) -> Error {
        Error::corrupt(self.format.name(), reason)
    }

    fn entries(&self, entries: Vec<(Cbor, Cbor)>) -> Result<BTreeMap<Key, Value>> {
        let mut map = BTreeMap::new();
        for (k, v) in entries {
            map.insert(self.key(k)?, self.value(v)?);
        }
        Ok(map)
    }

    fn key(&self, k: Cbor) -> Result<Key> {
        match k {
            Cbor::Bool(b) => Ok(Key::Bool(b)),
            Cbor::Integer(i) => self.int(i).map(Key::Int),
            Cbor::Text(s) => Ok(Key::Text(s)),
            Cbor::Bytes(b) => Ok(Key::Bytes(b)),
            other => Err(self.corrupt(format!("{} is not a valid key", describe(&other)))),
        }
    }

    fn int(&self, i: ciborium::value::Integer) -> Result<i64> {
        i64::try_from(i128::from(i)).map_err(|_| self.corrupt("integer out of i64 range"))
    }

    fn value(&self, v: Cbor) -> Result<Value> {
        Ok(match v {
            Cbor::Null => Value::Null,
            Cbor::Bool(b) => Value::Bool(b),
            Cbor::Integer(i) => Value::Int(self.int(i)?),
            Cbor::Float(f) => Value::Float(f),
            Cbor::Text(s) => Value::Text(s),
            Cbor::Bytes(b) => Value::Bytes(b),
            Cbor::Array(items) => Value::List(
                items
                    .into_iter()
                    .map(|item| self.value(item))
                    .collect::<Result<_>>()?,
            ),
            Cbor::Map(entries) => Value::Map(self.entries(entries)?),
            Cbor::Tag(TAG_SET, inner) => Value::Set(self.set(*inner)?),
            Cbor::Tag(TAG_RECORD, inner) => Value::Record(self.record(*inner)?),
            Cbor::Tag(tag, _) => return Err(self.corrupt(format!("unsupported tag {tag}"))),
            other => return Err(self.corrupt(format!("unsupported item {}", describe(&other)))),
        })
    }

    fn set(&self, inner: Cbor) -> Result<BTreeSet<Key>> {
        let Cbor::Array(items) = inner else {
            return Err(self.corrupt("set tag must wrap an array"));
        };
        items.into_iter().map(|item| self.key(item)).collect()
    }

    fn record(&self, inner: Cbor) -> Result<Record> {
        let Cbor::Array(parts) = inner else {
            return Err(self.corrupt("record tag must wrap an array"));
        };
        let mut parts = parts.into_iter();
        let (Some(Cbor::Text(path)), Some(Cbor::Map(fields)), None) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(self.corrupt("record must be [type, fields]"));
        };
        let type_ref = TypeRef::parse(&path)
            .ok_or_else(|| self.corrupt(format!("malformed type reference {path:?}")))?;
        if !self.modules.resolve(&type_ref) {
            return Err(self.corrupt(format!("unknown record type {type_ref}")));
        }
        let mut record = Record::new(type_ref);
        for (k, v) in fields {
            let Cbor::Text(name) = k else {
                return Err(self.corrupt("record field names must be text"));
            };
            record.fields.insert(name, self.value(v)?);
        }
        Ok(record)
    }
}

fn describe(v: &Cbor) -> &'static str {
    match v {
        Cbor::Integer(_) => "integer",
        Cbor::Bytes(_) => "bytes",
        Cbor::Float(_) => "float",
        Cbor::Text(_) => "text",
        Cbor::Bool(_) => "bool",
        Cbor::Null => "null",
        Cbor::Tag(_, _) => "tagged item",
        Cbor::Array(_) => "array",
        Cbor::Map(_) => "map",
        _ => "unknown item",
    }
}
