// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! JSON codecs (compact and pretty).

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map as JsonMap, Number, Value as JsonValue};

use super::{corrupt, Codec, Format};
use crate::error::{Error, Result};
use crate::modules::ModuleTable;
use crate::value::{Key, Mapping, Value};

/// Compact JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json;

/// JSON indented with four spaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPretty;

impl Codec for Json {
    fn encode(&self, mapping: &Mapping, _modules: &ModuleTable) -> Result<Vec<u8>> {
        let doc = json_object(Format::Json, mapping)?;
        serde_json::to_vec(&doc).map_err(|e| Error::unsupported(Format::Json.name(), e.to_string()))
    }

    fn decode(&self, bytes: &[u8], _modules: &ModuleTable) -> Result<Mapping> {
        decode_json(Format::Json, bytes)
    }
}

impl Codec for JsonPretty {
    fn encode(&self, mapping: &Mapping, _modules: &ModuleTable) -> Result<Vec<u8>> {
        let doc = json_object(Format::JsonPretty, mapping)?;
        let mut out = Vec::new();
        let fmt = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, fmt);
        doc.serialize(&mut ser)
            .map_err(|e| Error::unsupported(Format::JsonPretty.name(), e.to_string()))?;
        Ok(out)
    }

    fn decode(&self, bytes: &[u8], _modules: &ModuleTable) -> Result<Mapping> {
        decode_json(Format::JsonPretty, bytes)
    }
}

// ── Encoding ────────────────────────────────────────────────────────────

/// Build an object, failing when two distinct keys stringify to the same name.
fn json_object(format: Format, entries: &Mapping) -> Result<JsonValue> {
    let mut obj = JsonMap::new();
    let mut owners: BTreeMap<String, &Key> = BTreeMap::new();
    for (k, v) in entries {
        let name = json_key(format, k)?;
        if let Some(prev) = owners.insert(name.clone(), k) {
            return Err(Error::unsupported(
                format.name(),
                format!("keys {prev} and {k} both encode as {name:?}"),
            ));
        }
        obj.insert(name, json_value(format, v)?);
    }
    Ok(JsonValue::Object(obj))
}

fn json_key(format: Format, k: &Key) -> Result<String> {
    match k {
        Key::Text(s) => Ok(s.clone()),
        Key::Int(n) => Ok(n.to_string()),
        Key::Bool(b) => Ok(b.to_string()),
        Key::Bytes(_) => Err(Error::unsupported(format.name(), "a bytes key")),
    }
}

fn json_value(format: Format, v: &Value) -> Result<JsonValue> {
    Ok(match v {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(n) => JsonValue::Number((*n).into()),
        Value::Float(f) => JsonValue::Number(
            Number::from_f64(*f)
                .ok_or_else(|| Error::unsupported(format.name(), format!("non-finite float {f}")))?,
        ),
        Value::Text(s) => JsonValue::String(s.clone()),
        Value::List(items) => JsonValue::Array(
            items
                .iter()
                .map(|item| json_value(format, item))
                .collect::<Result<_>>()?,
        ),
        Value::Map(entries) => json_object(format, entries)?,
        Value::Bytes(_) | Value::Set(_) | Value::Record(_) => {
            return Err(Error::unsupported(
                format.name(),
                format!("a {} value", v.kind()),
            ))
        }
    })
}

// ── Decoding ────────────────────────────────────────────────────────────

fn decode_json(format: Format, bytes: &[u8]) -> Result<Mapping> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Mapping::new());
    }
    let doc: JsonValue = serde_json::from_slice(bytes).map_err(|e| corrupt(format, e))?;
    match doc {
        JsonValue::Object(obj) => Ok(from_object(obj)),
        _ => Err(Error::corrupt(
            format.name(),
            "top-level value is not an object",
        )),
    }
}

fn from_object(obj: JsonMap<String, JsonValue>) -> Mapping {
    obj.into_iter()
        .map(|(k, v)| (Key::Text(k), from_json(v)))
        .collect()
}

fn from_json(v: JsonValue) -> Value {
    match v {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(b),
        JsonValue::Number(n) => n
            .as_i64()
            .map_or_else(|| Value::Float(n.as_f64().unwrap_or(f64::NAN)), Value::Int),
        JsonValue::String(s) => Value::Text(s),
        JsonValue::Array(items) => Value::List(items.into_iter().map(from_json).collect()),
        JsonValue::Object(obj) => Value::Map(from_object(obj)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::value::{Record, TypeRef};

    fn modules() -> ModuleTable {
        ModuleTable::new()
    }

    #[test]
    fn non_string_keys_are_coerced() {
        let mut m = Mapping::new();
        m.insert(Key::Int(1), Value::Int(10));
        m.insert(Key::Bool(true), Value::from("yes"));
        let bytes = Json.encode(&m, &modules()).unwrap();
        assert_eq!(bytes, br#"{"1":10,"true":"yes"}"#.to_vec());

        let back = Json.decode(&bytes, &modules()).unwrap();
        assert_eq!(back[&Key::from("1")], Value::Int(10));
        assert!(!back.contains_key(&Key::Int(1)));
    }

    #[test]
    fn values_outside_the_grammar_are_rejected() {
        let cases = vec![
            Value::Bytes(vec![1]),
            Value::Set([Key::Int(1)].into_iter().collect()),
            Value::Record(Record::new(TypeRef::new("m", "T"))),
            Value::Float(f64::NAN),
            Value::Float(f64::INFINITY),
            Value::List(vec![Value::Bytes(vec![])]),
        ];
        for value in cases {
            let mut m = Mapping::new();
            m.insert(Key::from("k"), value.clone());
            let err = Json.encode(&m, &modules()).unwrap_err();
            assert!(
                matches!(err, Error::UnsupportedValue { format: "json", .. }),
                "{value}: {err}"
            );
        }

        let mut m = Mapping::new();
        m.insert(Key::Bytes(vec![0]), Value::Null);
        assert!(matches!(
            JsonPretty.encode(&m, &modules()),
            Err(Error::UnsupportedValue { format: "json-pretty", .. })
        ));
    }

    #[test]
    fn colliding_key_names_are_rejected() {
        let mut m = Mapping::new();
        m.insert(Key::Int(1), Value::from("int-one"));
        m.insert(Key::from("1"), Value::from("text-one"));
        let err = Json.encode(&m, &modules()).unwrap_err();
        assert!(
            matches!(err, Error::UnsupportedValue { format: "json", .. }),
            "{err}"
        );
        assert!(err.to_string().contains("both encode as \"1\""), "{err}");

        let mut m = Mapping::new();
        m.insert(Key::Bool(true), Value::Int(1));
        m.insert(Key::from("true"), Value::Int(2));
        assert!(JsonPretty.encode(&m, &modules()).is_err());
    }

    #[test]
    fn colliding_nested_key_names_are_rejected() {
        let mut inner = Mapping::new();
        inner.insert(Key::Int(7), Value::Null);
        inner.insert(Key::from("7"), Value::Null);
        let mut m = Mapping::new();
        m.insert(Key::from("outer"), Value::List(vec![Value::Map(inner)]));
        let err = Json.encode(&m, &modules()).unwrap_err();
        assert!(
            matches!(err, Error::UnsupportedValue { format: "json", .. }),
            "{err}"
        );
    }

    #[test]
    fn pretty_uses_four_space_indent() {
        let mut m = Mapping::new();
        m.insert(Key::from("a"), Value::Int(1));
        let text = String::from_utf8(JsonPretty.encode(&m, &modules()).unwrap()).unwrap();
        assert_eq!(text, "{\n    \"a\": 1\n}");
    }

    #[test]
    fn numbers_decode_to_int_when_they_fit() {
        let back = Json
            .decode(br#"{"i": 3, "f": 2.5, "big": 18446744073709551615}"#, &modules())
            .unwrap();
        assert_eq!(back[&Key::from("i")], Value::Int(3));
        assert_eq!(back[&Key::from("f")], Value::Float(2.5));
        assert!(matches!(back[&Key::from("big")], Value::Float(_)));
    }

    #[test]
    fn non_object_documents_are_corrupt() {
        for doc in [&b"[1,2]"[..], b"42", b"{\"a\":", b"\xff"] {
            let err = Json.decode(doc, &modules()).unwrap_err();
            assert!(matches!(err, Error::CorruptData { .. }), "{err}");
        }
    }

    #[test]
    fn whitespace_only_is_empty() {
        assert!(Json.decode(b"  \n", &modules()).unwrap().is_empty());
    }
}
