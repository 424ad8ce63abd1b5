// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Auto-cast of text assignments into the kind already stored under a key.

use crate::error::{Error, Result};
use crate::value::{Value, ValueKind};

/// Coerce `incoming` into the kind of `stored`.
///
/// Only text is ever coerced, and only over a non-text slot; every other
/// combination passes through untouched. Containers, records, and null cannot
/// be produced from text and fail with [`Error::Cast`].
pub fn coerce(stored: &Value, incoming: Value) -> Result<Value> {
    let Value::Text(text) = incoming else {
        return Ok(incoming);
    };
    let target = stored.kind();
    let fail = |reason: String| Error::Cast {
        from: ValueKind::Text,
        to: target,
        reason,
    };
    let trimmed = text.trim();
    match target {
        ValueKind::Text => Ok(Value::Text(text)),
        ValueKind::Int => trimmed
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| fail(format!("{text:?}: {e}"))),
        ValueKind::Float => trimmed
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| fail(format!("{text:?}: {e}"))),
        ValueKind::Bool => parse_bool(trimmed)
            .map(Value::Bool)
            .ok_or_else(|| fail(format!("{text:?} is not a boolean"))),
        ValueKind::Bytes => Ok(Value::Bytes(text.into_bytes())),
        ValueKind::Null
        | ValueKind::List
        | ValueKind::Set
        | ValueKind::Map
        | ValueKind::Record => Err(fail("no text representation".to_owned())),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn text_into_numeric_slots() {
        assert_eq!(coerce(&Value::Int(1), "2".into()).unwrap(), Value::Int(2));
        assert_eq!(coerce(&Value::Int(1), " -7 ".into()).unwrap(), Value::Int(-7));
        assert_eq!(
            coerce(&Value::Float(0.5), "2.25".into()).unwrap(),
            Value::Float(2.25)
        );
    }

    #[test]
    fn unparsable_text_is_a_cast_error() {
        let err = coerce(&Value::Int(1), "two".into()).unwrap_err();
        assert!(matches!(
            err,
            Error::Cast {
                from: ValueKind::Text,
                to: ValueKind::Int,
                ..
            }
        ));
        assert!(coerce(&Value::Bool(true), "maybe".into()).is_err());
        assert!(coerce(&Value::List(vec![]), "[]".into()).is_err());
        assert!(coerce(&Value::Null, "x".into()).is_err());
    }

    #[test]
    fn booleans_accept_common_spellings() {
        for (s, b) in [("TRUE", true), ("off", false), ("1", true), ("No", false)] {
            assert_eq!(coerce(&Value::Bool(!b), s.into()).unwrap(), Value::Bool(b));
        }
    }

    #[test]
    fn bytes_take_utf8() {
        assert_eq!(
            coerce(&Value::Bytes(vec![]), "hi".into()).unwrap(),
            Value::Bytes(b"hi".to_vec())
        );
    }

    #[test]
    fn non_text_passes_through() {
        assert_eq!(coerce(&Value::Int(1), Value::Float(1.5)).unwrap(), Value::Float(1.5));
        assert_eq!(
            coerce(&Value::Text("a".into()), "b".into()).unwrap(),
            Value::Text("b".into())
        );
    }
}
