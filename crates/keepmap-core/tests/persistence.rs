// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Load/save behavior of `PersistentMap` over an instrumented in-memory store.

use std::collections::BTreeSet;

use keepmap_core::{
    BackingStore, Error, Format, Key, Mapping, MemoryStore, MissingFile, ModuleHandle, ModuleTable,
    PersistentMap, Policy, Record, TypeRef, Value,
};

fn json() -> Policy {
    Policy::default().with_format(Format::Json)
}

fn mapping<const N: usize>(entries: [(&str, i64); N]) -> Mapping {
    entries
        .into_iter()
        .map(|(k, v)| (Key::from(k), Value::Int(v)))
        .collect()
}

// ── 1. Loading ──────────────────────────────────────────────────────────

#[test]
fn file_contents_merge_over_defaults() {
    let store = MemoryStore::at("/cfg.json").with_contents(br#"{"b":3,"c":4}"#.to_vec());
    let policy = json()
        .with_default("a", 1)
        .with_default("b", 2)
        .with_save_on_drop(false, false);
    let map = PersistentMap::open(store, policy).expect("open");
    assert!(map.is_loaded());
    assert_eq!(map.as_mapping(), &mapping([("a", 1), ("b", 3), ("c", 4)]));
    assert!(!map.changed());
}

#[test]
fn without_include_defaults_file_replaces_contents() {
    let store = MemoryStore::at("/cfg.json").with_contents(br#"{"b":3,"c":4}"#.to_vec());
    let policy = json()
        .with_default("a", 1)
        .with_default("b", 2)
        .with_include_defaults(false)
        .with_save_on_drop(false, false);
    let map = PersistentMap::open(store, policy).expect("open");
    assert_eq!(map.as_mapping(), &mapping([("b", 3), ("c", 4)]));
}

#[test]
fn missing_file_seeds_defaults() {
    let store = MemoryStore::at("/absent.json");
    let policy = json().with_default("a", 1).with_save_on_drop(false, false);
    let map = PersistentMap::open(store.clone(), policy).expect("open");
    assert!(map.is_loaded());
    assert_eq!(map.as_mapping(), &mapping([("a", 1)]));
    assert_eq!(store.reads(), 0);
    assert!(store.contents().is_none(), "loading never creates the file");
}

#[test]
fn missing_file_can_be_an_error() {
    let store = MemoryStore::at("/absent.json");
    let policy = json().with_missing_file(MissingFile::Fail);
    let err = PersistentMap::open(store.clone(), policy).unwrap_err();
    assert!(err.is_not_found(), "got {err}");
    assert_eq!(store.writes(), 0, "failed open must not save on drop");
}

#[test]
fn empty_file_yields_defaults() {
    let store = MemoryStore::at("/empty.json").with_contents(Vec::new());
    let policy = json().with_default("a", 1).with_save_on_drop(false, false);
    let map = PersistentMap::open(store, policy).expect("open");
    assert_eq!(map.as_mapping(), &mapping([("a", 1)]));
}

#[test]
fn reload_discards_unsaved_edits() {
    let store = MemoryStore::at("/cfg.json").with_contents(br#"{"a":1}"#.to_vec());
    let mut map = PersistentMap::open(store, json().with_save_on_drop(false, false)).unwrap();
    map.insert("a", 99).unwrap();
    map.insert("z", 0).unwrap();
    map.load().unwrap();
    assert_eq!(map.as_mapping(), &mapping([("a", 1)]));
}

// ── 2. Saving ───────────────────────────────────────────────────────────

#[test]
fn unchanged_map_is_not_rewritten() {
    let store = MemoryStore::at("/cfg.json").with_contents(br#"{"a":1}"#.to_vec());
    let mut map = PersistentMap::open(store.clone(), json().with_save_on_drop(true, false)).unwrap();
    assert!(!map.save(false).unwrap());
    map.insert("a", 1).unwrap();
    assert!(!map.save(false).unwrap(), "same value is not a change");
    drop(map);
    assert_eq!(store.writes(), 0);
}

#[test]
fn forced_save_always_writes() {
    let store = MemoryStore::at("/cfg.json").with_contents(br#"{"a":1}"#.to_vec());
    let mut map = PersistentMap::open(store.clone(), json().with_save_on_drop(false, false)).unwrap();
    assert!(map.save(true).unwrap());
    assert!(map.save(true).unwrap());
    assert_eq!(store.writes(), 2);
}

#[test]
fn dirty_save_writes_once() {
    let store = MemoryStore::at("/cfg.json");
    let mut map = PersistentMap::open(store.clone(), json().with_save_on_drop(false, false)).unwrap();
    map.insert("volume", 7).unwrap();
    assert!(map.changed());
    assert!(map.save(false).unwrap());
    assert!(!map.changed());
    assert!(!map.save(false).unwrap());
    assert_eq!(store.writes(), 1);
    assert_eq!(store.contents().unwrap(), br#"{"volume":7}"#);
}

#[test]
fn removal_and_clear_count_as_changes() {
    let store = MemoryStore::at("/cfg.json").with_contents(br#"{"a":1,"b":2}"#.to_vec());
    let mut map = PersistentMap::open(store.clone(), json().with_save_on_drop(false, false)).unwrap();
    assert_eq!(map.remove("a"), Some(Value::Int(1)));
    assert!(map.changed());
    map.save(false).unwrap();
    map.clear();
    assert!(map.changed());
    map.save(false).unwrap();
    assert_eq!(store.contents().unwrap(), b"{}");
}

#[test]
fn nested_edits_are_detected() {
    let store = MemoryStore::at("/cfg.json").with_contents(br#"{"items":[1,2]}"#.to_vec());
    let mut map = PersistentMap::open(store.clone(), json().with_save_on_drop(false, false)).unwrap();
    map.get_mut("items")
        .and_then(Value::as_list_mut)
        .expect("list")
        .push(Value::Int(3));
    assert!(map.changed());
    assert!(map.save(false).unwrap());
    assert_eq!(store.contents().unwrap(), br#"{"items":[1,2,3]}"#);
}

#[test]
fn disabled_tracking_writes_every_time() {
    let store = MemoryStore::at("/cfg.json").with_contents(br#"{"a":1}"#.to_vec());
    let policy = json()
        .with_track_changes(false)
        .with_save_on_drop(false, false);
    let mut map = PersistentMap::open(store.clone(), policy).unwrap();
    assert!(map.changed());
    assert!(map.save(false).unwrap());
    assert!(map.save(false).unwrap());
    assert_eq!(store.writes(), 2);
}

#[test]
fn unsupported_value_fails_before_touching_the_file() {
    let store = MemoryStore::at("/cfg.json").with_contents(br#"{"a":1}"#.to_vec());
    let mut map = PersistentMap::open(store.clone(), json().with_save_on_drop(false, false)).unwrap();
    map.insert("blob", Value::Bytes(vec![1, 2])).unwrap();
    let err = map.save(false).unwrap_err();
    assert!(matches!(err, Error::UnsupportedValue { format: "json", .. }), "got {err}");
    assert_eq!(store.contents().unwrap(), br#"{"a":1}"#);
    assert!(map.changed(), "failed save keeps the map dirty");
}

// ── 3. End of life ──────────────────────────────────────────────────────

#[test]
fn drop_saves_pending_changes() {
    let store = MemoryStore::at("/cfg.json");
    {
        let mut map = PersistentMap::open(store.clone(), json().with_save_on_drop(true, false)).unwrap();
        map.insert("a", 1).unwrap();
    }
    assert_eq!(store.contents().unwrap(), br#"{"a":1}"#);
}

#[test]
fn default_policy_forces_the_final_save() {
    let store = MemoryStore::at("/cfg.json").with_contents(br#"{"a":1}"#.to_vec());
    drop(PersistentMap::open(store.clone(), json()).unwrap());
    assert_eq!(store.writes(), 1);
}

#[test]
fn disabled_final_save_leaves_file_alone() {
    let store = MemoryStore::at("/cfg.json");
    {
        let mut map = PersistentMap::open(store.clone(), json().with_save_on_drop(false, false)).unwrap();
        map.insert("a", 1).unwrap();
    }
    assert!(store.contents().is_none());
}

#[test]
fn close_reports_the_final_save() {
    let store = MemoryStore::at("/cfg.json");
    let mut map = PersistentMap::open(store.clone(), json().with_save_on_drop(true, false)).unwrap();
    map.insert("a", 1).unwrap();
    assert!(map.close().unwrap());
    assert_eq!(store.writes(), 1, "drop after close does not save again");
}

#[test]
fn close_surfaces_write_errors() {
    let store = MemoryStore::at("/cfg.json");
    let mut map = PersistentMap::open(store.clone(), json()).unwrap();
    map.insert("a", 1).unwrap();
    store.set_read_only(true);
    let err = map.close().unwrap_err();
    assert!(matches!(err, Error::Io { .. }), "got {err}");
}

#[test]
fn drop_swallows_write_errors() {
    let store = MemoryStore::at("/cfg.json");
    let mut map = PersistentMap::open(store.clone(), json()).unwrap();
    map.insert("a", 1).unwrap();
    store.set_read_only(true);
    drop(map);
    assert_eq!(store.writes(), 0);
}

// ── 4. Reopening ────────────────────────────────────────────────────────

#[test]
fn lossless_formats_reopen_every_kind() {
    let table = ModuleTable::new();
    table.register(ModuleHandle::new("geometry", ["Point"]));
    let point = Record::new(TypeRef::new("geometry", "Point"))
        .with_field("x", 1)
        .with_field("y", -2.5);
    let tags: BTreeSet<Key> = [Key::from("a"), Key::Int(3)].into_iter().collect();

    for format in [Format::CborBinary, Format::CborHex] {
        let store = MemoryStore::at(format!("/state.{format}"));
        let mut map = PersistentMap::builder(store.clone())
            .policy(Policy::default().with_save_on_drop(false, false))
            .format(format)
            .modules(table.clone())
            .open()
            .unwrap();
        map.insert(Key::Int(7), "seven").unwrap();
        map.insert(Key::Bool(true), Value::Null).unwrap();
        map.insert(Key::Bytes(vec![0xff]), Value::Bytes(vec![0, 1])).unwrap();
        map.insert("tags", Value::Set(tags.clone())).unwrap();
        map.insert("origin", point.clone()).unwrap();
        map.insert("ratio", 2.0).unwrap();
        map.save(false).unwrap();
        let saved = map.as_mapping().clone();
        drop(map);

        let reopened = PersistentMap::builder(store)
            .policy(Policy::default().with_save_on_drop(false, false))
            .format(format)
            .modules(table.clone())
            .open()
            .unwrap();
        assert_eq!(reopened.as_mapping(), &saved, "{format}");
        assert!(!reopened.changed());
    }
}

#[test]
fn pretty_json_reopens_with_string_keys() {
    let store = MemoryStore::at("/cfg.json");
    let policy = Policy::default()
        .with_format(Format::JsonPretty)
        .with_save_on_drop(false, false);
    let mut map = PersistentMap::open(store.clone(), policy.clone()).unwrap();
    map.insert(Key::Int(1), "one").unwrap();
    map.save(false).unwrap();
    assert_eq!(store.contents().unwrap(), b"{\n    \"1\": \"one\"\n}");

    let reopened = PersistentMap::open(store, policy).unwrap();
    assert_eq!(reopened.get("1"), Some(&Value::from("one")));
    assert_eq!(reopened.get(Key::Int(1)), None);
}

#[test]
fn load_from_and_save_to_rebind() {
    let store = MemoryStore::new();
    let mut other = store.clone();
    other.bind("/b.json".into()).unwrap();
    other.write_all(br#"{"from":"b"}"#).unwrap();

    let mut map = PersistentMap::open(store.clone(), json().with_save_on_drop(false, false)).unwrap();
    assert!(map.path().is_none());
    map.load_from("/b.json").unwrap();
    assert_eq!(map.get("from"), Some(&Value::from("b")));
    assert!(map.save_to("/c.json", false).unwrap());
    assert_eq!(
        store.contents_at(std::path::Path::new("/c.json")).unwrap(),
        br#"{"from":"b"}"#
    );
}

// ── 5. Auto-cast ────────────────────────────────────────────────────────

#[test]
fn text_assignments_take_the_stored_kind() {
    let policy = json()
        .with_auto_cast(true)
        .with_default("port", 8080)
        .with_default("debug", false)
        .with_default("scale", 1.0)
        .with_save_on_drop(false, false);
    let mut map = PersistentMap::open(MemoryStore::new(), policy).unwrap();
    map.insert("port", "9090").unwrap();
    map.insert("debug", "yes").unwrap();
    map.insert("scale", "0.5").unwrap();
    assert_eq!(map.get("port"), Some(&Value::Int(9090)));
    assert_eq!(map.get("debug"), Some(&Value::Bool(true)));
    assert_eq!(map.get("scale"), Some(&Value::Float(0.5)));
}

#[test]
fn without_auto_cast_text_replaces_the_value() {
    let policy = json().with_default("port", 8080).with_save_on_drop(false, false);
    let mut map = PersistentMap::open(MemoryStore::new(), policy).unwrap();
    map.insert("port", "9090").unwrap();
    assert_eq!(map.get("port"), Some(&Value::from("9090")));
}
