// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

crate::define_id! {
    /// Test ID type for macro verification.
    pub struct TestId;
}

#[test]
fn define_id_new_and_as_str() {
    let id = TestId::new("abc");
    assert_eq!(id.as_str(), "abc");
}

#[test]
fn define_id_display_and_eq() {
    let id = TestId::new("worker:t1:abcd");
    assert_eq!(id.to_string(), "worker:t1:abcd");
    assert_eq!(id, "worker:t1:abcd");
}

#[test]
fn define_id_short_truncates() {
    let id = TestId::new("abcdefgh");
    assert_eq!(id.short(4), "abcd");
    assert_eq!(id.short(100), "abcdefgh");
}

#[test]
fn define_id_hash_map_lookup_by_str() {
    let mut map = HashMap::new();
    map.insert(TestId::new("k"), 42);
    assert_eq!(map.get("k"), Some(&42));
}

#[test]
fn define_id_serde_is_plain_string() {
    let id = TestId::new("serde-test");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"serde-test\"");
    let parsed: TestId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn short_id_on_str() {
    assert_eq!("hello".short(3), "hel");
    assert_eq!("hi".short(3), "hi");
}

#[test]
fn uuid_id_gen_is_unique() {
    let gen = UuidIdGen;
    assert_ne!(gen.next(), gen.next());
}

#[test]
fn sequential_id_gen_counts_up() {
    let gen = SequentialIdGen::new("agent");
    assert_eq!(gen.next(), "agent-1");
    assert_eq!(gen.next(), "agent-2");

    // Clones share the counter
    let cloned = gen.clone();
    assert_eq!(cloned.next(), "agent-3");
}
