//! Integration tests for the runtime core
//!
//! Exercises the full surface: the ordered hash-accelerated dictionary,
//! magic-name resolution, the release protocol, shared numeric buffers
//! and the namespace context.

use std::collections::HashMap;
use std::rc::Rc;

use qplot::builtins;
use qplot::runtime::context::{dump_namespace, Context};
use qplot::runtime::dict::{self, symbol_cmp, AllocPolicy, Dict, DictRef};
use qplot::runtime::gc;
use qplot::runtime::value::{Obj, ObjKind, ObjRef, Payload};
use qplot::runtime::vector::Vector;
use qplot::RuntimeError;

/// Helper: fresh heap-policy dictionary
fn heap_dict() -> DictRef {
    Dict::new(AllocPolicy::Heap).into_ref()
}

/// Helper: the real part of a number value
fn real_of(v: &ObjRef) -> f64 {
    match &v.borrow().payload {
        Payload::Num(n) => n.real,
        other => panic!("expected a number, got {}", other.kind().name()),
    }
}

/// Helper: brute-force two distinct short keys with an identical hash
fn collision_pair() -> (String, String) {
    let mut seen: HashMap<u32, String> = HashMap::new();
    for a in b'A'..=b'z' {
        for b in b'0'..=b'z' {
            let k = String::from_utf8(vec![a, b]).unwrap();
            let h = Dict::hash(&k);
            if let Some(prev) = seen.get(&h) {
                if prev != &k {
                    return (prev.clone(), k);
                }
            }
            seen.insert(h, k);
        }
    }
    panic!("no collision found in the probe alphabet");
}

// ============================================
// Dictionary ordering
// ============================================

#[test]
fn test_iteration_order_is_total_and_insertion_independent() {
    let keys = [
        "Zeta", "alpha", "ALPHA", "beta", "Alpha", "gamma", "delta", "Beta",
    ];
    let mut permutations: Vec<Vec<&str>> = vec![keys.to_vec()];
    let mut reversed = keys.to_vec();
    reversed.reverse();
    permutations.push(reversed);
    let mut rotated = keys.to_vec();
    rotated.rotate_left(3);
    permutations.push(rotated);

    let mut expected: Vec<String> = keys.iter().map(|s| s.to_string()).collect();
    expected.sort_by(|a, b| symbol_cmp(a, b));

    for perm in permutations {
        let d = heap_dict();
        for k in perm {
            dict::append(&d, k, Obj::null()).unwrap();
        }
        assert_eq!(d.borrow().keys(), expected);
    }
}

#[test]
fn test_order_survives_removals() {
    let d = heap_dict();
    for k in ["one", "Two", "three", "Four", "five"] {
        dict::append(&d, k, Obj::null()).unwrap();
    }
    dict::remove_key(&d, "three").unwrap();
    dict::append(&d, "six", Obj::null()).unwrap();

    let keys = d.borrow().keys();
    let mut sorted = keys.clone();
    sorted.sort_by(|a, b| symbol_cmp(a, b));
    assert_eq!(keys, sorted);
}

// ============================================
// Overwrite semantics
// ============================================

#[test]
fn test_overwrite_leaves_one_entry_at_original_position() {
    let d = heap_dict();
    dict::append(&d, "aaa", Obj::num(1.0)).unwrap();
    dict::append(&d, "bbb", Obj::num(2.0)).unwrap();
    dict::append(&d, "ccc", Obj::num(3.0)).unwrap();

    let first = Obj::num(10.0);
    dict::append(&d, "bbb", first.clone()).unwrap();
    dict::append(&d, "bbb", Obj::num(20.0)).unwrap();

    assert_eq!(d.borrow().len(), 3);
    assert_eq!(d.borrow().keys(), vec!["aaa", "bbb", "ccc"]);
    assert_eq!(real_of(&d.borrow().lookup("bbb").unwrap()), 20.0);
    // The displaced payload was released
    assert!(first.borrow().is_zombie());
}

// ============================================
// Lookup and membership
// ============================================

#[test]
fn test_contains_agrees_with_lookup_everywhere() {
    let d = heap_dict();
    let (c1, c2) = collision_pair();
    for k in ["x", "Y", "longer_name", c1.as_str(), c2.as_str()] {
        dict::append(&d, k, Obj::null()).unwrap();
    }
    for k in ["x", "Y", "y", "longer_name", c1.as_str(), c2.as_str(), "absent"] {
        assert_eq!(
            d.borrow().contains(k),
            d.borrow().lookup(k).is_some(),
            "membership disagrees for {k}"
        );
    }
}

// ============================================
// Hash collisions
// ============================================

#[test]
fn test_colliding_keys_resolve_correctly() {
    let (c1, c2) = collision_pair();
    assert_eq!(Dict::hash(&c1), Dict::hash(&c2));

    let d = heap_dict();
    dict::append(&d, &c1, Obj::num(1.0)).unwrap();
    dict::append(&d, &c2, Obj::num(2.0)).unwrap();

    assert_eq!(real_of(&d.borrow().lookup(&c1).unwrap()), 1.0);
    assert_eq!(real_of(&d.borrow().lookup(&c2).unwrap()), 2.0);

    // Removal of either must leave the other findable
    dict::remove_key(&d, &c1).unwrap();
    assert!(d.borrow().lookup(&c1).is_none());
    assert_eq!(real_of(&d.borrow().lookup(&c2).unwrap()), 2.0);
}

#[test]
fn test_collisions_mixed_with_ordinary_keys() {
    let (c1, c2) = collision_pair();
    let d = heap_dict();
    for k in ["apple", "banana", "cherry"] {
        dict::append(&d, k, Obj::null()).unwrap();
    }
    dict::append(&d, &c1, Obj::num(1.0)).unwrap();
    dict::append(&d, &c2, Obj::num(2.0)).unwrap();

    for k in ["apple", "banana", "cherry", c1.as_str(), c2.as_str()] {
        assert!(d.borrow().contains(k), "lost key {k}");
    }
    assert_eq!(d.borrow().len(), 5);
}

// ============================================
// Removal round trips
// ============================================

#[test]
fn test_remove_key_then_lookup_is_absent() {
    let d = heap_dict();
    dict::append(&d, "k", Obj::num(1.0)).unwrap();
    let len_before = d.borrow().len();

    dict::remove_key(&d, "k").unwrap();
    assert!(d.borrow().lookup("k").is_none());
    assert_eq!(d.borrow().len(), len_before - 1);

    // Removing a missing key fails and leaves the length unchanged
    assert!(matches!(
        dict::remove_key(&d, "k"),
        Err(RuntimeError::NotFound { .. })
    ));
    assert_eq!(d.borrow().len(), len_before - 1);
}

#[test]
fn test_remove_all_by_identity() {
    let d = heap_dict();
    let shared = Obj::num(5.0);
    dict::append(&d, "a", Obj::acquire(&shared)).unwrap();
    dict::append(&d, "b", Obj::acquire(&shared)).unwrap();
    dict::append(&d, "c", Obj::num(0.0)).unwrap();

    dict::remove_all(&d, &shared).unwrap();
    assert_eq!(d.borrow().len(), 1);
    assert!(d.borrow().contains("c"));
}

// ============================================
// Wildcard resolution
// ============================================

#[test]
fn test_wildcard_extracts_dummy_variable() {
    let w = builtins::default_wildcards().unwrap();
    let ns = heap_dict();

    let m = w.resolve(&ns, "diff_dx").unwrap();
    assert_eq!(m.substitution, "x");
    assert_eq!(m.value.borrow().kind(), ObjKind::Func);

    // Empty suffix is not a match
    assert!(w.resolve(&ns, "diff_d").is_none());
    // Malformed suffixes are not matches
    assert!(w.resolve(&ns, "diff_d9").is_none());
    let long = format!("diff_d{}", "a".repeat(40));
    assert!(w.resolve(&ns, &long).is_none());
}

#[test]
fn test_wildcard_prefers_exact_binding() {
    let w = builtins::default_wildcards().unwrap();
    let ns = heap_dict();
    let exact = Obj::num(1.0);
    dict::append(&ns, "diff_dx", exact.clone()).unwrap();

    let m = w.resolve(&ns, "diff_dx").unwrap();
    assert!(Rc::ptr_eq(&m.value, &exact));
    assert_eq!(m.substitution, "");
}

// ============================================
// Release protocol
// ============================================

#[test]
fn test_release_totality_over_nested_containers() {
    // dictionary -> list -> dictionary -> (number, vector)
    let leaf_num = Obj::num(1.0);
    let leaf_vec = Obj::vector(3).unwrap();

    let inner = Obj::dict_new(AllocPolicy::Heap);
    if let Payload::Dict(d) = &inner.borrow().payload {
        dict::append(d, "n", leaf_num.clone()).unwrap();
        dict::append(d, "v", leaf_vec.clone()).unwrap();
    }

    let mid = Obj::list_new(AllocPolicy::Heap);
    if let Payload::List(l) = &mid.borrow().payload {
        l.borrow_mut().push(inner.clone());
    }

    let root = Obj::dict_new(AllocPolicy::Heap);
    if let Payload::Dict(d) = &root.borrow().payload {
        dict::append(d, "mid", mid.clone()).unwrap();
    }

    gc::release(&root);

    for v in [&root, &mid, &inner, &leaf_num, &leaf_vec] {
        assert!(v.borrow().is_zombie());
        assert_eq!(v.borrow().refs, 0);
    }
}

#[test]
fn test_deeply_nested_release_terminates() {
    // A few hundred levels of dictionary nesting
    let mut handles = Vec::new();
    let mut current = Obj::dict_new(AllocPolicy::Heap);
    handles.push(current.clone());
    for i in 0..300 {
        let parent = Obj::dict_new(AllocPolicy::Heap);
        if let Payload::Dict(d) = &parent.borrow().payload {
            dict::append(d, &format!("level_{i}"), current).unwrap();
        }
        current = parent.clone();
        handles.push(parent);
    }

    gc::release(&current);
    for h in &handles {
        assert!(h.borrow().is_zombie());
    }
}

#[test]
fn test_double_release_is_safe() {
    let v = Obj::str("short lived");
    gc::release(&v);
    gc::release(&v);
    assert!(v.borrow().is_zombie());
    assert_eq!(v.borrow().refs, 0);
}

// ============================================
// Shared numeric buffers
// ============================================

#[test]
fn test_vector_values_share_one_raw_buffer() {
    let v1 = Obj::vector(4).unwrap();
    let raw = match &v1.borrow().payload {
        Payload::Vector(w) => w.borrow().raw.clone(),
        _ => panic!("expected vector"),
    };
    let v2 = Obj::vector_value(Vector::view(&raw, 4).into_ref());
    assert_eq!(raw.borrow().refs, 2);

    // Writes through one view are visible through the other
    if let Payload::Vector(w) = &v1.borrow().payload {
        w.borrow_mut().set(2, 7.5);
    }
    if let Payload::Vector(w) = &v2.borrow().payload {
        assert_eq!(w.borrow().get(2), Some(7.5));
    }

    // Releasing one value leaves the buffer intact and the other usable
    gc::release(&v1);
    assert_eq!(raw.borrow().refs, 1);
    assert!(!raw.borrow().is_freed());
    if let Payload::Vector(w) = &v2.borrow().payload {
        assert!(w.borrow_mut().set(0, 1.0));
        assert_eq!(w.borrow().get(0), Some(1.0));
    }

    // Releasing the second reclaims the buffer exactly once
    gc::release(&v2);
    assert_eq!(raw.borrow().refs, 0);
    assert!(raw.borrow().is_freed());
}

// ============================================
// Allocation policies
// ============================================

#[test]
fn test_arena_entries_are_not_individually_released() {
    let arena = Dict::new(AllocPolicy::Arena).into_ref();
    let child = Obj::num(1.0);
    arena.borrow_mut().insert("x", child.clone()).unwrap();

    // free() performs no per-entry work under the arena policy
    dict::free(&arena);
    assert_eq!(arena.borrow().len(), 1);
    assert!(!child.borrow().is_zombie());

    // Neither does the namespace teardown
    gc::release_namespace(&arena);
    assert!(!child.borrow().is_zombie());

    // Bulk discard afterwards must not double-release anything
    drop(arena);
    assert!(!child.borrow().is_zombie());
    assert_eq!(child.borrow().refs, 1);
}

#[test]
fn test_heap_teardown_walks_and_releases() {
    let d = heap_dict();
    let child = Obj::num(1.0);
    dict::append(&d, "x", child.clone()).unwrap();

    gc::release_namespace(&d);
    assert!(child.borrow().is_zombie());
    assert_eq!(d.borrow().len(), 0);
}

// ============================================
// Value aliasing
// ============================================

#[test]
fn test_copied_dict_value_aliases_storage() {
    let a = Obj::dict_new(AllocPolicy::Heap);
    let b = Obj::copy(&a);

    if let Payload::Dict(d) = &a.borrow().payload {
        dict::append(d, "shared", Obj::num(9.0)).unwrap();
    }
    // The mutation is visible through the copy
    if let Payload::Dict(d) = &b.borrow().payload {
        assert_eq!(real_of(&d.borrow().lookup("shared").unwrap()), 9.0);
    }

    // Releasing the copy leaves the original usable
    gc::release(&b);
    if let Payload::Dict(d) = &a.borrow().payload {
        assert_eq!(d.borrow().len(), 1);
    }
}

// ============================================
// Namespace context
// ============================================

#[test]
fn test_scope_lifecycle_with_globals() {
    let mut ctx = Context::new().unwrap();
    ctx.define("total", Obj::num(0.0)).unwrap();

    ctx.push_scope();
    ctx.mark_global("total").unwrap();
    ctx.define("total", Obj::num(10.0)).unwrap();
    ctx.define("local_only", Obj::num(1.0)).unwrap();
    ctx.pop_scope();

    assert_eq!(real_of(&ctx.lookup("total").unwrap()), 10.0);
    assert!(!ctx.contains("local_only"));
}

#[test]
fn test_builtin_dump_is_deterministic() {
    let a = builtins::default_namespace().unwrap();
    let b = builtins::default_namespace().unwrap();
    let da: Vec<String> = dump_namespace(&a)
        .iter()
        .map(|x| format!("{} {} {}", x.name, x.kind, x.value))
        .collect();
    let db: Vec<String> = dump_namespace(&b)
        .iter()
        .map(|x| format!("{} {} {}", x.name, x.kind, x.value))
        .collect();
    assert_eq!(da, db);
    assert!(!da.is_empty());
}

#[test]
fn test_frozen_module_rejects_mutation_and_survives() {
    let ns = builtins::default_namespace().unwrap();
    let os = ns.borrow().lookup("os").unwrap();
    let d = match &os.borrow().payload {
        Payload::Module(d) => d.clone(),
        _ => panic!("expected module"),
    };
    let before = d.borrow().len();
    assert!(matches!(
        dict::append(&d, "intruder", Obj::null()),
        Err(RuntimeError::Frozen { .. })
    ));
    assert_eq!(d.borrow().len(), before);
    assert!(d.borrow().contains("name"));
}
