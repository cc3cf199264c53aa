//! Magic symbol resolution
//!
//! A few built-in operators embed a user-chosen variable name in their
//! own name: `diff_dx(...)` differentiates with respect to `x`, and the
//! `x` can be any identifier. Such names cannot be found by exact
//! lookup. They are resolved against a small table of patterns, keyed
//! like ordinary symbols except that a trailing `?` stands for the
//! dummy-variable name. Resolution always tries the active namespace
//! exactly first; the pattern table is a fallback.

use crate::error::Result;
use crate::runtime::dict::{self, AllocPolicy, Dict, DictRef};
use crate::runtime::value::ObjRef;

/// Upper bound on the length of a dummy-variable name
pub const DUMMY_NAME_MAX: usize = 16;

/// A successful resolution: the generic entry plus the extracted
/// dummy-variable name (empty for exact matches)
pub struct WildcardMatch {
    pub value: ObjRef,
    pub substitution: String,
}

/// Table of magic-name patterns consulted after a failed exact lookup
pub struct WildcardResolver {
    table: DictRef,
}

impl WildcardResolver {
    pub fn new(policy: AllocPolicy) -> Self {
        WildcardResolver {
            table: Dict::new(policy).into_ref(),
        }
    }

    /// Register a pattern. A key ending in `?` matches that prefix
    /// followed by any valid dummy-variable name; any other key must
    /// match exactly.
    pub fn register(&self, pattern: &str, value: ObjRef) -> Result<()> {
        dict::append(&self.table, pattern, value)
    }

    pub fn table(&self) -> &DictRef {
        &self.table
    }

    /// Exact lookup in `namespace`, falling back to the pattern table
    pub fn resolve(&self, namespace: &DictRef, key: &str) -> Option<WildcardMatch> {
        if let Some(value) = namespace.borrow().lookup(key) {
            return Some(WildcardMatch {
                value,
                substitution: String::new(),
            });
        }
        self.resolve_magic(key)
    }

    /// Probe the pattern table alone
    pub fn resolve_magic(&self, key: &str) -> Option<WildcardMatch> {
        let table = self.table.borrow();
        for (pattern, value) in table.iter() {
            if let Some(prefix) = pattern.strip_suffix('?') {
                if let Some(suffix) = key.strip_prefix(prefix) {
                    if is_valid_dummy(suffix) {
                        return Some(WildcardMatch {
                            value: value.clone(),
                            substitution: suffix.to_string(),
                        });
                    }
                }
            } else if pattern == key {
                return Some(WildcardMatch {
                    value: value.clone(),
                    substitution: String::new(),
                });
            }
        }
        None
    }
}

/// A dummy-variable name starts with a letter, continues with
/// alphanumerics or underscores, and is bounded in length
fn is_valid_dummy(s: &str) -> bool {
    if s.is_empty() || s.len() > DUMMY_NAME_MAX {
        return false;
    }
    let bytes = s.as_bytes();
    if !bytes[0].is_ascii_alphabetic() {
        return false;
    }
    bytes[1..]
        .iter()
        .all(|&b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Dictionary-surface form: exact lookup against `dict`, then the magic
/// table
pub fn lookup_with_wildcard(
    dict: &DictRef,
    resolver: &WildcardResolver,
    key: &str,
) -> Option<WildcardMatch> {
    resolver.resolve(dict, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::value::Obj;

    fn resolver_with(patterns: &[&str]) -> WildcardResolver {
        let r = WildcardResolver::new(AllocPolicy::Heap);
        for p in patterns {
            r.register(p, Obj::str(*p)).unwrap();
        }
        r
    }

    fn empty_ns() -> DictRef {
        Dict::new(AllocPolicy::Heap).into_ref()
    }

    #[test]
    fn test_suffix_becomes_substitution() {
        let r = resolver_with(&["diff_d?"]);
        let m = r.resolve(&empty_ns(), "diff_dx").unwrap();
        assert_eq!(m.substitution, "x");

        let m = r.resolve(&empty_ns(), "diff_dtheta").unwrap();
        assert_eq!(m.substitution, "theta");
    }

    #[test]
    fn test_empty_suffix_does_not_match() {
        let r = resolver_with(&["diff_d?"]);
        assert!(r.resolve(&empty_ns(), "diff_d").is_none());
    }

    #[test]
    fn test_suffix_must_start_with_a_letter() {
        let r = resolver_with(&["diff_d?"]);
        assert!(r.resolve(&empty_ns(), "diff_d2x").is_none());
        assert!(r.resolve(&empty_ns(), "diff_d_x").is_none());
    }

    #[test]
    fn test_suffix_length_is_bounded() {
        let r = resolver_with(&["diff_d?"]);
        let ok = format!("diff_d{}", "a".repeat(DUMMY_NAME_MAX));
        let too_long = format!("diff_d{}", "a".repeat(DUMMY_NAME_MAX + 1));
        assert!(r.resolve(&empty_ns(), &ok).is_some());
        assert!(r.resolve(&empty_ns(), &too_long).is_none());
    }

    #[test]
    fn test_suffix_may_contain_digits_and_underscores() {
        let r = resolver_with(&["int_d?"]);
        let m = r.resolve(&empty_ns(), "int_dalpha_1").unwrap();
        assert_eq!(m.substitution, "alpha_1");
    }

    #[test]
    fn test_exact_pattern_matches_with_empty_substitution() {
        let r = resolver_with(&["unit"]);
        let m = r.resolve(&empty_ns(), "unit").unwrap();
        assert_eq!(m.substitution, "");
        assert!(r.resolve(&empty_ns(), "unitx").is_none());
    }

    #[test]
    fn test_exact_namespace_entry_wins_over_pattern() {
        let r = resolver_with(&["diff_d?"]);
        let ns = empty_ns();
        let bound = Obj::num(7.0);
        dict::append(&ns, "diff_dx", bound.clone()).unwrap();

        let m = r.resolve(&ns, "diff_dx").unwrap();
        assert!(std::rc::Rc::ptr_eq(&m.value, &bound));
        assert_eq!(m.substitution, "");
    }

    #[test]
    fn test_unknown_key_reports_not_found() {
        let r = resolver_with(&["diff_d?", "int_d?"]);
        assert!(r.resolve(&empty_ns(), "frobnicate").is_none());
    }

    #[test]
    fn test_surface_helper_delegates() {
        let r = resolver_with(&["diff_d?"]);
        let ns = empty_ns();
        let m = lookup_with_wildcard(&ns, &r, "diff_dq").unwrap();
        assert_eq!(m.substitution, "q");
    }
}
