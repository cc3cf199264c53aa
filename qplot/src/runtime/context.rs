//! Namespace stack for the interpreter
//!
//! Slot 0 holds the frozen builtin namespace, slot 1 the user globals,
//! and everything above is a local scope. Namespaces are ordinary
//! dictionaries, so enumeration of "all currently defined variables" is
//! deterministic.

use serde::Serialize;

use crate::builtins;
use crate::error::{Result, RuntimeError};
use crate::runtime::dict::{self, AllocPolicy, Dict, DictRef};
use crate::runtime::gc;
use crate::runtime::value::{Number, Obj, ObjKind, ObjRef, Payload};
use crate::runtime::wildcard::{WildcardMatch, WildcardResolver};

/// One visible binding, as reported by the introspection dump
#[derive(Debug, Serialize)]
pub struct Binding {
    pub name: String,
    pub kind: &'static str,
    pub value: String,
}

/// Interpreter-wide namespace stack
pub struct Context {
    namespaces: Vec<DictRef>,
    wildcards: WildcardResolver,
}

impl Context {
    /// Fresh context with populated builtins and empty globals
    pub fn new() -> Result<Self> {
        let builtin_ns = builtins::default_namespace()?;
        let globals = Dict::new(AllocPolicy::Heap).into_ref();
        let wildcards = builtins::default_wildcards()?;
        Ok(Context {
            namespaces: vec![builtin_ns, globals],
            wildcards,
        })
    }

    /// Current scope depth (2 = no local scopes)
    pub fn depth(&self) -> usize {
        self.namespaces.len()
    }

    fn top(&self) -> DictRef {
        self.namespaces
            .last()
            .expect("namespace stack is never empty")
            .clone()
    }

    pub fn builtin_ns(&self) -> &DictRef {
        &self.namespaces[0]
    }

    pub fn globals(&self) -> &DictRef {
        &self.namespaces[1]
    }

    pub fn wildcards(&self) -> &WildcardResolver {
        &self.wildcards
    }

    /// Enter a new local scope; returns the new depth
    pub fn push_scope(&mut self) -> usize {
        self.namespaces
            .push(Dict::new(AllocPolicy::Heap).into_ref());
        self.namespaces.len()
    }

    /// Leave the innermost scope, releasing every binding it holds.
    /// Panics if asked to pop the globals or builtins.
    pub fn pop_scope(&mut self) {
        if self.namespaces.len() <= 2 {
            panic!("Cannot pop the global namespace");
        }
        let ns = self.namespaces.pop().expect("namespace stack is never empty");
        gc::release_dict(&ns);
    }

    /// True when the innermost scope redirects `name` to the globals
    fn is_marked_global(&self, name: &str) -> bool {
        if self.namespaces.len() <= 2 {
            return false;
        }
        match self.top().borrow().lookup(name) {
            Some(v) => v.borrow().kind() == ObjKind::Global,
            None => false,
        }
    }

    /// Bind `name` in the innermost scope (or the globals, if the name
    /// is marked global there)
    pub fn define(&mut self, name: &str, value: ObjRef) -> Result<()> {
        let target = if self.is_marked_global(name) {
            self.globals().clone()
        } else {
            self.top()
        };
        dict::append(&target, name, value)
    }

    /// Redirect `name` in the innermost scope to the global namespace.
    /// A no-op outside any local scope.
    pub fn mark_global(&mut self, name: &str) -> Result<()> {
        if self.namespaces.len() <= 2 {
            return Ok(());
        }
        dict::append(&self.top(), name, Obj::global_marker())
    }

    /// Walk the stack from the innermost scope outward
    pub fn lookup(&self, name: &str) -> Option<ObjRef> {
        for (i, ns) in self.namespaces.iter().enumerate().rev() {
            if let Some(v) = ns.borrow().lookup(name) {
                if v.borrow().kind() == ObjKind::Global && i >= 2 {
                    return self.globals().borrow().lookup(name);
                }
                return Some(v);
            }
        }
        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Exact lookup through the stack, then the magic-name table
    pub fn resolve(&self, key: &str) -> Option<WildcardMatch> {
        for ns in self.namespaces.iter().rev() {
            if let Some(value) = ns.borrow().lookup(key) {
                return Some(WildcardMatch {
                    value,
                    substitution: String::new(),
                });
            }
        }
        self.wildcards.resolve_magic(key)
    }

    /// Temporarily hijack the binding for `name` in the innermost scope,
    /// installing a numeric placeholder. Returns the bound cell and the
    /// displaced payload (None when the name was previously unbound).
    /// Used for loop dummies and function-argument evaluation.
    pub fn get_var_pointer(&mut self, name: &str) -> Result<(ObjRef, Option<Payload>)> {
        let top = self.top();
        let existing = top.borrow().lookup(name);
        match existing {
            Some(obj) => {
                let saved = std::mem::replace(
                    &mut obj.borrow_mut().payload,
                    Payload::Num(Number::real(1.0)),
                );
                Ok((obj, Some(saved)))
            }
            None => {
                let fresh = Obj::num(1.0);
                dict::append(&top, name, fresh.clone())?;
                Ok((fresh, None))
            }
        }
    }

    /// Undo `get_var_pointer`: restore the displaced payload, tearing
    /// down whatever the interim binding holds, or remove the binding
    /// entirely if the name was previously unbound
    pub fn restore_var_pointer(&mut self, name: &str, saved: Option<Payload>) -> Result<()> {
        let top = self.top();
        match saved {
            Some(payload) => {
                let obj = top
                    .borrow()
                    .lookup(name)
                    .ok_or_else(|| RuntimeError::not_found(name))?;
                gc::replace_payload(&obj, payload);
                Ok(())
            }
            None => dict::remove_key(&top, name),
        }
    }

    /// Every visible user binding, innermost scope first, in the
    /// deterministic enumeration order. Shadowed names appear once and
    /// internal sentinels are skipped.
    pub fn dump_variables(&self) -> Vec<Binding> {
        let mut seen: Vec<String> = Vec::new();
        let mut out = Vec::new();
        for ns in self.namespaces[1..].iter().rev() {
            for b in dump_namespace(ns) {
                if !seen.contains(&b.name) {
                    seen.push(b.name.clone());
                    out.push(b);
                }
            }
        }
        out
    }
}

/// Enumerate one namespace in sorted order, skipping internal sentinels
pub fn dump_namespace(ns: &DictRef) -> Vec<Binding> {
    let d = ns.borrow();
    d.iter()
        .filter(|(_, v)| {
            !matches!(v.borrow().kind(), ObjKind::Global | ObjKind::Zombie)
        })
        .map(|(k, v)| {
            let v = v.borrow();
            Binding {
                name: k.to_string(),
                kind: v.type_name(),
                value: v.to_string(),
            }
        })
        .collect()
}
