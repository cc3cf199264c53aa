//! The release protocol
//!
//! Reference counts are decremented here and nowhere else. When a cell's
//! count reaches zero its tag is overwritten with a zombie tombstone
//! before any recursive work happens, so re-entrant traversal during
//! teardown observes a marker instead of a half-destroyed value. Release
//! is total: it cannot fail and is defined for every reachable state,
//! including a second release of an already-dead cell.

use crate::runtime::dict::{AllocPolicy, DictRef};
use crate::runtime::list::ListRef;
use crate::runtime::value::{ObjRef, Payload};

const STACK_RED_ZONE: usize = 128 * 1024; // 128KB remaining triggers growth
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024; // Grow by 4MB each time

/// Drop one reference to a value cell; tears the value down when the
/// last reference goes
pub fn release(obj: &ObjRef) {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || release_inner(obj));
}

fn release_inner(obj: &ObjRef) {
    let (payload, lval, receiver) = {
        let mut o = obj.borrow_mut();
        if o.refs == 0 {
            // Already a zombie; a double release is a safe no-op
            return;
        }
        o.refs -= 1;
        if o.refs > 0 {
            return;
        }
        (
            std::mem::replace(&mut o.payload, Payload::Zombie),
            o.lval.take(),
            o.receiver.take(),
        )
    };

    // Back-references are ownership edges and go first
    if let Some(l) = lval {
        release(&l);
    }
    if let Some(r) = receiver {
        release(&r);
    }
    dispatch(payload);
}

/// Type-directed teardown of a payload captured from a dying cell
fn dispatch(payload: Payload) {
    match payload {
        // Scalar payloads and owned character buffers go with the variant
        Payload::Null
        | Payload::Bool(_)
        | Payload::Num(_)
        | Payload::Str(_)
        | Payload::Date(_)
        | Payload::Color(_)
        | Payload::Exception(_)
        | Payload::Zombie
        | Payload::GlobalMarker => {}

        Payload::Dict(d) | Payload::Module(d) => release_dict(&d),

        Payload::List(l) => {
            let n = {
                let mut ll = l.borrow_mut();
                ll.refs = ll.refs.saturating_sub(1);
                ll.refs
            };
            if n == 0 {
                release_list(&l);
            }
        }

        // Wrapper and raw buffer are shared independently; each is
        // freed only when its own count reaches zero
        Payload::Vector(v) => {
            let raw = {
                let mut w = v.borrow_mut();
                w.refs = w.refs.saturating_sub(1);
                if w.refs == 0 { Some(w.raw.clone()) } else { None }
            };
            if let Some(raw) = raw {
                raw.borrow_mut().release();
            }
        }
        Payload::Matrix(m) => {
            let raw = {
                let mut w = m.borrow_mut();
                w.refs = w.refs.saturating_sub(1);
                if w.refs == 0 { Some(w.raw.clone()) } else { None }
            };
            if let Some(raw) = raw {
                raw.borrow_mut().release();
            }
        }

        Payload::Func(f) => {
            let mut chain = f.borrow_mut();
            chain.refs = chain.refs.saturating_sub(1);
            if chain.refs == 0 {
                chain.clear();
            }
        }

        Payload::File(f) => {
            let mut h = f.borrow_mut();
            h.refs = h.refs.saturating_sub(1);
            if h.refs == 0 {
                h.close();
            }
        }

        // Shared immutable singletons: decremented, never torn down
        Payload::Type(t) => {
            let mut ty = t.borrow_mut();
            ty.refs = ty.refs.saturating_sub(1);
        }
    }
}

/// Drop one share of a dictionary; tears the namespace down when the
/// last share goes
pub fn release_dict(dict: &DictRef) {
    let n = {
        let mut d = dict.borrow_mut();
        d.refs = d.refs.saturating_sub(1);
        d.refs
    };
    if n == 0 {
        release_namespace(dict);
    }
}

/// Recursively release every entry of a namespace, then discard its
/// structure in one pass. Performs no per-entry work under the arena
/// policy.
pub fn release_namespace(dict: &DictRef) {
    let values = {
        let mut d = dict.borrow_mut();
        if d.policy() == AllocPolicy::Arena {
            return;
        }
        d.drain_values()
    };
    for v in values {
        release(&v);
    }
}

/// Recursively release every element of a list, then discard its nodes.
/// Performs no per-element work under the arena policy.
pub fn release_list(list: &ListRef) {
    let values = {
        let mut l = list.borrow_mut();
        if l.policy() == AllocPolicy::Arena {
            return;
        }
        l.drain_values()
    };
    for v in values {
        release(&v);
    }
}

/// Swap a cell's payload, tearing the displaced payload down without
/// touching the cell's own reference count
pub fn replace_payload(obj: &ObjRef, new_payload: Payload) {
    let old = std::mem::replace(&mut obj.borrow_mut().payload, new_payload);
    dispatch(old);
}
