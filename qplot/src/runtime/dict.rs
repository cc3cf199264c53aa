//! Ordered, hash-accelerated symbol table
//!
//! Every namespace, module and user-visible dictionary value is a `Dict`.
//! Two structures coexist over the same entries: a doubly linked list kept
//! in case-insensitive key order (ties broken case-sensitively), giving
//! deterministic enumeration, and a binary search tree keyed by a 32-bit
//! string hash, giving fast lookup. A genuine hash clash between distinct
//! keys is flagged on the resident tree node rather than resolved; probes
//! that land on a flagged node degrade to a linear scan of the ordered
//! list.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use crate::error::{Result, RuntimeError};
use crate::runtime::gc;
use crate::runtime::value::{Obj, ObjRef};

/// Shared handle to a dictionary
pub type DictRef = Rc<RefCell<Dict>>;

/// Whether entries are released individually or discarded in bulk with
/// their owning scope
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocPolicy {
    /// Entries are individually releasable; teardown walks and releases
    Heap,
    /// Entries belong to an allocation scope and are invalidated in bulk;
    /// teardown performs no per-entry work
    Arena,
}

#[derive(Debug)]
struct Entry {
    key: String,
    hash: u32,
    value: ObjRef,
    // ordered doubly linked list
    prev: Option<usize>,
    next: Option<usize>,
    // hash search tree
    left: Option<usize>,
    right: Option<usize>,
    in_tree: bool,
    /// Set on a tree node when a different key with the same hash exists;
    /// lookups for this hash must fall back to the ordered scan
    collided: bool,
}

/// Ordered dictionary mapping string keys to value cells
#[derive(Debug)]
pub struct Dict {
    slots: Vec<Option<Entry>>,
    free: Vec<usize>,
    first: Option<usize>,
    last: Option<usize>,
    root: Option<usize>,
    length: usize,
    /// Share count: how many values alias this dictionary
    pub refs: u32,
    policy: AllocPolicy,
    frozen: bool,
}

/// Composite symbol order: case-insensitive comparison, ties broken by
/// exact byte comparison
pub fn symbol_cmp(a: &str, b: &str) -> Ordering {
    let fold = a
        .bytes()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.bytes().map(|c| c.to_ascii_lowercase()));
    fold.then_with(|| a.as_bytes().cmp(b.as_bytes()))
}

impl Dict {
    /// Empty dictionary with the given allocation policy
    pub fn new(policy: AllocPolicy) -> Self {
        Dict {
            slots: Vec::new(),
            free: Vec::new(),
            first: None,
            last: None,
            root: None,
            length: 0,
            refs: 1,
            policy,
            frozen: false,
        }
    }

    /// Wrap in Rc<RefCell<>>
    pub fn into_ref(self) -> DictRef {
        Rc::new(RefCell::new(self))
    }

    /// 32-bit string hash: h = h*33 + byte, seed 5381
    pub fn hash(key: &str) -> u32 {
        key.bytes()
            .fold(5381u32, |h, b| h.wrapping_mul(33).wrapping_add(b as u32))
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn policy(&self) -> AllocPolicy {
        self.policy
    }

    /// Reject all further mutation (frozen modules)
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn entry(&self, i: usize) -> &Entry {
        self.slots[i].as_ref().expect("dictionary slot out of sync")
    }

    fn entry_mut(&mut self, i: usize) -> &mut Entry {
        self.slots[i].as_mut().expect("dictionary slot out of sync")
    }

    fn alloc_slot(&mut self, e: Entry) -> Result<usize> {
        if let Some(i) = self.free.pop() {
            self.slots[i] = Some(e);
            Ok(i)
        } else {
            self.slots
                .try_reserve(1)
                .map_err(|_| RuntimeError::out_of_memory("dictionary entry"))?;
            self.slots.push(Some(e));
            Ok(self.slots.len() - 1)
        }
    }

    /// Bind `key` to `value`. An existing binding with the exact same key
    /// is overwritten in place (keeping its position in the enumeration
    /// order and its tree node); the displaced value cell is returned so
    /// the caller can release it per policy. A new key is spliced into
    /// its sorted position, which costs a walk of the ordered list.
    pub fn insert(&mut self, key: &str, value: ObjRef) -> Result<Option<ObjRef>> {
        if self.frozen {
            return Err(RuntimeError::frozen(key));
        }

        let mut prev: Option<usize> = None;
        let mut before: Option<usize> = None;
        let mut cur = self.first;
        while let Some(i) = cur {
            match symbol_cmp(&self.entry(i).key, key) {
                Ordering::Equal => {
                    let e = self.entry_mut(i);
                    let old = std::mem::replace(&mut e.value, value);
                    return Ok(Some(old));
                }
                Ordering::Greater => {
                    before = Some(i);
                    break;
                }
                Ordering::Less => {
                    prev = cur;
                    cur = self.entry(i).next;
                }
            }
        }

        let hash = Self::hash(key);
        let mut owned = String::new();
        owned
            .try_reserve_exact(key.len())
            .map_err(|_| RuntimeError::out_of_memory("dictionary key"))?;
        owned.push_str(key);

        let idx = self.alloc_slot(Entry {
            key: owned,
            hash,
            value,
            prev,
            next: before,
            left: None,
            right: None,
            in_tree: false,
            collided: false,
        })?;

        match prev {
            Some(p) => self.entry_mut(p).next = Some(idx),
            None => self.first = Some(idx),
        }
        match before {
            Some(b) => self.entry_mut(b).prev = Some(idx),
            None => self.last = Some(idx),
        }
        self.length += 1;
        self.tree_insert(idx);
        Ok(None)
    }

    fn tree_insert(&mut self, idx: usize) {
        let hash = self.entry(idx).hash;
        let mut cur = match self.root {
            None => {
                self.root = Some(idx);
                self.entry_mut(idx).in_tree = true;
                return;
            }
            Some(r) => r,
        };
        loop {
            let cur_hash = self.entry(cur).hash;
            if hash < cur_hash {
                match self.entry(cur).left {
                    Some(l) => cur = l,
                    None => {
                        self.entry_mut(cur).left = Some(idx);
                        self.entry_mut(idx).in_tree = true;
                        return;
                    }
                }
            } else if hash > cur_hash {
                match self.entry(cur).right {
                    Some(r) => cur = r,
                    None => {
                        self.entry_mut(cur).right = Some(idx);
                        self.entry_mut(idx).in_tree = true;
                        return;
                    }
                }
            } else {
                // Same hash under a different key. The new entry stays
                // list-only and the resident node is flagged so lookups
                // for this hash degrade to the ordered scan.
                self.entry_mut(cur).collided = true;
                return;
            }
        }
    }

    fn find_index_hash(&self, key: &str, hash: u32) -> Option<usize> {
        let mut cur = self.root;
        while let Some(i) = cur {
            let e = self.entry(i);
            if hash < e.hash {
                cur = e.left;
            } else if hash > e.hash {
                cur = e.right;
            } else {
                if !e.collided && e.key == key {
                    return Some(i);
                }
                // Flagged clash or key mismatch: exhaustive ordered scan,
                // stopping once the scan passes the point where the key
                // could sort.
                let mut cur = self.first;
                while let Some(i) = cur {
                    let e = self.entry(i);
                    if e.key == key {
                        return Some(i);
                    }
                    if symbol_cmp(&e.key, key) == Ordering::Greater {
                        break;
                    }
                    cur = e.next;
                }
                return None;
            }
        }
        None
    }

    /// Probe for a key; never partially matches
    pub fn lookup(&self, key: &str) -> Option<ObjRef> {
        self.lookup_hash(key, Self::hash(key))
    }

    /// Probe with a precomputed hash
    pub fn lookup_hash(&self, key: &str, hash: u32) -> Option<ObjRef> {
        self.find_index_hash(key, hash)
            .map(|i| self.entry(i).value.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.find_index_hash(key, Self::hash(key)).is_some()
    }

    /// Excise the binding for `key`, returning its value cell for the
    /// caller to release per policy
    pub fn remove_entry(&mut self, key: &str) -> Result<ObjRef> {
        if self.frozen {
            return Err(RuntimeError::frozen(key));
        }
        let idx = self
            .find_index_hash(key, Self::hash(key))
            .ok_or_else(|| RuntimeError::not_found(key))?;
        Ok(self.remove_at(idx))
    }

    /// Excise the first entry whose value is the given cell (payload
    /// identity, not key)
    pub fn remove_value(&mut self, target: &ObjRef) -> Result<ObjRef> {
        if self.frozen {
            return Err(RuntimeError::frozen("<value>"));
        }
        let mut cur = self.first;
        while let Some(i) = cur {
            if Rc::ptr_eq(&self.entry(i).value, target) {
                return Ok(self.remove_at(i));
            }
            cur = self.entry(i).next;
        }
        Err(RuntimeError::not_found("<value>"))
    }

    fn remove_at(&mut self, idx: usize) -> ObjRef {
        let (prev, next, hash, in_tree) = {
            let e = self.entry(idx);
            (e.prev, e.next, e.hash, e.in_tree)
        };
        match prev {
            Some(p) => self.entry_mut(p).next = next,
            None => self.first = next,
        }
        match next {
            Some(n) => self.entry_mut(n).prev = prev,
            None => self.last = prev,
        }
        if in_tree {
            self.tree_remove(idx);
        }
        self.length -= 1;
        let entry = self.slots[idx].take().expect("dictionary slot out of sync");
        self.free.push(idx);
        self.repair_collision(hash);
        entry.value
    }

    fn tree_remove(&mut self, idx: usize) {
        let (left, right, hash) = {
            let e = self.entry(idx);
            (e.left, e.right, e.hash)
        };
        if let (Some(l), Some(r)) = (left, right) {
            // Promote a neighbour to keep the tree connected without a
            // rebalance: the predecessor side for even hashes, the
            // successor side for odd ones.
            let promoted = if hash & 1 == 0 {
                self.rightmost(l)
            } else {
                self.leftmost(r)
            };
            let promoted_collided = self.entry(promoted).collided;
            self.tree_remove(promoted);
            let (l2, r2) = {
                let e = self.entry(idx);
                (e.left, e.right)
            };
            {
                let e = self.entry_mut(promoted);
                e.left = l2;
                e.right = r2;
                e.in_tree = true;
                e.collided = promoted_collided;
            }
            self.tree_replace(idx, Some(promoted));
        } else {
            self.tree_replace(idx, left.or(right));
        }
        let e = self.entry_mut(idx);
        e.left = None;
        e.right = None;
        e.in_tree = false;
        e.collided = false;
    }

    fn rightmost(&self, mut i: usize) -> usize {
        while let Some(r) = self.entry(i).right {
            i = r;
        }
        i
    }

    fn leftmost(&self, mut i: usize) -> usize {
        while let Some(l) = self.entry(i).left {
            i = l;
        }
        i
    }

    /// Point the parent of `idx` (or the root) at `with` instead
    fn tree_replace(&mut self, idx: usize, with: Option<usize>) {
        let hash = self.entry(idx).hash;
        let mut parent: Option<usize> = None;
        let mut cur = self.root;
        while let Some(i) = cur {
            if i == idx {
                break;
            }
            let e = self.entry(i);
            parent = Some(i);
            cur = if hash < e.hash { e.left } else { e.right };
        }
        debug_assert_eq!(cur, Some(idx), "hash tree desynchronized from list");
        match parent {
            None => self.root = with,
            Some(p) => {
                let e = self.entry_mut(p);
                if e.left == Some(idx) {
                    e.left = with;
                } else {
                    e.right = with;
                }
            }
        }
    }

    /// After removing an entry with `hash`, reconcile the collided flag
    /// and reinstate a surviving list-only entry into the tree if the
    /// tree node for this hash was the one removed
    fn repair_collision(&mut self, hash: u32) {
        let mut survivors = Vec::new();
        let mut cur = self.first;
        while let Some(i) = cur {
            let e = self.entry(i);
            if e.hash == hash {
                survivors.push(i);
            }
            cur = e.next;
        }

        let mut node = None;
        let mut cur = self.root;
        while let Some(i) = cur {
            let e = self.entry(i);
            if hash < e.hash {
                cur = e.left;
            } else if hash > e.hash {
                cur = e.right;
            } else {
                node = Some(i);
                break;
            }
        }

        match node {
            Some(i) => self.entry_mut(i).collided = survivors.len() > 1,
            None => {
                if let Some(&head) = survivors.first() {
                    self.tree_insert(head);
                    self.entry_mut(head).collided = survivors.len() > 1;
                }
            }
        }
    }

    /// Remove every entry, returning the value cells in enumeration
    /// order for the caller to release
    pub fn drain_values(&mut self) -> Vec<ObjRef> {
        let mut out = Vec::with_capacity(self.length);
        let mut cur = self.first;
        while let Some(i) = cur {
            let e = self.slots[i].take().expect("dictionary slot out of sync");
            out.push(e.value);
            cur = e.next;
        }
        self.reset_structure();
        out
    }

    /// Discard every entry without releasing the value cells
    pub fn clear(&mut self) {
        self.reset_structure();
    }

    fn reset_structure(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.first = None;
        self.last = None;
        self.root = None;
        self.length = 0;
    }

    /// One-shot forward cursor over (key, value) pairs in sorted order
    pub fn iter(&self) -> DictIter<'_> {
        DictIter {
            dict: self,
            cur: self.first,
        }
    }

    /// Keys in enumeration order
    pub fn keys(&self) -> Vec<String> {
        self.iter().map(|(k, _)| k.to_string()).collect()
    }
}

/// Lazy one-shot iterator; obtain a fresh one to iterate again
pub struct DictIter<'a> {
    dict: &'a Dict,
    cur: Option<usize>,
}

impl<'a> Iterator for DictIter<'a> {
    type Item = (&'a str, &'a ObjRef);

    fn next(&mut self) -> Option<Self::Item> {
        let i = self.cur?;
        let e = self.dict.entry(i);
        self.cur = e.next;
        Some((e.key.as_str(), &e.value))
    }
}

/// Bind `key` to `value`, releasing a displaced binding under the heap
/// policy
pub fn append(dict: &DictRef, key: &str, value: ObjRef) -> Result<()> {
    let (old, policy) = {
        let mut d = dict.borrow_mut();
        let old = d.insert(key, value)?;
        (old, d.policy())
    };
    if let Some(old) = old {
        if policy == AllocPolicy::Heap {
            gc::release(&old);
        }
    }
    Ok(())
}

/// Bind a copy of `value` (container payloads shared, scalars and
/// strings duplicated), leaving the source untouched
pub fn append_copy(dict: &DictRef, key: &str, value: &ObjRef) -> Result<()> {
    append(dict, key, Obj::copy(value))
}

/// Excise the binding for `key` and release its value per policy
pub fn remove_key(dict: &DictRef, key: &str) -> Result<()> {
    let (removed, policy) = {
        let mut d = dict.borrow_mut();
        let removed = d.remove_entry(key)?;
        (removed, d.policy())
    };
    if policy == AllocPolicy::Heap {
        gc::release(&removed);
    }
    Ok(())
}

/// Excise the first entry bound to the given value cell
pub fn remove(dict: &DictRef, value: &ObjRef) -> Result<()> {
    let (removed, policy) = {
        let mut d = dict.borrow_mut();
        let removed = d.remove_value(value)?;
        (removed, d.policy())
    };
    if policy == AllocPolicy::Heap {
        gc::release(&removed);
    }
    Ok(())
}

/// Excise every entry bound to the given value cell (multi-aliased
/// registration)
pub fn remove_all(dict: &DictRef, value: &ObjRef) -> Result<()> {
    while remove(dict, value).is_ok() {}
    Ok(())
}

/// Discard the dictionary's entries without walking the release
/// protocol; a no-op under the arena policy
pub fn free(dict: &DictRef) {
    let mut d = dict.borrow_mut();
    if d.policy() == AllocPolicy::Arena {
        return;
    }
    d.clear();
}
