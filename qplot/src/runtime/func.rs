//! Function values: shared chains of overloaded definitions
//!
//! A function value does not hold a single callable. It holds a chain of
//! definitions consulted in order, so a later `f(x) = ...` over a
//! restricted range can be spliced in front of an earlier one without
//! destroying it.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Result;
use crate::runtime::value::ObjRef;

/// Shared handle to a function chain
pub type FuncRef = Rc<RefCell<FuncChain>>;

/// Native implementation of a system function
pub type NativeFn = fn(&[ObjRef]) -> Result<ObjRef>;

/// How a definition came to exist
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FuncKind {
    /// Built-in implemented natively
    System,
    /// Built-in whose name embeds a user-chosen dummy variable
    Magic,
    /// Declared by the user as an expression
    UserDefined,
    /// Multi-statement user subroutine
    Subroutine,
}

/// The body of a single definition
#[derive(Debug)]
pub enum FuncBody {
    Native(NativeFn),
    /// Argument names plus the (uncompiled) expression text
    Expr { args: Vec<String>, text: String },
}

/// One overload in a function chain
#[derive(Debug)]
pub struct FuncDef {
    pub kind: FuncKind,
    pub name: String,
    pub min_args: usize,
    pub max_args: usize,
    pub numeric_only: bool,
    pub real_only: bool,
    pub dimensionless_only: bool,
    pub reject_nan: bool,
    /// Domain restriction for spliced definitions, if any
    pub range: Option<(f64, f64)>,
    pub body: FuncBody,
    pub description: String,
}

impl FuncDef {
    /// A native built-in accepting a fixed span of numeric arguments
    pub fn system(
        name: impl Into<String>,
        min_args: usize,
        max_args: usize,
        body: NativeFn,
        description: impl Into<String>,
    ) -> Self {
        FuncDef {
            kind: FuncKind::System,
            name: name.into(),
            min_args,
            max_args,
            numeric_only: true,
            real_only: false,
            dimensionless_only: false,
            reject_nan: false,
            range: None,
            body: FuncBody::Native(body),
            description: description.into(),
        }
    }

    /// A magic built-in resolved through the wildcard table
    pub fn magic(
        name: impl Into<String>,
        min_args: usize,
        max_args: usize,
        description: impl Into<String>,
    ) -> Self {
        FuncDef {
            kind: FuncKind::Magic,
            name: name.into(),
            min_args,
            max_args,
            numeric_only: false,
            real_only: false,
            dimensionless_only: false,
            reject_nan: false,
            range: None,
            body: FuncBody::Expr {
                args: Vec::new(),
                text: String::new(),
            },
            description: description.into(),
        }
    }

    /// A user definition retaining its argument names and source text
    pub fn user(name: impl Into<String>, args: Vec<String>, text: impl Into<String>) -> Self {
        let n = args.len();
        FuncDef {
            kind: FuncKind::UserDefined,
            name: name.into(),
            min_args: n,
            max_args: n,
            numeric_only: false,
            real_only: false,
            dimensionless_only: false,
            reject_nan: false,
            range: None,
            body: FuncBody::Expr {
                args,
                text: text.into(),
            },
            description: String::new(),
        }
    }
}

/// Shared chain of overloaded definitions
#[derive(Debug)]
pub struct FuncChain {
    /// Share count: how many values alias this chain
    pub refs: u32,
    pub defs: Vec<FuncDef>,
}

impl FuncChain {
    pub fn new(def: FuncDef) -> Self {
        FuncChain {
            refs: 1,
            defs: vec![def],
        }
    }

    pub fn into_ref(self) -> FuncRef {
        Rc::new(RefCell::new(self))
    }

    /// Splice a new definition in front of the existing ones; it is
    /// consulted first when the chain is called
    pub fn splice(&mut self, def: FuncDef) {
        self.defs.insert(0, def);
    }

    /// The first definition accepting the given argument count
    pub fn select(&self, nargs: usize) -> Option<&FuncDef> {
        self.defs
            .iter()
            .find(|d| nargs >= d.min_args && nargs <= d.max_args)
    }

    /// Destroy every definition in the chain
    pub fn clear(&mut self) {
        self.defs.clear();
    }
}
