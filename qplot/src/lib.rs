//! QPlot runtime core
//!
//! The dynamically-typed value system and the ordered, hash-accelerated
//! symbol table used for every scope, module namespace and dictionary
//! value in the QPlot scripting language.

pub mod builtins;
pub mod error;
pub mod runtime;

pub use error::{Result, RuntimeError};
pub use runtime::{AllocPolicy, Context, Dict, DictRef, Obj, ObjKind, ObjRef, Payload};
