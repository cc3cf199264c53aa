//! The value system and the symbol-table core beneath the interpreter

pub mod context;
pub mod dict;
pub mod file;
pub mod func;
pub mod gc;
pub mod list;
pub mod value;
pub mod vector;
pub mod wildcard;

pub use context::Context;
pub use dict::{AllocPolicy, Dict, DictRef};
pub use value::{Obj, ObjKind, ObjRef, Payload};
pub use wildcard::WildcardResolver;
