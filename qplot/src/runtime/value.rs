//! Runtime values: tagged variant cells carrying manual reference counts
//!
//! Every value the interpreter touches lives in an `Obj` cell behind an
//! `ObjRef` handle. Container payloads (dictionaries, lists, vectors,
//! matrices, function chains, file handles) are shared structures with
//! their own share counts; several cells may alias one payload.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::runtime::dict::{AllocPolicy, Dict, DictRef};
use crate::runtime::file::{FileHandle, FileRef};
use crate::runtime::func::{FuncChain, FuncRef};
use crate::runtime::list::{ListRef, ValueList};
use crate::runtime::vector::{Matrix, MatrixRef, Vector, VectorRef};

/// Number of base quantities tracked in a physical dimension
pub const MAX_BASE_UNITS: usize = 24;

/// Shared handle to a value cell
pub type ObjRef = Rc<RefCell<Obj>>;

/// Shared handle to a type descriptor
pub type TypeRef = Rc<RefCell<TypeObj>>;

/// Value kind tags, one per payload variant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjKind {
    Num,
    Str,
    Bool,
    Date,
    Color,
    Dict,
    Module,
    List,
    Vector,
    Matrix,
    File,
    Func,
    Type,
    Null,
    Exception,
    Global,
    Zombie,
}

impl ObjKind {
    pub const ALL: [ObjKind; 17] = [
        ObjKind::Num,
        ObjKind::Str,
        ObjKind::Bool,
        ObjKind::Date,
        ObjKind::Color,
        ObjKind::Dict,
        ObjKind::Module,
        ObjKind::List,
        ObjKind::Vector,
        ObjKind::Matrix,
        ObjKind::File,
        ObjKind::Func,
        ObjKind::Type,
        ObjKind::Null,
        ObjKind::Exception,
        ObjKind::Global,
        ObjKind::Zombie,
    ];

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|&k| k == self).unwrap_or(0)
    }

    /// User-visible type name; names starting with `!` are internal
    /// markers and are never displayed
    pub fn name(self) -> &'static str {
        match self {
            ObjKind::Num => "number",
            ObjKind::Str => "string",
            ObjKind::Bool => "boolean",
            ObjKind::Date => "date",
            ObjKind::Color => "color",
            ObjKind::Dict => "dictionary",
            ObjKind::Module => "module",
            ObjKind::List => "list",
            ObjKind::Vector => "vector",
            ObjKind::Matrix => "matrix",
            ObjKind::File => "file handle",
            ObjKind::Func => "function",
            ObjKind::Type => "type",
            ObjKind::Null => "null",
            ObjKind::Exception => "exception",
            ObjKind::Global => "!global",
            ObjKind::Zombie => "!zombie",
        }
    }

    /// Rank used when values of different kinds are ordered against
    /// each other
    pub fn sort_order(self) -> i32 {
        match self {
            ObjKind::Null | ObjKind::Global | ObjKind::Zombie => 0,
            ObjKind::Bool => 1,
            ObjKind::Num => 2,
            ObjKind::Date => 3,
            ObjKind::Str => 4,
            ObjKind::Color => 5,
            ObjKind::Vector => 6,
            ObjKind::List => 7,
            ObjKind::Matrix => 8,
            ObjKind::Dict => 9,
            ObjKind::Module => 11,
            ObjKind::Func => 12,
            ObjKind::File => 13,
            ObjKind::Type => 14,
            ObjKind::Exception => 15,
        }
    }
}

/// Physical-dimension exponents over the base quantities
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Dims {
    pub exponent: [f64; MAX_BASE_UNITS],
}

impl Dims {
    /// Dimensionless
    pub fn none() -> Self {
        Dims {
            exponent: [0.0; MAX_BASE_UNITS],
        }
    }

    /// A single base quantity raised to the first power
    pub fn base(unit: usize) -> Self {
        let mut d = Dims::none();
        if unit < MAX_BASE_UNITS {
            d.exponent[unit] = 1.0;
        }
        d
    }

    pub fn is_dimensionless(&self) -> bool {
        self.exponent.iter().all(|&e| e == 0.0)
    }
}

impl Default for Dims {
    fn default() -> Self {
        Self::none()
    }
}

/// Numeric payload: a possibly-complex value with physical dimensions
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Number {
    pub real: f64,
    pub imag: f64,
    pub complex: bool,
    pub dims: Dims,
}

impl Number {
    pub fn real(x: f64) -> Self {
        Number {
            real: x,
            imag: 0.0,
            complex: false,
            dims: Dims::none(),
        }
    }

    pub fn complex(real: f64, imag: f64) -> Self {
        Number {
            real,
            imag,
            complex: true,
            dims: Dims::none(),
        }
    }

    pub fn with_dims(x: f64, dims: Dims) -> Self {
        Number {
            real: x,
            imag: 0.0,
            complex: false,
            dims,
        }
    }

    pub fn is_dimensionless(&self) -> bool {
        self.dims.is_dimensionless()
    }
}

/// Color spaces a color value can be expressed in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorSpace {
    Rgb,
    Hsb,
    Cmyk,
    Grey,
}

/// Color payload; components are clamped to [0, 1] at construction
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub space: ColorSpace,
    pub c: [f64; 4],
}

impl Color {
    pub fn new(space: ColorSpace, c1: f64, c2: f64, c3: f64, c4: f64) -> Self {
        Color {
            space,
            c: [
                c1.clamp(0.0, 1.0),
                c2.clamp(0.0, 1.0),
                c3.clamp(0.0, 1.0),
                c4.clamp(0.0, 1.0),
            ],
        }
    }

    pub fn rgb(r: f64, g: f64, b: f64) -> Self {
        Self::new(ColorSpace::Rgb, r, g, b, 0.0)
    }
}

/// Type descriptor: a shared immutable singleton with a methods table
#[derive(Debug)]
pub struct TypeObj {
    pub refs: u32,
    pub id: ObjKind,
    pub methods: DictRef,
}

impl TypeObj {
    pub fn name(&self) -> &'static str {
        self.id.name()
    }
}

/// Tagged payload variant
#[derive(Debug)]
pub enum Payload {
    Null,
    Bool(bool),
    Num(Number),
    Str(String),
    /// Seconds since the Unix epoch
    Date(f64),
    Color(Color),
    Dict(DictRef),
    Module(DictRef),
    List(ListRef),
    Vector(VectorRef),
    Matrix(MatrixRef),
    Func(FuncRef),
    File(FileRef),
    Type(TypeRef),
    Exception(String),
    /// Tombstone left behind once a cell's reference count reaches zero
    Zombie,
    /// Sentinel redirecting a local binding to the global namespace
    GlobalMarker,
}

impl Payload {
    pub fn kind(&self) -> ObjKind {
        match self {
            Payload::Null => ObjKind::Null,
            Payload::Bool(_) => ObjKind::Bool,
            Payload::Num(_) => ObjKind::Num,
            Payload::Str(_) => ObjKind::Str,
            Payload::Date(_) => ObjKind::Date,
            Payload::Color(_) => ObjKind::Color,
            Payload::Dict(_) => ObjKind::Dict,
            Payload::Module(_) => ObjKind::Module,
            Payload::List(_) => ObjKind::List,
            Payload::Vector(_) => ObjKind::Vector,
            Payload::Matrix(_) => ObjKind::Matrix,
            Payload::Func(_) => ObjKind::Func,
            Payload::File(_) => ObjKind::File,
            Payload::Type(_) => ObjKind::Type,
            Payload::Exception(_) => ObjKind::Exception,
            Payload::Zombie => ObjKind::Zombie,
            Payload::GlobalMarker => ObjKind::Global,
        }
    }
}

/// A reference-counted value cell
///
/// The two back-references are ownership edges: when the cell dies they
/// are released before the payload is torn down.
#[derive(Debug)]
pub struct Obj {
    /// Manual reference count; at least 1 while the cell is live
    pub refs: u32,
    pub immutable: bool,
    /// Enclosing assignment target this value was read out of
    pub lval: Option<ObjRef>,
    /// Bound receiver for method-like values
    pub receiver: Option<ObjRef>,
    /// The Type value this cell is an instance of (borrowed singleton,
    /// not an ownership edge)
    pub prototype: Option<ObjRef>,
    pub payload: Payload,
}

impl Obj {
    fn cell(payload: Payload) -> ObjRef {
        let proto = prototype(payload.kind());
        Rc::new(RefCell::new(Obj {
            refs: 1,
            immutable: false,
            lval: None,
            receiver: None,
            prototype: Some(proto),
            payload,
        }))
    }

    pub fn null() -> ObjRef {
        Self::cell(Payload::Null)
    }

    pub fn boolean(b: bool) -> ObjRef {
        Self::cell(Payload::Bool(b))
    }

    pub fn num(x: f64) -> ObjRef {
        Self::cell(Payload::Num(Number::real(x)))
    }

    pub fn complex(real: f64, imag: f64) -> ObjRef {
        Self::cell(Payload::Num(Number::complex(real, imag)))
    }

    pub fn number(n: Number) -> ObjRef {
        Self::cell(Payload::Num(n))
    }

    pub fn str(s: impl Into<String>) -> ObjRef {
        Self::cell(Payload::Str(s.into()))
    }

    pub fn date(unix_time: f64) -> ObjRef {
        Self::cell(Payload::Date(unix_time))
    }

    pub fn color(c: Color) -> ObjRef {
        Self::cell(Payload::Color(c))
    }

    /// Fresh empty dictionary value under the given allocation policy
    pub fn dict_new(policy: AllocPolicy) -> ObjRef {
        Self::cell(Payload::Dict(Dict::new(policy).into_ref()))
    }

    /// Wrap an existing dictionary; the cell takes over one share count
    pub fn dict_value(d: DictRef) -> ObjRef {
        Self::cell(Payload::Dict(d))
    }

    /// Fresh module; a frozen module rejects all mutation
    pub fn module(policy: AllocPolicy, frozen: bool) -> ObjRef {
        let d = Dict::new(policy);
        let cell = Self::cell(Payload::Module(d.into_ref()));
        if frozen {
            let mut o = cell.borrow_mut();
            o.immutable = true;
            if let Payload::Module(d) = &o.payload {
                d.borrow_mut().freeze();
            }
        }
        cell
    }

    /// Wrap an existing dictionary as a module value
    pub fn module_value(d: DictRef) -> ObjRef {
        Self::cell(Payload::Module(d))
    }

    pub fn list_new(policy: AllocPolicy) -> ObjRef {
        Self::cell(Payload::List(ValueList::new(policy).into_ref()))
    }

    pub fn list_value(l: ListRef) -> ObjRef {
        Self::cell(Payload::List(l))
    }

    /// Fresh zero-filled vector of the given length
    pub fn vector(len: usize) -> Result<ObjRef> {
        Ok(Self::cell(Payload::Vector(Vector::alloc(len)?.into_ref())))
    }

    /// Wrap an existing vector wrapper; takes over one share count
    pub fn vector_value(v: VectorRef) -> ObjRef {
        Self::cell(Payload::Vector(v))
    }

    pub fn matrix(rows: usize, cols: usize) -> Result<ObjRef> {
        Ok(Self::cell(Payload::Matrix(
            Matrix::alloc(rows, cols)?.into_ref(),
        )))
    }

    pub fn matrix_value(m: MatrixRef) -> ObjRef {
        Self::cell(Payload::Matrix(m))
    }

    pub fn func(chain: FuncRef) -> ObjRef {
        Self::cell(Payload::Func(chain))
    }

    pub fn func_new(chain: FuncChain) -> ObjRef {
        Self::cell(Payload::Func(chain.into_ref()))
    }

    pub fn file(handle: FileHandle) -> ObjRef {
        Self::cell(Payload::File(handle.into_ref()))
    }

    pub fn file_value(f: FileRef) -> ObjRef {
        Self::cell(Payload::File(f))
    }

    /// Standard-stream wrapper; its handle is exempt from closing
    pub fn file_stdio() -> ObjRef {
        Self::cell(Payload::File(FileHandle::stdio().into_ref()))
    }

    pub fn exception(message: impl Into<String>) -> ObjRef {
        Self::cell(Payload::Exception(message.into()))
    }

    pub fn global_marker() -> ObjRef {
        Self::cell(Payload::GlobalMarker)
    }

    pub fn zombie() -> ObjRef {
        Self::cell(Payload::Zombie)
    }

    /// Shallow copy: shares container payloads (bumping their share
    /// counts), duplicates scalar and string payloads, and records the
    /// source as the copy's enclosing l-value.
    pub fn copy(src: &ObjRef) -> ObjRef {
        let (payload, immutable) = {
            let s = src.borrow();
            let payload = match &s.payload {
                Payload::Null => Payload::Null,
                Payload::Bool(b) => Payload::Bool(*b),
                Payload::Num(n) => Payload::Num(*n),
                Payload::Str(s) => Payload::Str(s.clone()),
                Payload::Date(d) => Payload::Date(*d),
                Payload::Color(c) => Payload::Color(*c),
                Payload::Dict(d) => {
                    d.borrow_mut().refs += 1;
                    Payload::Dict(d.clone())
                }
                Payload::Module(d) => {
                    d.borrow_mut().refs += 1;
                    Payload::Module(d.clone())
                }
                Payload::List(l) => {
                    l.borrow_mut().refs += 1;
                    Payload::List(l.clone())
                }
                Payload::Vector(v) => {
                    v.borrow_mut().refs += 1;
                    Payload::Vector(v.clone())
                }
                Payload::Matrix(m) => {
                    m.borrow_mut().refs += 1;
                    Payload::Matrix(m.clone())
                }
                Payload::Func(f) => {
                    f.borrow_mut().refs += 1;
                    Payload::Func(f.clone())
                }
                Payload::File(f) => {
                    f.borrow_mut().refs += 1;
                    Payload::File(f.clone())
                }
                Payload::Type(t) => {
                    t.borrow_mut().refs += 1;
                    Payload::Type(t.clone())
                }
                Payload::Exception(e) => Payload::Exception(e.clone()),
                Payload::Zombie => Payload::Zombie,
                Payload::GlobalMarker => Payload::GlobalMarker,
            };
            (payload, s.immutable)
        };
        let out = Self::cell(payload);
        {
            let mut o = out.borrow_mut();
            o.lval = Some(Obj::acquire(src));
            o.immutable = immutable;
        }
        out
    }

    /// Register another owner of the same cell: bumps the reference
    /// count and hands back a handle
    pub fn acquire(obj: &ObjRef) -> ObjRef {
        obj.borrow_mut().refs += 1;
        obj.clone()
    }

    pub fn kind(&self) -> ObjKind {
        self.payload.kind()
    }

    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn is_zombie(&self) -> bool {
        matches!(self.payload, Payload::Zombie)
    }
}

impl fmt::Display for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Payload::Null => write!(f, "null"),
            Payload::Bool(b) => write!(f, "{b}"),
            Payload::Num(n) => {
                if n.complex {
                    if n.imag < 0.0 {
                        write!(f, "{}-{}i", n.real, -n.imag)
                    } else {
                        write!(f, "{}+{}i", n.real, n.imag)
                    }
                } else {
                    write!(f, "{}", n.real)
                }
            }
            Payload::Str(s) => write!(f, "{s:?}"),
            Payload::Date(d) => {
                let secs = *d as i64;
                let nanos = ((d - secs as f64) * 1e9) as u32;
                match chrono::DateTime::from_timestamp(secs, nanos) {
                    Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S UTC")),
                    None => write!(f, "invalid date"),
                }
            }
            Payload::Color(c) => match c.space {
                ColorSpace::Rgb => write!(f, "rgb({},{},{})", c.c[0], c.c[1], c.c[2]),
                ColorSpace::Hsb => write!(f, "hsb({},{},{})", c.c[0], c.c[1], c.c[2]),
                ColorSpace::Cmyk => {
                    write!(f, "cmyk({},{},{},{})", c.c[0], c.c[1], c.c[2], c.c[3])
                }
                ColorSpace::Grey => write!(f, "grey({})", c.c[0]),
            },
            Payload::Dict(d) => write!(f, "dictionary ({} entries)", d.borrow().len()),
            Payload::Module(d) => write!(f, "module ({} entries)", d.borrow().len()),
            Payload::List(l) => write!(f, "list ({} items)", l.borrow().len()),
            Payload::Vector(v) => write!(f, "vector ({} elements)", v.borrow().len),
            Payload::Matrix(m) => {
                let m = m.borrow();
                write!(f, "matrix ({}x{})", m.rows, m.cols)
            }
            Payload::Func(c) => write!(f, "function ({} definitions)", c.borrow().defs.len()),
            Payload::File(_) => write!(f, "file handle"),
            Payload::Type(t) => write!(f, "<type '{}'>", t.borrow().name()),
            Payload::Exception(e) => write!(f, "exception: {e}"),
            Payload::Zombie => write!(f, "!zombie"),
            Payload::GlobalMarker => write!(f, "!global"),
        }
    }
}

thread_local! {
    static PROTOTYPES: RefCell<Vec<ObjRef>> = const { RefCell::new(Vec::new()) };
}

/// The Type prototype for a value kind; built once, shared forever
pub fn prototype(kind: ObjKind) -> ObjRef {
    PROTOTYPES.with(|cell| {
        {
            let protos = cell.borrow();
            if !protos.is_empty() {
                return protos[kind.index()].clone();
            }
        }
        let built = build_prototypes();
        let out = built[kind.index()].clone();
        *cell.borrow_mut() = built;
        out
    })
}

// Prototype cells are built directly so that creating the Type values
// does not itself ask for a prototype.
fn build_prototypes() -> Vec<ObjRef> {
    ObjKind::ALL
        .iter()
        .map(|&k| {
            let t = TypeObj {
                refs: 1,
                id: k,
                methods: Dict::new(AllocPolicy::Heap).into_ref(),
            };
            Rc::new(RefCell::new(Obj {
                refs: 1,
                immutable: true,
                lval: None,
                receiver: None,
                prototype: None,
                payload: Payload::Type(Rc::new(RefCell::new(t))),
            }))
        })
        .collect()
}
