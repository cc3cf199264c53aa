//! Startup population of the builtin namespaces
//!
//! The interpreter's outermost namespace is built here: mathematical
//! constants, the type table, a few frozen modules and the system
//! function table. Population goes through the ordinary dictionary
//! append path, so allocation failure propagates to the caller.

use crate::error::{Result, RuntimeError};
use crate::runtime::dict::{self, AllocPolicy, Dict, DictRef};
use crate::runtime::func::{FuncChain, FuncDef};
use crate::runtime::value::{prototype, Number, Obj, ObjKind, ObjRef, Payload};
use crate::runtime::wildcard::WildcardResolver;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;
const GOLDEN_RATIO: f64 = 1.618_033_988_749_895;

/// Build the frozen builtin namespace
pub fn default_namespace() -> Result<DictRef> {
    let ns = Dict::new(AllocPolicy::Heap).into_ref();

    // Constants
    dict::append(&ns, "pi", Obj::num(std::f64::consts::PI))?;
    dict::append(&ns, "e", Obj::num(std::f64::consts::E))?;
    dict::append(&ns, "goldenRatio", Obj::num(GOLDEN_RATIO))?;
    dict::append(&ns, "eulerGamma", Obj::num(EULER_GAMMA))?;
    dict::append(&ns, "True", Obj::boolean(true))?;
    dict::append(&ns, "False", Obj::boolean(false))?;
    dict::append(&ns, "version", Obj::str(VERSION))?;

    // Type table: one entry per user-visible kind
    let types = Dict::new(AllocPolicy::Heap).into_ref();
    for kind in ObjKind::ALL {
        let name = kind.name();
        if name.starts_with('!') {
            continue;
        }
        dict::append(&types, name, Obj::copy(&prototype(kind)))?;
    }
    dict::append(&ns, "types", frozen_module(types))?;

    // Host-environment module
    let os = Dict::new(AllocPolicy::Heap).into_ref();
    dict::append(&os, "name", Obj::str(std::env::consts::OS))?;
    dict::append(&os, "family", Obj::str(std::env::consts::FAMILY))?;
    dict::append(&os, "pathSep", Obj::str(std::path::MAIN_SEPARATOR.to_string()))?;
    dict::append(&ns, "os", frozen_module(os))?;

    // Calendar module
    let time = Dict::new(AllocPolicy::Heap).into_ref();
    dict::append(&time, "unixEpoch", Obj::date(0.0))?;
    add_system_func(&time, FuncDef::system("now", 0, 0, fn_now, "now(): the current time"))?;
    dict::append(&ns, "time", frozen_module(time))?;

    // System function table
    add_system_func(&ns, FuncDef::system("abs", 1, 1, fn_abs, "abs(z): absolute magnitude"))?;
    add_system_func(
        &ns,
        dimensionless(FuncDef::system("sqrt", 1, 1, fn_sqrt, "sqrt(z): square root")),
    )?;
    add_system_func(
        &ns,
        dimensionless(FuncDef::system("exp", 1, 1, fn_exp, "exp(z): exponential")),
    )?;
    add_system_func(
        &ns,
        dimensionless(FuncDef::system("log", 1, 1, fn_log, "log(z): natural logarithm")),
    )?;
    add_system_func(&ns, FuncDef::system("floor", 1, 1, fn_floor, "floor(x)"))?;
    add_system_func(&ns, FuncDef::system("ceil", 1, 1, fn_ceil, "ceil(x)"))?;
    add_system_func(&ns, FuncDef::system("min", 2, 8, fn_min, "min(x,y,...)"))?;
    add_system_func(&ns, FuncDef::system("max", 2, 8, fn_max, "max(x,y,...)"))?;
    add_system_func(&ns, FuncDef::system("hypot", 2, 2, fn_hypot, "hypot(x,y)"))?;

    install_type_methods()?;

    ns.borrow_mut().freeze();
    Ok(ns)
}

/// Build the magic-name table consulted after failed exact lookups
pub fn default_wildcards() -> Result<WildcardResolver> {
    let r = WildcardResolver::new(AllocPolicy::Heap);
    r.register(
        "diff_d?",
        Obj::func_new(FuncChain::new(FuncDef::magic(
            "diff_d",
            2,
            3,
            "differentiate an expression with respect to the named variable",
        ))),
    )?;
    r.register(
        "int_d?",
        Obj::func_new(FuncChain::new(FuncDef::magic(
            "int_d",
            3,
            3,
            "integrate an expression over the named variable",
        ))),
    )?;
    r.register(
        "unit",
        Obj::func_new(FuncChain::new(FuncDef::magic(
            "unit",
            1,
            1,
            "attach physical units to a number",
        ))),
    )?;
    Ok(r)
}

fn frozen_module(d: DictRef) -> ObjRef {
    d.borrow_mut().freeze();
    let m = Obj::module_value(d);
    m.borrow_mut().immutable = true;
    m
}

fn dimensionless(mut def: FuncDef) -> FuncDef {
    def.dimensionless_only = true;
    def
}

fn add_system_func(ns: &DictRef, def: FuncDef) -> Result<()> {
    let name = def.name.clone();
    dict::append(ns, &name, Obj::func_new(FuncChain::new(def)))
}

/// Register the handful of methods shared by the container types.
/// Prototypes are process-wide singletons, so this only runs once.
fn install_type_methods() -> Result<()> {
    for kind in [ObjKind::Str, ObjKind::List, ObjKind::Dict, ObjKind::Vector] {
        let proto = prototype(kind);
        let methods = match &proto.borrow().payload {
            Payload::Type(t) => t.borrow().methods.clone(),
            _ => continue,
        };
        if methods.borrow().contains("len") {
            continue;
        }
        dict::append(
            &methods,
            "len",
            Obj::func_new(FuncChain::new(FuncDef::system(
                "len",
                1,
                1,
                fn_len,
                "len(v): number of elements",
            ))),
        )?;
    }
    Ok(())
}

fn arg_num(args: &[ObjRef], i: usize) -> Result<Number> {
    let obj = args
        .get(i)
        .ok_or_else(|| RuntimeError::type_error("missing argument"))?;
    match &obj.borrow().payload {
        Payload::Num(n) => Ok(*n),
        other => Err(RuntimeError::type_error(format!(
            "expected a number, received a {}",
            other.kind().name()
        ))),
    }
}

fn fn_abs(args: &[ObjRef]) -> Result<ObjRef> {
    let n = arg_num(args, 0)?;
    let out = if n.complex {
        n.real.hypot(n.imag)
    } else {
        n.real.abs()
    };
    Ok(Obj::number(Number {
        real: out,
        imag: 0.0,
        complex: false,
        dims: n.dims,
    }))
}

fn fn_sqrt(args: &[ObjRef]) -> Result<ObjRef> {
    let n = arg_num(args, 0)?;
    if !n.complex && n.real >= 0.0 {
        Ok(Obj::num(n.real.sqrt()))
    } else if !n.complex {
        Ok(Obj::complex(0.0, (-n.real).sqrt()))
    } else {
        // Principal square root of a complex argument
        let r = n.real.hypot(n.imag).sqrt();
        let theta = n.imag.atan2(n.real) / 2.0;
        Ok(Obj::complex(r * theta.cos(), r * theta.sin()))
    }
}

fn fn_exp(args: &[ObjRef]) -> Result<ObjRef> {
    let n = arg_num(args, 0)?;
    if n.complex {
        let m = n.real.exp();
        Ok(Obj::complex(m * n.imag.cos(), m * n.imag.sin()))
    } else {
        Ok(Obj::num(n.real.exp()))
    }
}

fn fn_log(args: &[ObjRef]) -> Result<ObjRef> {
    let n = arg_num(args, 0)?;
    if n.complex || n.real < 0.0 {
        let m = n.real.hypot(n.imag);
        Ok(Obj::complex(m.ln(), n.imag.atan2(n.real)))
    } else {
        Ok(Obj::num(n.real.ln()))
    }
}

fn fn_floor(args: &[ObjRef]) -> Result<ObjRef> {
    Ok(Obj::num(arg_num(args, 0)?.real.floor()))
}

fn fn_ceil(args: &[ObjRef]) -> Result<ObjRef> {
    Ok(Obj::num(arg_num(args, 0)?.real.ceil()))
}

fn fn_min(args: &[ObjRef]) -> Result<ObjRef> {
    let mut best = arg_num(args, 0)?.real;
    for i in 1..args.len() {
        best = best.min(arg_num(args, i)?.real);
    }
    Ok(Obj::num(best))
}

fn fn_max(args: &[ObjRef]) -> Result<ObjRef> {
    let mut best = arg_num(args, 0)?.real;
    for i in 1..args.len() {
        best = best.max(arg_num(args, i)?.real);
    }
    Ok(Obj::num(best))
}

fn fn_hypot(args: &[ObjRef]) -> Result<ObjRef> {
    let x = arg_num(args, 0)?;
    let y = arg_num(args, 1)?;
    Ok(Obj::num(x.real.hypot(y.real)))
}

fn fn_now(_args: &[ObjRef]) -> Result<ObjRef> {
    let now = chrono::Utc::now();
    Ok(Obj::date(now.timestamp_millis() as f64 / 1e3))
}

fn fn_len(args: &[ObjRef]) -> Result<ObjRef> {
    let obj = args
        .get(0)
        .ok_or_else(|| RuntimeError::type_error("missing receiver"))?;
    let len = match &obj.borrow().payload {
        Payload::Str(s) => s.chars().count(),
        Payload::List(l) => l.borrow().len(),
        Payload::Dict(d) | Payload::Module(d) => d.borrow().len(),
        Payload::Vector(v) => v.borrow().len,
        other => {
            return Err(RuntimeError::type_error(format!(
                "a {} has no length",
                other.kind().name()
            )));
        }
    };
    Ok(Obj::num(len as f64))
}
