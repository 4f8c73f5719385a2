//! Host packages.
//!
//! A package is a named table of host functions. Code reaches an export
//! either qualified (`math::sqrt`) or, once the package is attached with
//! `use`, by its bare name. Captures record the packages their expression
//! needs so the evaluating context can attach them again.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::session::ContextId;
use crate::value::{Handle, HandleKind, Value};

pub type HostFnImpl = fn(&[Value], ContextId) -> Result<Value>;

pub struct Package {
    pub name: &'static str,
    pub exports: &'static [(&'static str, HostFnImpl)],
}

impl std::fmt::Debug for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.exports.iter().map(|(n, _)| *n).collect();
        f.debug_struct("Package")
            .field("name", &self.name)
            .field("exports", &names)
            .finish()
    }
}

impl Package {
    pub fn export(&self, name: &str) -> Option<(&'static str, HostFnImpl)> {
        self.exports.iter().find(|(n, _)| *n == name).copied()
    }
}

static PACKAGES: &[Package] = &[
    Package {
        name: "math",
        exports: &[
            ("sqrt", math_sqrt),
            ("abs", math_abs),
            ("floor", math_floor),
            ("pow", math_pow),
        ],
    },
    Package {
        name: "text",
        exports: &[
            ("upper", text_upper),
            ("lower", text_lower),
            ("concat", text_concat),
            ("length", text_length),
        ],
    },
    Package {
        name: "io",
        exports: &[("open", io_open), ("read", io_read), ("close", io_close)],
    },
    Package {
        name: "ffi",
        exports: &[("symbol", ffi_symbol), ("alloc", ffi_alloc)],
    },
];

pub fn all() -> &'static [Package] {
    PACKAGES
}

pub fn find(name: &str) -> Option<&'static Package> {
    PACKAGES.iter().find(|p| p.name == name)
}

/// Resolve `package::name` to a callable value.
pub fn lookup(package: &str, name: &str) -> Result<Value> {
    let pkg = find(package).ok_or_else(|| Error::evaluation(format!("unknown package `{package}`")))?;
    let (export, _) = pkg.export(name).ok_or_else(|| {
        Error::undefined(format!("package `{package}` has no export `{name}`"))
    })?;
    Ok(Value::HostFn {
        package: pkg.name,
        name: export,
    })
}

/// The first attached package exporting `name`, with the export's name.
pub fn provider(attached: &BTreeSet<String>, name: &str) -> Option<(&'static str, &'static str)> {
    attached
        .iter()
        .filter_map(|p| find(p))
        .find_map(|pkg| pkg.export(name).map(|(export, _)| (pkg.name, export)))
}

pub fn call(package: &str, name: &str, args: &[Value], context: ContextId) -> Result<Value> {
    let pkg = find(package).ok_or_else(|| Error::evaluation(format!("unknown package `{package}`")))?;
    let (_, f) = pkg.export(name).ok_or_else(|| {
        Error::undefined(format!("package `{package}` has no export `{name}`"))
    })?;
    f(args, context)
}

// ---------------------------------------------------------------------------
// Argument helpers

fn arity(fname: &str, args: &[Value], n: usize) -> Result<()> {
    if args.len() != n {
        return Err(Error::evaluation(format!(
            "{fname}: expected {n} argument(s), got {}",
            args.len()
        )));
    }
    Ok(())
}

fn number(fname: &str, v: &Value) -> Result<f64> {
    match v {
        Value::Int(n) => Ok(*n as f64),
        Value::Float(f) => Ok(*f),
        other => Err(Error::evaluation(format!(
            "{fname}: expected a number, got {}",
            other.type_name()
        ))),
    }
}

fn string<'a>(fname: &str, v: &'a Value) -> Result<&'a str> {
    match v {
        Value::Str(s) => Ok(s),
        other => Err(Error::evaluation(format!(
            "{fname}: expected a string, got {}",
            other.type_name()
        ))),
    }
}

// ---------------------------------------------------------------------------
// math

fn math_sqrt(args: &[Value], _: ContextId) -> Result<Value> {
    arity("sqrt", args, 1)?;
    let x = number("sqrt", &args[0])?;
    if x < 0.0 {
        return Err(Error::evaluation(format!("sqrt: negative argument {x}")));
    }
    Ok(Value::Float(x.sqrt()))
}

fn math_abs(args: &[Value], _: ContextId) -> Result<Value> {
    arity("abs", args, 1)?;
    match &args[0] {
        Value::Int(n) => n
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| Error::evaluation("abs: integer overflow")),
        other => Ok(Value::Float(number("abs", other)?.abs())),
    }
}

fn math_floor(args: &[Value], _: ContextId) -> Result<Value> {
    arity("floor", args, 1)?;
    Ok(Value::Int(number("floor", &args[0])?.floor() as i64))
}

fn math_pow(args: &[Value], _: ContextId) -> Result<Value> {
    arity("pow", args, 2)?;
    Ok(Value::Float(
        number("pow", &args[0])?.powf(number("pow", &args[1])?),
    ))
}

// ---------------------------------------------------------------------------
// text

fn text_upper(args: &[Value], _: ContextId) -> Result<Value> {
    arity("upper", args, 1)?;
    Ok(Value::Str(string("upper", &args[0])?.to_uppercase()))
}

fn text_lower(args: &[Value], _: ContextId) -> Result<Value> {
    arity("lower", args, 1)?;
    Ok(Value::Str(string("lower", &args[0])?.to_lowercase()))
}

fn text_concat(args: &[Value], _: ContextId) -> Result<Value> {
    let mut out = String::new();
    for arg in args {
        match arg {
            Value::Str(s) => out.push_str(s),
            other => out.push_str(&other.to_string()),
        }
    }
    Ok(Value::Str(out))
}

fn text_length(args: &[Value], _: ContextId) -> Result<Value> {
    arity("length", args, 1)?;
    Ok(Value::Int(string("length", &args[0])?.chars().count() as i64))
}

// ---------------------------------------------------------------------------
// io: a connection's open state is shared by every copy of its handle and
// freed with the last copy

/// Open state of one connection.
#[derive(Debug, Clone)]
pub struct Connection(Rc<RefCell<Option<PathBuf>>>);

impl Connection {
    fn open(path: PathBuf) -> Self {
        Self(Rc::new(RefCell::new(Some(path))))
    }

    /// The backing path, or `None` once closed.
    pub fn path(&self) -> Option<PathBuf> {
        self.0.borrow().clone()
    }

    /// Returns whether the connection was still open.
    fn close(&self) -> bool {
        self.0.borrow_mut().take().is_some()
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

thread_local! {
    static NEXT_HANDLE: Cell<u64> = const { Cell::new(1) };
}

fn next_handle_id() -> u64 {
    NEXT_HANDLE.with(|n| {
        let id = n.get();
        n.set(id + 1);
        id
    })
}

fn connection<'a>(fname: &str, v: &'a Value) -> Result<(&'a Handle, &'a Connection)> {
    match v {
        Value::Handle(
            h @ Handle {
                kind: HandleKind::Connection,
                resource: Some(conn),
                ..
            },
        ) => Ok((h, conn)),
        other => Err(Error::evaluation(format!(
            "{fname}: expected a connection, got {}",
            other.type_name()
        ))),
    }
}

fn io_open(args: &[Value], context: ContextId) -> Result<Value> {
    arity("open", args, 1)?;
    let path = string("open", &args[0])?;
    Ok(Value::Handle(Handle {
        kind: HandleKind::Connection,
        id: next_handle_id(),
        label: path.to_string(),
        origin: context,
        resource: Some(Connection::open(PathBuf::from(path))),
    }))
}

fn io_read(args: &[Value], _: ContextId) -> Result<Value> {
    arity("read", args, 1)?;
    let (h, conn) = connection("read", &args[0])?;
    let path = conn
        .path()
        .ok_or_else(|| Error::evaluation(format!("read: connection #{} is closed", h.id)))?;
    std::fs::read_to_string(&path)
        .map(Value::Str)
        .map_err(|e| Error::evaluation(format!("read: {}: {e}", path.display())))
}

fn io_close(args: &[Value], _: ContextId) -> Result<Value> {
    arity("close", args, 1)?;
    let (_, conn) = connection("close", &args[0])?;
    Ok(Value::Bool(conn.close()))
}

// ---------------------------------------------------------------------------
// ffi

fn ffi_symbol(args: &[Value], context: ContextId) -> Result<Value> {
    arity("symbol", args, 1)?;
    let name = string("symbol", &args[0])?;
    Ok(Value::Handle(Handle {
        kind: HandleKind::NativeSymbol,
        id: next_handle_id(),
        label: name.to_string(),
        origin: context,
        resource: None,
    }))
}

fn ffi_alloc(args: &[Value], context: ContextId) -> Result<Value> {
    arity("alloc", args, 1)?;
    let size = match &args[0] {
        Value::Int(n) if *n >= 0 => *n,
        other => {
            return Err(Error::evaluation(format!(
                "alloc: expected a non-negative int, got {other}"
            )))
        }
    };
    Ok(Value::Handle(Handle {
        kind: HandleKind::ExternalPointer,
        id: next_handle_id(),
        label: format!("{size} bytes"),
        origin: context,
        resource: None,
    }))
}
