//! Runtime values.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use promesa_ast::ast::Block;

use crate::binding::{FlatMap, IndexedMap};
use crate::error::Error;
use crate::future::Future;
use crate::packages::Connection;
use crate::scope::Scope;
use crate::session::ContextId;

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// By-value sequence; assignment copies it.
    List(Vec<Value>),
    /// By-value record of named fields.
    Record(BTreeMap<String, Value>),
    /// Reference-mutable name -> slot mapping.
    Map(FlatMap),
    /// Reference-mutable, order-preserving, name- and position-addressable slots.
    Slots(IndexedMap),
    Closure(Rc<Closure>),
    /// Interpreter builtin (`value`, `print`, ...)
    Builtin(&'static str),
    /// Function exported by a host package
    HostFn {
        package: &'static str,
        name: &'static str,
    },
    Handle(Handle),
    Future(Future),
    /// A failure handed back as data (`value(f, "return")`).
    Condition(Box<Error>),
}

#[derive(Debug)]
pub struct Closure {
    pub params: Vec<String>,
    pub body: Block,
    pub scope: Scope,
}

/// A value whose meaning is tied to the execution context that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Handle {
    pub kind: HandleKind,
    pub id: u64,
    pub label: String,
    pub origin: ContextId,
    /// Backing state for connections.
    pub resource: Option<Connection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub enum HandleKind {
    /// Open connection (file or stream)
    Connection,
    /// Pointer into foreign-runtime memory
    ExternalPointer,
    /// Resolved native-code symbol
    NativeSymbol,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HandleKind::Connection => "connection",
            HandleKind::ExternalPointer => "external pointer",
            HandleKind::NativeSymbol => "native symbol",
        })
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Record(_) => "record",
            Value::Map(_) => "map",
            Value::Slots(_) => "slots",
            Value::Closure(_) | Value::Builtin(_) | Value::HostFn { .. } => "function",
            Value::Handle(_) => "handle",
            Value::Future(_) => "future",
            Value::Condition(_) => "condition",
        }
    }

    pub fn is_truthy(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Structural equality for data; reference values compare by identity.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Record(a), Value::Record(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.loose_eq(vb))
            }
            (Value::Map(a), Value::Map(b)) => a.ptr_eq(b),
            (Value::Slots(a), Value::Slots(b)) => a.ptr_eq(b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (
                Value::HostFn { package, name },
                Value::HostFn {
                    package: p2,
                    name: n2,
                },
            ) => package == p2 && name == n2,
            (Value::Handle(a), Value::Handle(b)) => a == b,
            (Value::Future(a), Value::Future(b)) => a.ptr_eq(b),
            (Value::Condition(a), Value::Condition(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "\"{s}\""),
            Value::List(elems) => {
                write!(f, "[")?;
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, "]")
            }
            Value::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {name}: {value}")?;
                }
                write!(f, " }}")
            }
            Value::Map(m) => write!(f, "<map of {}>", m.len()),
            Value::Slots(s) => write!(f, "<slots of {}>", s.len()),
            Value::Closure(c) => write!(f, "<fn({})>", c.params.join(", ")),
            Value::Builtin(name) => write!(f, "<builtin:{name}>"),
            Value::HostFn { package, name } => write!(f, "<{package}::{name}>"),
            Value::Handle(h) => write!(f, "<{}#{} {}>", h.kind, h.id, h.label),
            Value::Future(fut) => write!(f, "<future {} {}>", fut.id(), fut.state()),
            Value::Condition(e) => write!(f, "<{}: {}>", e.kind, e.message),
        }
    }
}
