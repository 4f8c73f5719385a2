//! Future/promise runtime.
//!
//! A future is a handle to the value of an expression that is, or will be,
//! evaluated under some strategy. This crate provides the pieces: capture of
//! an expression with its globals, pluggable evaluation strategies, the
//! ownership guard that restricts who may trigger evaluation, the reference
//! safety check, and the binding layer that attaches futures to variables or
//! container slots so they materialize on first read.

#![forbid(unsafe_code)]
#![deny(unused_must_use)]
#![warn(clippy::dbg_macro, clippy::todo, clippy::unimplemented)]

pub mod binding;
pub mod builtins;
pub mod capture;
pub mod config;
pub mod env;
pub mod error;
pub mod eval;
pub mod future;
pub mod guard;
pub mod interpreter;
pub mod packages;
pub mod reference;
pub mod scope;
pub mod session;
pub mod strategy;
pub mod value;

pub use binding::{bind, Container, FlatMap, IndexedMap, Key, Slot, MAX_POSITION};
pub use capture::{capture, capture_with, Capture};
pub use config::{FutureConfig, OnError, OnReference, StrategyKind};
pub use env::Env;
pub use error::{Error, ErrorKind, Result};
pub use eval::{bind_assign, create_future, resolve_all, MAX_CALL_DEPTH};
pub use future::{Future, FutureState, StateKind};
pub use guard::value_of;
pub use interpreter::{on_eval_stack, Interpreter, EVAL_STACK_SIZE};
pub use session::{ContextId, FutureId, Session};
pub use strategy::{Eager, Lazy, Plan, Sequential, Strategy};
pub use value::{Handle, HandleKind, Value};
