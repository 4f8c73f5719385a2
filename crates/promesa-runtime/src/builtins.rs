//! Interpreter builtins.

use std::collections::BTreeMap;

use crate::binding::{FlatMap, IndexedMap};
use crate::config::{OnError, StrategyKind};
use crate::env::Env;
use crate::error::{Error, Result};
use crate::eval::resolve_all;
use crate::guard::value_of;
use crate::value::Value;

const BUILTINS: &[&str] = &[
    "value",
    "resolved",
    "state",
    "fail",
    "print",
    "len",
    "list",
    "record",
    "map",
    "slots",
    "set_name",
    "names",
    "resolve_all",
    "plan",
    "message",
];

pub fn lookup(name: &str) -> Option<&'static str> {
    BUILTINS.iter().find(|b| **b == name).copied()
}

pub fn call(name: &str, args: Vec<Value>, env: &mut Env) -> Result<Value> {
    match name {
        "value" => builtin_value(args, env),
        "resolved" => match one(name, &args)? {
            Value::Future(f) => Ok(Value::Bool(f.is_terminal())),
            _ => Ok(Value::Bool(true)),
        },
        "state" => match one(name, &args)? {
            Value::Future(f) => Ok(Value::Str(f.state().to_string())),
            other => Err(type_error(name, "a future", other)),
        },
        "fail" => match one(name, &args)? {
            Value::Str(msg) => Err(Error::evaluation(msg.clone())),
            other => Err(Error::evaluation(other.to_string())),
        },
        "print" => {
            let line: Vec<String> = args.iter().map(display_plain).collect();
            println!("{}", line.join(" "));
            Ok(Value::Nil)
        }
        "len" => builtin_len(one(name, &args)?),
        "list" => Ok(Value::List(args)),
        "record" => builtin_record(args),
        "map" => {
            arity(name, &args, 0)?;
            Ok(Value::Map(FlatMap::new()))
        }
        "slots" => builtin_slots(args),
        "set_name" => builtin_set_name(args),
        "names" => builtin_names(one(name, &args)?),
        "resolve_all" => match args.as_slice() {
            [] => {
                env.scope().vars().resolve_all(env.context())?;
                Ok(Value::Nil)
            }
            [target] => {
                resolve_all(target, env.context())?;
                Ok(target.clone())
            }
            _ => Err(Error::evaluation(format!(
                "resolve_all: expected at most 1 argument, got {}",
                args.len()
            ))),
        },
        "plan" => builtin_plan(args, env),
        "message" => match one(name, &args)? {
            Value::Condition(e) => Ok(Value::Str(e.message.clone())),
            other => Err(type_error(name, "a condition", other)),
        },
        _ => Err(Error::undefined(format!("unknown builtin `{name}`"))),
    }
}

fn arity(name: &str, args: &[Value], n: usize) -> Result<()> {
    if args.len() != n {
        return Err(Error::evaluation(format!(
            "{name}: expected {n} argument(s), got {}",
            args.len()
        )));
    }
    Ok(())
}

fn one<'a>(name: &str, args: &'a [Value]) -> Result<&'a Value> {
    arity(name, args, 1)?;
    Ok(&args[0])
}

fn type_error(name: &str, expected: &str, got: &Value) -> Error {
    Error::evaluation(format!(
        "{name}: expected {expected}, got {}",
        got.type_name()
    ))
}

fn display_plain(v: &Value) -> String {
    match v {
        Value::Str(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `value(f)` / `value(f, "return")`
fn builtin_value(args: Vec<Value>, env: &Env) -> Result<Value> {
    let (target, policy) = match args.as_slice() {
        [target] => (target, None),
        [target, Value::Str(policy)] => {
            let policy: OnError = policy.parse().map_err(|_| {
                Error::evaluation(format!("value: unknown error policy {policy:?}"))
            })?;
            (target, Some(policy))
        }
        _ => {
            return Err(Error::evaluation(
                "value: expected a future and an optional error policy",
            ))
        }
    };
    match target {
        Value::Future(f) => {
            let policy = policy.unwrap_or_else(|| f.capture().on_error());
            value_of(f, env.context(), policy)
        }
        other => Ok(other.clone()),
    }
}

fn builtin_len(v: &Value) -> Result<Value> {
    let n = match v {
        Value::List(items) => items.len(),
        Value::Record(fields) => fields.len(),
        Value::Str(s) => s.chars().count(),
        Value::Map(m) => m.len(),
        Value::Slots(s) => s.len(),
        other => return Err(type_error("len", "a collection", other)),
    };
    Ok(Value::Int(n as i64))
}

/// `record("a", 1, "b", 2)`
fn builtin_record(args: Vec<Value>) -> Result<Value> {
    if args.len() % 2 != 0 {
        return Err(Error::evaluation(
            "record: expected name/value pairs",
        ));
    }
    let mut fields = BTreeMap::new();
    let mut it = args.into_iter();
    while let (Some(k), Some(v)) = (it.next(), it.next()) {
        match k {
            Value::Str(name) => {
                fields.insert(name, v);
            }
            other => return Err(type_error("record", "a field name", &other)),
        }
    }
    Ok(Value::Record(fields))
}

/// `slots()` or `slots(n)`: an indexable mapping with `n` unbound slots.
fn builtin_slots(args: Vec<Value>) -> Result<Value> {
    let s = IndexedMap::new();
    match args.as_slice() {
        [] => {}
        [Value::Int(n)] if *n >= 0 => {
            s.reserve(usize::try_from(*n).unwrap_or(usize::MAX))?;
        }
        [other] => return Err(type_error("slots", "a non-negative int", other)),
        _ => return Err(Error::evaluation("slots: expected at most 1 argument")),
    }
    Ok(Value::Slots(s))
}

fn builtin_set_name(args: Vec<Value>) -> Result<Value> {
    match args.as_slice() {
        [Value::Slots(s), Value::Int(i), Value::Str(name)] if *i >= 1 => {
            s.set_name(*i as usize, name)?;
            Ok(Value::Slots(s.clone()))
        }
        [Value::Slots(_), Value::Int(i), _] if *i < 1 => Err(Error::unsupported(format!(
            "position {i} is out of range; positions start at 1"
        ))),
        _ => Err(Error::evaluation(
            "set_name: expected (slots, position, name)",
        )),
    }
}

fn builtin_names(v: &Value) -> Result<Value> {
    let names = match v {
        Value::Record(fields) => fields.keys().cloned().map(Value::Str).collect(),
        Value::Map(m) => m.names().into_iter().map(Value::Str).collect(),
        Value::Slots(s) => s
            .names()
            .into_iter()
            .map(|n| n.map(Value::Str).unwrap_or(Value::Nil))
            .collect(),
        other => return Err(type_error("names", "a record, map or slots", other)),
    };
    Ok(Value::List(names))
}

/// `plan()` reports the strategy in effect; `plan("lazy")` installs one and
/// returns the previous name.
fn builtin_plan(args: Vec<Value>, env: &Env) -> Result<Value> {
    let config = env.config();
    let previous = Value::Str(config.plan().policy_name().to_string());
    match args.as_slice() {
        [] => Ok(previous),
        [Value::Str(name)] => {
            let kind: StrategyKind = name
                .parse()
                .map_err(|_| Error::evaluation(format!("plan: unknown strategy {name:?}")))?;
            env.set_config(config.with_strategy(kind));
            Ok(previous)
        }
        [other] => Err(type_error("plan", "a strategy name", other)),
        _ => Err(Error::evaluation("plan: expected at most 1 argument")),
    }
}

