//! Tree-walking evaluator.
//!
//! Blocks do not open scopes; function calls and local futures do. A block's
//! value is its tail expression, else the value of its last statement, else
//! `nil`. Future creation and deferred binding are expressed here in terms
//! of the capture, strategy and binding layers.

use std::cell::Cell;
use std::rc::Rc;

use promesa_ast::ast::{BinOp, Block, Expr, FutureOpt, Lit, Stmt, Target, UnOp};
use tracing::debug;

use crate::binding::{self, Container, Key};
use crate::builtins;
use crate::capture::{capture_with, Capture};
use crate::config::{FutureConfig, OnError, OptionValue};
use crate::env::Env;
use crate::error::{Error, Result};
use crate::future::Future;
use crate::guard::value_of;
use crate::packages;
use crate::reference;
use crate::scope::Scope;
use crate::session::{ContextId, Session};
use crate::strategy::Plan;
use crate::value::{Closure, Value};

/// Maximum call depth to prevent stack overflow from deep recursion
/// Nested calls and future evaluations allowed before evaluation fails.
/// Sized so that [`EVAL_STACK_SIZE`](crate::interpreter::EVAL_STACK_SIZE)
/// holds the native frames with room to spare.
pub const MAX_CALL_DEPTH: u32 = 256;

thread_local! {
    /// Current call depth, including nested future evaluations
    static CALL_DEPTH: Cell<u32> = const { Cell::new(0) };
}

fn with_depth<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    let depth = CALL_DEPTH.with(|d| {
        let current = d.get() + 1;
        d.set(current);
        current
    });
    let result = if depth > MAX_CALL_DEPTH {
        Err(Error::evaluation(format!(
            "maximum call depth exceeded (limit: {MAX_CALL_DEPTH} calls)"
        )))
    } else {
        f()
    };
    CALL_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    result
}

// ---------------------------------------------------------------------------
// Futures
// ---------------------------------------------------------------------------

/// Capture `expr` and run the reference checks `config` asks for.
fn prepare(expr: &Expr, env: &Env, config: &FutureConfig) -> Result<(Capture, Plan)> {
    if let Some(unknown) = config.packages.iter().find(|p| packages::find(p).is_none()) {
        return Err(Error::evaluation(format!("unknown package `{unknown}`")));
    }
    let capture = capture_with(expr, env, config);
    let plan = config.plan();
    reference::check(&capture, config.on_reference)?;
    reference::check_handoff(&capture, &plan)?;
    Ok((capture, plan))
}

/// Create a future for `expr`, owned by the context of `env`.
pub fn create_future(expr: &Expr, env: &Env, config: &FutureConfig) -> Result<Future> {
    let (capture, plan) = prepare(expr, env, config)?;
    plan.resolve(capture, env.context())
}

/// Bind a future for `expr` to `target`.
///
/// The container and key are resolved before the future is created. If
/// creation fails the target is left as it was.
pub fn bind_assign(target: &Target, expr: &Expr, env: &mut Env, config: &FutureConfig) -> Result<()> {
    let (container, key) = match target {
        Target::Name(id) => (
            Container::Flat(env.scope().vars().clone()),
            Key::Name(id.text.clone()),
        ),
        Target::Index { container, key, .. } => {
            let holder = eval_expr(env, container)?;
            let key = eval_expr(env, key)?;
            (Container::from_value(&holder)?, Key::from_value(&key)?)
        }
    };
    container.accepts(&key)?;
    let (capture, plan) = prepare(expr, env, config)?;
    binding::bind(&container, &key, capture, &plan, env.context())
}

/// Force every future reachable at the top level of `value` on behalf of
/// `requester`. Containers have their deferred slots materialized.
pub fn resolve_all(value: &Value, requester: ContextId) -> Result<()> {
    match value {
        Value::Future(f) => value_of(f, requester, OnError::Throw).map(|_| ()),
        Value::Map(_) | Value::Slots(_) => Container::from_value(value)?.resolve_all(requester),
        Value::List(items) => items.iter().try_for_each(|v| resolve_all(v, requester)),
        Value::Record(fields) => fields.values().try_for_each(|v| resolve_all(v, requester)),
        _ => Ok(()),
    }
}

/// Evaluate a captured expression in a fresh execution context.
pub(crate) fn evaluate_capture(capture: &Capture) -> Result<Value> {
    let context = Session::global().new_context();
    let scope = if capture.is_local() {
        Scope::from_slots(capture.globals().clone()).child()
    } else {
        capture.defining_scope().clone()
    };
    let mut env = Env::for_evaluation(
        scope,
        context,
        capture.packages().clone(),
        capture.settings(),
    );
    debug!(context = %context, local = capture.is_local(), expression = capture.text(), "evaluating capture");
    with_depth(|| eval_expr(&mut env, capture.expr())).map_err(|e| e.in_expression(capture.text()))
}

/// Apply `future(...)` / `defer(...)` options over the interpreter config.
fn future_config(env: &Env, options: &[FutureOpt]) -> Result<FutureConfig> {
    let mut config = env.config();
    for opt in options {
        let value = match &opt.value {
            Lit::Str(s) => OptionValue::Str(s),
            Lit::Bool(b) => OptionValue::Bool(*b),
            other => {
                return Err(Error::evaluation(format!(
                    "invalid future option `{}: {other}`",
                    opt.name.text
                )))
            }
        };
        config.set_option(&opt.name.text, value)?;
    }
    Ok(config)
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

pub fn eval_expr(env: &mut Env, expr: &Expr) -> Result<Value> {
    match expr {
        Expr::Lit(lit, _) => Ok(match lit {
            Lit::Int(v) => Value::Int(*v),
            Lit::Float(v) => Value::Float(*v),
            Lit::Str(s) => Value::Str(s.clone()),
            Lit::Bool(b) => Value::Bool(*b),
            Lit::Nil => Value::Nil,
        }),

        Expr::Var(id) => eval_var(env, &id.text),

        Expr::Path { package, name, .. } => packages::lookup(&package.text, &name.text),

        Expr::Paren { inner, .. } => eval_expr(env, inner),

        Expr::Unary { op, expr, .. } => match (op, eval_expr(env, expr)?) {
            (UnOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            (UnOp::Neg, Value::Int(i)) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| Error::evaluation("integer overflow")),
            (UnOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
            (UnOp::Not, v) => Err(Error::evaluation(format!(
                "`!` expects bool, got {}",
                v.type_name()
            ))),
            (UnOp::Neg, v) => Err(Error::evaluation(format!(
                "unary `-` expects a number, got {}",
                v.type_name()
            ))),
        },

        Expr::Binary { lhs, op, rhs, .. } => eval_binary(env, *op, lhs, rhs),

        Expr::Call { callee, args, .. } => {
            with_depth(|| eval_call(env, callee, args)).map_err(|e| e.in_call(expr))
        }

        Expr::Index { target, key, .. } => eval_index(env, target, key),

        Expr::Block(block) => eval_block(env, block),

        Expr::If {
            cond, then_, else_, ..
        } => eval_if(env, cond, then_, else_.as_deref()),

        Expr::While { cond, body, .. } => eval_while(env, cond, body),

        Expr::Lambda { params, body, .. } => Ok(Value::Closure(Rc::new(Closure {
            params: params.iter().map(|p| p.text.clone()).collect(),
            body: body.clone(),
            scope: env.scope().clone(),
        }))),

        Expr::Future { options, body, .. } => {
            let config = future_config(env, options)?;
            let body = Expr::Block(body.clone());
            create_future(&body, env, &config).map(Value::Future)
        }
    }
}

fn eval_var(env: &Env, name: &str) -> Result<Value> {
    if env.scope().contains(name) {
        return env.scope().read(name, env.context());
    }
    if let Some(builtin) = builtins::lookup(name) {
        return Ok(Value::Builtin(builtin));
    }
    if let Some((package, name)) = packages::provider(env.packages(), name) {
        return Ok(Value::HostFn { package, name });
    }
    Err(Error::undefined(format!("undefined variable `{name}`")))
}

fn eval_binary(env: &mut Env, op: BinOp, lhs: &Expr, rhs: &Expr) -> Result<Value> {
    use BinOp::*;

    // short-circuit
    if let And | Or = op {
        let l = match eval_expr(env, lhs)? {
            Value::Bool(b) => b,
            v => {
                return Err(Error::evaluation(format!(
                    "`{}` expects bool, got {}",
                    op.symbol(),
                    v.type_name()
                )))
            }
        };
        if matches!(op, And) != l {
            return Ok(Value::Bool(l));
        }
        return match eval_expr(env, rhs)? {
            Value::Bool(b) => Ok(Value::Bool(b)),
            v => Err(Error::evaluation(format!(
                "`{}` expects bool, got {}",
                op.symbol(),
                v.type_name()
            ))),
        };
    }

    let l = eval_expr(env, lhs)?;
    let r = eval_expr(env, rhs)?;

    match op {
        Add | Sub | Mul | Div => arithmetic(op, l, r),
        Lt | Le | Gt | Ge => {
            let ordering = match (&l, &r) {
                (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
                (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
                (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                    as_f64(&l).partial_cmp(&as_f64(&r))
                }
                _ => {
                    return Err(Error::evaluation(format!(
                        "cannot compare {} with {}",
                        l.type_name(),
                        r.type_name()
                    )))
                }
            };
            let Some(ordering) = ordering else {
                return Ok(Value::Bool(false));
            };
            Ok(Value::Bool(match op {
                Lt => ordering.is_lt(),
                Le => ordering.is_le(),
                Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        Eq => Ok(Value::Bool(l.loose_eq(&r))),
        Ne => Ok(Value::Bool(!l.loose_eq(&r))),
        And | Or => Err(Error::evaluation("logical operator reached arithmetic")),
    }
}

fn as_f64(v: &Value) -> f64 {
    match v {
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        _ => f64::NAN,
    }
}

fn arithmetic(op: BinOp, l: Value, r: Value) -> Result<Value> {
    use BinOp::*;
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => {
            let result = match op {
                Add => a.checked_add(b),
                Sub => a.checked_sub(b),
                Mul => a.checked_mul(b),
                _ => {
                    if b == 0 {
                        return Err(Error::evaluation("division by zero"));
                    }
                    a.checked_div(b)
                }
            };
            result
                .map(Value::Int)
                .ok_or_else(|| Error::evaluation("integer overflow"))
        }
        (Value::Str(a), Value::Str(b)) if matches!(op, Add) => Ok(Value::Str(a + &b)),
        (l @ (Value::Int(_) | Value::Float(_)), r @ (Value::Int(_) | Value::Float(_))) => {
            let (a, b) = (as_f64(&l), as_f64(&r));
            Ok(Value::Float(match op {
                Add => a + b,
                Sub => a - b,
                Mul => a * b,
                _ => a / b,
            }))
        }
        (l, r) => Err(Error::evaluation(format!(
            "`{}` expects numbers, got {} and {}",
            op.symbol(),
            l.type_name(),
            r.type_name()
        ))),
    }
}

pub fn eval_block(env: &mut Env, block: &Block) -> Result<Value> {
    let mut last = Value::Nil;
    for stmt in &block.stmts {
        last = eval_stmt(env, stmt)?;
    }
    match &block.tail {
        Some(tail) => eval_expr(env, tail),
        None => Ok(last),
    }
}

fn eval_stmt(env: &mut Env, stmt: &Stmt) -> Result<Value> {
    match stmt {
        Stmt::Assign { target, value, .. } => {
            let v = eval_expr(env, value)?;
            assign(env, target, v.clone())?;
            Ok(v)
        }
        Stmt::Defer {
            options,
            target,
            value,
            ..
        } => {
            let config = future_config(env, options)?;
            bind_assign(target, value, env, &config)?;
            Ok(Value::Nil)
        }
        Stmt::Use { package, .. } => {
            env.attach(&package.text)?;
            Ok(Value::Nil)
        }
        Stmt::Expr { expr, .. } => eval_expr(env, expr),
    }
}

fn assign(env: &mut Env, target: &Target, value: Value) -> Result<()> {
    let (container, key) = match target {
        Target::Name(id) => {
            env.scope().assign(&id.text, value);
            return Ok(());
        }
        Target::Index { container, key, .. } => (container, key),
    };
    let holder = eval_expr(env, container)?;
    let key = eval_expr(env, key)?;
    match holder {
        Value::Map(_) | Value::Slots(_) => {
            Container::from_value(&holder)?.assign(&Key::from_value(&key)?, value)
        }
        // by-value containers: copy, modify, rebind
        Value::List(mut items) => {
            let name = rebind_name(container, "list")?;
            let pos = match Key::from_value(&key)? {
                Key::Index(i) => i - 1,
                Key::Name(n) => {
                    return Err(Error::evaluation(format!(
                        "lists are indexed by position, not {n:?}"
                    )))
                }
            };
            if pos >= items.len() {
                items.resize(pos + 1, Value::Nil);
            }
            items[pos] = value;
            env.scope().assign(name, Value::List(items));
            Ok(())
        }
        Value::Record(mut fields) => {
            let name = rebind_name(container, "record")?;
            match key {
                Value::Str(field) => {
                    fields.insert(field, value);
                    env.scope().assign(name, Value::Record(fields));
                    Ok(())
                }
                other => Err(Error::evaluation(format!(
                    "records are indexed by name, not {}",
                    other.type_name()
                ))),
            }
        }
        other => Err(Error::unsupported(format!(
            "cannot assign into a {}",
            other.type_name()
        ))),
    }
}

fn rebind_name<'a>(container: &'a Expr, kind: &str) -> Result<&'a str> {
    match container {
        Expr::Var(id) => Ok(&id.text),
        _ => Err(Error::unsupported(format!(
            "{kind} element assignment needs a variable to update"
        ))),
    }
}

fn eval_index(env: &mut Env, target: &Expr, key: &Expr) -> Result<Value> {
    let holder = eval_expr(env, target)?;
    let key = eval_expr(env, key)?;
    match &holder {
        Value::List(items) => match Key::from_value(&key)? {
            Key::Index(i) => items.get(i - 1).cloned().ok_or_else(|| {
                Error::undefined(format!(
                    "position {i} is out of bounds for a list of {}",
                    items.len()
                ))
            }),
            Key::Name(n) => Err(Error::evaluation(format!(
                "lists are indexed by position, not {n:?}"
            ))),
        },
        Value::Record(fields) => match &key {
            Value::Str(name) => fields
                .get(name)
                .cloned()
                .ok_or_else(|| Error::undefined(format!("record has no field `{name}`"))),
            other => Err(Error::evaluation(format!(
                "records are indexed by name, not {}",
                other.type_name()
            ))),
        },
        Value::Map(_) | Value::Slots(_) => {
            Container::from_value(&holder)?.read(&Key::from_value(&key)?, env.context())
        }
        other => Err(Error::evaluation(format!(
            "cannot index a {}",
            other.type_name()
        ))),
    }
}

fn eval_if(env: &mut Env, cond: &Expr, then_: &Block, else_: Option<&Expr>) -> Result<Value> {
    let cond_val = match eval_expr(env, cond)? {
        Value::Bool(b) => b,
        v => {
            return Err(Error::evaluation(format!(
                "if condition must be bool, got {}",
                v.type_name()
            )))
        }
    };
    if cond_val {
        eval_block(env, then_)
    } else if let Some(else_expr) = else_ {
        eval_expr(env, else_expr)
    } else {
        Ok(Value::Nil)
    }
}

fn eval_while(env: &mut Env, cond: &Expr, body: &Block) -> Result<Value> {
    loop {
        match eval_expr(env, cond)? {
            Value::Bool(true) => {}
            Value::Bool(false) => break,
            v => {
                return Err(Error::evaluation(format!(
                    "while condition must be bool, got {}",
                    v.type_name()
                )))
            }
        }
        eval_block(env, body)?;
    }
    Ok(Value::Nil)
}

fn eval_call(env: &mut Env, callee: &Expr, args: &[Expr]) -> Result<Value> {
    let f = eval_expr(env, callee)?;
    let mut argv = Vec::with_capacity(args.len());
    for arg in args {
        argv.push(eval_expr(env, arg)?);
    }
    call_value(env, &f, argv)
}

/// Apply a callable value to already-evaluated arguments.
pub fn call_value(env: &mut Env, f: &Value, args: Vec<Value>) -> Result<Value> {
    match f {
        Value::Closure(closure) => {
            if args.len() != closure.params.len() {
                return Err(Error::evaluation(format!(
                    "function expects {} argument(s), got {}",
                    closure.params.len(),
                    args.len()
                )));
            }
            let scope = closure.scope.child();
            for (param, arg) in closure.params.iter().zip(args) {
                scope.assign(param, arg);
            }
            let mut inner = env.with_scope(scope);
            eval_block(&mut inner, &closure.body)
        }
        Value::Builtin(name) => builtins::call(name, args, env),
        Value::HostFn { package, name } => packages::call(package, name, &args, env.context()),
        other => Err(Error::evaluation(format!(
            "cannot call a {}",
            other.type_name()
        ))),
    }
}
