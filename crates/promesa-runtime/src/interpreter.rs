//! Embedding facade: one top-level context, one config, many programs.

use anyhow::Context as _;
use promesa_ast::ast::{Expr, Program};
use promesa_parse::{parse_expr_str, parse_str};

use crate::config::{FutureConfig, OnError};
use crate::env::Env;
use crate::error::Result;
use crate::eval::{self, eval_block};
use crate::future::Future;
use crate::guard::value_of;
use crate::strategy::Plan;
use crate::value::Value;

/// Native stack for threads started by [`on_eval_stack`].
pub const EVAL_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Run `f` on a dedicated thread with [`EVAL_STACK_SIZE`] bytes of stack.
///
/// The evaluator recurses on the native stack, and the main thread's stack
/// is too small for [`MAX_CALL_DEPTH`](crate::eval::MAX_CALL_DEPTH) nested
/// calls. Build the interpreter inside `f`; its values are not `Send`.
pub fn on_eval_stack<T, F>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let handle = std::thread::Builder::new()
        .name("promesa-eval".into())
        .stack_size(EVAL_STACK_SIZE)
        .spawn(f)
        .context("failed to start evaluation thread")?;
    handle
        .join()
        .map_err(|_| anyhow::anyhow!("evaluation thread panicked"))
}

#[derive(Debug, Default)]
pub struct Interpreter {
    env: Env,
}

impl Interpreter {
    pub fn new(config: FutureConfig) -> Self {
        Self {
            env: Env::new(config),
        }
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn config(&self) -> FutureConfig {
        self.env.config()
    }

    pub fn set_config(&self, config: FutureConfig) {
        self.env.set_config(config);
    }

    /// Install an externally supplied strategy for subsequent futures.
    pub fn set_plan(&self, plan: Plan) {
        self.env.set_config(self.env.config().with_plan(plan));
    }

    /// Run a parsed program at top level. State persists across runs.
    pub fn run(&mut self, program: &Program) -> Result<Value> {
        eval_block(&mut self.env, &program.body)
    }

    /// Parse and run `src`.
    pub fn eval_source(&mut self, src: &str) -> anyhow::Result<Value> {
        let program = parse_str("<input>", src)?;
        Ok(self.run(&program)?)
    }

    /// `create_future` over an expression, owned by the top-level context.
    pub fn create_future(&self, expr: &Expr, config: &FutureConfig) -> Result<Future> {
        eval::create_future(expr, &self.env, config)
    }

    /// Parse `src` and create a future for it under the current config.
    pub fn future_of(&self, src: &str) -> anyhow::Result<Future> {
        let expr = parse_expr_str(src).context("parsing future expression")?;
        Ok(self.create_future(&expr, &self.config())?)
    }

    pub fn value_of(&self, future: &Future, on_error: OnError) -> Result<Value> {
        value_of(future, self.env.context(), on_error)
    }

    /// Read a top-level variable, forcing a deferred binding.
    pub fn get(&self, name: &str) -> Result<Value> {
        self.env.scope().read(name, self.env.context())
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.env.scope().contains(name)
    }
}
