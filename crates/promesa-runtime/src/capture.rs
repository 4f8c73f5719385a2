//! Capture layer.
//!
//! A [`Capture`] freezes what a future needs at creation time: the expression,
//! the values of the names it reads from its defining scope, and the packages
//! it uses. It is immutable once built.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use promesa_ast::ast::Expr;
use promesa_globals::find_globals;
use sha2::{Digest, Sha256};

use crate::binding::Slot;
use crate::config::{FutureConfig, OnError};
use crate::env::Env;
use crate::packages;
use crate::scope::Scope;

#[derive(Clone)]
pub struct Capture(Rc<Inner>);

struct Inner {
    expr: Expr,
    text: String,
    globals: BTreeMap<String, Slot>,
    packages: BTreeSet<String>,
    local: bool,
    on_error: OnError,
    defining_scope: Scope,
    settings: Rc<RefCell<FutureConfig>>,
}

impl fmt::Debug for Capture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capture")
            .field("expression", &self.0.text)
            .field("globals", &self.0.globals.keys().collect::<Vec<_>>())
            .field("packages", &self.0.packages)
            .field("local", &self.0.local)
            .finish()
    }
}

/// Capture `expr` in `env` with default settings and the given locality.
pub fn capture(expr: &Expr, env: &Env, local: bool) -> Capture {
    capture_with(expr, env, &env.config().with_local(local))
}

/// Capture `expr` in `env` using `config` for locality, error policy and
/// explicitly requested packages.
pub fn capture_with(expr: &Expr, env: &Env, config: &FutureConfig) -> Capture {
    let found = find_globals(expr);
    let mut globals = BTreeMap::new();
    let mut pkgs = found.packages;
    pkgs.extend(config.packages.iter().cloned());

    for name in &found.names {
        match env.scope().lookup_slot(name) {
            Some(Slot::Value(v)) => {
                globals.insert(name.clone(), Slot::Value(v));
            }
            Some(Slot::Deferred(fut)) => {
                // terminal successes are plain data by now; anything still
                // pending (or failed) travels as the future itself
                let slot = match fut.outcome() {
                    Some(Ok(v)) => Slot::Value(v),
                    _ => Slot::Deferred(fut),
                };
                globals.insert(name.clone(), slot);
            }
            None => {
                if let Some((pkg, _)) = packages::provider(env.packages(), name) {
                    pkgs.insert(pkg.to_string());
                }
            }
        }
    }

    Capture(Rc::new(Inner {
        text: expr.to_string(),
        expr: expr.clone(),
        globals,
        packages: pkgs,
        local: config.local,
        on_error: config.on_error,
        defining_scope: env.scope().clone(),
        settings: env.settings(),
    }))
}

impl Capture {
    pub fn expr(&self) -> &Expr {
        &self.0.expr
    }

    /// Deparsed expression text.
    pub fn text(&self) -> &str {
        &self.0.text
    }

    pub fn globals(&self) -> &BTreeMap<String, Slot> {
        &self.0.globals
    }

    pub fn packages(&self) -> &BTreeSet<String> {
        &self.0.packages
    }

    pub fn is_local(&self) -> bool {
        self.0.local
    }

    /// Error policy reads of the resulting future default to.
    pub fn on_error(&self) -> OnError {
        self.0.on_error
    }

    pub fn defining_scope(&self) -> &Scope {
        &self.0.defining_scope
    }

    pub(crate) fn settings(&self) -> Rc<RefCell<FutureConfig>> {
        self.0.settings.clone()
    }

    /// Stable digest of the expression text, global names and packages.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.text.as_bytes());
        for name in self.0.globals.keys() {
            hasher.update(b"\0g:");
            hasher.update(name.as_bytes());
        }
        for pkg in &self.0.packages {
            hasher.update(b"\0p:");
            hasher.update(pkg.as_bytes());
        }
        format!("sha256:{:x}", hasher.finalize())
    }
}
