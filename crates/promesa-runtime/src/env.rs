//! Evaluation environment: the scope chain plus the identity and settings of
//! the execution context doing the evaluating.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use crate::config::FutureConfig;
use crate::error::{Error, Result};
use crate::packages;
use crate::scope::Scope;
use crate::session::{ContextId, Session};

#[derive(Debug, Clone)]
pub struct Env {
    scope: Scope,
    context: ContextId,
    /// Packages whose exports resolve without a `pkg::` prefix.
    packages: Rc<BTreeSet<String>>,
    /// Interpreter-wide settings, shared with every capture taken here.
    settings: Rc<RefCell<FutureConfig>>,
}

impl Default for Env {
    fn default() -> Self {
        Self::new(FutureConfig::default())
    }
}

impl Env {
    /// Top-level environment of the session's root context.
    pub fn new(config: FutureConfig) -> Self {
        Self {
            scope: Scope::root(),
            context: Session::global().root_context(),
            packages: Rc::new(BTreeSet::new()),
            settings: Rc::new(RefCell::new(config)),
        }
    }

    pub(crate) fn for_evaluation(
        scope: Scope,
        context: ContextId,
        packages: BTreeSet<String>,
        settings: Rc<RefCell<FutureConfig>>,
    ) -> Self {
        Self {
            scope,
            context,
            packages: Rc::new(packages),
            settings,
        }
    }

    /// Same context and settings, different scope (function calls).
    pub fn with_scope(&self, scope: Scope) -> Self {
        Self {
            scope,
            ..self.clone()
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn packages(&self) -> &BTreeSet<String> {
        &self.packages
    }

    pub fn config(&self) -> FutureConfig {
        self.settings.borrow().clone()
    }

    pub fn set_config(&self, config: FutureConfig) {
        *self.settings.borrow_mut() = config;
    }

    pub(crate) fn settings(&self) -> Rc<RefCell<FutureConfig>> {
        self.settings.clone()
    }

    /// Attach a package for unqualified lookup.
    pub fn attach(&mut self, package: &str) -> Result<()> {
        if packages::find(package).is_none() {
            return Err(Error::evaluation(format!("unknown package `{package}`")));
        }
        Rc::make_mut(&mut self.packages).insert(package.to_string());
        Ok(())
    }
}
