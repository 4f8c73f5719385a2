//! Evaluation strategies.
//!
//! A strategy turns a [`Capture`] into a [`Future`]. It decides when the
//! captured expression is evaluated; identity, ownership and the state
//! machine stay with the future core. New strategies plug in by
//! implementing [`Strategy`] and wrapping it in a [`Plan`].

use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::capture::Capture;
use crate::config::StrategyKind;
use crate::error::Result;
use crate::eval::evaluate_capture;
use crate::future::Future;
use crate::session::ContextId;

pub trait Strategy: fmt::Debug {
    fn policy_name(&self) -> &str;

    /// Produce a future owned by `owner`. An `Err` means no future exists.
    fn resolve(&self, capture: Capture, owner: ContextId) -> Result<Future>;

    /// Whether futures still pending in the owner's context may appear among
    /// this strategy's captured globals.
    fn owner_compatible(&self) -> bool {
        true
    }
}

/// Evaluate at creation; evaluation errors propagate out of creation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eager;

impl Strategy for Eager {
    fn policy_name(&self) -> &str {
        "eager"
    }

    fn resolve(&self, capture: Capture, owner: ContextId) -> Result<Future> {
        let value = evaluate_capture(&capture)?;
        Ok(Future::resolved(capture, owner, self.policy_name(), value))
    }
}

/// Evaluate on first read.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lazy;

impl Strategy for Lazy {
    fn policy_name(&self) -> &str {
        "lazy"
    }

    fn resolve(&self, capture: Capture, owner: ContextId) -> Result<Future> {
        Ok(Future::pending(capture, owner, self.policy_name()))
    }
}

/// In-process sequential evaluation; `lazy` picks between running now and
/// running on first read.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential {
    pub lazy: bool,
}

impl Strategy for Sequential {
    fn policy_name(&self) -> &str {
        "sequential"
    }

    fn resolve(&self, capture: Capture, owner: ContextId) -> Result<Future> {
        if self.lazy {
            return Ok(Future::pending(capture, owner, self.policy_name()));
        }
        let value = evaluate_capture(&capture)?;
        Ok(Future::resolved(capture, owner, self.policy_name(), value))
    }
}

/// Shared handle to the strategy in effect.
#[derive(Clone)]
pub struct Plan(Rc<dyn Strategy>);

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Plan({:?})", self.0)
    }
}

impl Plan {
    pub fn new(strategy: impl Strategy + 'static) -> Self {
        Plan(Rc::new(strategy))
    }

    pub fn builtin(kind: StrategyKind, lazy: bool) -> Self {
        match kind {
            StrategyKind::Eager => Plan::new(Eager),
            StrategyKind::Lazy => Plan::new(Lazy),
            StrategyKind::Sequential => Plan::new(Sequential { lazy }),
        }
    }

    pub fn policy_name(&self) -> &str {
        self.0.policy_name()
    }

    pub fn owner_compatible(&self) -> bool {
        self.0.owner_compatible()
    }

    pub fn resolve(&self, capture: Capture, owner: ContextId) -> Result<Future> {
        debug!(
            strategy = self.policy_name(),
            fingerprint = %capture.fingerprint(),
            local = capture.is_local(),
            "resolving capture"
        );
        self.0.resolve(capture, owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::capture;
    use crate::env::Env;
    use crate::error::ErrorKind;
    use crate::future::StateKind;
    use crate::value::Value;
    use promesa_parse::parse_expr_str;

    fn cap(src: &str) -> (Capture, ContextId) {
        let env = Env::default();
        (capture(&parse_expr_str(src).unwrap(), &env, true), env.context())
    }

    #[test]
    fn eager_resolves_immediately() {
        let (c, owner) = cap("40 + 2");
        let f = Plan::builtin(StrategyKind::Eager, false).resolve(c, owner).unwrap();
        assert_eq!(f.state(), StateKind::Resolved);
        assert_eq!(f.strategy(), "eager");
        assert!(matches!(f.outcome(), Some(Ok(Value::Int(42)))));
    }

    #[test]
    fn eager_failure_creates_nothing() {
        let (c, owner) = cap("fail(\"early\")");
        let err = Plan::new(Eager).resolve(c, owner).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Evaluation);
    }

    #[test]
    fn lazy_defers() {
        let (c, owner) = cap("fail(\"later\")");
        let f = Plan::new(Lazy).resolve(c, owner).unwrap();
        assert_eq!(f.state(), StateKind::Created);
        assert_eq!(f.owner(), owner);
    }

    #[test]
    fn sequential_follows_lazy_flag() {
        let (c, owner) = cap("1");
        let now = Plan::builtin(StrategyKind::Sequential, false)
            .resolve(c.clone(), owner)
            .unwrap();
        assert_eq!(now.state(), StateKind::Resolved);
        let later = Plan::builtin(StrategyKind::Sequential, true).resolve(c, owner).unwrap();
        assert_eq!(later.state(), StateKind::Created);
        assert_eq!(later.strategy(), "sequential");
    }
}
