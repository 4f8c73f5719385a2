//! Future core: identity, ownership and the one-way state machine
//! `Created -> Running -> Resolved | Failed`.
//!
//! A future is shared (`Rc`) between every slot and variable it was copied
//! into. The terminal outcome is written once; every later read of any copy
//! observes the same value or the same error.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use tracing::debug;

use crate::capture::Capture;
use crate::error::{Error, Result};
use crate::eval::evaluate_capture;
use crate::session::{ContextId, FutureId, Session};
use crate::value::Value;

#[derive(Debug, Clone)]
pub enum FutureState {
    Created,
    Running,
    Resolved(Value),
    Failed(Error),
}

/// Payload-free view of [`FutureState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StateKind {
    Created,
    Running,
    Resolved,
    Failed,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StateKind::Created => "created",
            StateKind::Running => "running",
            StateKind::Resolved => "resolved",
            StateKind::Failed => "failed",
        })
    }
}

impl FutureState {
    pub fn kind(&self) -> StateKind {
        match self {
            FutureState::Created => StateKind::Created,
            FutureState::Running => StateKind::Running,
            FutureState::Resolved(_) => StateKind::Resolved,
            FutureState::Failed(_) => StateKind::Failed,
        }
    }
}

#[derive(Clone)]
pub struct Future(Rc<Inner>);

struct Inner {
    id: FutureId,
    owner: ContextId,
    strategy: String,
    capture: Capture,
    state: RefCell<FutureState>,
}

impl fmt::Debug for Future {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("id", &self.0.id)
            .field("strategy", &self.0.strategy)
            .field("state", &self.state())
            .finish()
    }
}

impl Future {
    fn with_state(capture: Capture, owner: ContextId, strategy: &str, state: FutureState) -> Self {
        let id = Session::global().next_future_id();
        debug!(future = %id, owner = %owner, strategy, state = %state.kind(), "future created");
        Future(Rc::new(Inner {
            id,
            owner,
            strategy: strategy.to_string(),
            capture,
            state: RefCell::new(state),
        }))
    }

    /// A future whose evaluation has not started.
    pub fn pending(capture: Capture, owner: ContextId, strategy: &str) -> Self {
        Self::with_state(capture, owner, strategy, FutureState::Created)
    }

    /// A future that already holds its value.
    pub fn resolved(capture: Capture, owner: ContextId, strategy: &str, value: Value) -> Self {
        Self::with_state(capture, owner, strategy, FutureState::Resolved(value))
    }

    /// A future whose evaluation already failed.
    pub fn failed(capture: Capture, owner: ContextId, strategy: &str, error: Error) -> Self {
        Self::with_state(capture, owner, strategy, FutureState::Failed(error))
    }

    pub fn id(&self) -> FutureId {
        self.0.id
    }

    pub fn owner(&self) -> ContextId {
        self.0.owner
    }

    /// Policy name of the strategy that created this future.
    pub fn strategy(&self) -> &str {
        &self.0.strategy
    }

    pub fn capture(&self) -> &Capture {
        &self.0.capture
    }

    pub fn state(&self) -> StateKind {
        self.0.state.borrow().kind()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state(), StateKind::Resolved | StateKind::Failed)
    }

    pub fn ptr_eq(&self, other: &Future) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// The stored outcome, if the future is terminal.
    pub fn outcome(&self) -> Option<Result<Value>> {
        match &*self.0.state.borrow() {
            FutureState::Resolved(v) => Some(Ok(v.clone())),
            FutureState::Failed(e) => Some(Err(e.clone())),
            FutureState::Created | FutureState::Running => None,
        }
    }

    /// Drive the state machine to a terminal state and return the outcome.
    ///
    /// The outer `Err` means evaluation could not start at all (the future
    /// is already running further up this call stack). The inner result is
    /// the stored outcome. Ownership is checked by the caller.
    pub(crate) fn force(&self) -> Result<Result<Value>> {
        {
            let mut state = self.0.state.borrow_mut();
            match &*state {
                FutureState::Resolved(v) => return Ok(Ok(v.clone())),
                FutureState::Failed(e) => return Ok(Err(e.clone())),
                FutureState::Running => {
                    return Err(Error::evaluation(format!(
                        "future {} depends on its own value",
                        self.0.id
                    ))
                    .in_expression(self.0.capture.text()));
                }
                FutureState::Created => *state = FutureState::Running,
            }
        }

        debug!(future = %self.0.id, "forcing future");
        let outcome = evaluate_capture(&self.0.capture);
        *self.0.state.borrow_mut() = match &outcome {
            Ok(v) => FutureState::Resolved(v.clone()),
            Err(e) => FutureState::Failed(e.clone()),
        };
        debug!(future = %self.0.id, state = %self.state(), "future settled");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::capture;
    use crate::env::Env;
    use crate::error::ErrorKind;
    use promesa_parse::parse_expr_str;

    fn pending(src: &str) -> Future {
        let env = Env::default();
        let c = capture(&parse_expr_str(src).unwrap(), &env, true);
        Future::pending(c, env.context(), "lazy")
    }

    #[test]
    fn force_moves_to_resolved_once() {
        let f = pending("1 + 2");
        assert_eq!(f.state(), StateKind::Created);
        assert!(f.outcome().is_none());
        let v = f.force().unwrap().unwrap();
        assert!(matches!(v, Value::Int(3)));
        assert_eq!(f.state(), StateKind::Resolved);
        assert!(matches!(f.force().unwrap(), Ok(Value::Int(3))));
    }

    #[test]
    fn failure_is_stored_and_replayed() {
        let f = pending("fail(\"boom\")");
        let first = f.force().unwrap().unwrap_err();
        assert_eq!(f.state(), StateKind::Failed);
        let second = f.outcome().unwrap().unwrap_err();
        assert_eq!(first, second);
        assert_eq!(first.kind, ErrorKind::Evaluation);
        assert_eq!(first.expression.as_deref(), Some("fail(\"boom\")"));
    }

    #[test]
    fn clones_share_state() {
        let f = pending("42");
        let g = f.clone();
        f.force().unwrap().unwrap();
        assert_eq!(g.state(), StateKind::Resolved);
        assert!(f.ptr_eq(&g));
    }

    #[test]
    fn state_kind_display() {
        assert_eq!(StateKind::Created.to_string(), "created");
        assert_eq!(StateKind::Failed.to_string(), "failed");
    }
}
