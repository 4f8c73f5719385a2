//! Ownership guard.
//!
//! Only the context that created a future may read it while it is pending,
//! whether it has not started yet or is being evaluated further up the
//! stack. Once a future is terminal its outcome is plain data and any
//! context may read it.

use tracing::debug;

use crate::config::OnError;
use crate::error::{Error, ErrorKind, Result};
use crate::future::Future;
use crate::session::ContextId;
use crate::value::Value;

/// Reject `requester` if it may not force `future` right now.
pub fn check_owner(future: &Future, requester: ContextId) -> Result<()> {
    if !future.is_terminal() && future.owner() != requester {
        debug!(future = %future.id(), owner = %future.owner(), requester = %requester, "ownership violation");
        return Err(Error::new(
            ErrorKind::OwnershipViolation,
            format!(
                "future {} is owned by context {} and cannot be resolved from context {}",
                future.id(),
                future.owner(),
                requester
            ),
        )
        .in_expression(future.capture().text()));
    }
    Ok(())
}

/// Force (if needed) and return the value of `future` on behalf of
/// `requester`.
///
/// A failed future re-raises its stored error under [`OnError::Throw`] and
/// yields it as a [`Value::Condition`] under [`OnError::Return`]. Ownership
/// and cycle errors are raised regardless of the policy. A cycle error means
/// the owner itself re-entered a future it is still evaluating.
pub fn value_of(future: &Future, requester: ContextId, on_error: OnError) -> Result<Value> {
    let outcome = match future.outcome() {
        Some(outcome) => outcome,
        None => {
            check_owner(future, requester)?;
            future.force()?
        }
    };
    match (outcome, on_error) {
        (Ok(value), _) => Ok(value),
        (Err(e), OnError::Throw) => Err(e),
        (Err(e), OnError::Return) => Ok(Value::Condition(Box::new(e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::capture;
    use crate::future::StateKind;
    use crate::env::Env;
    use crate::session::Session;
    use promesa_parse::parse_expr_str;

    fn pending(src: &str) -> (Future, ContextId) {
        let env = Env::default();
        let c = capture(&parse_expr_str(src).unwrap(), &env, true);
        (Future::pending(c, env.context(), "lazy"), env.context())
    }

    #[test]
    fn foreign_context_cannot_force() {
        let (f, owner) = pending("1");
        let other = Session::global().new_context();
        let err = value_of(&f, other, OnError::Throw).unwrap_err();
        assert_eq!(err.kind, ErrorKind::OwnershipViolation);
        assert!(err.message.contains(&owner.to_string()), "{}", err.message);
        assert!(err.message.contains(&other.to_string()), "{}", err.message);
        assert_eq!(f.state(), StateKind::Created);
    }

    #[test]
    fn terminal_futures_are_readable_anywhere() {
        let (f, owner) = pending("7");
        assert!(matches!(value_of(&f, owner, OnError::Throw), Ok(Value::Int(7))));
        let other = Session::global().new_context();
        assert!(matches!(value_of(&f, other, OnError::Throw), Ok(Value::Int(7))));
    }

    #[test]
    fn return_policy_hands_back_condition() {
        let (f, owner) = pending("fail(\"nope\")");
        match value_of(&f, owner, OnError::Return).unwrap() {
            Value::Condition(e) => assert_eq!(e.message, "nope"),
            other => panic!("expected condition, got {other}"),
        }
        assert!(value_of(&f, owner, OnError::Throw).is_err());
    }

    #[test]
    fn ownership_violation_ignores_return_policy() {
        let (f, _) = pending("1");
        let other = Session::global().new_context();
        assert!(value_of(&f, other, OnError::Return).is_err());
    }
}
