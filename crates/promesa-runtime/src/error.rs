//! Structured runtime errors.
//!
//! Every failure the runtime reports is an [`Error`] value: a kind, a
//! message, and (when known) the text of the captured expression and of the
//! call that raised it. Errors are `Clone` because a failed future stores its
//! error and re-raises the same value on every read.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Raised while evaluating a captured expression.
    Evaluation,
    /// A context other than the owner tried to force an unresolved future.
    OwnershipViolation,
    /// A name or container slot was read before it was ever bound.
    UndefinedBinding,
    /// A future cannot be bound into the requested container.
    UnsupportedTarget,
    /// A capture holds values that cannot leave their execution context.
    ReferenceSafetyViolation,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Evaluation => "EvaluationError",
            ErrorKind::OwnershipViolation => "OwnershipViolation",
            ErrorKind::UndefinedBinding => "UndefinedBinding",
            ErrorKind::UnsupportedTarget => "UnsupportedTarget",
            ErrorKind::ReferenceSafetyViolation => "ReferenceSafetyViolation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    /// Deparsed text of the captured expression the error originated in.
    pub expression: Option<String>,
    /// Deparsed text of the call that raised the error.
    pub call: Option<String>,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            expression: None,
            call: None,
        }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Evaluation, message)
    }

    pub fn undefined(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UndefinedBinding, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedTarget, message)
    }

    pub fn reference(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ReferenceSafetyViolation, message)
    }

    /// Record the originating expression unless an inner one is already set.
    pub fn in_expression(mut self, text: &str) -> Self {
        if self.expression.is_none() {
            self.expression = Some(text.to_string());
        }
        self
    }

    /// Record the raising call unless an inner one is already set.
    pub fn in_call(mut self, text: impl fmt::Display) -> Self {
        if self.call.is_none() {
            self.call = Some(text.to_string());
        }
        self
    }

    /// Multi-line rendering for terminals.
    pub fn report(&self) -> String {
        let mut out = format!("{}: {}", self.kind, self.message);
        if let Some(call) = &self.call {
            out.push_str(&format!("\n  -> in call: {call}"));
        }
        if let Some(expr) = &self.expression {
            out.push_str(&format!("\n  -> in expression: {expr}"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_kind_and_message() {
        let e = Error::evaluation("boom");
        assert_eq!(e.to_string(), "EvaluationError: boom");
    }

    #[test]
    fn innermost_context_wins() {
        let e = Error::evaluation("boom")
            .in_call("fail(\"boom\")")
            .in_call("outer()")
            .in_expression("{ inner }")
            .in_expression("{ outer }");
        assert_eq!(e.call.as_deref(), Some("fail(\"boom\")"));
        assert_eq!(e.expression.as_deref(), Some("{ inner }"));
        let report = e.report();
        assert!(report.contains("in call: fail(\"boom\")"), "{report}");
        assert!(report.contains("in expression: { inner }"), "{report}");
    }
}
