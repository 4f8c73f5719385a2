//! Reference-safety check.
//!
//! Some values only mean something inside the context that produced them:
//! open connections, foreign pointers, native symbols. A capture carrying one
//! of these to another context is reported according to [`OnReference`].

use std::collections::HashSet;

use serde::Serialize;
use tracing::warn;

use crate::binding::Slot;
use crate::capture::Capture;
use crate::config::OnReference;
use crate::error::{Error, Result};
use crate::future::Future;
use crate::strategy::Plan;
use crate::value::{HandleKind, Value};

/// A context-bound value reachable from a captured global.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub global: String,
    pub kind: HandleKind,
    pub label: String,
}

/// Every non-exportable value reachable from the capture's globals.
pub fn find_references(capture: &Capture) -> Vec<Finding> {
    let mut walker = Walker {
        seen: HashSet::new(),
        findings: Vec::new(),
    };
    for (name, slot) in capture.globals() {
        match slot {
            Slot::Value(v) => walker.value(name, v),
            Slot::Deferred(f) => walker.future(name, f),
        }
    }
    walker.findings
}

/// Apply `policy` to `capture`. Returns the findings that were tolerated.
pub fn check(capture: &Capture, policy: OnReference) -> Result<Vec<Finding>> {
    if policy == OnReference::Ignore {
        return Ok(Vec::new());
    }
    let findings = find_references(capture);
    if findings.is_empty() {
        return Ok(findings);
    }
    match policy {
        OnReference::Ignore => Ok(Vec::new()),
        OnReference::Warning => {
            for f in &findings {
                warn!(global = %f.global, kind = %f.kind, label = %f.label, expression = capture.text(), "non-exportable value in capture");
            }
            Ok(findings)
        }
        OnReference::Error => Err(Error::reference(format!(
            "captured globals hold non-exportable values: {}",
            describe(&findings)
        ))
        .in_expression(capture.text())),
    }
}

/// Strategies that are not owner-compatible cannot take captures holding
/// futures still pending in the owner's context.
pub fn check_handoff(capture: &Capture, plan: &Plan) -> Result<()> {
    if plan.owner_compatible() {
        return Ok(());
    }
    let pending: Vec<&str> = capture
        .globals()
        .iter()
        .filter(|(_, slot)| matches!(slot, Slot::Deferred(f) if !f.is_terminal()))
        .map(|(name, _)| name.as_str())
        .collect();
    if pending.is_empty() {
        return Ok(());
    }
    Err(Error::reference(format!(
        "strategy `{}` cannot take unresolved futures from the owner context: {}",
        plan.policy_name(),
        pending.join(", ")
    ))
    .in_expression(capture.text()))
}

fn describe(findings: &[Finding]) -> String {
    findings
        .iter()
        .map(|f| format!("`{}` ({} {})", f.global, f.kind, f.label))
        .collect::<Vec<_>>()
        .join(", ")
}

struct Walker {
    seen: HashSet<usize>,
    findings: Vec<Finding>,
}

impl Walker {
    fn value(&mut self, global: &str, value: &Value) {
        match value {
            Value::Handle(h) => self.findings.push(Finding {
                global: global.to_string(),
                kind: h.kind,
                label: h.label.clone(),
            }),
            Value::List(items) => items.iter().for_each(|v| self.value(global, v)),
            Value::Record(fields) => fields.values().for_each(|v| self.value(global, v)),
            Value::Map(m) => {
                if self.seen.insert(m.addr()) {
                    for (_, slot) in m.slots() {
                        self.slot(global, &slot);
                    }
                }
            }
            Value::Slots(s) => {
                if self.seen.insert(s.addr()) {
                    for slot in s.slots().into_iter().flatten() {
                        self.slot(global, &slot);
                    }
                }
            }
            Value::Future(f) => self.future(global, f),
            _ => {}
        }
    }

    fn slot(&mut self, global: &str, slot: &Slot) {
        match slot {
            Slot::Value(v) => self.value(global, v),
            Slot::Deferred(f) => self.future(global, f),
        }
    }

    // only a resolved value can be inspected; pending work is opaque
    fn future(&mut self, global: &str, future: &Future) {
        if let Some(Ok(v)) = future.outcome() {
            self.value(global, &v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::FlatMap;
    use crate::capture::capture;
    use crate::env::Env;
    use crate::error::ErrorKind;
    use crate::value::Handle;
    use promesa_parse::parse_expr_str;

    fn handle(kind: HandleKind, label: &str) -> Value {
        Value::Handle(Handle {
            kind,
            id: 1,
            label: label.into(),
            origin: crate::session::Session::global().root_context(),
            resource: None,
        })
    }

    fn cap_with(name: &str, value: Value, src: &str) -> Capture {
        let env = Env::default();
        env.scope().assign(name, value);
        capture(&parse_expr_str(src).unwrap(), &env, true)
    }

    #[test]
    fn finds_handles_nested_in_containers() {
        let m = FlatMap::new();
        m.set("conn", Slot::Value(handle(HandleKind::Connection, "data.txt")));
        let c = cap_with(
            "cfg",
            Value::List(vec![Value::Int(1), Value::Map(m)]),
            "cfg",
        );
        let found = find_references(&c);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].global, "cfg");
        assert_eq!(found[0].kind, HandleKind::Connection);
    }

    #[test]
    fn cyclic_maps_terminate() {
        let m = FlatMap::new();
        m.set("self", Slot::Value(Value::Map(m.clone())));
        let c = cap_with("m", Value::Map(m), "m");
        assert!(find_references(&c).is_empty());
    }

    #[test]
    fn policies() {
        let c = cap_with("p", handle(HandleKind::ExternalPointer, "16 bytes"), "p");
        assert!(check(&c, OnReference::Ignore).unwrap().is_empty());
        assert_eq!(check(&c, OnReference::Warning).unwrap().len(), 1);
        let err = check(&c, OnReference::Error).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ReferenceSafetyViolation);
        assert!(err.message.contains("`p`"), "{}", err.message);
    }

    #[test]
    fn plain_data_passes() {
        let c = cap_with("x", Value::Int(3), "x");
        assert!(check(&c, OnReference::Error).unwrap().is_empty());
    }
}
