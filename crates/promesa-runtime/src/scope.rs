//! Lexical frames.
//!
//! A frame is a flat name -> slot mapping plus a parent link. Blocks do not
//! open frames; function calls and locally evaluated futures do. Assignment
//! always writes to the innermost frame.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::binding::{FlatMap, Slot};
use crate::error::{Error, Result};
use crate::session::ContextId;
use crate::value::Value;

#[derive(Clone)]
pub struct Scope(Rc<Frame>);

struct Frame {
    vars: FlatMap,
    parent: Option<Scope>,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("depth", &self.depth())
            .field("names", &self.0.vars.names())
            .finish()
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::root()
    }
}

impl Scope {
    pub fn root() -> Self {
        Self::from_slots(BTreeMap::new())
    }

    /// A parentless frame pre-populated with `slots`.
    pub fn from_slots(slots: BTreeMap<String, Slot>) -> Self {
        Scope(Rc::new(Frame {
            vars: FlatMap::from_slots(slots),
            parent: None,
        }))
    }

    pub fn child(&self) -> Self {
        Scope(Rc::new(Frame {
            vars: FlatMap::new(),
            parent: Some(self.clone()),
        }))
    }

    /// The innermost frame's mapping.
    pub fn vars(&self) -> &FlatMap {
        &self.0.vars
    }

    pub fn parent(&self) -> Option<&Scope> {
        self.0.parent.as_ref()
    }

    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cur = self.parent();
        while let Some(s) = cur {
            depth += 1;
            cur = s.parent();
        }
        depth
    }

    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Define or overwrite `name` in the innermost frame.
    pub fn assign(&self, name: &str, value: Value) {
        self.0.vars.set(name, Slot::Value(value));
    }

    /// The mapping of the nearest frame that binds `name`.
    pub fn frame_of(&self, name: &str) -> Option<&FlatMap> {
        let mut cur = Some(self);
        while let Some(s) = cur {
            if s.0.vars.contains(name) {
                return Some(&s.0.vars);
            }
            cur = s.parent();
        }
        None
    }

    /// Raw slot lookup. Never forces.
    pub fn lookup_slot(&self, name: &str) -> Option<Slot> {
        self.frame_of(name).and_then(|vars| vars.get_slot(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.frame_of(name).is_some()
    }

    /// Read `name`, forcing a deferred binding on behalf of `requester`.
    pub fn read(&self, name: &str, requester: ContextId) -> Result<Value> {
        match self.frame_of(name) {
            Some(vars) => vars.read(name, requester),
            None => Err(Error::undefined(format!("undefined variable `{name}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::session::Session;

    #[test]
    fn assignment_targets_innermost_frame() {
        let outer = Scope::root();
        outer.assign("a", Value::Float(2.71));
        let inner = outer.child();
        inner.assign("a", Value::Float(3.14));

        let ctx = Session::global().root_context();
        assert!(matches!(inner.read("a", ctx), Ok(Value::Float(v)) if v == 3.14));
        assert!(matches!(outer.read("a", ctx), Ok(Value::Float(v)) if v == 2.71));
        assert_eq!(inner.depth(), 1);
    }

    #[test]
    fn lookup_walks_parents() {
        let outer = Scope::root();
        outer.assign("x", Value::Int(1));
        let inner = outer.child().child();
        assert!(inner.contains("x"));
        assert!(inner.frame_of("x").unwrap().ptr_eq(outer.vars()));
    }

    #[test]
    fn missing_name_is_undefined_binding() {
        let err = Scope::root()
            .read("nope", Session::global().root_context())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UndefinedBinding);
    }
}
