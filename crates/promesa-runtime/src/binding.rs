//! Binding layer: attaching futures to named or positional slots.
//!
//! Two reference-mutable container kinds can hold a not-yet-materialized
//! slot:
//!
//! - [`FlatMap`]: name -> slot. Lexical frames are flat maps too.
//! - [`IndexedMap`]: order-preserving slots addressed by 1-based position or
//!   by name, auto-growing when assigned past its end.
//!
//! A slot holds either a plain value or a deferred future. Reading a deferred
//! slot forces the future through the ownership guard and replaces the slot
//! with the plain value; later reads never touch the future again.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::capture::Capture;
use crate::error::{Error, Result};
use crate::future::Future;
use crate::guard::value_of;
use crate::session::ContextId;
use crate::strategy::Plan;
use crate::value::Value;

/// Highest position an indexable mapping or list may be grown to.
pub const MAX_POSITION: usize = 1 << 20;

#[derive(Debug, Clone)]
pub enum Slot {
    Value(Value),
    Deferred(Future),
}

/// Force a slot's content into a plain value, honoring the error policy the
/// future was created with.
fn materialize(slot: &Slot, requester: ContextId) -> Result<Value> {
    match slot {
        Slot::Value(v) => Ok(v.clone()),
        Slot::Deferred(fut) => value_of(fut, requester, fut.capture().on_error()),
    }
}

/// Replace `slot` with `value` if it still holds `fut`. Forcing can run
/// arbitrary code, which may have rebound the slot in the meantime.
fn settle(slot: &mut Slot, fut: &Future, value: Value) {
    if matches!(slot, Slot::Deferred(cur) if cur.ptr_eq(fut)) {
        *slot = Slot::Value(value);
    }
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Name(String),
    /// 1-based position
    Index(usize),
}

impl Key {
    pub fn from_value(value: &Value) -> Result<Key> {
        match value {
            Value::Str(s) => Ok(Key::Name(s.clone())),
            Value::Int(i) if *i >= 1 && *i as u64 <= MAX_POSITION as u64 => {
                Ok(Key::Index(*i as usize))
            }
            Value::Int(i) if *i >= 1 => Err(Error::unsupported(format!(
                "position {i} is out of range; positions stop at {MAX_POSITION}"
            ))),
            Value::Int(i) => Err(Error::unsupported(format!(
                "position {i} is out of range; positions start at 1"
            ))),
            other => Err(Error::unsupported(format!(
                "cannot use a {} as a binding key",
                other.type_name()
            ))),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(n) => write!(f, "{n:?}"),
            Key::Index(i) => write!(f, "{i}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Flat mapping
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct FlatMap(Rc<RefCell<BTreeMap<String, Slot>>>);

impl fmt::Debug for FlatMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlatMap")
            .field("names", &self.names())
            .finish()
    }
}

impl FlatMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slots(slots: BTreeMap<String, Slot>) -> Self {
        FlatMap(Rc::new(RefCell::new(slots)))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.borrow().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    pub fn ptr_eq(&self, other: &FlatMap) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn get_slot(&self, name: &str) -> Option<Slot> {
        self.0.borrow().get(name).cloned()
    }

    pub fn slots(&self) -> Vec<(String, Slot)> {
        self.0
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Insert or overwrite.
    pub fn set(&self, name: &str, slot: Slot) {
        self.0.borrow_mut().insert(name.to_string(), slot);
    }

    pub fn read(&self, name: &str, requester: ContextId) -> Result<Value> {
        let slot = self
            .get_slot(name)
            .ok_or_else(|| Error::undefined(format!("`{name}` is not bound")))?;
        let value = materialize(&slot, requester)?;
        if let Slot::Deferred(fut) = &slot {
            if let Some(cur) = self.0.borrow_mut().get_mut(name) {
                settle(cur, fut, value.clone());
            }
        }
        Ok(value)
    }

    pub fn resolve_all(&self, requester: ContextId) -> Result<()> {
        for (name, slot) in self.slots() {
            if matches!(slot, Slot::Deferred(_)) {
                self.read(&name, requester)?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Indexable mapping
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Indexed {
    slots: Vec<Option<Slot>>,
    /// Parallel to `slots`; a name addresses at most one position.
    names: Vec<Option<String>>,
}

impl Indexed {
    fn position(&self, key: &Key) -> Option<usize> {
        match key {
            Key::Index(i) => i.checked_sub(1),
            Key::Name(n) => self.names.iter().position(|x| x.as_deref() == Some(n)),
        }
    }

    fn grow_to(&mut self, len: usize) -> Result<()> {
        if len > MAX_POSITION {
            return Err(Error::unsupported(format!(
                "cannot grow to {len} slots; positions stop at {MAX_POSITION}"
            )));
        }
        if self.slots.len() < len {
            self.slots.resize(len, None);
            self.names.resize(len, None);
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct IndexedMap(Rc<RefCell<Indexed>>);

impl fmt::Debug for IndexedMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexedMap")
            .field("len", &self.len())
            .field("names", &self.names())
            .finish()
    }
}

impl IndexedMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self) -> Vec<Option<String>> {
        self.0.borrow().names.clone()
    }

    pub fn ptr_eq(&self, other: &IndexedMap) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Grow to at least `len` positions; new positions are unbound.
    pub fn reserve(&self, len: usize) -> Result<()> {
        self.0.borrow_mut().grow_to(len)
    }

    /// Whether the slot addressed by `key` has ever been bound.
    pub fn is_bound(&self, key: &Key) -> bool {
        self.get_slot(key).is_some()
    }

    pub fn get_slot(&self, key: &Key) -> Option<Slot> {
        let inner = self.0.borrow();
        let pos = inner.position(key)?;
        inner.slots.get(pos).cloned().flatten()
    }

    pub fn slots(&self) -> Vec<Option<Slot>> {
        self.0.borrow().slots.clone()
    }

    /// Store into the addressed slot. Positions past the end grow the
    /// container with unbound slots; unknown names append a new named slot.
    pub fn set(&self, key: &Key, slot: Slot) -> Result<()> {
        let mut inner = self.0.borrow_mut();
        match (inner.position(key), key) {
            (Some(pos), _) => {
                inner.grow_to(pos + 1)?;
                inner.slots[pos] = Some(slot);
            }
            (None, Key::Name(name)) => {
                inner.slots.push(Some(slot));
                inner.names.push(Some(name.clone()));
            }
            (None, Key::Index(_)) => return Err(Error::unsupported("positions start at 1")),
        }
        Ok(())
    }

    /// Give position `index` (1-based) the name `name`, taking it away from
    /// any other position that had it.
    pub fn set_name(&self, index: usize, name: &str) -> Result<()> {
        if index == 0 {
            return Err(Error::unsupported("positions start at 1"));
        }
        let mut inner = self.0.borrow_mut();
        inner.grow_to(index)?;
        for n in inner.names.iter_mut() {
            if n.as_deref() == Some(name) {
                *n = None;
            }
        }
        inner.names[index - 1] = Some(name.to_string());
        Ok(())
    }

    pub fn read(&self, key: &Key, requester: ContextId) -> Result<Value> {
        let slot = self
            .get_slot(key)
            .ok_or_else(|| Error::undefined(format!("slot {key} is not bound")))?;
        let value = materialize(&slot, requester)?;
        if let Slot::Deferred(fut) = &slot {
            let mut inner = self.0.borrow_mut();
            if let Some(pos) = inner.position(key) {
                if let Some(Some(cur)) = inner.slots.get_mut(pos) {
                    settle(cur, fut, value.clone());
                }
            }
        }
        Ok(value)
    }

    pub fn resolve_all(&self, requester: ContextId) -> Result<()> {
        for (i, slot) in self.slots().iter().enumerate() {
            if matches!(slot, Some(Slot::Deferred(_))) {
                self.read(&Key::Index(i + 1), requester)?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Container dispatch
// ---------------------------------------------------------------------------

/// A reference-mutable place a future can be bound into.
#[derive(Debug, Clone)]
pub enum Container {
    Flat(FlatMap),
    Indexed(IndexedMap),
}

impl Container {
    /// Only reference-mutable containers qualify. By-value lists and
    /// records, and scalars, are rejected.
    pub fn from_value(value: &Value) -> Result<Container> {
        match value {
            Value::Map(m) => Ok(Container::Flat(m.clone())),
            Value::Slots(s) => Ok(Container::Indexed(s.clone())),
            other => Err(Error::unsupported(format!(
                "cannot bind into a {}; use map() or slots()",
                other.type_name()
            ))),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Container::Flat(m) => m.len(),
            Container::Indexed(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` can address a slot of this container.
    pub fn accepts(&self, key: &Key) -> Result<()> {
        match (self, key) {
            (Container::Flat(_), Key::Index(i)) => Err(Error::unsupported(format!(
                "flat mappings are addressed by name, not position {i}"
            ))),
            (_, Key::Index(0)) => Err(Error::unsupported("positions start at 1")),
            _ => Ok(()),
        }
    }

    fn store(&self, key: &Key, slot: Slot) -> Result<()> {
        match (self, key) {
            (Container::Flat(m), Key::Name(name)) => {
                m.set(name, slot);
                Ok(())
            }
            (Container::Flat(_), Key::Index(_)) => self.accepts(key),
            (Container::Indexed(s), key) => s.set(key, slot),
        }
    }

    /// Attach `future` to `key`, overwriting whatever was there.
    pub fn bind_future(&self, key: &Key, future: Future) -> Result<()> {
        self.store(key, Slot::Deferred(future))
    }

    pub fn assign(&self, key: &Key, value: Value) -> Result<()> {
        self.store(key, Slot::Value(value))
    }

    pub fn read(&self, key: &Key, requester: ContextId) -> Result<Value> {
        match (self, key) {
            (Container::Flat(m), Key::Name(name)) => m.read(name, requester),
            (Container::Flat(_), Key::Index(i)) => Err(Error::unsupported(format!(
                "flat mappings are addressed by name, not position {i}"
            ))),
            (Container::Indexed(s), key) => s.read(key, requester),
        }
    }

    pub fn resolve_all(&self, requester: ContextId) -> Result<()> {
        match self {
            Container::Flat(m) => m.resolve_all(requester),
            Container::Indexed(s) => s.resolve_all(requester),
        }
    }
}

/// Run `capture` through `plan` and bind the resulting future at `key`.
///
/// When the strategy fails to produce a future (an eager evaluation error)
/// the container is left untouched.
pub fn bind(
    container: &Container,
    key: &Key,
    capture: Capture,
    plan: &Plan,
    owner: ContextId,
) -> Result<()> {
    container.accepts(key)?;
    let future = plan.resolve(capture, owner)?;
    container.bind_future(key, future)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::session::Session;

    fn ctx() -> ContextId {
        Session::global().root_context()
    }

    #[test]
    fn flat_map_overwrites() {
        let m = Container::Flat(FlatMap::new());
        let k = Key::Name("a".into());
        m.assign(&k, Value::Int(1)).unwrap();
        m.assign(&k, Value::Int(2)).unwrap();
        assert!(matches!(m.read(&k, ctx()), Ok(Value::Int(2))));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn flat_map_rejects_positions() {
        let m = Container::Flat(FlatMap::new());
        let err = m.assign(&Key::Index(1), Value::Nil).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedTarget);
    }

    #[test]
    fn huge_positions_are_refused_without_growing() {
        let s = IndexedMap::new();
        let err = s
            .set(&Key::Index(usize::MAX), Slot::Value(Value::Nil))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedTarget);
        assert!(s.reserve(MAX_POSITION + 1).is_err());
        assert!(s.set_name(MAX_POSITION + 1, "x").is_err());
        assert_eq!(s.len(), 0);

        let err = Key::from_value(&Value::Int(i64::MAX)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedTarget);
    }

    #[test]
    fn indexed_auto_extends_with_unbound_slots() {
        let s = IndexedMap::new();
        s.set(&Key::Index(5), Slot::Value(Value::Int(5))).unwrap();
        assert_eq!(s.len(), 5);
        for i in 1..5 {
            let err = s.read(&Key::Index(i), ctx()).unwrap_err();
            assert_eq!(err.kind, ErrorKind::UndefinedBinding);
        }
        assert!(matches!(s.read(&Key::Index(5), ctx()), Ok(Value::Int(5))));
    }

    #[test]
    fn names_and_positions_address_the_same_slot() {
        let s = IndexedMap::new();
        s.set(&Key::Index(2), Slot::Value(Value::Int(20))).unwrap();
        s.set_name(2, "b").unwrap();
        assert!(matches!(
            s.read(&Key::Name("b".into()), ctx()),
            Ok(Value::Int(20))
        ));
        s.set(&Key::Name("b".into()), Slot::Value(Value::Int(21))).unwrap();
        assert!(matches!(s.read(&Key::Index(2), ctx()), Ok(Value::Int(21))));
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn unknown_name_appends() {
        let s = IndexedMap::new();
        s.set(&Key::Index(1), Slot::Value(Value::Int(1))).unwrap();
        s.set(&Key::Name("z".into()), Slot::Value(Value::Int(2))).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.names(), vec![None, Some("z".to_string())]);
    }

    #[test]
    fn renaming_moves_the_name() {
        let s = IndexedMap::new();
        s.set_name(1, "a").unwrap();
        s.set_name(3, "a").unwrap();
        assert_eq!(s.names(), vec![None, None, Some("a".to_string())]);
        assert!(s.set_name(0, "x").is_err());
    }

    #[test]
    fn keys_from_values() {
        assert_eq!(
            Key::from_value(&Value::Str("k".into())).unwrap(),
            Key::Name("k".into())
        );
        assert_eq!(Key::from_value(&Value::Int(3)).unwrap(), Key::Index(3));
        assert_eq!(
            Key::from_value(&Value::Int(0)).unwrap_err().kind,
            ErrorKind::UnsupportedTarget
        );
        assert!(Key::from_value(&Value::Bool(true)).is_err());
    }

    #[test]
    fn by_value_containers_are_rejected() {
        for v in [
            Value::List(vec![Value::Int(1)]),
            Value::Record(BTreeMap::new()),
            Value::Int(3),
        ] {
            let err = Container::from_value(&v).unwrap_err();
            assert_eq!(err.kind, ErrorKind::UnsupportedTarget);
        }
        assert!(Container::from_value(&Value::Map(FlatMap::new())).is_ok());
        assert!(Container::from_value(&Value::Slots(IndexedMap::new())).is_ok());
    }
}
