//! End-to-end future semantics through the interpreter.

use std::cell::RefCell;
use std::rc::Rc;

use promesa_parse::parse_str;
use promesa_runtime::{
    Capture, ContextId, ErrorKind, Future, FutureConfig, Interpreter, OnError, Plan, Result,
    StateKind, Strategy, StrategyKind, Value,
};

fn run(interp: &mut Interpreter, src: &str) -> Result<Value> {
    let program = parse_str("test.pm", src).expect("parse");
    interp.run(&program)
}

fn with_strategy(kind: StrategyKind) -> Interpreter {
    Interpreter::new(FutureConfig::default().with_strategy(kind))
}

fn ints(v: &Value) -> Vec<i64> {
    match v {
        Value::List(items) => items
            .iter()
            .map(|x| match x {
                Value::Int(n) => *n,
                other => panic!("expected int, got {other}"),
            })
            .collect(),
        other => panic!("expected list, got {other}"),
    }
}

fn float(v: &Value) -> f64 {
    match v {
        Value::Float(f) => *f,
        other => panic!("expected float, got {other}"),
    }
}

#[test]
fn eager_and_lazy_agree() {
    let src = "f = future { x = 2; x * 21 }; value(f)";
    for kind in [StrategyKind::Eager, StrategyKind::Lazy, StrategyKind::Sequential] {
        let v = run(&mut with_strategy(kind), src).unwrap();
        assert!(matches!(v, Value::Int(42)), "{kind:?} gave {v}");
    }
}

#[test]
fn lazy_has_no_effect_before_first_read() {
    let src = "
        count = 0;
        f = future(local: false) { count = count + 1; count };
        before = count;
        v = value(f);
        list(before, count, v)
    ";
    let lazy = run(&mut with_strategy(StrategyKind::Lazy), src).unwrap();
    assert_eq!(ints(&lazy), vec![0, 1, 1]);
    let eager = run(&mut with_strategy(StrategyKind::Eager), src).unwrap();
    assert_eq!(ints(&eager), vec![1, 1, 1]);
}

#[test]
fn state_transitions_are_visible() {
    let mut interp = with_strategy(StrategyKind::Lazy);
    run(&mut interp, "f = future { 1 }").unwrap();
    assert!(matches!(run(&mut interp, "state(f)"), Ok(Value::Str(s)) if s == "created"));
    assert!(matches!(run(&mut interp, "resolved(f)"), Ok(Value::Bool(false))));
    run(&mut interp, "value(f)").unwrap();
    assert!(matches!(run(&mut interp, "state(f)"), Ok(Value::Str(s)) if s == "resolved"));
    assert!(matches!(run(&mut interp, "resolved(f)"), Ok(Value::Bool(true))));
}

#[test]
fn reads_are_idempotent() {
    let mut interp = with_strategy(StrategyKind::Lazy);
    let v = run(
        &mut interp,
        "n = 0; f = future(local: false) { n = n + 1; n }; list(value(f), value(f), n)",
    )
    .unwrap();
    assert_eq!(ints(&v), vec![1, 1, 1]);
}

#[test]
fn failures_replay_the_same_error() {
    let mut interp = with_strategy(StrategyKind::Lazy);
    run(&mut interp, "f = future { fail(\"boom\") }").unwrap();
    let first = run(&mut interp, "value(f)").unwrap_err();
    let second = run(&mut interp, "value(f)").unwrap_err();
    assert_eq!(first, second);
    assert_eq!(first.kind, ErrorKind::Evaluation);
    assert_eq!(first.message, "boom");
    assert_eq!(first.call.as_deref(), Some("fail(\"boom\")"));
    assert_eq!(first.expression.as_deref(), Some("{ fail(\"boom\") }"));
}

#[test]
fn eager_failure_is_raised_at_creation() {
    let mut interp = with_strategy(StrategyKind::Eager);
    let err = run(&mut interp, "f = future { fail(\"early\") }").unwrap_err();
    assert_eq!(err.message, "early");
    assert!(!interp.is_bound("f"));
}

#[test]
fn foreign_context_cannot_force_a_pending_future() {
    let mut interp = with_strategy(StrategyKind::Lazy);
    run(&mut interp, "f = future { 21 * 2 }; g = future { value(f) }").unwrap();

    let err = run(&mut interp, "value(g)").unwrap_err();
    assert_eq!(err.kind, ErrorKind::OwnershipViolation);
    assert!(matches!(run(&mut interp, "state(f)"), Ok(Value::Str(s)) if s == "created"));

    // once the owner has forced it, the value is plain data anywhere
    assert!(matches!(run(&mut interp, "value(f)"), Ok(Value::Int(42))));
    let v = run(&mut interp, "h = future { value(f) }; value(h)").unwrap();
    assert!(matches!(v, Value::Int(42)));
}

#[test]
fn eager_capture_of_pending_binding_violates_ownership() {
    let mut interp = with_strategy(StrategyKind::Eager);
    run(&mut interp, "defer(strategy: \"lazy\") x = 1").unwrap();
    let err = run(&mut interp, "y = future { x + 1 }").unwrap_err();
    assert_eq!(err.kind, ErrorKind::OwnershipViolation);

    let v = run(&mut interp, "resolve_all(); y = future { x + 1 }; value(y)").unwrap();
    assert!(matches!(v, Value::Int(2)));
}

#[test]
fn local_evaluation_is_isolated() {
    let src = "a = 2.71; f = future { a = 3.14 }; list(value(f), a)";
    let v = run(&mut Interpreter::default(), src).unwrap();
    let Value::List(items) = v else { panic!("expected list") };
    assert_eq!(float(&items[0]), 3.14);
    assert_eq!(float(&items[1]), 2.71);

    let src = "a = 2.71; f = future(local: false) { a = 3.14 }; list(value(f), a)";
    let v = run(&mut Interpreter::default(), src).unwrap();
    let Value::List(items) = v else { panic!("expected list") };
    assert_eq!(float(&items[0]), 3.14);
    assert_eq!(float(&items[1]), 3.14);
}

#[test]
fn captured_values_are_snapshots() {
    let mut interp = with_strategy(StrategyKind::Lazy);
    let v = run(&mut interp, "a = 1; f = future { a + 1 }; a = 100; value(f)").unwrap();
    assert!(matches!(v, Value::Int(2)));
}

#[test]
fn reentrant_forcing_fails_instead_of_hanging() {
    // the inner read comes from the evaluation context, not the owner
    let mut interp = with_strategy(StrategyKind::Lazy);
    let err = run(&mut interp, "defer(local: false) x = x + 1; x").unwrap_err();
    assert_eq!(err.kind, ErrorKind::OwnershipViolation);
    assert!(err.message.contains("cannot be resolved"), "{}", err.message);
}

#[test]
fn running_future_is_guarded_from_other_contexts() {
    let mut interp = with_strategy(StrategyKind::Lazy);
    let err = run(&mut interp, "f = future(local: false) { value(f) }; value(f)").unwrap_err();
    assert_eq!(err.kind, ErrorKind::OwnershipViolation);
    let owner = interp.env().context().to_string();
    assert!(err.message.contains(&owner), "{}", err.message);

    // the violation is the stored outcome; the owner sees it again
    assert!(matches!(run(&mut interp, "state(f)"), Ok(Value::Str(s)) if s == "failed"));
    let again = run(&mut interp, "value(f)").unwrap_err();
    assert_eq!(again.kind, ErrorKind::OwnershipViolation);
    assert_eq!(again.message, err.message);
}

#[test]
fn nested_futures_are_owned_by_their_evaluation() {
    for kind in [StrategyKind::Eager, StrategyKind::Lazy] {
        let v = run(
            &mut with_strategy(kind),
            "f = future { g = future { 1 }; value(g) + 1 }; value(f)",
        )
        .unwrap();
        assert!(matches!(v, Value::Int(2)), "{kind:?} gave {v}");
    }
}

#[test]
fn sequential_honors_lazy_flag() {
    let mut interp = Interpreter::default();
    let v = run(
        &mut interp,
        "a = future(strategy: \"sequential\") { 1 };
         b = future(strategy: \"sequential\", lazy: true) { 2 };
         list(state(a), state(b))",
    )
    .unwrap();
    let Value::List(items) = v else { panic!("expected list") };
    assert!(matches!(&items[0], Value::Str(s) if s == "resolved"));
    assert!(matches!(&items[1], Value::Str(s) if s == "created"));
}

#[test]
fn packages_follow_the_capture() {
    let mut interp = with_strategy(StrategyKind::Lazy);
    let v = run(&mut interp, "use math; f = future { sqrt(16) }; value(f)").unwrap();
    assert_eq!(float(&v), 4.0);
    let v = run(&mut interp, "value(future { math::floor(2.7) })").unwrap();
    assert!(matches!(v, Value::Int(2)));
}

#[test]
fn return_policy_yields_a_condition() {
    let mut interp = with_strategy(StrategyKind::Lazy);
    let v = run(
        &mut interp,
        "f = future(on_error: \"return\") { fail(\"soft\") }; message(value(f))",
    )
    .unwrap();
    assert!(matches!(v, Value::Str(s) if s == "soft"));

    run(&mut interp, "g = future { fail(\"hard\") }").unwrap();
    assert!(run(&mut interp, "value(g)").is_err());
    let v = run(&mut interp, "message(value(g, \"return\"))").unwrap();
    assert!(matches!(v, Value::Str(s) if s == "hard"));
}

#[test]
fn reference_policies() {
    let mut interp = with_strategy(StrategyKind::Lazy);
    run(&mut interp, "p = ffi::alloc(16); c = io::open(\"data.txt\")").unwrap();

    // default policy ignores handles
    run(&mut interp, "f = future { p }").unwrap();

    let v = run(&mut interp, "g = future(on_reference: \"warning\") { p }; value(g)").unwrap();
    assert!(matches!(v, Value::Handle(_)));

    let err = run(
        &mut interp,
        "h = future(on_reference: \"error\") { list(1, c) }",
    )
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ReferenceSafetyViolation);
    assert!(err.message.contains("connection"), "{}", err.message);
    assert!(!interp.is_bound("h"));
}

#[test]
fn plan_builtin_switches_strategy() {
    let mut interp = Interpreter::default();
    let v = run(&mut interp, "old = plan(\"lazy\"); f = future { 1 }; list(old, plan(), state(f))")
        .unwrap();
    let Value::List(items) = v else { panic!("expected list") };
    assert!(matches!(&items[0], Value::Str(s) if s == "eager"));
    assert!(matches!(&items[1], Value::Str(s) if s == "lazy"));
    assert!(matches!(&items[2], Value::Str(s) if s == "created"));
    assert_eq!(interp.config().strategy, StrategyKind::Lazy);
}

// ---------------------------------------------------------------------------
// Externally supplied strategies

#[derive(Debug, Default)]
struct Recording {
    fingerprints: Rc<RefCell<Vec<String>>>,
}

impl Strategy for Recording {
    fn policy_name(&self) -> &str {
        "recording"
    }

    fn resolve(&self, capture: Capture, owner: ContextId) -> Result<Future> {
        self.fingerprints.borrow_mut().push(capture.fingerprint());
        Ok(Future::pending(capture, owner, self.policy_name()))
    }
}

#[derive(Debug)]
struct Detached;

impl Strategy for Detached {
    fn policy_name(&self) -> &str {
        "detached"
    }

    fn resolve(&self, capture: Capture, owner: ContextId) -> Result<Future> {
        Ok(Future::pending(capture, owner, self.policy_name()))
    }

    fn owner_compatible(&self) -> bool {
        false
    }
}

#[test]
fn custom_strategy_plugs_in() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut interp = Interpreter::default();
    interp.set_plan(Plan::new(Recording {
        fingerprints: log.clone(),
    }));

    let f = interp.future_of("1 + 1").unwrap();
    assert_eq!(f.strategy(), "recording");
    assert_eq!(f.state(), StateKind::Created);
    assert!(matches!(interp.value_of(&f, OnError::Throw), Ok(Value::Int(2))));

    let v = run(&mut interp, "g = future { 40 + 2 }; value(g)").unwrap();
    assert!(matches!(v, Value::Int(42)));
    assert_eq!(log.borrow().len(), 2);
    assert!(log.borrow()[0].starts_with("sha256:"));
}

#[test]
fn non_owner_compatible_strategy_rejects_pending_globals() {
    let mut interp = Interpreter::default();
    run(&mut interp, "defer(strategy: \"lazy\") x = 1").unwrap();
    interp.set_plan(Plan::new(Detached));

    let err = run(&mut interp, "f = future { x }").unwrap_err();
    assert_eq!(err.kind, ErrorKind::ReferenceSafetyViolation);
    assert!(err.message.contains("detached"), "{}", err.message);

    run(&mut interp, "resolve_all()").unwrap();
    run(&mut interp, "f = future { x }").unwrap();
}
