//! Deferred binding into variables and containers.

use promesa_parse::parse_str;
use promesa_runtime::{ErrorKind, FutureConfig, Interpreter, Result, StrategyKind, Value};

fn run(interp: &mut Interpreter, src: &str) -> Result<Value> {
    let program = parse_str("test.pm", src).expect("parse");
    interp.run(&program)
}

fn lazy() -> Interpreter {
    Interpreter::new(FutureConfig::default().with_strategy(StrategyKind::Lazy))
}

#[test]
fn deferred_variable_materializes_on_read() {
    let mut interp = lazy();
    let v = run(
        &mut interp,
        "n = 0; defer(local: false) x = { n = n + 1; 10 }; before = n; list(x, x, before, n)",
    )
    .unwrap();
    let Value::List(items) = v else { panic!("expected list") };
    let got: Vec<i64> = items
        .iter()
        .map(|v| match v {
            Value::Int(n) => *n,
            other => panic!("expected int, got {other}"),
        })
        .collect();
    assert_eq!(got, vec![10, 10, 0, 1]);
}

#[test]
fn positional_binding_extends_slots() {
    let mut interp = lazy();
    let v = run(&mut interp, "s = slots(); defer s[5] = 42; list(len(s), s[5])").unwrap();
    let Value::List(items) = v else { panic!("expected list") };
    assert!(matches!(items[0], Value::Int(5)));
    assert!(matches!(items[1], Value::Int(42)));

    for pos in 1..=4 {
        let err = run(&mut interp, &format!("s[{pos}]")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UndefinedBinding, "position {pos}");
    }
}

#[test]
fn names_and_positions_address_the_same_slot() {
    let mut interp = lazy();
    let v = run(
        &mut interp,
        "s = slots(); defer s[\"b\"] = 2; set_name(s, 3, \"c\"); defer s[\"c\"] = 3;
         list(len(s), s[1], s[3], s[\"c\"])",
    )
    .unwrap();
    let Value::List(items) = v else { panic!("expected list") };
    assert!(matches!(items[0], Value::Int(3)));
    assert!(matches!(items[1], Value::Int(2)));
    assert!(matches!(items[2], Value::Int(3)));
    assert!(matches!(items[3], Value::Int(3)));

    let names = run(&mut interp, "names(s)").unwrap();
    let Value::List(names) = names else { panic!("expected list") };
    assert!(matches!(&names[0], Value::Str(s) if s == "b"));
    assert!(matches!(&names[1], Value::Nil));
    assert!(matches!(&names[2], Value::Str(s) if s == "c"));
}

#[test]
fn flat_mappings_bind_by_name() {
    let mut interp = lazy();
    let v = run(&mut interp, "m = map(); defer m[\"k\"] = 10; m[\"k\"] + 1").unwrap();
    assert!(matches!(v, Value::Int(11)));

    let err = run(&mut interp, "defer m[1] = 1").unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnsupportedTarget);
}

#[test]
fn by_value_containers_are_unsupported_targets() {
    let mut interp = lazy();
    for src in [
        "l = list(1, 2); defer l[1] = 5",
        "r = record(\"a\", 1); defer r[\"a\"] = 5",
        "n = 3; defer n[1] = 5",
    ] {
        let err = run(&mut interp, src).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedTarget, "{src}");
    }
}

#[test]
fn position_zero_is_rejected() {
    let mut interp = lazy();
    let err = run(&mut interp, "s = slots(); defer s[0] = 1").unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnsupportedTarget);
    assert!(matches!(run(&mut interp, "len(s)"), Ok(Value::Int(0))));
}

#[test]
fn oversized_positions_fail_instead_of_allocating() {
    let mut interp = lazy();
    for src in [
        "s = slots(); s[9223372036854775807] = 1",
        "s = slots(); defer s[9223372036854775807] = 1",
        "slots(4611686018427387904)",
        "l = list(1); l[9223372036854775807] = 2",
        "set_name(slots(), 9223372036854775807, \"x\")",
    ] {
        let err = run(&mut interp, src).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedTarget, "{src}: {}", err.message);
    }
    assert!(matches!(run(&mut interp, "len(s)"), Ok(Value::Int(0))));
}

#[test]
fn eager_failure_leaves_target_unset() {
    let mut interp = Interpreter::default();
    let err = run(
        &mut interp,
        "a = 0; defer(local: false) x = { a = 3.14; fail(\"boom\"); 42 }",
    )
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Evaluation);
    assert_eq!(err.message, "boom");
    assert!(!interp.is_bound("x"));
    assert!(matches!(interp.get("a"), Ok(Value::Float(f)) if f == 3.14));

    let err = run(&mut interp, "s = slots(); defer s[1] = fail(\"again\")").unwrap_err();
    assert_eq!(err.message, "again");
    assert!(matches!(run(&mut interp, "len(s)"), Ok(Value::Int(0))));
}

#[test]
fn rebinding_replaces_the_future() {
    let mut interp = lazy();
    let v = run(&mut interp, "defer x = 1; defer x = 2; x").unwrap();
    assert!(matches!(v, Value::Int(2)));
}

#[test]
fn resolve_all_forces_every_slot() {
    let mut interp = lazy();
    let v = run(
        &mut interp,
        "n = 0;
         m = map();
         defer(local: false) m[\"a\"] = { n = n + 1; n };
         defer(local: false) m[\"b\"] = { n = n + 10; n };
         before = n;
         resolve_all(m);
         list(before, n, m[\"a\"], m[\"b\"])",
    )
    .unwrap();
    let Value::List(items) = v else { panic!("expected list") };
    assert!(matches!(items[0], Value::Int(0)));
    assert!(matches!(items[1], Value::Int(11)));
    assert!(matches!(items[2], Value::Int(1)));
    assert!(matches!(items[3], Value::Int(11)));
}

#[test]
fn deferred_error_policy_applies_to_reads() {
    let mut interp = lazy();
    let v = run(
        &mut interp,
        "defer(on_error: \"return\") x = fail(\"soft\"); message(x)",
    )
    .unwrap();
    assert!(matches!(v, Value::Str(s) if s == "soft"));

    run(&mut interp, "defer y = fail(\"hard\")").unwrap();
    let err = interp.get("y").unwrap_err();
    assert_eq!(err.message, "hard");
}

#[test]
fn unbound_read_is_undefined_binding() {
    let mut interp = lazy();
    let err = run(&mut interp, "m = map(); m[\"missing\"]").unwrap_err();
    assert_eq!(err.kind, ErrorKind::UndefinedBinding);
}
