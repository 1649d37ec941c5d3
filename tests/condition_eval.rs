mod common;

use std::collections::HashMap;

use probedag::errors::ProbeDagError;
use probedag::template::Condition;
use probedag::template::condition::evaluate;
use probedag::types::Value;

fn bindings(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn eval_with(source: &str, pairs: &[(&str, Value)]) -> bool {
    let map = bindings(pairs);
    evaluate(source, |name| map.get(name).cloned()).unwrap()
}

#[test]
fn string_equality_against_bound_value() {
    assert!(eval_with(r#"{x} == "1""#, &[("x", "1".into())]));
    assert!(!eval_with(r#"{x} == "1""#, &[("x", "0".into())]));
    assert!(eval_with(r#"{x} != "1""#, &[("x", "0".into())]));
}

#[test]
fn numbers_compare_numerically() {
    let x = [("x", Value::from("12"))];
    assert!(eval_with("{x} > 10", &x));
    assert!(eval_with("{x} >= 12", &x));
    assert!(!eval_with("{x} < 9.5", &x));
    assert!(eval_with("{x} == 12.0", &x));
}

#[test]
fn booleans_compare_loosely_with_text() {
    assert!(eval_with("{flag} == true", &[("flag", "True".into())]));
    assert!(eval_with("{flag} == True", &[("flag", "true".into())]));
    assert!(eval_with("{flag} == false", &[("flag", "false".into())]));
    assert!(!eval_with("{flag} == true", &[("flag", "nope".into())]));
}

#[test]
fn failure_and_skip_sentinels() {
    // A failed probe reads as boolean false.
    assert!(eval_with("{p} == false", &[("p", Value::Failed)]));
    assert!(!eval_with("{p}", &[("p", Value::Failed)]));
    // A skipped probe reads as null.
    assert!(eval_with("{p} == null", &[("p", Value::Skipped)]));
    assert!(eval_with("not {p}", &[("p", Value::Skipped)]));
}

#[test]
fn connectives_and_grouping() {
    let vars = [("a", Value::from("1")), ("b", Value::from("0"))];
    assert!(eval_with("{a} == 1 and not ({b} == 1)", &vars));
    assert!(eval_with("{a} == 1 && {b} == 0", &vars));
    assert!(eval_with("{b} == 1 or {a} == 1", &vars));
    assert!(eval_with("{b} == 1 || !({a} == 0)", &vars));
    assert!(!eval_with("{a} == 1 and {b} == 1", &vars));
}

#[test]
fn membership() {
    let branch = [("branch", Value::from("main"))];
    assert!(eval_with(r#"{branch} in ["main", "release"]"#, &branch));
    assert!(eval_with(r#"{branch} not in ["dev"]"#, &branch));
    assert!(eval_with(r#""ai" in {branch}"#, &branch));
}

#[test]
fn truthiness_of_bare_values() {
    assert!(eval_with("{x}", &[("x", "yes".into())]));
    assert!(!eval_with("{x}", &[("x", "".into())]));
    assert!(!eval_with("{x}", &[("x", "0".into())]));
    assert!(!eval_with("{x}", &[("x", "False".into())]));
}

#[test]
fn bound_values_are_never_parsed_as_syntax() {
    // A value that looks like an expression stays a plain string.
    let vars = [("x", Value::from(r#"1" or "1" == "1"#))];
    assert!(!eval_with(r#"{x} == "2""#, &vars));
}

#[test]
fn quoted_strings_interpolate_placeholders() {
    let vars = [("dir", Value::from("/tmp"))];
    assert!(eval_with(r#""{dir}/a" == "/tmp/a""#, &vars));
}

#[test]
fn unbound_placeholders_read_as_literal_text() {
    assert!(eval_with(r#"{nobody} == "{nobody}""#, &[]));
}

#[test]
fn malformed_conditions_are_errors() {
    for source in ["{x} ==", "(", r#""unterminated"#, "{x} = 1", "1 2"] {
        let err = Condition::parse(source).unwrap_err();
        assert!(
            matches!(err, ProbeDagError::Condition(_)),
            "expected condition error for {source:?}, got {err:?}"
        );
    }
}

#[test]
fn ordering_incomparable_values_is_an_error() {
    let cond = Condition::parse("{x} < [1]").unwrap();
    let map = bindings(&[("x", "a".into())]);
    assert!(cond.evaluate(|name| map.get(name).cloned()).is_err());
}

#[test]
fn parsed_condition_keeps_its_source() {
    let cond = Condition::parse("{a} == 1").unwrap();
    assert_eq!(cond.source(), "{a} == 1");
}
