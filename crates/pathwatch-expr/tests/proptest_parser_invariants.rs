#![forbid(unsafe_code)]

//! Property-based invariant tests for the expression parser and evaluator.
//!
//! 1. Arbitrary input never panics the lexer or parser; errors stay within
//!    the source's bounds.
//! 2. The printed form of a parsed tree re-parses to the same tree.
//! 3. Evaluation is total: any parsed tree evaluates against any scope.
//! 4. Integer arithmetic matches Rust's for left-associative `+ - *`.
//! 5. A member chain of plain identifiers reports exactly its own path.

use pathwatch_core::{Object, Value};
use pathwatch_expr::{FilterTable, evaluate, parse};
use proptest::prelude::*;

// ── Strategies ──────────────────────────────────────────────────────────

fn ident() -> impl Strategy<Value = String> {
    "[a-z_][a-z0-9_]{0,4}".prop_filter("reserved", |s| !matches!(s.as_str(), "true" | "false" | "null"))
}

fn operand() -> impl Strategy<Value = String> {
    prop_oneof![
        (0u32..100).prop_map(|n| n.to_string()),
        ident(),
        proptest::collection::vec(ident(), 1..4).prop_map(|keys| keys.join(".")),
        "'[a-z ]{0,5}'",
        Just("true".to_string()),
    ]
}

fn expression() -> impl Strategy<Value = String> {
    operand().prop_recursive(4, 24, 3, |inner| {
        prop_oneof![
            (inner.clone(), prop::sample::select(vec!["+", "-", "*", "/", "%", "=", "<>", "<", ">="]), inner.clone())
                .prop_map(|(l, op, r)| format!("{l} {op} {r}")),
            inner.clone().prop_map(|e| format!("({e})")),
            inner.clone().prop_map(|e| format!("!{e}")),
            (inner.clone(), prop::sample::select(vec!["upper", "trim", "length"]))
                .prop_map(|(e, f)| format!("{e} | {f}")),
            proptest::collection::vec(inner, 0..3).prop_map(|items| format!("[{}]", items.join(", "))),
        ]
    })
}

fn scope() -> Value {
    Value::from(
        Object::new()
            .with("a", Object::new().with("b", 2))
            .with("n", 5)
            .with("s", "text"),
    )
}

// ── Properties ──────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn parser_never_panics(source in "\\PC{0,24}") {
        if let Err(err) = parse(&source) {
            prop_assert!(err.column() <= source.chars().count());
        }
    }

    #[test]
    fn printed_tree_reparses(source in expression()) {
        let first = parse(&source).expect("generated expressions parse");
        let printed = first.ast().to_string();
        let again = parse(&printed).expect("printed form parses");
        prop_assert_eq!(first.ast(), again.ast());
        prop_assert_eq!(first.paths(), again.paths());
    }

    #[test]
    fn evaluation_is_total(source in expression()) {
        let parsed = parse(&source).expect("generated expressions parse");
        let filters = FilterTable::with_defaults();
        let _ = evaluate(parsed.ast(), &scope(), &filters);
        let _ = evaluate(parsed.ast(), &Value::Undefined, &filters);
    }

    #[test]
    fn integer_arithmetic_matches(
        first in -50i64..50,
        rest in proptest::collection::vec((prop::sample::select(vec!['+', '-', '*']), 0i64..50), 0..6),
    ) {
        let mut source = format!("({first})");
        let mut expected = first;
        for (op, n) in &rest {
            source.push_str(&format!(" {op} {n}"));
        }
        // Precedence: fold products first, then sums left to right.
        let mut terms = vec![expected];
        let mut signs = vec![1i64];
        for (op, n) in &rest {
            match op {
                '*' => {
                    let last = terms.len() - 1;
                    terms[last] *= n;
                }
                '+' => {
                    terms.push(*n);
                    signs.push(1);
                }
                _ => {
                    terms.push(*n);
                    signs.push(-1);
                }
            }
        }
        expected = terms.iter().zip(&signs).map(|(t, s)| t * s).sum();
        let parsed = parse(&source).expect("parse");
        let value = evaluate(parsed.ast(), &Value::Undefined, &FilterTable::new());
        #[allow(clippy::cast_precision_loss)]
        let expected = Value::from(expected as f64);
        prop_assert_eq!(value, expected);
    }

    #[test]
    fn identifier_chain_reports_its_path(keys in proptest::collection::vec(ident(), 1..5)) {
        let source = keys.join(".");
        let parsed = parse(&source).expect("parse");
        prop_assert_eq!(parsed.paths(), Some(&[source.clone()][..]));
    }
}
