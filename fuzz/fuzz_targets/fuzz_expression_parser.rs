#![no_main]

use libfuzzer_sys::fuzz_target;
use pathwatch_core::Value;
use pathwatch_expr::{ExprError, FilterTable, evaluate, parse};

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };
    match parse(source) {
        Ok(parsed) => {
            // Printing adds parentheses, so a tree near the nesting limit may
            // print past it.
            match parse(&parsed.ast().to_string()) {
                Ok(again) => assert_eq!(parsed.ast(), again.ast()),
                Err(err) => assert!(matches!(
                    err,
                    ExprError::Parse {
                        expected: "shallower nesting",
                        ..
                    }
                )),
            }
            let _ = evaluate(parsed.ast(), &Value::Undefined, &FilterTable::with_defaults());
        }
        Err(err) => assert!(err.column() <= source.chars().count()),
    }
});
