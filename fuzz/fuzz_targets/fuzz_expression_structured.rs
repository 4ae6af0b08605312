#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pathwatch_core::{Object, Value};
use pathwatch_expr::{FilterTable, evaluate, parse};

#[derive(Arbitrary, Debug)]
enum Piece {
    Ident(u8),
    Number(u16),
    Str(u8),
    Symbol(u8),
    Filter(u8),
}

const IDENTS: [&str; 6] = ["a", "b", "list", "size", "true", "null"];
const SYMBOLS: [&str; 18] = [
    "+", "-", "*", "/", "%", "=", "<>", "<", ">=", "!", "(", ")", "[", "]", "{", "}", ".", ",",
];
const FILTERS: [&str; 5] = ["upper", "date", "json", "default:'-'", "join:', '"];

impl Piece {
    fn render(&self, out: &mut String) {
        match self {
            Piece::Ident(i) => out.push_str(IDENTS[usize::from(*i) % IDENTS.len()]),
            Piece::Number(n) => out.push_str(&n.to_string()),
            Piece::Str(c) => {
                out.push('\'');
                out.push(char::from(b'a' + c % 26));
                out.push('\'');
            }
            Piece::Symbol(s) => out.push_str(SYMBOLS[usize::from(*s) % SYMBOLS.len()]),
            Piece::Filter(f) => {
                out.push_str(" | ");
                out.push_str(FILTERS[usize::from(*f) % FILTERS.len()]);
            }
        }
        out.push(' ');
    }
}

fuzz_target!(|input: Vec<Piece>| {
    let mut source = String::new();
    for piece in input.iter().take(256) {
        piece.render(&mut source);
    }
    let Ok(parsed) = parse(&source) else {
        return;
    };
    let scope = Value::from(
        Object::new()
            .with("a", Object::new().with("b", 2))
            .with("list", pathwatch_core::Array::from_values(["x", "y"])),
    );
    let _ = evaluate(parsed.ast(), &scope, &FilterTable::with_defaults());
});
