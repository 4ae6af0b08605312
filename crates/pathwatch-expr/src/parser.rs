#![forbid(unsafe_code)]

//! Recursive-descent parser with static path extraction.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! comparison → sum (('=' | '<>' | '<=' | '>=' | '<' | '>') sum)*
//! sum        → multiply (('+' | '-') multiply)*
//! multiply   → filter (('*' | '/' | '%') filter)*
//! filter     → unary ('|' ident (':' comparison (',' comparison)*)?)*
//! unary      → ('+' | '-' | '!') unary | paren
//! paren      → '(' comparison ')' | operand
//! operand    → string | number | object | array | member
//! member     → '.' '[' comparison ']' chain | identifier chain
//! chain      → ('.' ident | '[' comparison ']' | '(' args ')')*
//! ```
//!
//! Binary operators associate to the left.
//!
//! Nesting is bounded: every parenthesized or bracketed sub-expression,
//! unary prefix and chained operator adds one level, and input deeper than
//! [`MAX_DEPTH`] levels fails with a parse error instead of exhausting the
//! stack.
//!
//! While parsing a member chain the parser accumulates the keys it reads from
//! the scope. A completed chain contributes its encoded key path to the
//! expression's path set. A bracket whose index is not a string or number
//! literal ends the chain's path at the prefix before it; the index's own
//! paths are still collected. Any call discards the path set entirely, since
//! a call's result cannot be attributed to a path.

use std::collections::BTreeSet;

use pathwatch_core::{format_number, to_key_path};

use crate::ast::{BinaryOp, Node, Reserved, UnaryOp};
use crate::error::{ExprError, Result};
use crate::lexer::{Symbol, Token, TokenKind, tokenize};

/// Deepest nesting the parser accepts.
pub const MAX_DEPTH: usize = 128;

/// A parsed expression with its static dependencies.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    source: String,
    ast: Node,
    paths: Option<Vec<String>>,
}

impl Parsed {
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn ast(&self) -> &Node {
        &self.ast
    }

    /// Sorted key paths the expression reads, or `None` if it contains a
    /// call and must be dirty-checked instead.
    #[must_use]
    pub fn paths(&self) -> Option<&[String]> {
        self.paths.as_deref()
    }

    /// Whether evaluation must be dirty-checked rather than path-watched.
    #[must_use]
    pub fn is_computed(&self) -> bool {
        self.paths.is_none()
    }
}

/// Parse `source` without consulting any cache.
pub fn parse(source: &str) -> Result<Parsed> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        paths: BTreeSet::new(),
        has_call: false,
        depth: 0,
    };
    let ast = parser.comparison()?;
    parser.expect_end()?;
    let paths = (!parser.has_call).then(|| parser.paths.into_iter().collect());
    Ok(Parsed {
        source: source.to_string(),
        ast,
        paths,
    })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    paths: BTreeSet<String>,
    has_call: bool,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // `tokenize` always ends with `End`, and `advance` never moves past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::End {
            self.pos += 1;
        }
        token
    }

    fn at(&self, symbol: Symbol) -> bool {
        self.peek().kind == TokenKind::Symbol(symbol)
    }

    fn eat(&mut self, symbol: Symbol) -> bool {
        if self.at(symbol) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, expected: &'static str) -> ExprError {
        let token = self.peek();
        ExprError::parse(token.column, expected, token.kind.to_string())
    }

    fn expect(&mut self, symbol: Symbol, expected: &'static str) -> Result<()> {
        if self.eat(symbol) {
            Ok(())
        } else {
            Err(self.error(expected))
        }
    }

    fn expect_end(&self) -> Result<()> {
        if self.peek().kind == TokenKind::End {
            Ok(())
        } else {
            Err(self.error("end of input"))
        }
    }

    fn descend(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("shallower nesting"));
        }
        Ok(())
    }

    fn ident(&mut self, expected: &'static str) -> Result<String> {
        match self.peek().kind.clone() {
            TokenKind::Ident(name) => {
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error(expected)),
        }
    }

    // ── Binary levels ───────────────────────────────────────────────────

    fn binary(
        &mut self,
        ops: &[(Symbol, BinaryOp)],
        next: fn(&mut Self) -> Result<Node>,
    ) -> Result<Node> {
        let mut left = next(self)?;
        let mut folds = 0;
        'outer: loop {
            for &(symbol, op) in ops {
                if self.eat(symbol) {
                    self.descend()?;
                    folds += 1;
                    let right = next(self)?;
                    left = Node::Binary {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    };
                    continue 'outer;
                }
            }
            self.depth -= folds;
            return Ok(left);
        }
    }

    fn comparison(&mut self) -> Result<Node> {
        self.descend()?;
        let node = self.binary(
            &[
                (Symbol::Eq, BinaryOp::Eq),
                (Symbol::NotEq, BinaryOp::NotEq),
                (Symbol::LtEq, BinaryOp::LtEq),
                (Symbol::GtEq, BinaryOp::GtEq),
                (Symbol::Lt, BinaryOp::Lt),
                (Symbol::Gt, BinaryOp::Gt),
            ],
            Self::sum,
        )?;
        self.depth -= 1;
        Ok(node)
    }

    fn sum(&mut self) -> Result<Node> {
        self.binary(
            &[(Symbol::Plus, BinaryOp::Add), (Symbol::Minus, BinaryOp::Sub)],
            Self::multiply,
        )
    }

    fn multiply(&mut self) -> Result<Node> {
        self.binary(
            &[
                (Symbol::Star, BinaryOp::Mul),
                (Symbol::Slash, BinaryOp::Div),
                (Symbol::Percent, BinaryOp::Rem),
            ],
            Self::filter,
        )
    }

    fn filter(&mut self) -> Result<Node> {
        let mut input = self.unary()?;
        let mut folds = 0;
        while self.eat(Symbol::Pipe) {
            self.descend()?;
            folds += 1;
            let name = self.ident("filter name")?;
            let mut args = Vec::new();
            if self.eat(Symbol::Colon) {
                args.push(self.comparison()?);
                while self.eat(Symbol::Comma) {
                    args.push(self.comparison()?);
                }
            }
            input = Node::Filter {
                name,
                input: Box::new(input),
                args,
            };
        }
        self.depth -= folds;
        Ok(input)
    }

    fn unary(&mut self) -> Result<Node> {
        let op = if self.eat(Symbol::Bang) {
            UnaryOp::Not
        } else if self.eat(Symbol::Minus) {
            UnaryOp::Neg
        } else if self.eat(Symbol::Plus) {
            UnaryOp::Plus
        } else {
            return self.paren();
        };
        self.descend()?;
        let operand = self.unary()?;
        self.depth -= 1;
        Ok(Node::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn paren(&mut self) -> Result<Node> {
        if self.eat(Symbol::LParen) {
            let inner = self.comparison()?;
            self.expect(Symbol::RParen, "`)`")?;
            return Ok(inner);
        }
        self.operand()
    }

    // ── Operands ────────────────────────────────────────────────────────

    fn operand(&mut self) -> Result<Node> {
        match self.peek().kind.clone() {
            TokenKind::Str(s) => {
                self.pos += 1;
                Ok(Node::Str(s))
            }
            TokenKind::Number(n) => {
                self.pos += 1;
                Ok(Node::Number(n))
            }
            TokenKind::Ident(name) => {
                self.pos += 1;
                match name.as_str() {
                    "true" => Ok(Node::Reserved(Reserved::True)),
                    "false" => Ok(Node::Reserved(Reserved::False)),
                    "null" => Ok(Node::Reserved(Reserved::Null)),
                    _ => {
                        let keys = vec![name.clone()];
                        self.chain(Node::Identifier(name), Some(keys))
                    }
                }
            }
            TokenKind::Symbol(Symbol::LBrace) => self.object_literal(),
            TokenKind::Symbol(Symbol::LBracket) => self.array_literal(),
            TokenKind::Symbol(Symbol::Dot) => {
                self.pos += 1;
                if !self.at(Symbol::LBracket) {
                    return Err(self.error("`[` after a leading `.`"));
                }
                self.chain(Node::Scope, Some(Vec::new()))
            }
            _ => Err(self.error("an expression")),
        }
    }

    /// Parse `.prop`, `[index]` and `(args)` suffixes onto `base`, tracking
    /// the scope keys read so far in `keys` (`None` once untrackable).
    fn chain(&mut self, mut base: Node, mut keys: Option<Vec<String>>) -> Result<Node> {
        let mut folds = 0;
        loop {
            if [Symbol::Dot, Symbol::LBracket, Symbol::LParen]
                .into_iter()
                .any(|symbol| self.at(symbol))
            {
                self.descend()?;
                folds += 1;
            }
            if self.eat(Symbol::Dot) {
                let name = self.ident("property name")?;
                if let Some(keys) = keys.as_mut() {
                    keys.push(name.clone());
                }
                base = Node::Member {
                    object: Box::new(base),
                    property: Box::new(Node::Str(name)),
                };
            } else if self.eat(Symbol::LBracket) {
                let index = self.comparison()?;
                self.expect(Symbol::RBracket, "`]`")?;
                let literal = match &index {
                    Node::Str(s) => Some(s.clone()),
                    Node::Number(n) => Some(format_number(*n)),
                    _ => None,
                };
                match literal {
                    Some(key) => {
                        if let Some(keys) = keys.as_mut() {
                            keys.push(key);
                        }
                    }
                    None => {
                        if let Some(prefix) = keys.take() {
                            self.record(&prefix);
                        }
                    }
                }
                base = Node::Member {
                    object: Box::new(base),
                    property: Box::new(index),
                };
            } else if self.eat(Symbol::LParen) {
                let mut args = Vec::new();
                if !self.at(Symbol::RParen) {
                    args.push(self.comparison()?);
                    while self.eat(Symbol::Comma) {
                        args.push(self.comparison()?);
                    }
                }
                self.expect(Symbol::RParen, "`)` or `,`")?;
                self.has_call = true;
                keys = None;
                base = Node::Call {
                    callee: Box::new(base),
                    args,
                };
            } else {
                if let Some(keys) = keys {
                    self.record(&keys);
                }
                self.depth -= folds;
                return Ok(base);
            }
        }
    }

    fn record(&mut self, keys: &[String]) {
        if !keys.is_empty() {
            self.paths.insert(to_key_path(keys));
        }
    }

    fn object_literal(&mut self) -> Result<Node> {
        self.expect(Symbol::LBrace, "`{`")?;
        let mut fields = Vec::new();
        if !self.eat(Symbol::RBrace) {
            loop {
                let key = match self.peek().kind.clone() {
                    TokenKind::Ident(name) => name,
                    TokenKind::Str(s) => s,
                    TokenKind::Number(n) => format_number(n),
                    _ => return Err(self.error("object key")),
                };
                self.pos += 1;
                self.expect(Symbol::Colon, "`:`")?;
                fields.push((key, self.comparison()?));
                if self.eat(Symbol::RBrace) {
                    break;
                }
                self.expect(Symbol::Comma, "`,` or `}`")?;
            }
        }
        Ok(Node::Object(fields))
    }

    fn array_literal(&mut self) -> Result<Node> {
        self.expect(Symbol::LBracket, "`[`")?;
        let mut items = Vec::new();
        if !self.eat(Symbol::RBracket) {
            loop {
                items.push(self.comparison()?);
                if self.eat(Symbol::RBracket) {
                    break;
                }
                self.expect(Symbol::Comma, "`,` or `]`")?;
            }
        }
        Ok(Node::Array(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(source: &str) -> Option<Vec<String>> {
        parse(source).expect("parse").paths().map(<[String]>::to_vec)
    }

    fn strings(items: &[&str]) -> Option<Vec<String>> {
        Some(items.iter().map(|s| (*s).to_string()).collect())
    }

    #[test]
    fn arithmetic_precedence_and_associativity() {
        let parsed = parse("x.y.z + 1 * 2").expect("parse");
        assert_eq!(parsed.ast().to_string(), "(x.y.z + (1 * 2))");
        assert_eq!(parse("1 - 2 - 3").expect("parse").ast().to_string(), "((1 - 2) - 3)");
    }

    #[test]
    fn filters_bind_tighter_than_multiplication() {
        let parsed = parse("a * b | upper | date:'%Y', 2").expect("parse");
        assert_eq!(
            parsed.ast().to_string(),
            "(a * ((b | upper) | date:'%Y', 2))"
        );
    }

    #[test]
    fn reserved_words_are_literals() {
        let parsed = parse("(true)").expect("parse");
        assert_eq!(parsed.ast(), &Node::Reserved(Reserved::True));
        assert_eq!(parsed.paths(), Some(&[][..]));
    }

    #[test]
    fn member_paths_are_collected() {
        assert_eq!(paths("a.b + c"), strings(&["a.b", "c"]));
        assert_eq!(paths("a['x.y'][0]"), strings(&["a.x^.y.0"]));
        assert_eq!(paths("{k: a, l: [b]}"), strings(&["a", "b"]));
        assert_eq!(paths(".['odd key'].z"), strings(&["odd key.z"]));
    }

    #[test]
    fn dynamic_index_truncates_at_prefix() {
        assert_eq!(paths("list[i].name"), strings(&["i", "list"]));
    }

    #[test]
    fn calls_disable_paths() {
        assert_eq!(paths("a.b + f(c)"), None);
        assert!(parse("items.join(',')").expect("parse").is_computed());
    }

    #[test]
    fn trailing_tokens_are_rejected() {
        assert_eq!(
            parse("a b"),
            Err(ExprError::parse(2, "end of input", "identifier `b`"))
        );
    }

    #[test]
    fn errors_point_at_the_offending_symbol() {
        assert_eq!(parse("(a + b").map(|_| ()).unwrap_err().column(), 6);
        assert_eq!(parse("a | ").map(|_| ()).unwrap_err().column(), 4);
        assert_eq!(parse("a.").map(|_| ()).unwrap_err().column(), 2);
        assert_eq!(parse("{a 1}").map(|_| ()).unwrap_err().column(), 3);
        assert_eq!(parse("").map(|_| ()).unwrap_err().column(), 0);
    }

    #[test]
    fn deep_nesting_is_a_parse_error() {
        let deep = [
            format!("{}a", "!".repeat(200_000)),
            format!("{}a{}", "(".repeat(10_000), ")".repeat(10_000)),
            format!("{}{}", "[".repeat(10_000), "]".repeat(10_000)),
            format!("a{}", "[0]".repeat(10_000)),
            vec!["a"; 10_000].join(" + "),
        ];
        for source in &deep {
            assert!(
                matches!(
                    parse(source),
                    Err(ExprError::Parse {
                        expected: "shallower nesting",
                        ..
                    })
                ),
                "{}",
                &source[..20]
            );
        }
    }

    #[test]
    fn moderate_nesting_still_parses() {
        let parens = format!("{}a{}", "(".repeat(40), ")".repeat(40));
        assert_eq!(paths(&parens), strings(&["a"]));
        let bangs = format!("{}a", "!".repeat(60));
        assert!(parse(&bangs).is_ok());
        let sum = vec!["1"; 60].join(" + ");
        assert!(parse(&sum).is_ok());
    }

    #[test]
    fn display_reparses_to_the_same_tree() {
        for source in [
            "!a.b <> -c[0]",
            "f(x, 'q\\'s')(1)",
            "{'a b': [1, 2.5], c: null} | json",
            ".[k].v % 3 >= 1",
        ] {
            let first = parse(source).expect("parse");
            let again = parse(&first.ast().to_string()).expect("reparse");
            assert_eq!(first.ast(), again.ast(), "{source}");
        }
    }
}
