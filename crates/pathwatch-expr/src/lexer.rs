#![forbid(unsafe_code)]

//! Tokenizer for binding expressions.

use std::fmt;

use crate::error::{ExprError, LexErrorKind, Result};

/// Operators and punctuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Dot,
    Eq,
    NotEq,
    LtEq,
    GtEq,
    Lt,
    Gt,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Colon,
    Comma,
    Pipe,
}

impl Symbol {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Bang => "!",
            Self::Dot => ".",
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::LtEq => "<=",
            Self::GtEq => ">=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::Colon => ":",
            Self::Comma => ",",
            Self::Pipe => "|",
        }
    }

    fn single(c: char) -> Option<Self> {
        Some(match c {
            '+' => Self::Plus,
            '-' => Self::Minus,
            '*' => Self::Star,
            '/' => Self::Slash,
            '%' => Self::Percent,
            '!' => Self::Bang,
            '.' => Self::Dot,
            '=' => Self::Eq,
            '<' => Self::Lt,
            '>' => Self::Gt,
            '(' => Self::LParen,
            ')' => Self::RParen,
            '[' => Self::LBracket,
            ']' => Self::RBracket,
            '{' => Self::LBrace,
            '}' => Self::RBrace,
            ':' => Self::Colon,
            ',' => Self::Comma,
            '|' => Self::Pipe,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Str(String),
    Number(f64),
    Ident(String),
    Symbol(Symbol),
    End,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "string {s:?}"),
            Self::Number(n) => write!(f, "number {n}"),
            Self::Ident(name) => write!(f, "identifier `{name}`"),
            Self::Symbol(symbol) => write!(f, "`{}`", symbol.as_str()),
            Self::End => f.write_str("end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// 0-based character offset of the token's first character.
    pub column: usize,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Split `source` into tokens, always ending with [`TokenKind::End`].
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < chars.len() {
        let c = chars[pos];
        let column = pos;
        if c.is_whitespace() {
            pos += 1;
            continue;
        }
        let kind = if c == '\'' || c == '"' {
            let (text, next) = lex_string(&chars, pos)?;
            pos = next;
            TokenKind::Str(text)
        } else if c.is_ascii_digit() {
            let start = pos;
            while pos < chars.len() && chars[pos].is_ascii_digit() {
                pos += 1;
            }
            if pos + 1 < chars.len() && chars[pos] == '.' && chars[pos + 1].is_ascii_digit() {
                pos += 1;
                while pos < chars.len() && chars[pos].is_ascii_digit() {
                    pos += 1;
                }
            }
            let text: String = chars[start..pos].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| ExprError::lex(column, LexErrorKind::InvalidNumber(text.clone())))?;
            TokenKind::Number(value)
        } else if is_ident_start(c) {
            let start = pos;
            while pos < chars.len() && is_ident_continue(chars[pos]) {
                pos += 1;
            }
            TokenKind::Ident(chars[start..pos].iter().collect())
        } else {
            let next = chars.get(pos + 1).copied();
            let symbol = match (c, next) {
                ('<', Some('>')) => Some(Symbol::NotEq),
                ('<', Some('=')) => Some(Symbol::LtEq),
                ('>', Some('=')) => Some(Symbol::GtEq),
                _ => None,
            };
            match symbol {
                Some(symbol) => {
                    pos += 2;
                    TokenKind::Symbol(symbol)
                }
                None => {
                    let symbol = Symbol::single(c)
                        .ok_or_else(|| ExprError::lex(column, LexErrorKind::UnexpectedChar(c)))?;
                    pos += 1;
                    TokenKind::Symbol(symbol)
                }
            }
        };
        tokens.push(Token { kind, column });
    }
    tokens.push(Token {
        kind: TokenKind::End,
        column: chars.len(),
    });
    Ok(tokens)
}

/// Lex a quoted string starting at `start`; returns the text and the index
/// after the closing quote.
fn lex_string(chars: &[char], start: usize) -> Result<(String, usize)> {
    let quote = chars[start];
    let mut text = String::new();
    let mut pos = start + 1;
    while pos < chars.len() {
        match chars[pos] {
            c if c == quote => return Ok((text, pos + 1)),
            '\\' => {
                let Some(&escaped) = chars.get(pos + 1) else {
                    break;
                };
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                pos += 2;
            }
            c => {
                text.push(c);
                pos += 1;
            }
        }
    }
    Err(ExprError::lex(start, LexErrorKind::UnterminatedString))
}
