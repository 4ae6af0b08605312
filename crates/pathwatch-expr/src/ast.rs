#![forbid(unsafe_code)]

//! Expression syntax tree.

use std::fmt;

use pathwatch_core::format_number;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reserved {
    True,
    False,
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Str(String),
    Number(f64),
    Reserved(Reserved),
    /// A top-level name read from the scope.
    Identifier(String),
    /// The scope itself, as the base of `.[expr]`.
    Scope,
    Member {
        object: Box<Node>,
        property: Box<Node>,
    },
    Call {
        callee: Box<Node>,
        args: Vec<Node>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Filter {
        name: String,
        input: Box<Node>,
        args: Vec<Node>,
    },
    Object(Vec<(String, Node)>),
    Array(Vec<Node>),
}

fn write_string(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("'")?;
    for c in s.chars() {
        match c {
            '\'' => f.write_str("\\'")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("'")
}

fn write_list(f: &mut fmt::Formatter<'_>, nodes: &[Node]) -> fmt::Result {
    for (i, node) in nodes.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{node}")?;
    }
    Ok(())
}

/// Fully parenthesized source form; parsing it yields an equal tree.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write_string(f, s),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::Reserved(Reserved::True) => f.write_str("true"),
            Self::Reserved(Reserved::False) => f.write_str("false"),
            Self::Reserved(Reserved::Null) => f.write_str("null"),
            Self::Identifier(name) => f.write_str(name),
            Self::Scope => f.write_str("."),
            Self::Member { object, property } => match (&**object, &**property) {
                (Self::Scope, property) => write!(f, ".[{property}]"),
                (object, Self::Str(name)) if is_identifier(name) => write!(f, "{object}.{name}"),
                (object, property) => write!(f, "{object}[{property}]"),
            },
            Self::Call { callee, args } => {
                write!(f, "{callee}(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Self::Unary { op, operand } => {
                let op = match op {
                    UnaryOp::Not => "!",
                    UnaryOp::Neg => "-",
                    UnaryOp::Plus => "+",
                };
                write!(f, "({op}{operand})")
            }
            Self::Binary { op, left, right } => write!(f, "({left} {} {right})", op.as_str()),
            Self::Filter { name, input, args } => {
                write!(f, "({input} | {name}")?;
                if !args.is_empty() {
                    f.write_str(":")?;
                    write_list(f, args)?;
                }
                f.write_str(")")
            }
            Self::Object(fields) => {
                f.write_str("{")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_string(f, key)?;
                    write!(f, ": {value}")?;
                }
                f.write_str("}")
            }
            Self::Array(items) => {
                f.write_str("[")?;
                write_list(f, items)?;
                f.write_str("]")
            }
        }
    }
}

/// Whether `name` lexes as a single non-reserved identifier.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        && !matches!(name, "true" | "false" | "null")
}
