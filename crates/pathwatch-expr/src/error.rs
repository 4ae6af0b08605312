use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExprError>;

/// Why a source string could not be tokenized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexErrorKind {
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("invalid number literal {0:?}")]
    InvalidNumber(String),
}

/// A malformed expression. Columns are 0-based character offsets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("lex error at column {column}: {kind}")]
    Lex { column: usize, kind: LexErrorKind },

    #[error("parse error at column {column}: expected {expected}, found {found}")]
    Parse {
        column: usize,
        expected: &'static str,
        found: String,
    },
}

impl ExprError {
    /// Column of the offending character or symbol.
    #[must_use]
    pub fn column(&self) -> usize {
        match self {
            Self::Lex { column, .. } | Self::Parse { column, .. } => *column,
        }
    }

    pub(crate) fn lex(column: usize, kind: LexErrorKind) -> Self {
        Self::Lex { column, kind }
    }

    pub(crate) fn parse(column: usize, expected: &'static str, found: impl Into<String>) -> Self {
        Self::Parse {
            column,
            expected,
            found: found.into(),
        }
    }
}
