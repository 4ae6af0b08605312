#![forbid(unsafe_code)]

//! Binding expressions for pathwatch.
//!
//! A source string such as `user.name | upper` is tokenized ([`lexer`]),
//! parsed into a [`Node`] tree with its static key-path dependencies
//! ([`parser`]), memoized per source ([`cache`]), and evaluated against a
//! scope value ([`eval`]) with a table of named [`filters`]. An
//! [`Expression`] can also be watched: it re-evaluates when its dependencies
//! change and reports `(new, old)` results.
//!
//! ```
//! use pathwatch_core::{Object, Value};
//! use pathwatch_expr::Expression;
//!
//! let scope = Value::from(Object::new().with("foo", "12/1/84"));
//! let expr = Expression::new("foo | date").unwrap();
//! assert_eq!(expr.compile(&scope), Value::from("December 1, 1984"));
//! ```

pub mod ast;
pub mod cache;
pub mod error;
pub mod eval;
pub mod expression;
pub mod filters;
pub mod lexer;
pub mod parser;

pub use ast::{BinaryOp, Node, Reserved, UnaryOp};
pub use cache::{ExpressionCache, with_default_cache};
pub use error::{ExprError, LexErrorKind, Result};
pub use eval::evaluate;
pub use expression::Expression;
pub use filters::{DEFAULT_DATE_FORMAT, FilterFn, FilterTable, default_filters};
pub use parser::{MAX_DEPTH, Parsed, parse};
