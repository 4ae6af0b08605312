#![forbid(unsafe_code)]

//! Parse memoization.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;
use tracing::trace;

use crate::error::Result;
use crate::parser::{Parsed, parse};

/// Memo from source text to its parse. Each distinct source is parsed at most
/// once per cache; failed parses are not stored.
#[derive(Debug, Default)]
pub struct ExpressionCache {
    entries: RefCell<AHashMap<String, Rc<Parsed>>>,
}

impl ExpressionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached parse of `source`, parsing it on first request.
    pub fn parse(&self, source: &str) -> Result<Rc<Parsed>> {
        if let Some(parsed) = self.entries.borrow().get(source) {
            return Ok(Rc::clone(parsed));
        }
        let parsed = Rc::new(parse(source)?);
        trace!(source, computed = parsed.is_computed(), "parsed expression");
        self.entries
            .borrow_mut()
            .insert(source.to_string(), Rc::clone(&parsed));
        Ok(parsed)
    }

    #[must_use]
    pub fn contains(&self, source: &str) -> bool {
        self.entries.borrow().contains_key(source)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

thread_local! {
    static DEFAULT_CACHE: ExpressionCache = ExpressionCache::new();
}

/// Run `f` with this thread's default cache.
pub fn with_default_cache<R>(f: impl FnOnce(&ExpressionCache) -> R) -> R {
    DEFAULT_CACHE.with(f)
}
