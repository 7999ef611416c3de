//! Subscription query compiler.
//!
//! Turns a subscription's tag expression into a text predicate and its type
//! expression into a file type filter. Compiled queries live for a single
//! sync cycle and are rebuilt from the source strings every time.

mod tags;
mod types;

use thiserror::Error;

use crate::models::Subscription;

pub use tags::TagQuery;
pub use types::FileTypes;

/// Syntax errors in a tag expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("expression is empty")]
    Empty,

    #[error("expected '\"' at {pos}, found {found:?}")]
    ExpectedQuote { found: char, pos: usize },

    #[error("keyword starting at {pos} is not closed")]
    UnterminatedKeyword { pos: usize },

    #[error("keyword at {pos} is empty")]
    EmptyKeyword { pos: usize },

    #[error("operator at {pos} has no right-hand keyword")]
    DanglingOperator { pos: usize },

    #[error("unexpected {found:?} at {pos}, expected '&' or '|'")]
    UnexpectedChar { found: char, pos: usize },
}

/// Cycle-scoped compiled form of a subscription.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub tags: TagQuery,
    pub types: FileTypes,
}

impl CompiledQuery {
    /// Compile a subscription, failing closed on a malformed tag expression.
    pub fn compile(subscription: &Subscription) -> Self {
        Self {
            tags: TagQuery::compile(&subscription.tags),
            types: FileTypes::parse(&subscription.types),
        }
    }

    /// Whether a thread comment satisfies the tag expression.
    pub fn matches_text(&self, text: &str) -> bool {
        self.tags.matches(text)
    }
}
