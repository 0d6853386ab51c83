//! Fatal error taxonomy.
//!
//! Ordinary mismatches are not errors: every negative comparison is an
//! `Ok(false)` absorbed by the nearest backtracking point. Only broken
//! internal invariants and recognized-but-unimplemented constructs abort a
//! search.

use thiserror::Error;

/// Search-aborting failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchError {
    /// An internal invariant was broken: a supposed variable placeholder is
    /// not a leaf, a non-root term has no parent, a stack was popped empty.
    #[error("structural violation: {0}")]
    StructuralViolation(String),

    /// The pattern uses a construct the engine recognizes but does not
    /// implement, e.g. indirect pattern definitions.
    #[error("unsupported construct: {0}")]
    UnsupportedConstruct(&'static str),
}

impl MatchError {
    /// Shorthand for a [`MatchError::StructuralViolation`].
    pub(crate) fn structural(msg: impl Into<String>) -> Self {
        MatchError::StructuralViolation(msg.into())
    }
}
