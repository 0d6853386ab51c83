//! Shared hypergraph model for the HGQL pattern matcher.
//!
//! This crate defines the data the matching engine and its collaborators
//! exchange: atoms and their structural tags, the [`GraphStore`] interface a
//! backing store must expose, a reference in-memory store, and compiled
//! patterns (clause trees of term occurrences plus the derived index sets the
//! engine consumes).

mod atom;
mod pattern;
mod store;

pub use atom::{Atom, AtomId, GlobBounds, LinkTag};
pub use pattern::{
    Clause, ClauseId, CompiledClause, Modality, Pattern, PatternError, PatternTerm, TermId,
};
pub use store::{GraphStore, MemStore};
