//! Backtracking graph-pattern matching over hypergraph knowledge stores.
//!
//! Given a compiled pattern (clauses of template sub-graphs with free
//! variables, variadic globs, commutative sub-structures, multi-way
//! alternatives and externally evaluated predicates), the engine finds every
//! way of substituting stored structures for the variables so that all
//! clauses hold. It is a hand-written constraint solver: subgraph
//! isomorphism search driven bottom-up through reverse references, a
//! join-order heuristic over clauses, and explicitly stacked backtracking
//! state that makes permutation and glob cursors pausable and resumable
//! across nested constructs.
//!
//! The store behind the search and the acceptance decisions along the way
//! stay outside the engine: storage implements
//! [`hgql_common::GraphStore`], and every comparison, clause decision,
//! evaluation and solution passes through a [`MatchPolicy`].
//!
//! ```
//! use hgql_common::{Clause, LinkTag, MemStore, Pattern};
//! use hgql_match::test_support::{atom_binding, collect_solutions};
//!
//! let mut store = MemStore::new();
//! let x = store.variable("X");
//! let likes = store.node("likes");
//! let alice = store.node("alice");
//! let fact = store.link(LinkTag::List, vec![likes, alice]);
//! let query = store.link(LinkTag::List, vec![likes, x]);
//!
//! let pattern = Pattern::compile(&store, &[x], &[Clause::mandatory(query)]).unwrap();
//! let solutions = collect_solutions(&store, &pattern);
//! assert_eq!(solutions.len(), 1);
//! assert_eq!(atom_binding(&solutions[0], x), Some(alice));
//! # let _ = fact;
//! ```

mod choice;
mod compare;
mod engine;
mod error;
mod explore;
mod glob;
mod grounding;
mod init;
mod perm;
mod policy;
mod scheduler;
mod scratch;

pub mod test_support;

pub use engine::MatchEngine;
pub use error::MatchError;
pub use grounding::{ClauseGroundingMap, Grounding, GroundingMap};
pub use init::SearchInitiator;
pub use policy::{DefaultPolicy, MatchPolicy, PredicateEval, SolutionSink};
pub use scratch::{EvalFrame, ScratchGuard, ScratchPool};
