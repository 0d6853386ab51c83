//! The tree comparator: one pattern occurrence against one candidate.
//!
//! Comparison is recursive over the incidence tree and has one side effect:
//! successful sub-matches extend the grounding map. It never cleans up after
//! a failure; callers bracket speculative comparisons with solution
//! checkpoints and restore on mismatch.

use hgql_common::{Atom, AtomId, LinkTag, TermId};
use tracing::{debug, trace};

use crate::engine::MatchEngine;
use crate::error::MatchError;
use crate::grounding::Grounding;

/// Which construct requested a comparison; used for tracing context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Caller {
    /// Positional comparison inside an ordered link.
    Order,
    /// One permutation of a commutative link.
    Unorder,
    /// One alternative of a choice link.
    Choice,
    /// One element probed by the glob matcher.
    Glob,
    /// A proposed branch grounding from upward exploration.
    Start,
}

impl MatchEngine<'_> {
    /// Compare pattern occurrence `ptm` against candidate `hg`.
    ///
    /// Dispatches in strict priority order: existing binding, declared
    /// variable, scoped variable, literal identity, node comparison, choice,
    /// fuzzy fallback, then link comparison (ordered, variadic or
    /// commutative).
    pub(crate) fn tree_compare(
        &mut self,
        ptm: TermId,
        hg: AtomId,
        caller: Caller,
    ) -> Result<bool, MatchError> {
        let store = self.store;
        let pattern = self.pattern;
        let term = pattern.term(ptm);
        let hp = term.atom();
        let quoted = term.is_quoted();

        // No second-guessing: a bound atom must reproduce its grounding.
        if let Some(gnd) = self.var_grounding.get(hp) {
            return Ok(gnd.is_atom(hg));
        }

        let pat_atom = store.atom(hp);

        if pat_atom.tag() == Some(LinkTag::Define) {
            return Err(MatchError::UnsupportedConstruct(
                "indirect pattern definition",
            ));
        }

        if !quoted {
            if pattern.is_declared_var(hp) {
                return self.variable_compare(hp, hg);
            }
            // A variable that is not ours is bound in some nested scope.
            if matches!(pat_atom, Atom::Variable { .. }) {
                return Ok(self.policy.scope_match(hp, hg));
            }
        }

        // Identical atoms are a self-match, unless the term must be
        // evaluated: evaluation may depend on external state, so it cannot
        // be short-circuited.
        if hp == hg && !pattern.is_evaluatable_atom(hp) {
            return Ok(self.self_compare(ptm));
        }

        let cand_atom = store.atom(hg);
        if pat_atom.is_node() && cand_atom.is_node() {
            return Ok(self.node_compare(hp, hg));
        }

        // Choice before the fuzzy fallback: a choice of nodes may be
        // compared against a single node.
        if pat_atom.tag() == Some(LinkTag::Choice) {
            return self.choice_compare(ptm, hg);
        }

        if !(pat_atom.is_link() && cand_atom.is_link()) {
            return Ok(self.policy.fuzzy_match(hp, hg));
        }

        if !self.policy.link_match(hp, hg) {
            return Ok(false);
        }
        trace!(?caller, %hp, %hg, "tree compare descends");

        if pat_atom.arity() < 2 || !pat_atom.tag().is_some_and(LinkTag::is_unordered) {
            return self.ordered_compare(ptm, hg);
        }
        self.unordered_compare(ptm, hg)
    }

    /// Compare a declared variable against a proposed grounding.
    fn variable_compare(&mut self, hp: AtomId, hg: AtomId) -> Result<bool, MatchError> {
        // Multiple groundings arise when traversing graphs with loops; a
        // repeat must agree with the record.
        if let Some(gnd) = self.var_grounding.get(hp) {
            return Ok(gnd.is_atom(hg));
        }

        if !self.store.atom(hp).is_node() {
            return Err(MatchError::structural(format!(
                "variable placeholder {hp} is not a leaf"
            )));
        }

        if !self.policy.variable_match(hp, hg) {
            return Ok(false);
        }

        // Globs bind only through the variadic matcher, where the run they
        // consumed is known.
        if !self.pattern.is_glob(hp) {
            debug!(%hp, %hg, "grounded variable");
            self.var_grounding.insert(hp, Grounding::Atom(hg));
        }
        Ok(true)
    }

    /// An atom compared against itself.
    fn self_compare(&mut self, ptm: TermId) -> bool {
        let term = self.pattern.term(ptm);
        let hp = term.atom();
        if !term.is_quoted() {
            self.var_grounding.insert(hp, Grounding::Atom(hp));
        }
        trace!(%hp, "atom matches itself");
        true
    }

    /// Compare two leaf atoms through the node-acceptance policy.
    fn node_compare(&mut self, hp: AtomId, hg: AtomId) -> bool {
        let matched = self.policy.node_match(hp, hg);
        if matched {
            trace!(%hp, %hg, "nodes match");
            if hp != hg {
                self.var_grounding.insert(hp, Grounding::Atom(hg));
            }
        }
        matched
    }

    /// Side-by-side comparison of two ordered links.
    pub(crate) fn ordered_compare(&mut self, ptm: TermId, hg: AtomId) -> Result<bool, MatchError> {
        let store = self.store;
        let pattern = self.pattern;
        let hp = pattern.term_atom(ptm);
        let osp: Vec<TermId> = pattern.term(ptm).children().to_vec();
        let osg: Vec<AtomId> = store.atom(hg).children().to_vec();

        let mut matched = true;
        if pattern.is_globby_term(hp) {
            matched = self.glob_compare(ptm, &osp, &osg)?;
        } else if osp.len() != osg.len() {
            // Mismatched arity without a glob: the fuzzy fallback decides.
            matched = self.policy.fuzzy_match(hp, hg);
        } else {
            for (i, &child) in osp.iter().enumerate() {
                if !self.tree_compare(child, osg[i], Caller::Order)? {
                    matched = false;
                    break;
                }
            }
        }
        trace!(%hp, matched, "ordered compare");

        if !matched {
            self.policy.post_link_mismatch(hp, hg);
            return Ok(false);
        }
        if !self.policy.post_link_match(hp, hg) {
            return Ok(false);
        }
        self.record_grounding(ptm, hg);
        Ok(true)
    }

    /// Record a grounded composite term.
    pub(crate) fn record_grounding(&mut self, ptm: TermId, hg: AtomId) {
        let term = self.pattern.term(ptm);
        let hp = term.atom();
        // A closed term grounding itself needs no record.
        if hp == hg {
            return;
        }
        if !term.is_quoted() {
            self.var_grounding.insert(hp, Grounding::Atom(hg));
        }
    }
}
