//! Upward exploration: from a grounded subterm toward its clause root.
//!
//! A newly grounded term proposes groundings for its parent via the
//! candidate's reverse-reference set; each reverse reference is one branch.
//! Branches push the full permutation checkpoint so that a failed branch
//! leaves no trace, and the per-construct drivers here (odometer, glob,
//! choice, unordered) retry a branch while its cursors still hold
//! unexplored alternatives. The recursion terminates only when the entire
//! pattern is grounded (and accepted) or every possibility is exhausted.

use hgql_common::{Atom, AtomId, ClauseId, LinkTag, TermId};
use tracing::{debug, trace};

use crate::compare::Caller;
use crate::engine::MatchEngine;
use crate::error::MatchError;

impl MatchEngine<'_> {
    /// Explore every occurrence of `term` within `clause`, starting each
    /// from the proposed grounding `hg`.
    pub(crate) fn explore_term_branches(
        &mut self,
        term: AtomId,
        hg: AtomId,
        clause: ClauseId,
    ) -> Result<bool, MatchError> {
        let pattern = self.pattern;
        let occurrences: Vec<TermId> = pattern
            .connected_terms(term, clause)
            .ok_or_else(|| {
                MatchError::structural(format!("atom {term} has no occurrence in its clause"))
            })?
            .to_vec();
        let has_glob = pattern.is_globby_holder(term);

        for ptm in occurrences {
            trace!(?ptm, "begin exploring occurrence");
            let found = if has_glob {
                self.explore_glob_branches(ptm, hg, clause)?
            } else {
                self.explore_odometer(ptm, hg, clause)?
            };
            trace!(?ptm, found, "finished exploring occurrence");
            if found {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Walk one step upward: ground `ptm` by some member of `hg`'s
    /// reverse-reference set.
    fn explore_up_branches(
        &mut self,
        ptm: TermId,
        hg: AtomId,
        clause: ClauseId,
    ) -> Result<bool, MatchError> {
        if self.pattern.is_globby_holder(self.pattern.term_atom(ptm)) {
            self.explore_upglob_branches(ptm, hg, clause)
        } else {
            self.explore_upvar_branches(ptm, hg, clause)
        }
    }

    /// Upward branching without globs: a plain loop over the incoming set,
    /// each branch bracketed by a permutation checkpoint.
    fn explore_upvar_branches(
        &mut self,
        ptm: TermId,
        hg: AtomId,
        clause: ClauseId,
    ) -> Result<bool, MatchError> {
        let iset = self.policy.incoming_set(hg);
        debug!(%hg, branches = iset.len(), "looking upward");

        // Permutation stepping must not escape past the branch point.
        self.perm.breakout = self.perm.to_step;
        let mut found = false;
        for (i, &branch) in iset.iter().enumerate() {
            trace!(n = i + 1, total = iset.len(), %branch, "try upward branch");
            self.perm.odo.clear();
            self.perm.push();
            self.perm.go_around = false;
            found = self.explore_odometer(ptm, branch, clause)?;
            self.perm.pop()?;
            if found {
                break;
            }
        }
        self.perm.breakout = None;

        debug!(found, "upward branching done");
        Ok(found)
    }

    /// Upward branching when `ptm` holds a glob: additionally iterate the
    /// glob grounding possibilities per branch.
    fn explore_upglob_branches(
        &mut self,
        ptm: TermId,
        hg: AtomId,
        clause: ClauseId,
    ) -> Result<bool, MatchError> {
        let iset = self.policy.incoming_set(hg);
        debug!(%hg, branches = iset.len(), "looking globby upward");

        let mut found = false;
        for &branch in &iset {
            // A matched branch records its cursors in the glob state; keep
            // the pre-branch view so the next branch starts clean.
            let saved_glob = self.glob_state.clone();
            found = self.explore_glob_branches(ptm, branch, clause)?;
            self.glob_state = saved_glob;
            if found {
                break;
            }
        }
        debug!(found, "upward globby branching done");
        Ok(found)
    }

    /// Retry `ptm` while its glob cursors still hold live positions. Each
    /// failed pass shrinks some run; exhaustion empties the cursor state.
    pub(crate) fn explore_glob_branches(
        &mut self,
        ptm: TermId,
        hg: AtomId,
        clause: ClauseId,
    ) -> Result<bool, MatchError> {
        debug_assert!(
            self.pattern.is_globby_holder(self.pattern.term_atom(ptm)),
            "glob exploration on a glob-free term"
        );

        let gstate_size = self.glob_state.len();
        loop {
            if self.explore_type_branches(ptm, hg, clause)? {
                return Ok(true);
            }
            trace!("globby term not grounded; try again");
            if self.glob_state.len() <= gstate_size {
                break;
            }
        }
        Ok(false)
    }

    /// Drive all commutative constructs at or below `ptm` through their
    /// permutations, odometer-style.
    pub(crate) fn explore_odometer(
        &mut self,
        ptm: TermId,
        hg: AtomId,
        clause: ClauseId,
    ) -> Result<bool, MatchError> {
        if self.explore_type_branches(ptm, hg, clause)? {
            return Ok(true);
        }
        while self.perm.have_more && self.perm.to_step != self.perm.breakout {
            self.perm.have_more = false;
            self.perm.take_step = true;
            self.perm.go_around = false;
            trace!(?ptm, "odometer step beneath term");
            if self.explore_type_branches(ptm, hg, clause)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Retry a commutative construct until its permutations are exhausted.
    fn explore_unordered_branches(
        &mut self,
        ptm: TermId,
        hg: AtomId,
        clause: ClauseId,
    ) -> Result<bool, MatchError> {
        loop {
            if self.explore_single_branch(ptm, hg, clause)? {
                return Ok(true);
            }
            trace!("step to next permutation");
            self.perm.take_step = true;
            self.perm.have_more = false;
            if !self.have_perm(ptm) {
                break;
            }
        }
        self.perm.take_step = false;
        self.perm.have_more = false;
        trace!("no more unordered permutations");
        Ok(false)
    }

    /// Dispatch to the alternative-enumeration driver for `ptm`'s
    /// construct; plain terms get the single-branch wrapper.
    pub(crate) fn explore_type_branches(
        &mut self,
        ptm: TermId,
        hg: AtomId,
        clause: ClauseId,
    ) -> Result<bool, MatchError> {
        let atom = self.store.atom(self.pattern.term_atom(ptm));
        match atom.tag() {
            Some(LinkTag::Choice) => self.explore_choice_branches(ptm, hg, clause),
            Some(tag) if tag.is_unordered() && atom.arity() >= 2 => {
                self.explore_unordered_branches(ptm, hg, clause)
            }
            _ => self.explore_single_branch(ptm, hg, clause),
        }
    }

    /// Check one proposed grounding, and on success continue up the clause.
    /// State is checkpointed around the whole attempt; this leaves the
    /// engine exactly as it found it.
    pub(crate) fn explore_single_branch(
        &mut self,
        ptm: TermId,
        hg: AtomId,
        clause: ClauseId,
    ) -> Result<bool, MatchError> {
        self.solution_push();

        trace!(?ptm, %hg, "checking term for solution");
        if !self.tree_compare(ptm, hg, Caller::Start)? {
            trace!(?ptm, "not solved here");
            self.solution_pop()?;
            return Ok(false);
        }

        trace!(?ptm, %hg, "term solved; move upward");
        let found = self.do_term_up(ptm, hg, clause)?;

        self.solution_pop()?;
        Ok(found)
    }

    /// Move upward from a grounded term: accept the clause at its root,
    /// jump to the evaluator for terms inside evaluatable sub-expressions,
    /// hop over embedded choice parents, and otherwise branch over the
    /// candidate's reverse references.
    fn do_term_up(&mut self, ptm: TermId, hg: AtomId, clause: ClauseId) -> Result<bool, MatchError> {
        let pattern = self.pattern;
        let hp = pattern.term_atom(ptm);

        if pattern.term(ptm).parent().is_none() {
            return self.clause_accept(clause, hg);
        }

        trace!(%hp, "term has ground; move upwards");

        // A term inside an evaluatable sub-expression does not climb to its
        // literal parent; the whole enclosing sentence is evaluated at
        // once. Connectives between here and the clause root are the
        // evaluator's concern, not the matcher's.
        for &(cl, eval_root) in pattern.in_evaluatable(hp) {
            if cl != clause {
                continue;
            }
            trace!(%eval_root, "term inside evaluatable; evaluating the sentence");
            let root = pattern.clause(clause).root();
            let found = self.policy.evaluate_sentence(root, &self.var_grounding);
            debug!(found, "evaluated sentence");
            if found {
                return self.clause_accept(clause, hg);
            }
            return Ok(false);
        }

        let parent = pattern
            .term(ptm)
            .parent()
            .ok_or_else(|| MatchError::structural("non-root term has no parent occurrence"))?;
        let parent_atom = pattern.term_atom(parent);

        if self.store.atom(parent_atom).tag() != Some(LinkTag::Choice) {
            let found = self.explore_up_branches(parent, hg, clause)?;
            debug!(found, "moved up the clause");
            return Ok(found);
        }

        if pattern.term(parent).parent().is_none() {
            trace!("choice link at clause root");
            return self.clause_accept(clause, hg);
        }

        // An embedded choice link is never matched directly; hop up past it
        // and resume from its parent.
        trace!("choice link below root; hop over it");
        debug_assert!(
            !self.have_choice(parent),
            "embedded choice link holds live state"
        );
        self.choice.need_push = true;
        self.do_term_up(parent, hg, clause)
    }

    /// Dispatch a clause: matchable clauses walk the store, evaluatable
    /// clauses go straight to the evaluator.
    pub(crate) fn explore_clause(
        &mut self,
        term: AtomId,
        grnd: AtomId,
        clause: ClauseId,
    ) -> Result<bool, MatchError> {
        let pattern = self.pattern;
        let cc = pattern.clause(clause);

        if !cc.is_evaluatable() {
            debug!("clause is matchable; start matching");
            self.did_check_forall = false;
            let found = self.explore_term_branches(term, grnd, clause)?;
            if !self.did_check_forall && cc.is_always() {
                // Failures count against the universal conjunction too.
                let m = self
                    .policy
                    .always_clause_match(cc.root(), None, &self.var_grounding);
                self.forall_state = self.forall_state && m;
            }
            return Ok(found);
        }

        debug!("clause is evaluatable; start evaluating");
        // A clause that is one big variable still deserves its grounding
        // recorded; there is nowhere else to do it.
        if matches!(self.store.atom(term), Atom::Variable { .. }) {
            self.var_grounding
                .insert(term, crate::grounding::Grounding::Atom(grnd));
        }
        let found = self.policy.evaluate_sentence(cc.root(), &self.var_grounding);
        debug!(found, "evaluated clause");
        if found {
            self.clause_accept(clause, grnd)
        } else {
            if cc.is_always() {
                let m = self
                    .policy
                    .always_clause_match(cc.root(), None, &self.var_grounding);
                self.forall_state = self.forall_state && m;
            }
            Ok(false)
        }
    }
}
