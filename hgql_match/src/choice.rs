//! Multi-way choice constructs.
//!
//! A choice link is grounded as soon as any one of its alternatives is; the
//! first success wins. A per-occurrence cursor remembers which alternative
//! satisfied the construct so that a later retry resumes at the next one
//! instead of restarting.

use std::collections::HashMap;

use hgql_common::{AtomId, TermId};
use tracing::trace;

use crate::compare::Caller;
use crate::engine::MatchEngine;
use crate::error::MatchError;

/// Choice cursors plus the stepping flags that drive retries.
#[derive(Clone, Debug, Default)]
pub(crate) struct ChoiceState {
    /// Alternative currently satisfying each live choice occurrence.
    pub(crate) state: HashMap<TermId, usize>,
    /// Set when the next visit must advance to the following alternative.
    pub(crate) choose_next: bool,
    /// Set while stepping an embedded choice that needs its own checkpoint.
    pub(crate) need_push: bool,
    /// Checkpoints for embedded-choice stepping.
    stack: Vec<HashMap<TermId, usize>>,
}

impl ChoiceState {
    /// Snapshot the cursors.
    pub(crate) fn checkpoint(&self) -> HashMap<TermId, usize> {
        self.state.clone()
    }

    /// Restore a cursor snapshot.
    pub(crate) fn restore(&mut self, saved: HashMap<TermId, usize>) {
        self.state = saved;
    }

    /// Push the cursors onto the embedded-choice stack.
    pub(crate) fn push(&mut self) {
        let saved = self.checkpoint();
        self.stack.push(saved);
    }

    /// Pop the embedded-choice stack.
    pub(crate) fn pop(&mut self) -> Result<(), MatchError> {
        let saved = self
            .stack
            .pop()
            .ok_or_else(|| MatchError::structural("choice stack popped while empty"))?;
        self.restore(saved);
        Ok(())
    }

    /// Reset for a fresh starting point.
    pub(crate) fn clear(&mut self) {
        self.state.clear();
        self.choose_next = true;
        self.need_push = false;
    }

    /// Drop checkpoints (start-of-search hygiene).
    pub(crate) fn clear_stack(&mut self) {
        self.stack.clear();
    }
}

impl MatchEngine<'_> {
    /// Cursor for `ptm`, starting at the first alternative on first visit.
    fn curr_choice(&mut self, ptm: TermId) -> usize {
        match self.choice.state.get(&ptm) {
            Some(&i) => i,
            None => {
                self.choice.choose_next = false;
                0
            }
        }
    }

    /// Whether `ptm` still holds a live choice cursor.
    pub(crate) fn have_choice(&self, ptm: TermId) -> bool {
        self.choice.state.contains_key(&ptm)
    }

    /// Compare a choice construct: try alternatives in order from the
    /// resumed cursor until one grounds the candidate.
    pub(crate) fn choice_compare(&mut self, ptm: TermId, hg: AtomId) -> Result<bool, MatchError> {
        let hp = self.pattern.term_atom(ptm);
        let osp: Vec<TermId> = self.pattern.term(ptm).children().to_vec();

        let iend = osp.len();
        let mut icurr = self.curr_choice(ptm);
        trace!(?ptm, icurr, iend, "resume choice search");

        if self.choice.choose_next {
            icurr += 1;
            self.choice.choose_next = false;
        }

        while icurr < iend {
            self.solution_push();
            let alternative = osp[icurr];
            trace!(?ptm, icurr, "try choice alternative");

            if self.tree_compare(alternative, hg, Caller::Choice)? {
                if self.policy.post_link_match(hp, hg) {
                    // Even the stack without erasing the groundings.
                    self.solution_drop()?;
                    self.record_grounding(ptm, hg);
                    self.choice.state.insert(ptm, icurr);
                    return Ok(true);
                }
            } else {
                self.policy.post_link_mismatch(hp, hg);
            }
            self.solution_pop()?;
            self.choice.choose_next = false;
            icurr += 1;
        }

        // All alternatives explored.
        self.choice.state.remove(&ptm);
        Ok(false)
    }

    /// Branch driver for a choice construct at an exploration point: retry
    /// with the next alternative until the cursor exhausts.
    pub(crate) fn explore_choice_branches(
        &mut self,
        ptm: TermId,
        hg: AtomId,
        clause: hgql_common::ClauseId,
    ) -> Result<bool, MatchError> {
        trace!(?ptm, "begin choice branchpoint iteration");
        loop {
            let pushed = self.choice.need_push;
            if pushed {
                self.choice.push();
            }
            let matched = self.explore_single_branch(ptm, hg, clause)?;
            if pushed {
                self.choice.pop()?;
            }
            self.choice.need_push = false;

            if matched {
                return Ok(true);
            }
            trace!(?ptm, "step to next choice");
            self.choice.choose_next = true;
            if !self.have_choice(ptm) {
                break;
            }
        }
        trace!(?ptm, "exhausted all choice alternatives");
        Ok(false)
    }
}
