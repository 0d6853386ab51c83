//! Permutation odometer for commutative constructs.
//!
//! Each commutative occurrence keeps a cursor over the permutations of its
//! children. When several such constructs are siblings or nest, they must
//! advance like the digits of an odometer: the designated stepper exhausts
//! its permutations before any construct to its "left" moves, and an
//! ancestor stepping re-opens ("goes around") cousins that had already
//! reported exhaustion. The stepper designation travels through
//! `to_step`; exhausted steppers hand the obligation back through the
//! saver stack.

use std::collections::HashMap;

use hgql_common::{AtomId, TermId};
use tracing::{debug, trace};

use crate::compare::Caller;
use crate::engine::MatchEngine;
use crate::error::MatchError;

/// Per-occurrence "done" flags of the commutative constructs discovered
/// beneath an occurrence. A construct wraps its flag to true when it has
/// cycled through every permutation.
pub(crate) type PermOdometer = HashMap<TermId, bool>;

/// All permutation-search state, bundled so checkpoints move it atomically.
#[derive(Clone, Debug, Default)]
pub(crate) struct PermState {
    /// Current permutation per live commutative occurrence.
    pub(crate) state: HashMap<TermId, Vec<TermId>>,
    /// The occurrence whose turn it is to advance.
    pub(crate) to_step: Option<TermId>,
    /// Set when the next comparison pass must advance `to_step`.
    pub(crate) take_step: bool,
    /// Set when a satisfied construct still has unexplored permutations.
    pub(crate) have_more: bool,
    /// Set when an exhausted construct must be re-opened because an
    /// ancestor or elder sibling advanced.
    pub(crate) go_around: bool,
    /// Stepping stops here while exploring upward branches.
    pub(crate) breakout: Option<TermId>,
    /// Earlier steppers, resumed when the current one exhausts.
    pub(crate) step_saver: Vec<TermId>,
    /// Odometer of the constructs beneath the occurrence being compared.
    pub(crate) odo: PermOdometer,
    /// Odometer of the parent occurrence, saved across nesting.
    pub(crate) podo: PermOdometer,
    /// Saved odometer per occurrence, restored on revisit.
    pub(crate) odo_state: HashMap<TermId, PermOdometer>,
    /// Branch checkpoints (see [`MatchEngine`] upward exploration).
    stack: Vec<PermFrame>,
}

/// One permutation checkpoint.
#[derive(Clone, Debug)]
pub(crate) struct PermFrame {
    state: HashMap<TermId, Vec<TermId>>,
    to_step: Option<TermId>,
    take_step: bool,
    have_more: bool,
    breakout: Option<TermId>,
    odo_state: HashMap<TermId, PermOdometer>,
}

impl PermState {
    /// Snapshot everything a branch exploration may disturb.
    pub(crate) fn checkpoint(&self) -> PermFrame {
        PermFrame {
            state: self.state.clone(),
            to_step: self.to_step,
            take_step: self.take_step,
            have_more: self.have_more,
            breakout: self.breakout,
            odo_state: self.odo_state.clone(),
        }
    }

    /// Restore a snapshot taken by [`PermState::checkpoint`].
    pub(crate) fn restore(&mut self, frame: PermFrame) {
        self.state = frame.state;
        self.to_step = frame.to_step;
        self.take_step = frame.take_step;
        self.have_more = frame.have_more;
        self.breakout = frame.breakout;
        self.odo_state = frame.odo_state;
        self.go_around = false;
    }

    /// Push the current state onto the branch stack.
    pub(crate) fn push(&mut self) {
        let frame = self.checkpoint();
        self.stack.push(frame);
    }

    /// Pop the branch stack.
    pub(crate) fn pop(&mut self) -> Result<(), MatchError> {
        let frame = self
            .stack
            .pop()
            .ok_or_else(|| MatchError::structural("permutation stack popped while empty"))?;
        self.restore(frame);
        Ok(())
    }

    /// Scalar reset applied when a grounded clause hands control onward;
    /// the per-occurrence permutation map survives.
    pub(crate) fn reset_scalars(&mut self) {
        self.to_step = None;
        self.take_step = false;
        self.have_more = false;
        self.breakout = None;
        self.go_around = false;
        self.odo.clear();
        self.podo.clear();
    }

    /// Full reset for a fresh starting point.
    pub(crate) fn clear(&mut self) {
        self.state.clear();
        self.odo_state.clear();
        self.step_saver.clear();
        self.reset_scalars();
    }

    /// Drop branch checkpoints (start-of-search hygiene).
    pub(crate) fn clear_stacks(&mut self) {
        self.stack.clear();
        self.step_saver.clear();
    }
}

/// Advance `seq` to its lexicographic successor. Returns false (leaving the
/// sequence sorted ascending) when the last permutation was already reached.
pub(crate) fn next_permutation<T: Ord>(seq: &mut [T]) -> bool {
    if seq.len() < 2 {
        return false;
    }
    let mut i = seq.len() - 1;
    while i > 0 && seq[i - 1] >= seq[i] {
        i -= 1;
    }
    if i == 0 {
        seq.reverse();
        return false;
    }
    let mut j = seq.len() - 1;
    while seq[j] <= seq[i - 1] {
        j -= 1;
    }
    seq.swap(i - 1, j);
    seq[i..].reverse();
    true
}

impl MatchEngine<'_> {
    /// The saved permutation for `ptm`, or a fresh sorted one, claiming the
    /// stepper role on first visit.
    pub(crate) fn curr_perm(&mut self, ptm: TermId) -> Vec<TermId> {
        if let Some(p) = self.perm.state.get(&ptm) {
            return p.clone();
        }
        trace!(?ptm, "fresh unordered term");
        let mut perm: Vec<TermId> = self.pattern.term(ptm).children().to_vec();
        perm.sort();
        self.perm.take_step = false;

        // This occurrence becomes the stepper; the previous stepper waits
        // on the saver stack until this one exhausts.
        if let Some(prev) = self.perm.to_step {
            self.perm.step_saver.push(prev);
        }
        self.perm.to_step = Some(ptm);

        // Announce ourselves to any enclosing unordered construct.
        self.perm.podo.entry(ptm).or_insert(false);
        perm
    }

    /// Whether `ptm` still holds unexplored permutation state.
    pub(crate) fn have_perm(&self, ptm: TermId) -> bool {
        self.perm.state.contains_key(&ptm)
    }

    /// Compare an unordered (commutative) construct against a candidate,
    /// permutation by permutation, coordinating with sibling and ancestor
    /// constructs through the odometer state.
    pub(crate) fn unordered_compare(
        &mut self,
        ptm: TermId,
        hg: AtomId,
    ) -> Result<bool, MatchError> {
        let store = self.store;
        let hp = self.pattern.term_atom(ptm);
        let osg: Vec<AtomId> = store.atom(hg).children().to_vec();
        let osp: Vec<TermId> = self.pattern.term(ptm).children().to_vec();
        let arity = osp.len();
        let has_glob = self.pattern.is_globby_holder(hp);

        // Without a glob the arities must agree; fall back to fuzzy
        // matching instead of permutation search.
        if osg.len() != arity && !has_glob {
            return Ok(self.policy.fuzzy_match(hp, hg));
        }

        debug_assert!(
            !(self.perm.take_step && self.perm.have_more),
            "stepping and have-more are mutually exclusive"
        );

        // Expose our odometer to descendants; save the parent's.
        let save_podo = std::mem::take(&mut self.perm.podo);
        self.perm.podo = self.perm.odo.clone();

        let mut mutation = self.curr_perm(ptm);
        self.perm.odo = self.perm.odo_state.get(&ptm).cloned().unwrap_or_default();

        loop {
            self.solution_push();
            let stepping = self.perm.take_step && self.perm.to_step == Some(ptm);

            if !stepping {
                trace!(?ptm, "explore unordered permutation");
                let matched = if has_glob {
                    // Each permutation starts from the same glob state.
                    let saved_glob = self.glob_state.clone();
                    let m = self.glob_compare(ptm, &mutation, &osg)?;
                    self.glob_state = saved_glob;
                    m
                } else {
                    let mut m = true;
                    for (i, &child) in mutation.iter().enumerate() {
                        if !self.tree_compare(child, osg[i], Caller::Unorder)? {
                            m = false;
                            break;
                        }
                    }
                    m
                };

                debug_assert!(
                    !(self.perm.take_step && self.perm.have_more),
                    "callee corrupted permutation flags"
                );

                // Somebody else is the stepper; just report what we saw.
                if self.perm.take_step && self.perm.to_step != Some(ptm) {
                    trace!(?ptm, stepper = ?self.perm.to_step, "not our turn to step");
                    self.solution_drop()?;
                    self.perm.odo = std::mem::take(&mut self.perm.podo);
                    self.perm.podo = save_podo;
                    return Ok(matched);
                }

                if matched {
                    if self.policy.post_link_match(hp, hg) {
                        // Even the stack without erasing the groundings.
                        self.solution_drop()?;
                        self.record_grounding(ptm, hg);
                        debug!(?ptm, "good permutation");
                        self.perm.state.insert(ptm, mutation);
                        self.perm.have_more = true;
                        self.perm.go_around = false;
                        self.perm.odo_state.insert(ptm, self.perm.odo.clone());
                        self.perm.odo = std::mem::take(&mut self.perm.podo);
                        self.perm.podo = save_podo;
                        return Ok(true);
                    }
                } else {
                    self.policy.post_link_mismatch(hp, hg);
                }

                // Odometer go-around: we may have wrapped first, but some
                // other wheel moved, so our combinations are live again.
                if self.perm.go_around {
                    let not_done = self
                        .perm
                        .odo
                        .iter()
                        .any(|(&term, &done)| term != ptm && !done);
                    if not_done {
                        trace!(?ptm, "go around");
                        self.perm.go_around = false;
                        self.perm.have_more = true;
                        self.perm.state.insert(ptm, mutation);
                        self.solution_pop()?;
                        self.perm.odo_state.insert(ptm, self.perm.odo.clone());
                        self.perm.odo = std::mem::take(&mut self.perm.podo);
                        self.perm.podo = save_podo;
                        return Ok(false);
                    }
                }

                trace!(?ptm, "bad permutation");
            }

            // Take the step.
            self.perm.take_step = false;
            self.perm.have_more = false;
            self.solution_pop()?;

            // Constructs beneath us restart from a clean slate when we
            // advance.
            let below: Vec<TermId> = self
                .perm
                .state
                .keys()
                .copied()
                .filter(|&t| self.pattern.is_descendant(t, ptm))
                .collect();
            for t in below {
                self.perm.state.remove(&t);
            }
            self.perm.odo.clear();
            self.perm.odo_state.insert(ptm, PermOdometer::new());

            if !next_permutation(&mut mutation) {
                break;
            }
        }

        // Every permutation explored.
        debug!(?ptm, "exhausted all permutations");
        self.perm.state.remove(&ptm);
        self.perm.have_more = false;
        self.perm.to_step = None;

        if let Some(saved) = self.perm.step_saver.pop() {
            // Hand the step obligation back, and ask ancestors to re-try
            // cousins that already wrapped.
            self.perm.to_step = Some(saved);
            self.perm.have_more = true;
            self.perm.go_around = true;
        }

        // Tell the enclosing construct we wrapped, then restore its view.
        self.perm.podo.insert(ptm, true);
        self.perm.odo = std::mem::take(&mut self.perm.podo);
        self.perm.podo = save_podo;

        Ok(false)
    }
}
