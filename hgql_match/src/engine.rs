//! Engine state and search lifecycle.
//!
//! All mutable search state lives here, versioned by two checkpoint stacks:
//! the solution stack (grounding maps only, pushed around every speculative
//! comparison) and the clause stack (grounding maps, issued set, choice and
//! permutation state, pushed when a grounded clause hands control to the
//! scheduler). Pushes and pops nest like parentheses; a pop from an empty
//! stack is a structural violation, never silently ignored.

use std::collections::{HashMap, HashSet};

use hgql_common::{AtomId, ClauseId, GraphStore, Pattern, TermId};
use tracing::debug;

use crate::choice::ChoiceState;
use crate::error::MatchError;
use crate::glob::GlobState;
use crate::grounding::{ClauseGroundingMap, Grounding, GroundingMap, SolutionFrame};
use crate::perm::PermState;
use crate::policy::MatchPolicy;

/// The clause the scheduler selected next, and the grounded variable that
/// joins it to the already-explored region.
#[derive(Clone, Copy, Debug)]
pub(crate) struct NextClause {
    pub(crate) clause: ClauseId,
    pub(crate) joint: AtomId,
}

/// One clause-level checkpoint: everything a clause traversal can disturb.
#[derive(Clone, Debug)]
struct ClauseFrame {
    solution: SolutionFrame,
    issued: HashSet<ClauseId>,
    choice: HashMap<TermId, usize>,
    perm: crate::perm::PermFrame,
}

/// Signature used to deduplicate delivered solutions.
type SolutionSignature = (Vec<(AtomId, Grounding)>, Vec<(AtomId, Option<AtomId>)>);

/// The backtracking pattern-match engine.
///
/// Configure once with a store, a policy and a compiled pattern, then invoke
/// [`MatchEngine::search`] for every starting point proposed by a search
/// initiator. The engine is single-threaded and purely synchronous; it
/// reports each complete grounding to the policy's solution sink and keeps
/// backtracking until the space is exhausted or the sink requests a halt.
pub struct MatchEngine<'e> {
    pub(crate) store: &'e dyn GraphStore,
    pub(crate) policy: &'e mut (dyn MatchPolicy + 'e),
    pub(crate) pattern: &'e Pattern,

    // Current groundings, plus the stack that versions them.
    pub(crate) var_grounding: GroundingMap,
    pub(crate) clause_grounding: ClauseGroundingMap,
    solution_stack: Vec<SolutionFrame>,

    // Clause scheduling state.
    pub(crate) issued: HashSet<ClauseId>,
    clause_stack: Vec<ClauseFrame>,
    pub(crate) next: Option<NextClause>,
    pub(crate) clause_accepted: bool,

    // Construct-specific cursors.
    pub(crate) choice: ChoiceState,
    pub(crate) perm: PermState,
    pub(crate) glob_state: HashMap<TermId, GlobState>,

    // Universal-clause bookkeeping.
    pub(crate) forall_state: bool,
    pub(crate) did_check_forall: bool,
    pub(crate) ground_cache: Vec<SolutionFrame>,

    // Delivery bookkeeping.
    reported: HashSet<SolutionSignature>,
    solutions: usize,
}

impl<'e> MatchEngine<'e> {
    /// Configure an engine for one compiled pattern.
    pub fn new(
        store: &'e dyn GraphStore,
        policy: &'e mut (dyn MatchPolicy + 'e),
        pattern: &'e Pattern,
    ) -> Self {
        MatchEngine {
            store,
            policy,
            pattern,
            var_grounding: GroundingMap::new(),
            clause_grounding: ClauseGroundingMap::new(),
            solution_stack: Vec::new(),
            issued: HashSet::new(),
            clause_stack: Vec::new(),
            next: None,
            clause_accepted: false,
            choice: ChoiceState::default(),
            perm: PermState::default(),
            glob_state: HashMap::new(),
            forall_state: true,
            did_check_forall: false,
            ground_cache: Vec::new(),
            reported: HashSet::new(),
            solutions: 0,
        }
    }

    /// Explore the neighborhood of one proposed starting point.
    ///
    /// `start_term` must be an atom occurring in `start_clause`, and
    /// `start_ground` the stored candidate proposed as its grounding. The
    /// returned flag is the solution sink's halt signal: true means stop
    /// feeding further starting points. A search that reports nothing is an
    /// ordinary `Ok(false)`.
    pub fn search(
        &mut self,
        start_term: AtomId,
        start_ground: AtomId,
        start_clause: ClauseId,
    ) -> Result<bool, MatchError> {
        debug!(%start_term, %start_ground, "begin neighborhood search");
        self.clause_stacks_clear();
        let halt = self.explore_redex(start_term, start_ground, start_clause)?;
        let stop = self.report_forall();
        debug!(halt, stop, solutions = self.solutions, "search finished");
        Ok(halt || stop)
    }

    /// Number of solutions delivered to the sink since configuration.
    pub fn solutions_reported(&self) -> usize {
        self.solutions
    }

    /// Decide a pattern whose clauses are all constant evaluatable terms:
    /// evaluate each once, and report the empty grounding if all hold.
    pub fn evaluate_constants(&mut self) -> Result<bool, MatchError> {
        let pattern = self.pattern;
        let mut found = true;
        for clause in pattern.clauses() {
            if clause.is_evaluatable() {
                found = self
                    .policy
                    .evaluate_sentence(clause.root(), &GroundingMap::new());
                if !found {
                    break;
                }
            }
        }
        if found {
            self.report_grounding(&GroundingMap::new(), &ClauseGroundingMap::new());
        }
        Ok(found)
    }

    /// Reset per-start traversal state and match the first clause.
    fn explore_redex(
        &mut self,
        term: AtomId,
        grnd: AtomId,
        clause: ClauseId,
    ) -> Result<bool, MatchError> {
        self.clear_current_state();
        self.issued.insert(clause);
        self.explore_clause(term, grnd, clause)
    }

    /// Clear traversal state so a fresh set of clauses can be walked.
    fn clear_current_state(&mut self) {
        self.var_grounding.clear();
        self.clause_grounding.clear();
        self.choice.clear();
        self.perm.clear();
        self.glob_state.clear();
        self.issued.clear();
    }

    // ------------------------------------------------------------------
    // Solution checkpoints.

    /// Save both grounding maps.
    pub(crate) fn solution_push(&mut self) {
        self.solution_stack.push(SolutionFrame {
            vars: self.var_grounding.clone(),
            clauses: self.clause_grounding.clone(),
        });
    }

    /// Restore the grounding maps saved by the matching push.
    pub(crate) fn solution_pop(&mut self) -> Result<(), MatchError> {
        let frame = self
            .solution_stack
            .pop()
            .ok_or_else(|| MatchError::structural("solution stack popped while empty"))?;
        self.var_grounding = frame.vars;
        self.clause_grounding = frame.clauses;
        Ok(())
    }

    /// Discard the top checkpoint, keeping the current groundings.
    pub(crate) fn solution_drop(&mut self) -> Result<(), MatchError> {
        self.solution_stack
            .pop()
            .ok_or_else(|| MatchError::structural("solution stack dropped while empty"))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Clause checkpoints.

    /// Save everything a clause traversal can disturb, then hand the
    /// permutation machinery a clean slate for the next clause.
    pub(crate) fn clause_stacks_push(&mut self) {
        self.clause_stack.push(ClauseFrame {
            solution: SolutionFrame {
                vars: self.var_grounding.clone(),
                clauses: self.clause_grounding.clone(),
            },
            issued: self.issued.clone(),
            choice: self.choice.checkpoint(),
            perm: self.perm.checkpoint(),
        });
        self.perm.reset_scalars();
        self.policy.push();
    }

    /// Restore the checkpoint saved by the matching push.
    pub(crate) fn clause_stacks_pop(&mut self) -> Result<(), MatchError> {
        self.policy.pop();
        let frame = self
            .clause_stack
            .pop()
            .ok_or_else(|| MatchError::structural("clause stack popped while empty"))?;
        self.var_grounding = frame.solution.vars;
        self.clause_grounding = frame.solution.clauses;
        self.issued = frame.issued;
        self.choice.restore(frame.choice);
        self.perm.restore(frame.perm);
        Ok(())
    }

    /// Unconditionally drop every traversal stack. Called once per starting
    /// point; with balanced traversal these are already empty.
    fn clause_stacks_clear(&mut self) {
        self.solution_stack.clear();
        self.clause_stack.clear();
        self.choice.clear_stack();
        self.perm.clear_stacks();
    }

    // ------------------------------------------------------------------
    // Delivery.

    /// Hand one complete grounding to the sink, or buffer it while
    /// universal clauses are pending. Returns the sink's halt flag.
    pub(crate) fn report_grounding(
        &mut self,
        vars: &GroundingMap,
        clauses: &ClauseGroundingMap,
    ) -> bool {
        if !self.pattern.has_always() {
            return self.deliver(vars, clauses);
        }
        // Universal clauses defer reporting; a branch that already failed
        // one is not worth caching.
        if !self.forall_state {
            return false;
        }
        self.ground_cache.push(SolutionFrame {
            vars: vars.clone(),
            clauses: clauses.clone(),
        });
        false
    }

    /// Flush solutions buffered behind universal clauses, if every check
    /// held. Returns the sink's halt flag.
    pub(crate) fn report_forall(&mut self) -> bool {
        if !self.pattern.has_always() {
            return false;
        }
        let mut halt = false;
        if self.forall_state {
            let cached = std::mem::take(&mut self.ground_cache);
            for frame in cached {
                halt = self.deliver(&frame.vars, &frame.clauses);
                if halt {
                    break;
                }
            }
        }
        self.forall_state = true;
        self.ground_cache.clear();
        halt
    }

    /// Deduplicated sink delivery. Coincident permutations of a commutative
    /// construct can reproduce a grounding already reported; those collapse
    /// here.
    fn deliver(&mut self, vars: &GroundingMap, clauses: &ClauseGroundingMap) -> bool {
        let sig = self.signature(vars, clauses);
        if !self.reported.insert(sig) {
            debug!("suppressing duplicate solution");
            return false;
        }
        self.solutions += 1;
        self.policy.grounding(vars, clauses)
    }

    fn signature(&self, vars: &GroundingMap, clauses: &ClauseGroundingMap) -> SolutionSignature {
        let mut vs: Vec<(AtomId, Grounding)> = vars
            .iter()
            .filter(|(a, _)| self.pattern.is_declared_var(*a))
            .map(|(a, g)| (a, g.clone()))
            .collect();
        vs.sort_by_key(|(a, _)| *a);
        let mut cs: Vec<(AtomId, Option<AtomId>)> = clauses.iter().collect();
        cs.sort_by_key(|(a, _)| *a);
        (vs, cs)
    }
}
