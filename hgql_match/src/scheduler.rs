//! Clause scheduling: which clause to pursue next, and acceptance of
//! grounded clauses.
//!
//! Clauses move through unissued → issued → grounded. Selection runs in
//! strict priority tiers: plain mandatory clauses, then fast evaluatable,
//! then black-box, the same three again admitting optionals, and finally
//! universal clauses. Within a tier the joint is the grounded variable with
//! the smallest reverse-reference set (the thinnest pivot), and among the
//! clauses it reaches, the one with the fewest still-ungrounded variables;
//! remaining ties fall to discovery order.

use std::collections::HashSet;

use hgql_common::{AtomId, ClauseId, CompiledClause, Modality};
use itertools::Itertools;
use tracing::debug;

use crate::engine::{MatchEngine, NextClause};
use crate::error::MatchError;
use crate::grounding::Grounding;

impl MatchEngine<'_> {
    /// A clause has been traversed to its root: let the policy make the
    /// final call, record the grounding, and move on to the next clause.
    pub(crate) fn clause_accept(&mut self, clause: ClauseId, hg: AtomId) -> Result<bool, MatchError> {
        let pattern = self.pattern;
        let cc = pattern.clause(clause);
        let root = cc.root();

        let matched = match cc.modality() {
            Modality::Optional => {
                self.clause_accepted = true;
                let m = self
                    .policy
                    .optional_clause_match(root, Some(hg), &self.var_grounding);
                debug!(m, "optional clause match callback");
                m
            }
            Modality::Always => {
                self.did_check_forall = true;
                let m = self
                    .policy
                    .always_clause_match(root, Some(hg), &self.var_grounding);
                self.forall_state = self.forall_state && m;
                debug!(m, "universal clause match callback");
                m
            }
            Modality::Mandatory => {
                let m = self.policy.clause_match(root, hg, &self.var_grounding);
                debug!(m, "clause match callback");
                m
            }
        };
        if !matched {
            return Ok(false);
        }

        if !cc.is_evaluatable() {
            self.clause_grounding.insert(root, Some(hg));
            debug!(%root, %hg, "clause grounded");
        }

        self.do_next_clause()
    }

    /// All previously selected clauses are grounded; pick the next one and
    /// pursue it, or report a complete solution if none remain.
    fn do_next_clause(&mut self) -> Result<bool, MatchError> {
        self.clause_stacks_push();
        self.get_next_untried_clause()?;

        let Some(next) = self.next else {
            // Nothing left to ground: a full solution.
            let vars = self.var_grounding.clone();
            let clauses = self.clause_grounding.clone();
            let found = self.report_grounding(&vars, &clauses);
            debug!(accepted = found, "all clauses grounded");
            self.clause_stacks_pop()?;
            return Ok(found);
        };

        let mut curr: Option<ClauseId> = Some(next.clause);
        debug!(clause = ?next.clause, joint = %next.joint, "next untried clause");

        // Resume from the joining variable's grounding; recursion stops
        // when the clause cannot be grounded.
        self.clause_accepted = false;
        let hgnd = self.joint_grounding(next.joint)?;
        let mut found = self.explore_clause(next.joint, hgnd, next.clause)?;

        // An optional clause whose search space is exhausted without any
        // acceptance is presented to the policy as absent. That may cascade
        // through several optionals, or complete the whole solution.
        while !found
            && !self.clause_accepted
            && curr.is_some_and(|c| self.pattern.clause(c).is_optional())
        {
            let c = curr.expect("loop condition checked");
            let root = self.pattern.clause(c).root();
            let matched = self
                .policy
                .optional_clause_match(root, None, &self.var_grounding);
            debug!(matched, "optional clause exhausted; absent check");
            if !matched {
                self.clause_stacks_pop()?;
                return Ok(false);
            }
            self.clause_grounding.insert(root, None);

            self.get_next_untried_clause()?;
            match self.next {
                None => {
                    curr = None;
                    let vars = self.var_grounding.clone();
                    let clauses = self.clause_grounding.clone();
                    found = self.report_grounding(&vars, &clauses);
                    debug!(accepted = found, "grounded with absent optionals");
                }
                Some(nx) => {
                    curr = Some(nx.clause);
                    self.clause_accepted = false;
                    let hgnd = self.joint_grounding(nx.joint)?;
                    found = self.explore_term_branches(nx.joint, hgnd, nx.clause)?;
                }
            }
        }

        self.clause_stacks_pop()?;
        Ok(found)
    }

    /// The joining atom's grounding; it must exist by construction.
    fn joint_grounding(&self, joint: AtomId) -> Result<AtomId, MatchError> {
        self.var_grounding
            .get(joint)
            .and_then(Grounding::as_atom)
            .ok_or_else(|| {
                MatchError::structural(format!("joining atom {joint} has no grounding"))
            })
    }

    /// Select the next unissued clause, widening the admitted kinds tier by
    /// tier. Universal clauses come last of all: by then every variable is
    /// grounded.
    fn get_next_untried_clause(&mut self) -> Result<(), MatchError> {
        let pattern = self.pattern;

        if self.next_thinnest(false, false, false) {
            return Ok(());
        }
        if pattern.has_evaluatable() {
            if self.next_thinnest(true, false, false) {
                return Ok(());
            }
            if pattern.has_black() && self.next_thinnest(true, true, false) {
                return Ok(());
            }
        }
        if pattern.has_optionals() {
            if self.next_thinnest(false, false, true) {
                return Ok(());
            }
            if pattern.has_evaluatable() {
                if self.next_thinnest(true, false, true) {
                    return Ok(());
                }
                if pattern.has_black() && self.next_thinnest(true, true, true) {
                    return Ok(());
                }
            }
        }

        for (i, cc) in pattern.clauses().iter().enumerate() {
            if !cc.is_always() {
                continue;
            }
            let cid = ClauseId::new(i as u32);
            if self.issued.contains(&cid) {
                continue;
            }
            let joint = cc
                .free_vars()
                .iter()
                .copied()
                .find(|v| self.var_grounding.contains(*v))
                .ok_or_else(|| {
                    MatchError::structural("universal clause has no grounded variable to join on")
                })?;
            self.issued.insert(cid);
            self.next = Some(NextClause { clause: cid, joint });
            return Ok(());
        }

        self.next = None;
        Ok(())
    }

    /// One selection tier. The flags admit evaluatable, black-box and
    /// optional clauses respectively.
    fn next_thinnest(
        &mut self,
        search_eval: bool,
        search_black: bool,
        search_optionals: bool,
    ) -> bool {
        let pattern = self.pattern;
        let store = self.store;

        let mut thinnest_clause = usize::MAX;
        let mut thinnest_joint = usize::MAX;
        let mut unsolved: Option<NextClause> = None;

        // Split variables into grounded pivots (weighted by the size of
        // their grounding's reverse-reference set) and the still-ungrounded
        // rest.
        let mut ungrounded: HashSet<AtomId> = HashSet::new();
        let mut pivots: Vec<(usize, AtomId)> = Vec::new();
        for &v in pattern.varset() {
            match self.var_grounding.get(v) {
                Some(g) => {
                    if pattern.is_glob(v) {
                        // A glob cannot join on its own; pivot on the
                        // smallest grounded composite embedding it, if any.
                        let Some(embed) = self.glob_embedding(v) else {
                            continue;
                        };
                        let Some(tg) =
                            self.var_grounding.get(embed).and_then(Grounding::as_atom)
                        else {
                            continue;
                        };
                        pivots.push((store.incoming(tg).len(), embed));
                    } else if let Some(a) = g.as_atom() {
                        pivots.push((store.incoming(a).len(), v));
                    }
                }
                None => {
                    ungrounded.insert(v);
                }
            }
        }

        // Thinnest pivot first; the stable sort keeps declaration order
        // among equally thin pivots.
        for (size, pursue) in pivots.into_iter().sorted_by_key(|(size, _)| *size) {
            if size > thinnest_joint {
                break;
            }
            for &cid in pattern.connectivity(pursue) {
                let cc = pattern.clause(cid);
                if self.issued.contains(&cid)
                    || cc.is_always()
                    || (!search_eval && cc.is_evaluatable())
                    || (!search_black && cc.is_black())
                    || (!search_optionals && cc.is_optional())
                {
                    continue;
                }
                let width = Self::thickness(cc, &ungrounded);
                if width < thinnest_clause {
                    thinnest_clause = width;
                    thinnest_joint = size;
                    unsolved = Some(NextClause {
                        clause: cid,
                        joint: pursue,
                    });
                }
            }
        }

        if let Some(nx) = unsolved {
            self.issued.insert(nx.clause);
            self.next = Some(nx);
            return true;
        }
        false
    }

    /// Number of still-ungrounded variables in a clause. With fewer than
    /// two live variables overall, any clause is equally good.
    fn thickness(clause: &CompiledClause, ungrounded: &HashSet<AtomId>) -> usize {
        if ungrounded.len() < 2 {
            return 1;
        }
        clause
            .free_vars()
            .iter()
            .filter(|v| ungrounded.contains(*v))
            .count()
    }

    /// The smallest grounded composite embedding a grounded glob, used as
    /// its stand-in pivot. `None` when nothing suitable is grounded yet.
    fn glob_embedding(&self, glob: AtomId) -> Option<AtomId> {
        let pattern = self.pattern;

        // Some clause containing the glob must still be ungrounded,
        // otherwise there is nothing to join.
        let cid = pattern
            .connectivity(glob)
            .iter()
            .copied()
            .find(|c| !self.issued.contains(c))?;

        for &ptm in pattern.connected_terms(glob, cid)? {
            let Some(parent) = pattern.term(ptm).parent() else {
                continue;
            };
            let embed = pattern.term_atom(parent);
            if self.var_grounding.contains(embed) && pattern.connectivity(embed).len() > 1 {
                return Some(embed);
            }
        }
        None
    }
}
