//! Search initiation.
//!
//! The engine explores outward from a proposed (term, candidate, clause)
//! triple; something has to propose those. Initiation heuristics are
//! external collaborators, but this minimal initiator covers the common
//! setups: start from the rarest constant in a matchable clause, fall back
//! to enumerating candidates for a variable, and decide constant evaluatable
//! patterns outright.

use hgql_common::{Atom, AtomId, ClauseId, GraphStore, Pattern, TermId};
use tracing::debug;

use crate::engine::MatchEngine;
use crate::error::MatchError;

/// Default starting-point chooser.
pub struct SearchInitiator<'s> {
    store: &'s dyn GraphStore,
}

impl<'s> SearchInitiator<'s> {
    /// Initiator over `store`.
    pub fn new(store: &'s dyn GraphStore) -> Self {
        SearchInitiator { store }
    }

    /// Drive `engine` from the best starting points this initiator can
    /// find. Returns the sink's halt flag.
    pub fn initiate(
        &self,
        pattern: &Pattern,
        engine: &mut MatchEngine<'_>,
    ) -> Result<bool, MatchError> {
        // Constants inside matchable clauses anchor the cheapest searches:
        // each grounds itself, and exploration fans out over its reverse
        // references. Thinnest first; constants under choice alternatives
        // make later starts necessary, and re-found solutions deduplicate
        // in the engine.
        let starts = self.constant_starts(pattern);
        if !starts.is_empty() {
            for (clause, constant) in starts {
                debug!(%constant, "neighbor search from constant");
                if engine.search(constant, constant, clause)? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }

        // No constants anywhere: enumerate candidates for a variable.
        if let Some((clause, var)) = self.variable_start(pattern) {
            debug!(%var, "variable search");
            for cand in self.store.atoms() {
                if matches!(
                    self.store.atom(cand),
                    Atom::Variable { .. } | Atom::Glob { .. }
                ) {
                    continue;
                }
                if engine.search(var, cand, clause)? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }

        // No variables either: evaluatable clauses are decided directly,
        // and constant matchable clauses ground themselves.
        if pattern.clauses().iter().all(|c| c.is_evaluatable()) {
            debug!("constant evaluatable pattern");
            return engine.evaluate_constants();
        }
        if let Some((i, cc)) = pattern
            .clauses()
            .iter()
            .enumerate()
            .find(|(_, c)| !c.is_evaluatable())
        {
            return engine.search(cc.root(), cc.root(), ClauseId::new(i as u32));
        }
        Ok(false)
    }

    /// Constant leaves of the matchable non-optional clauses, ordered by
    /// the size of their reverse-reference sets.
    fn constant_starts(&self, pattern: &Pattern) -> Vec<(ClauseId, AtomId)> {
        let mut starts: Vec<(usize, ClauseId, AtomId)> = Vec::new();
        for (i, cc) in pattern.clauses().iter().enumerate() {
            if cc.is_evaluatable() || cc.is_optional() || cc.is_always() {
                continue;
            }
            let cid = ClauseId::new(i as u32);
            let mut leaves = Vec::new();
            self.constant_leaves(pattern, cc.root_term(), &mut leaves);
            for atom in leaves {
                if starts.iter().any(|&(_, c, a)| c == cid && a == atom) {
                    continue;
                }
                starts.push((self.store.incoming(atom).len(), cid, atom));
            }
        }
        starts.sort_by_key(|&(width, _, _)| width);
        starts
            .into_iter()
            .map(|(_, cid, atom)| (cid, atom))
            .collect()
    }

    /// Collect constant leaf atoms beneath `term`.
    fn constant_leaves(&self, pattern: &Pattern, term: TermId, out: &mut Vec<AtomId>) {
        let t = pattern.term(term);
        let atom = t.atom();
        match self.store.atom(atom) {
            Atom::Node { .. } => out.push(atom),
            Atom::Variable { .. } | Atom::Glob { .. } => {}
            Atom::Link { .. } => {
                for &child in t.children() {
                    self.constant_leaves(pattern, child, out);
                }
            }
        }
    }

    /// A clause and one of its free variables to enumerate candidates for;
    /// matchable clauses are preferred over evaluatable ones.
    fn variable_start(&self, pattern: &Pattern) -> Option<(ClauseId, AtomId)> {
        let pick = |want_matchable: bool| {
            pattern.clauses().iter().enumerate().find_map(|(i, cc)| {
                if cc.is_evaluatable() == want_matchable || cc.is_optional() || cc.is_always() {
                    return None;
                }
                let var = *cc.free_vars().iter().find(|v| !pattern.is_glob(**v))?;
                Some((ClauseId::new(i as u32), var))
            })
        };
        pick(true).or_else(|| pick(false))
    }
}
