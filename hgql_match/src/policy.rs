//! The callback surface the engine drives, and a default implementation.
//!
//! The engine never decides acceptance on its own: every node, link, clause
//! and solution passes through a [`MatchPolicy`]. Custom policies implement
//! the same trait; hooks that most policies leave alone carry defaults.

use hgql_common::{Atom, AtomId, GraphStore, LinkTag, Pattern};
use tracing::trace;

use crate::grounding::{ClauseGroundingMap, Grounding, GroundingMap};
use crate::scratch::{EvalFrame, ScratchPool};

/// Acceptance callbacks and hooks consulted during matching.
///
/// All methods take `&mut self`: policies are free to accumulate state (the
/// solution sink being the obvious case). The engine calls these from a
/// single thread, in search order.
pub trait MatchPolicy {
    /// May the pattern node `pat` be grounded by the candidate node `cand`?
    fn node_match(&mut self, pat: AtomId, cand: AtomId) -> bool {
        pat == cand
    }

    /// May the declared variable `var` be grounded by `cand`?
    fn variable_match(&mut self, var: AtomId, cand: AtomId) -> bool;

    /// Comparison of a variable that is *not* declared in this pattern
    /// (it is bound in some nested scope).
    fn scope_match(&mut self, var: AtomId, cand: AtomId) -> bool {
        var == cand
    }

    /// Cheap type/arity veto before a link's children are compared.
    fn link_match(&mut self, pat: AtomId, cand: AtomId) -> bool;

    /// Last-resort comparison when structural matching cannot proceed
    /// (mismatched arity without a glob, leaf versus composite).
    fn fuzzy_match(&mut self, pat: AtomId, cand: AtomId) -> bool {
        let _ = (pat, cand);
        false
    }

    /// Inspect an otherwise successful link grounding; returning false
    /// vetoes it.
    fn post_link_match(&mut self, pat: AtomId, cand: AtomId) -> bool {
        let _ = (pat, cand);
        true
    }

    /// Observe a failed link grounding.
    fn post_link_mismatch(&mut self, pat: AtomId, cand: AtomId) {
        let _ = (pat, cand);
    }

    /// Final say on a grounded mandatory clause.
    fn clause_match(&mut self, root: AtomId, cand: AtomId, grounding: &GroundingMap) -> bool {
        let _ = (root, cand, grounding);
        true
    }

    /// Decide an optional clause: `cand` is the grounding found, or `None`
    /// when every possibility was exhausted and the clause is presented as
    /// absent.
    fn optional_clause_match(
        &mut self,
        root: AtomId,
        cand: Option<AtomId>,
        grounding: &GroundingMap,
    ) -> bool;

    /// Decide one grounding of a universally quantified clause; `None`
    /// reports that no grounding exists for the current bindings.
    fn always_clause_match(
        &mut self,
        root: AtomId,
        cand: Option<AtomId>,
        grounding: &GroundingMap,
    ) -> bool;

    /// Evaluate an externally decided sentence (a predicate, or a crisp
    /// connective expression over predicates) under the current bindings.
    fn evaluate_sentence(&mut self, root: AtomId, grounding: &GroundingMap) -> bool;

    /// Reverse-reference lookup for upward exploration. Policies usually
    /// delegate to their store; filtering here narrows the search.
    fn incoming_set(&mut self, cand: AtomId) -> Vec<AtomId>;

    /// Deliver one complete solution. Returning true halts the entire
    /// search.
    fn grounding(&mut self, vars: &GroundingMap, clauses: &ClauseGroundingMap) -> bool;

    /// Paired with [`MatchPolicy::pop`] around each clause checkpoint, for
    /// policies that keep their own stacked state.
    fn push(&mut self) {}

    /// See [`MatchPolicy::push`].
    fn pop(&mut self) {}
}

/// Evaluator invoked for predicate leaves of evaluatable sentences.
pub type PredicateEval<'a> = Box<dyn FnMut(AtomId, &EvalFrame) -> bool + 'a>;

/// Sink invoked per reported solution; returns the halt flag.
pub type SolutionSink<'a> = Box<dyn FnMut(&GroundingMap, &ClauseGroundingMap) -> bool + 'a>;

/// Canonical policy: structural identity for nodes, tag/arity veto for
/// links, absence semantics for optional clauses, and crisp `And`/`Or`/`Not`
/// evaluation over caller-supplied predicate leaves.
pub struct DefaultPolicy<'a> {
    store: &'a dyn GraphStore,
    pattern: &'a Pattern,
    scratch: &'a ScratchPool,
    evaluate: PredicateEval<'a>,
    on_solution: SolutionSink<'a>,
    optionals_present: bool,
}

impl<'a> DefaultPolicy<'a> {
    /// Policy with a rejecting evaluator and a collect-nothing sink; use the
    /// builder methods to install real ones.
    pub fn new(store: &'a dyn GraphStore, pattern: &'a Pattern, scratch: &'a ScratchPool) -> Self {
        DefaultPolicy {
            store,
            pattern,
            scratch,
            evaluate: Box::new(|_, _| false),
            on_solution: Box::new(|_, _| false),
            optionals_present: false,
        }
    }

    /// Install the predicate evaluator.
    pub fn with_evaluator(mut self, f: impl FnMut(AtomId, &EvalFrame) -> bool + 'a) -> Self {
        self.evaluate = Box::new(f);
        self
    }

    /// Install the solution sink.
    pub fn with_sink(
        mut self,
        f: impl FnMut(&GroundingMap, &ClauseGroundingMap) -> bool + 'a,
    ) -> Self {
        self.on_solution = Box::new(f);
        self
    }

    /// Whether some optional clause found a grounding that was then refused
    /// under absence semantics.
    pub fn optionals_present(&self) -> bool {
        self.optionals_present
    }

    /// Crisp evaluation of one evaluatable term.
    fn eval_term(&mut self, atom: AtomId, grounding: &GroundingMap) -> bool {
        let store = self.store;
        match store.atom(atom) {
            Atom::Link {
                tag: LinkTag::And,
                children,
            } => children.iter().all(|&c| self.eval_term(c, grounding)),
            Atom::Link {
                tag: LinkTag::Or,
                children,
            } => children.iter().any(|&c| self.eval_term(c, grounding)),
            Atom::Link {
                tag: LinkTag::Not,
                children,
            } => children
                .first()
                .is_some_and(|&c| !self.eval_term(c, grounding)),
            Atom::Link {
                tag: LinkTag::Predicate | LinkTag::BlackBox,
                ..
            } => {
                let mut frame = self.scratch.acquire();
                frame.load(self.pattern.varset(), grounding);
                let verdict = (self.evaluate)(atom, &frame);
                trace!(%atom, verdict, "evaluated predicate");
                verdict
            }
            _ => false,
        }
    }

}

impl MatchPolicy for DefaultPolicy<'_> {
    fn variable_match(&mut self, var: AtomId, cand: AtomId) -> bool {
        // A variable may ground itself; foreign variables and globs are not
        // acceptable groundings.
        cand == var
            || !matches!(
                self.store.atom(cand),
                Atom::Variable { .. } | Atom::Glob { .. }
            )
    }

    fn link_match(&mut self, pat: AtomId, cand: AtomId) -> bool {
        let pa = self.store.atom(pat);
        let ca = self.store.atom(cand);
        let (Some(pt), Some(ct)) = (pa.tag(), ca.tag()) else {
            return false;
        };
        if pt != ct {
            return false;
        }
        // With a glob among the children, arity is checked by the glob
        // matcher instead.
        self.pattern.is_globby_term(pat) || pa.arity() == ca.arity()
    }

    fn clause_match(&mut self, root: AtomId, _cand: AtomId, grounding: &GroundingMap) -> bool {
        // Every free variable of the clause must have a real grounding; a
        // clause matching its own template leaves them unbound or bound to
        // variable atoms.
        self.pattern
            .clauses()
            .iter()
            .filter(|c| c.root() == root)
            .all(|c| {
                c.free_vars().iter().all(|&v| {
                    grounding.get(v).is_some_and(|g| match g {
                        Grounding::Atom(a) => !matches!(
                            self.store.atom(*a),
                            Atom::Variable { .. } | Atom::Glob { .. }
                        ),
                        Grounding::Seq(_) => true,
                    })
                })
            })
    }

    fn optional_clause_match(
        &mut self,
        _root: AtomId,
        cand: Option<AtomId>,
        _grounding: &GroundingMap,
    ) -> bool {
        match cand {
            Some(_) => {
                self.optionals_present = true;
                false
            }
            None => true,
        }
    }

    fn always_clause_match(
        &mut self,
        _root: AtomId,
        cand: Option<AtomId>,
        _grounding: &GroundingMap,
    ) -> bool {
        cand.is_some()
    }

    fn evaluate_sentence(&mut self, root: AtomId, grounding: &GroundingMap) -> bool {
        self.eval_term(root, grounding)
    }

    fn incoming_set(&mut self, cand: AtomId) -> Vec<AtomId> {
        self.store.incoming(cand)
    }

    fn grounding(&mut self, vars: &GroundingMap, clauses: &ClauseGroundingMap) -> bool {
        (self.on_solution)(vars, clauses)
    }
}
