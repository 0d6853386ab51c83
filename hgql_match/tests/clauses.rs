//! Clause modalities and constructs beyond plain matching: optional-absence
//! semantics, universal clauses, evaluatable sentences, choice alternatives.

use std::cell::RefCell;
use std::rc::Rc;

use hgql_common::{Atom, AtomId, Clause, GraphStore, LinkTag, MemStore, Pattern};
use hgql_match::test_support::{atom_binding, collect_solutions, setup_test_logging};
use hgql_match::{
    ClauseGroundingMap, DefaultPolicy, Grounding, GroundingMap, MatchEngine, MatchPolicy,
    ScratchPool, SearchInitiator,
};

/// Whether an atom's subtree is free of variable and glob atoms.
fn closed(store: &MemStore, atom: AtomId) -> bool {
    match store.atom(atom) {
        Atom::Variable { .. } | Atom::Glob { .. } => false,
        Atom::Node { .. } => true,
        Atom::Link { children, .. } => children.iter().all(|&c| closed(store, c)),
    }
}

/// A policy that accepts grounded optionals as well as absent ones, for
/// tests that want both acceptance paths of an optional clause.
struct Permissive<'a> {
    store: &'a MemStore,
    solutions: Rc<RefCell<Vec<(GroundingMap, ClauseGroundingMap)>>>,
}

impl MatchPolicy for Permissive<'_> {
    fn variable_match(&mut self, var: AtomId, cand: AtomId) -> bool {
        cand == var
            || !matches!(
                self.store.atom(cand),
                Atom::Variable { .. } | Atom::Glob { .. }
            )
    }

    fn link_match(&mut self, pat: AtomId, cand: AtomId) -> bool {
        let (pa, ca) = (self.store.atom(pat), self.store.atom(cand));
        pa.tag() == ca.tag() && pa.tag().is_some() && pa.arity() == ca.arity()
    }

    fn clause_match(&mut self, _root: AtomId, cand: AtomId, _g: &GroundingMap) -> bool {
        closed(self.store, cand)
    }

    fn optional_clause_match(
        &mut self,
        _root: AtomId,
        cand: Option<AtomId>,
        _g: &GroundingMap,
    ) -> bool {
        cand.is_none_or(|c| closed(self.store, c))
    }

    fn always_clause_match(&mut self, _root: AtomId, cand: Option<AtomId>, _g: &GroundingMap) -> bool {
        cand.is_some()
    }

    fn evaluate_sentence(&mut self, _root: AtomId, _g: &GroundingMap) -> bool {
        false
    }

    fn incoming_set(&mut self, cand: AtomId) -> Vec<AtomId> {
        self.store.incoming(cand)
    }

    fn grounding(&mut self, vars: &GroundingMap, clauses: &ClauseGroundingMap) -> bool {
        self.solutions
            .borrow_mut()
            .push((vars.clone(), clauses.clone()));
        false
    }
}

fn optional_fixture() -> (MemStore, Pattern, AtomId, AtomId, AtomId, AtomId) {
    let mut s = MemStore::new();
    let a = s.node("a");
    let b = s.node("b");
    let c1 = s.node("c1");
    let c2 = s.node("c2");
    s.link(LinkTag::List, vec![a, c1]);
    s.link(LinkTag::List, vec![b, c1]);
    s.link(LinkTag::List, vec![a, c2]);

    let x = s.variable("X");
    let clause1 = s.link(LinkTag::List, vec![a, x]);
    let clause2 = s.link(LinkTag::List, vec![b, x]);
    let pattern = Pattern::compile(
        &s,
        &[x],
        &[Clause::mandatory(clause1), Clause::optional(clause2)],
    )
    .unwrap();
    (s, pattern, x, c1, c2, clause2)
}

#[test]
fn optional_with_absence_semantics_accepts_only_the_absent_branch() {
    // The default policy refuses grounded optionals: only X=c2, where no
    // optional grounding exists, survives.
    setup_test_logging();
    let (s, pattern, x, _c1, c2, clause2) = optional_fixture();
    let pool = ScratchPool::new();
    let seen: Rc<RefCell<Vec<(GroundingMap, ClauseGroundingMap)>>> = Rc::default();
    let sink = Rc::clone(&seen);
    let mut policy = DefaultPolicy::new(&s, &pattern, &pool).with_sink(move |vars, clauses| {
        sink.borrow_mut().push((vars.clone(), clauses.clone()));
        false
    });
    let mut engine = MatchEngine::new(&s, &mut policy, &pattern);
    SearchInitiator::new(&s).initiate(&pattern, &mut engine).unwrap();
    drop(engine);
    assert!(policy.optionals_present());

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(atom_binding(&seen[0].0, x), Some(c2));
    // The optional clause is recorded as explicitly absent.
    assert_eq!(seen[0].1.get(clause2), Some(None));
}

#[test]
fn permissive_optional_accepts_both_paths() {
    setup_test_logging();
    let (s, pattern, x, c1, c2, clause2) = optional_fixture();
    let seen: Rc<RefCell<Vec<(GroundingMap, ClauseGroundingMap)>>> = Rc::default();
    let mut policy = Permissive {
        store: &s,
        solutions: Rc::clone(&seen),
    };
    let mut engine = MatchEngine::new(&s, &mut policy, &pattern);
    SearchInitiator::new(&s).initiate(&pattern, &mut engine).unwrap();
    drop(engine);

    let seen = seen.borrow();
    let mut summary: Vec<(AtomId, bool)> = seen
        .iter()
        .map(|(vars, clauses)| {
            (
                atom_binding(vars, x).unwrap(),
                clauses.get(clause2) == Some(None),
            )
        })
        .collect();
    summary.sort();
    // X=c1 with the optional grounded, X=c2 with the optional absent.
    assert_eq!(summary, vec![(c1, false), (c2, true)]);
}

fn universal_fixture(include_last: bool) -> (MemStore, Pattern, AtomId) {
    let mut s = MemStore::new();
    let a = s.node("a");
    let b = s.node("b");
    let c1 = s.node("c1");
    let c2 = s.node("c2");
    s.link(LinkTag::List, vec![a, c1]);
    s.link(LinkTag::List, vec![a, c2]);
    s.link(LinkTag::List, vec![b, c1]);
    if include_last {
        s.link(LinkTag::List, vec![b, c2]);
    }

    let x = s.variable("X");
    let clause1 = s.link(LinkTag::List, vec![a, x]);
    let clause2 = s.link(LinkTag::List, vec![b, x]);
    let pattern = Pattern::compile(
        &s,
        &[x],
        &[Clause::mandatory(clause1), Clause::always(clause2)],
    )
    .unwrap();
    (s, pattern, x)
}

#[test]
fn universal_clause_flushes_solutions_when_every_check_holds() {
    setup_test_logging();
    let (s, pattern, x) = universal_fixture(true);
    let solutions = collect_solutions(&s, &pattern);
    let mut bound: Vec<_> = solutions
        .iter()
        .map(|sol| atom_binding(sol, x).unwrap())
        .collect();
    bound.sort();
    assert_eq!(bound.len(), 2);
}

#[test]
fn universal_clause_discards_everything_on_one_failure() {
    // X=c2 has no universal witness, so even the X=c1 solution is dropped.
    setup_test_logging();
    let (s, pattern, _x) = universal_fixture(false);
    assert!(collect_solutions(&s, &pattern).is_empty());
}

#[test]
fn evaluatable_clause_filters_groundings() {
    setup_test_logging();
    let mut s = MemStore::new();
    let a = s.node("a");
    let c1 = s.node("c1");
    let c2 = s.node("c2");
    s.link(LinkTag::List, vec![a, c1]);
    s.link(LinkTag::List, vec![a, c2]);

    let x = s.variable("X");
    let clause1 = s.link(LinkTag::List, vec![a, x]);
    let p = s.node("accepts-c1");
    let pred = s.link(LinkTag::Predicate, vec![p, x]);

    let pattern = Pattern::compile(
        &s,
        &[x],
        &[Clause::mandatory(clause1), Clause::mandatory(pred)],
    )
    .unwrap();

    let pool = ScratchPool::new();
    let solutions: Rc<RefCell<Vec<GroundingMap>>> = Rc::default();
    let sink = Rc::clone(&solutions);
    let mut policy = DefaultPolicy::new(&s, &pattern, &pool)
        .with_evaluator(move |_pred, frame| {
            frame
                .get(x)
                .and_then(|g| g.as_atom())
                .is_some_and(|bound| bound == c1)
        })
        .with_sink(move |vars, _clauses| {
            sink.borrow_mut().push(vars.clone());
            false
        });
    let mut engine = MatchEngine::new(&s, &mut policy, &pattern);
    SearchInitiator::new(&s).initiate(&pattern, &mut engine).unwrap();
    drop(engine);
    drop(policy);

    let solutions = solutions.borrow();
    assert_eq!(solutions.len(), 1);
    assert_eq!(atom_binding(&solutions[0], x), Some(c1));
}

#[test]
fn fast_evaluatables_are_scheduled_before_black_boxes() {
    setup_test_logging();
    let mut s = MemStore::new();
    let a = s.node("a");
    let c1 = s.node("c1");
    s.link(LinkTag::List, vec![a, c1]);

    let x = s.variable("X");
    let clause1 = s.link(LinkTag::List, vec![a, x]);
    let p = s.node("fast");
    let q = s.node("slow");
    let fast = s.link(LinkTag::Predicate, vec![p, x]);
    let slow = s.link(LinkTag::BlackBox, vec![q, x]);

    let pattern = Pattern::compile(
        &s,
        &[x],
        &[
            Clause::mandatory(clause1),
            // Declared black-box first to show scheduling, not declaration
            // order, decides.
            Clause::mandatory(slow),
            Clause::mandatory(fast),
        ],
    )
    .unwrap();

    let pool = ScratchPool::new();
    let order: Rc<RefCell<Vec<AtomId>>> = Rc::default();
    let log = Rc::clone(&order);
    let mut policy = DefaultPolicy::new(&s, &pattern, &pool)
        .with_evaluator(move |pred, _frame| {
            log.borrow_mut().push(pred);
            true
        });
    let mut engine = MatchEngine::new(&s, &mut policy, &pattern);
    SearchInitiator::new(&s).initiate(&pattern, &mut engine).unwrap();
    drop(engine);
    drop(policy);

    assert_eq!(&*order.borrow(), &[fast, slow]);
}

#[test]
fn evaluatable_only_pattern_enumerates_candidates() {
    setup_test_logging();
    let mut s = MemStore::new();
    let c1 = s.node("c1");
    let c2 = s.node("c2");
    let x = s.variable("X");
    let p = s.node("accepts-c2");
    let pred = s.link(LinkTag::Predicate, vec![p, x]);

    let pattern = Pattern::compile(&s, &[x], &[Clause::mandatory(pred)]).unwrap();

    let pool = ScratchPool::new();
    let solutions: Rc<RefCell<Vec<GroundingMap>>> = Rc::default();
    let sink = Rc::clone(&solutions);
    let mut policy = DefaultPolicy::new(&s, &pattern, &pool)
        .with_evaluator(move |_pred, frame| {
            frame
                .get(x)
                .and_then(|g| g.as_atom())
                .is_some_and(|bound| bound == c2)
        })
        .with_sink(move |vars, _clauses| {
            sink.borrow_mut().push(vars.clone());
            false
        });
    let mut engine = MatchEngine::new(&s, &mut policy, &pattern);
    SearchInitiator::new(&s).initiate(&pattern, &mut engine).unwrap();
    drop(engine);
    drop(policy);

    let solutions = solutions.borrow();
    assert_eq!(solutions.len(), 1);
    assert_eq!(atom_binding(&solutions[0], x), Some(c2));
    let _ = c1;
}

#[test]
fn embedded_choice_tries_alternatives_in_order() {
    // Choice below the clause root: the first alternative fails, the second
    // grounds the candidate.
    setup_test_logging();
    let mut s = MemStore::new();
    let k = s.node("k");
    let t = s.node("t");
    let u = s.node("u");
    let c1 = s.node("c1");
    let n = s.link(LinkTag::List, vec![t, c1]);
    s.link(LinkTag::List, vec![k, n]);

    let x = s.variable("X");
    let alt_miss = s.link(LinkTag::List, vec![u, x]);
    let alt_hit = s.link(LinkTag::List, vec![t, x]);
    let choice = s.link(LinkTag::Choice, vec![alt_miss, alt_hit]);
    let root = s.link(LinkTag::List, vec![k, choice]);

    let pattern = Pattern::compile(&s, &[x], &[Clause::mandatory(root)]).unwrap();
    let solutions = collect_solutions(&s, &pattern);

    assert_eq!(solutions.len(), 1);
    assert_eq!(atom_binding(&solutions[0], x), Some(c1));
}

#[test]
fn quoted_variable_matches_only_itself() {
    // Quote(X) is the literal variable atom, not a wildcard.
    setup_test_logging();
    let mut s = MemStore::new();
    let k = s.node("k");
    let c = s.node("c");
    let x = s.variable("X");
    let plain = s.link(LinkTag::List, vec![k, c]);
    let with_var = s.link(LinkTag::List, vec![k, x]);

    let q = s.link(LinkTag::Quote, vec![x]);
    let root = s.link(LinkTag::List, vec![k, q]);

    let pattern = Pattern::compile(&s, &[x], &[Clause::mandatory(root)]).unwrap();
    let solutions = collect_solutions(&s, &pattern);

    // X stays unbound: the quoted occurrence is literal.
    assert!(solutions.iter().all(|sol| sol.get(x).is_none()));
    // The link holding the literal variable matches; List(k, c) does not.
    let grounded_as = |target: AtomId| {
        solutions
            .iter()
            .any(|sol| matches!(sol.get(root), Some(Grounding::Atom(a)) if *a == target))
    };
    assert!(grounded_as(with_var));
    assert!(!grounded_as(plain));
}

#[test]
fn define_links_abort_with_unsupported_construct() {
    setup_test_logging();
    let mut s = MemStore::new();
    let k = s.node("k");
    let d = s.link(LinkTag::Define, vec![k]);
    let root = s.link(LinkTag::List, vec![k, d]);
    s.link(LinkTag::List, vec![k, k]);

    let pattern = Pattern::compile(&s, &[], &[Clause::mandatory(root)]).unwrap();
    let err = hgql_match::test_support::try_collect_solutions(&s, &pattern).unwrap_err();
    assert!(matches!(
        err,
        hgql_match::MatchError::UnsupportedConstruct(_)
    ));
}
