//! End-to-end searches over small stores: variable enumeration, cross-clause
//! joins, halt signalling, determinism.

use hgql_common::{Clause, LinkTag, MemStore, Pattern};
use hgql_match::test_support::{
    atom_binding, collect_solutions, collect_solutions_halting, setup_test_logging,
};

#[test]
fn single_variable_reports_every_leaf() {
    // Pattern: a bare variable clause; store: three leaves.
    setup_test_logging();
    let mut s = MemStore::new();
    let l1 = s.node("leaf-1");
    let l2 = s.node("leaf-2");
    let l3 = s.node("leaf-3");
    let x = s.variable("X");

    let pattern = Pattern::compile(&s, &[x], &[Clause::mandatory(x)]).unwrap();
    let solutions = collect_solutions(&s, &pattern);

    let bound: Vec<_> = solutions
        .iter()
        .map(|sol| atom_binding(sol, x).unwrap())
        .collect();
    assert_eq!(bound, vec![l1, l2, l3]);
}

#[test]
fn halting_sink_stops_after_first_solution() {
    let mut s = MemStore::new();
    s.node("leaf-1");
    s.node("leaf-2");
    s.node("leaf-3");
    let x = s.variable("X");

    let pattern = Pattern::compile(&s, &[x], &[Clause::mandatory(x)]).unwrap();
    let (solutions, halted) = collect_solutions_halting(&s, &pattern, 1);
    assert!(halted);
    assert_eq!(solutions.len(), 1);
}

#[test]
fn shared_variable_joins_two_clauses() {
    // Clause 1 grounds X=c1 first; clause 2 rejects it, forcing a backtrack
    // to the alternate grounding X=c2.
    let mut s = MemStore::new();
    let a = s.node("a");
    let b = s.node("b");
    let c1 = s.node("c1");
    let c2 = s.node("c2");
    let c3 = s.node("c3");
    let c4 = s.node("c4");
    s.link(LinkTag::List, vec![a, c1]);
    s.link(LinkTag::List, vec![a, c2]);
    s.link(LinkTag::List, vec![b, c2]);
    s.link(LinkTag::List, vec![b, c3]);
    s.link(LinkTag::List, vec![b, c4]);

    let x = s.variable("X");
    let clause1 = s.link(LinkTag::List, vec![a, x]);
    let clause2 = s.link(LinkTag::List, vec![b, x]);

    let pattern = Pattern::compile(
        &s,
        &[x],
        &[Clause::mandatory(clause1), Clause::mandatory(clause2)],
    )
    .unwrap();
    let solutions = collect_solutions(&s, &pattern);

    assert_eq!(solutions.len(), 1);
    assert_eq!(atom_binding(&solutions[0], x), Some(c2));
}

#[test]
fn conflicting_clauses_find_nothing() {
    let mut s = MemStore::new();
    let a = s.node("a");
    let b = s.node("b");
    let c1 = s.node("c1");
    let c2 = s.node("c2");
    s.link(LinkTag::List, vec![a, c1]);
    s.link(LinkTag::List, vec![b, c2]);

    let x = s.variable("X");
    let clause1 = s.link(LinkTag::List, vec![a, x]);
    let clause2 = s.link(LinkTag::List, vec![b, x]);

    let pattern = Pattern::compile(
        &s,
        &[x],
        &[Clause::mandatory(clause1), Clause::mandatory(clause2)],
    )
    .unwrap();
    // Zero groundings is an ordinary empty result.
    assert!(collect_solutions(&s, &pattern).is_empty());
}

#[test]
fn repeated_variable_must_rebind_identically() {
    // List(X, X) only matches links whose two children coincide.
    let mut s = MemStore::new();
    let c1 = s.node("c1");
    let c2 = s.node("c2");
    s.link(LinkTag::List, vec![c1, c1]);
    s.link(LinkTag::List, vec![c1, c2]);

    let x = s.variable("X");
    let root = s.link(LinkTag::List, vec![x, x]);

    let pattern = Pattern::compile(&s, &[x], &[Clause::mandatory(root)]).unwrap();
    let solutions = collect_solutions(&s, &pattern);

    assert_eq!(solutions.len(), 1);
    assert_eq!(atom_binding(&solutions[0], x), Some(c1));
}

#[test]
fn repeated_searches_enumerate_identically() {
    let build = || {
        let mut s = MemStore::new();
        let p = s.node("parent");
        let c1 = s.node("c1");
        let c2 = s.node("c2");
        let c3 = s.node("c3");
        s.link(LinkTag::List, vec![p, c1]);
        s.link(LinkTag::List, vec![p, c2]);
        s.link(LinkTag::List, vec![p, c3]);
        let x = s.variable("X");
        let root = s.link(LinkTag::List, vec![p, x]);
        let pattern = Pattern::compile(&s, &[x], &[Clause::mandatory(root)]).unwrap();
        (s, pattern, x)
    };

    let (s1, pat1, x1) = build();
    let (s2, pat2, x2) = build();
    let run1: Vec<_> = collect_solutions(&s1, &pat1)
        .iter()
        .map(|sol| atom_binding(sol, x1).unwrap())
        .collect();
    let run2: Vec<_> = collect_solutions(&s2, &pat2)
        .iter()
        .map(|sol| atom_binding(sol, x2).unwrap())
        .collect();

    assert_eq!(run1.len(), 3);
    assert_eq!(run1, run2);
}

#[test]
fn nested_structure_grounds_through_intermediate_links() {
    // X is two levels down; upward exploration crosses both.
    let mut s = MemStore::new();
    let tag = s.node("tag");
    let k = s.node("k");
    let v1 = s.node("v1");
    let v2 = s.node("v2");
    let inner1 = s.link(LinkTag::List, vec![k, v1]);
    let inner2 = s.link(LinkTag::List, vec![k, v2]);
    s.link(LinkTag::List, vec![tag, inner1]);
    s.link(LinkTag::List, vec![tag, inner2]);

    let x = s.variable("X");
    let pat_inner = s.link(LinkTag::List, vec![k, x]);
    let root = s.link(LinkTag::List, vec![tag, pat_inner]);

    let pattern = Pattern::compile(&s, &[x], &[Clause::mandatory(root)]).unwrap();
    let solutions = collect_solutions(&s, &pattern);

    let mut bound: Vec<_> = solutions
        .iter()
        .map(|sol| atom_binding(sol, x).unwrap())
        .collect();
    bound.sort();
    assert_eq!(bound, vec![v1, v2]);
}
