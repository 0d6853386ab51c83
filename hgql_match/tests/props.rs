//! Property tests over randomized small stores.

use std::collections::BTreeSet;

use hgql_common::{Clause, GlobBounds, LinkTag, MemStore, Pattern};
use hgql_match::test_support::{atom_binding, collect_solutions, seq_binding};
use quickcheck::{TestResult, quickcheck};

quickcheck! {
    /// One solution per stored leaf, in store order.
    fn a_variable_matches_each_stored_leaf_once(labels: Vec<u8>) -> TestResult {
        let labels: BTreeSet<u8> = labels.into_iter().collect();
        if labels.is_empty() || labels.len() > 6 {
            return TestResult::discard();
        }

        let mut s = MemStore::new();
        let leaves: Vec<_> = labels.iter().map(|l| s.node(format!("leaf-{l}"))).collect();
        let x = s.variable("X");
        let pattern = Pattern::compile(&s, &[x], &[Clause::mandatory(x)]).unwrap();

        let solutions = collect_solutions(&s, &pattern);
        let bound: Vec<_> = solutions
            .iter()
            .filter_map(|sol| atom_binding(sol, x))
            .collect();
        TestResult::from_bool(bound == leaves)
    }

    /// A single trailing glob matches exactly when the candidate tail length
    /// lies within its bounds, and then binds the whole tail.
    fn glob_run_lies_within_bounds(min: u8, span: u8, arity: u8) -> bool {
        let min = (min % 4) as usize;
        let arity = (arity % 5) as usize;
        let max = if span % 5 == 4 {
            None
        } else {
            Some(min + (span % 4) as usize)
        };

        let mut s = MemStore::new();
        let head = s.node("head");
        let mut children = vec![head];
        for i in 0..arity {
            let e = s.node(format!("e{i}"));
            children.push(e);
        }
        s.link(LinkTag::List, children);

        let g = s.glob("G", GlobBounds::new(min, max));
        let root = s.link(LinkTag::List, vec![head, g]);
        let pattern = Pattern::compile(&s, &[g], &[Clause::mandatory(root)]).unwrap();
        let solutions = collect_solutions(&s, &pattern);

        let fits = min <= arity && max.is_none_or(|m| arity <= m);
        if !fits {
            return solutions.is_empty();
        }
        solutions.len() == 1
            && seq_binding(&solutions[0], g).map(|run| run.len()) == Some(arity)
    }

    /// Fresh engines over the same store enumerate identically.
    fn enumeration_is_deterministic(labels: Vec<u8>) -> TestResult {
        let labels: BTreeSet<u8> = labels.into_iter().collect();
        if labels.is_empty() || labels.len() > 5 {
            return TestResult::discard();
        }

        let run = || {
            let mut s = MemStore::new();
            let anchor = s.node("anchor");
            for l in &labels {
                let leaf = s.node(format!("leaf-{l}"));
                s.link(LinkTag::List, vec![anchor, leaf]);
            }
            let x = s.variable("X");
            let root = s.link(LinkTag::List, vec![anchor, x]);
            let pattern = Pattern::compile(&s, &[x], &[Clause::mandatory(root)]).unwrap();
            collect_solutions(&s, &pattern)
                .iter()
                .map(|sol| atom_binding(sol, x).unwrap().raw())
                .collect::<Vec<u32>>()
        };

        let first = run();
        TestResult::from_bool(first.len() == labels.len() && first == run())
    }
}
