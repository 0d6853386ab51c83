//! Shared helpers for the test suites.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;

use hgql_common::{AtomId, GraphStore, Pattern};

use crate::engine::MatchEngine;
use crate::error::MatchError;
use crate::grounding::{Grounding, GroundingMap};
use crate::init::SearchInitiator;
use crate::policy::DefaultPolicy;
use crate::scratch::ScratchPool;

static INIT: Once = Once::new();

/// Configures logging for the test runner.
pub fn setup_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Run a full search with the default policy, collecting every reported
/// variable-grounding map in delivery order.
pub fn collect_solutions(store: &dyn GraphStore, pattern: &Pattern) -> Vec<GroundingMap> {
    collect_solutions_halting(store, pattern, usize::MAX).0
}

/// As [`collect_solutions`], but the sink requests a halt after `limit`
/// deliveries. Returns the solutions and whether the halt fired.
pub fn collect_solutions_halting(
    store: &dyn GraphStore,
    pattern: &Pattern,
    limit: usize,
) -> (Vec<GroundingMap>, bool) {
    setup_test_logging();
    let pool = ScratchPool::new();
    let solutions: Rc<RefCell<Vec<GroundingMap>>> = Rc::default();
    let sink_solutions = Rc::clone(&solutions);

    let mut policy = DefaultPolicy::new(store, pattern, &pool).with_sink(move |vars, _clauses| {
        let mut all = sink_solutions.borrow_mut();
        all.push(vars.clone());
        all.len() >= limit
    });
    let mut engine = MatchEngine::new(store, &mut policy, pattern);
    let halted = SearchInitiator::new(store)
        .initiate(pattern, &mut engine)
        .expect("search completes without structural violations");

    drop(engine);
    drop(policy);
    let solutions = Rc::try_unwrap(solutions)
        .expect("sink closure dropped with the policy")
        .into_inner();
    (solutions, halted)
}

/// As [`collect_solutions`], but propagating engine errors.
pub fn try_collect_solutions(
    store: &dyn GraphStore,
    pattern: &Pattern,
) -> Result<Vec<GroundingMap>, MatchError> {
    setup_test_logging();
    let pool = ScratchPool::new();
    let solutions: Rc<RefCell<Vec<GroundingMap>>> = Rc::default();
    let sink_solutions = Rc::clone(&solutions);

    let mut policy = DefaultPolicy::new(store, pattern, &pool).with_sink(move |vars, _clauses| {
        sink_solutions.borrow_mut().push(vars.clone());
        false
    });
    let mut engine = MatchEngine::new(store, &mut policy, pattern);
    SearchInitiator::new(store).initiate(pattern, &mut engine)?;

    drop(engine);
    drop(policy);
    Ok(Rc::try_unwrap(solutions)
        .expect("sink closure dropped with the policy")
        .into_inner())
}

/// The single-atom binding of `var` in a reported solution.
pub fn atom_binding(solution: &GroundingMap, var: AtomId) -> Option<AtomId> {
    solution.get(var).and_then(Grounding::as_atom)
}

/// The sequence binding of a glob in a reported solution.
pub fn seq_binding(solution: &GroundingMap, glob: AtomId) -> Option<Vec<AtomId>> {
    match solution.get(glob) {
        Some(Grounding::Seq(seq)) => Some(seq.clone()),
        _ => None,
    }
}
