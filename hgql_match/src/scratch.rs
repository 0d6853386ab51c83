//! Pooled scratch contexts for evaluatable-term checks.
//!
//! Evaluating a predicate needs a transient frame holding the variable
//! bindings visible to the evaluator. Frames are recycled through an explicit
//! free-list capability object rather than ambient global state; acquisition
//! returns a guard that clears and returns the frame when dropped. The pool
//! is single-threaded, matching the engine's concurrency model; wrap it in a
//! mutex if evaluation contexts are ever shared across threads.

use std::cell::RefCell;
use std::ops::{Deref, DerefMut};

use hgql_common::AtomId;

use crate::grounding::{Grounding, GroundingMap};

/// The bindings handed to an external evaluator.
#[derive(Clone, Debug, Default)]
pub struct EvalFrame {
    bindings: Vec<(AtomId, Grounding)>,
}

impl EvalFrame {
    /// Populate from the declared-variable bindings in `map`.
    pub fn load<'a>(
        &mut self,
        vars: impl IntoIterator<Item = &'a AtomId>,
        map: &GroundingMap,
    ) {
        self.bindings.clear();
        for &var in vars {
            if let Some(g) = map.get(var) {
                self.bindings.push((var, g.clone()));
            }
        }
    }

    /// The captured bindings, in variable declaration order.
    pub fn bindings(&self) -> &[(AtomId, Grounding)] {
        &self.bindings
    }

    /// Lookup one variable's binding.
    pub fn get(&self, var: AtomId) -> Option<&Grounding> {
        self.bindings
            .iter()
            .find(|(v, _)| *v == var)
            .map(|(_, g)| g)
    }

    fn reset(&mut self) {
        self.bindings.clear();
    }
}

/// Free-list of [`EvalFrame`]s.
#[derive(Debug, Default)]
pub struct ScratchPool {
    free: RefCell<Vec<EvalFrame>>,
}

impl ScratchPool {
    /// Empty pool; frames are created on demand.
    pub fn new() -> Self {
        ScratchPool::default()
    }

    /// Take a frame, creating one if the free list is empty. The frame
    /// returns to the pool when the guard drops.
    pub fn acquire(&self) -> ScratchGuard<'_> {
        let frame = self.free.borrow_mut().pop().unwrap_or_default();
        ScratchGuard {
            pool: self,
            frame: Some(frame),
        }
    }

    /// Number of idle frames.
    pub fn idle(&self) -> usize {
        self.free.borrow().len()
    }
}

/// Scoped ownership of a pooled frame.
#[derive(Debug)]
pub struct ScratchGuard<'p> {
    pool: &'p ScratchPool,
    frame: Option<EvalFrame>,
}

impl Deref for ScratchGuard<'_> {
    type Target = EvalFrame;

    fn deref(&self) -> &EvalFrame {
        self.frame.as_ref().expect("frame present until drop")
    }
}

impl DerefMut for ScratchGuard<'_> {
    fn deref_mut(&mut self) -> &mut EvalFrame {
        self.frame.as_mut().expect("frame present until drop")
    }
}

impl Drop for ScratchGuard<'_> {
    fn drop(&mut self) {
        if let Some(mut frame) = self.frame.take() {
            frame.reset();
            self.pool.free.borrow_mut().push(frame);
        }
    }
}
