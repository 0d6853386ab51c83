//! Variadic (glob) sequence matching.
//!
//! Matches an ordered run of pattern terms containing glob symbols against a
//! candidate's outgoing set, scanning left to right and extending each glob
//! greedily within its bounds. The cursor stack records where each glob
//! started; on a dead end the matcher pops back to the nearest earlier glob
//! and retries with a shorter run. A retry pass may never consume as many
//! elements as the pass before it for the same symbol, which keeps the
//! search monotone and makes the longest satisfying run the first one found.

use std::collections::HashMap;

use hgql_common::{Atom, AtomId, GlobBounds, TermId};
use tracing::{debug, trace};

use crate::compare::Caller;
use crate::engine::MatchEngine;
use crate::error::MatchError;
use crate::grounding::Grounding;

/// Where a glob began consuming, for backtracking.
#[derive(Clone, Copy, Debug)]
pub(crate) struct GlobFrame {
    /// The glob occurrence.
    pub(crate) glob: TermId,
    /// Pattern index at which it sits.
    pub(crate) pat_idx: usize,
    /// Candidate index where its run starts.
    pub(crate) cand_idx: usize,
}

/// Resumable glob-matching state for one holding occurrence.
#[derive(Clone, Debug, Default)]
pub(crate) struct GlobState {
    /// Run length recorded per glob during the current retry pass.
    pub(crate) lengths: HashMap<TermId, usize>,
    /// Cursor stack of glob start positions.
    pub(crate) stack: Vec<GlobFrame>,
}

/// Working cursor of one `glob_compare` activation.
struct Cursor {
    ip: usize,
    jg: usize,
    lengths: HashMap<TermId, usize>,
    stack: Vec<GlobFrame>,
    backtracking: bool,
    dead_end: bool,
}

fn bounds_of(atom: &Atom) -> GlobBounds {
    match atom {
        Atom::Glob { bounds, .. } => *bounds,
        _ => GlobBounds::default(),
    }
}

impl MatchEngine<'_> {
    /// Compare the pattern sequence `osp` (which contains at least one glob)
    /// against the candidate sequence `osg`, resuming from saved state when
    /// `holder` was matched before.
    pub(crate) fn glob_compare(
        &mut self,
        holder: TermId,
        osp: &[TermId],
        osg: &[AtomId],
    ) -> Result<bool, MatchError> {
        let store = self.store;
        let pattern = self.pattern;
        let osp_size = osp.len();
        let osg_size = osg.len();
        let mut matched = true;

        let mut cur = Cursor {
            ip: 0,
            jg: 0,
            lengths: HashMap::new(),
            stack: Vec::new(),
            backtracking: false,
            dead_end: false,
        };

        // Resume: an earlier pass grounded this sequence, but the grounding
        // failed elsewhere in the pattern; retry with shorter runs.
        if let Some(saved) = self.glob_state.get(&holder).cloned() {
            cur.backtracking = true;
            self.solution_pop()?;
            cur.lengths = saved.lengths;
            cur.stack = saved.stack;
            let top = cur
                .stack
                .last()
                .ok_or_else(|| MatchError::structural("glob cursor resumed with empty stack"))?;
            cur.ip = top.pat_idx;
            cur.jg = top.cand_idx;
            trace!(?holder, ip = cur.ip, jg = cur.jg, "resume glob matching");
        }

        while cur.ip < osp_size {
            if cur.dead_end {
                matched = false;
                self.glob_state.remove(&holder);
                break;
            }

            let term = osp[cur.ip];
            let hp = pattern.term_atom(term);

            if pattern.is_glob(hp) {
                // This symbol may already be bound by another occurrence;
                // the run here must replay it exactly.
                if !cur.backtracking {
                    if let Some(Grounding::Seq(seq)) = self.var_grounding.get(hp) {
                        let seq = seq.clone();
                        let mut fits = true;
                        let mut j = cur.jg;
                        for h in seq {
                            if j >= osg_size || h != osg[j] {
                                fits = false;
                                break;
                            }
                            j += 1;
                        }
                        if fits {
                            cur.jg = j;
                            cur.ip += 1;
                        } else {
                            self.glob_backtrack(&mut cur, holder, false)?;
                        }
                        continue;
                    }
                }

                if cur.backtracking {
                    // The frame for this glob is already on the stack.
                    cur.backtracking = false;
                } else {
                    cur.stack.push(GlobFrame {
                        glob: term,
                        pat_idx: cur.ip,
                        cand_idx: cur.jg,
                    });
                    self.save_glob_state(holder, &cur);
                }

                let last_grd = cur.lengths.get(&term).copied().unwrap_or(usize::MAX);
                let bounds = bounds_of(store.atom(hp));
                let mut seq: Vec<AtomId> = Vec::new();

                if bounds.lower_ok(0) {
                    // The empty run was tried already; look for another
                    // glob to shrink instead.
                    if last_grd == 0 {
                        self.glob_backtrack(&mut cur, holder, true)?;
                        continue;
                    }
                    // The previous pass consumed one; only the empty run is
                    // left, and it needs a successor to absorb the tail.
                    if last_grd == 1 && cur.ip + 1 < osp_size {
                        self.glob_record(&mut cur, holder, term, &seq);
                        cur.ip += 1;
                        continue;
                    }
                    if cur.jg >= osg_size {
                        self.glob_record(&mut cur, holder, term, &seq);
                        cur.ip += 1;
                        continue;
                    }
                    if !bounds.upper_ok(1) {
                        // Forced empty run; as the final pattern element it
                        // cannot absorb a leftover tail.
                        if cur.ip + 1 == osp_size && cur.jg < osg_size {
                            self.glob_backtrack(&mut cur, holder, true)?;
                        } else {
                            self.glob_record(&mut cur, holder, term, &seq);
                            cur.ip += 1;
                        }
                        continue;
                    }
                }

                // From here the glob must consume at least one element.
                if cur.jg >= osg_size {
                    self.glob_backtrack(&mut cur, holder, true)?;
                    continue;
                }

                // Greedy extension, capped by the upper bound and by the
                // previous pass's run for this symbol.
                while cur.jg < osg_size {
                    if !self.tree_compare(term, osg[cur.jg], Caller::Glob)? {
                        break;
                    }
                    if seq.len() + 1 >= last_grd {
                        break;
                    }
                    if !bounds.upper_ok(seq.len() + 1) {
                        break;
                    }
                    seq.push(osg[cur.jg]);
                    cur.jg += 1;
                }

                if seq.is_empty() {
                    self.glob_backtrack(&mut cur, holder, true)?;
                    continue;
                }
                if !bounds.lower_ok(seq.len()) {
                    self.glob_backtrack(&mut cur, holder, true)?;
                    continue;
                }
                // Last pattern element, but unconsumed candidates remain.
                if cur.ip + 1 == osp_size && cur.jg < osg_size {
                    self.glob_backtrack(&mut cur, holder, true)?;
                    continue;
                }

                self.glob_record(&mut cur, holder, term, &seq);
                cur.ip += 1;
            } else {
                // An ordinary term inside a globby sequence.
                if cur.jg >= osg_size {
                    self.glob_backtrack(&mut cur, holder, false)?;
                    continue;
                }
                // Last pattern element cannot absorb two or more.
                if cur.ip + 1 == osp_size && cur.jg + 1 < osg_size {
                    self.glob_backtrack(&mut cur, holder, false)?;
                    continue;
                }
                if !self.tree_compare(term, osg[cur.jg], Caller::Order)? {
                    self.glob_backtrack(&mut cur, holder, false)?;
                    continue;
                }
                cur.ip += 1;
                cur.jg += 1;
            }
        }

        Ok(matched)
    }

    /// Record a glob's run and checkpoint the groundings.
    fn glob_record(&mut self, cur: &mut Cursor, holder: TermId, glob: TermId, seq: &[AtomId]) {
        self.solution_push();
        cur.lengths.insert(glob, seq.len());
        self.save_glob_state(holder, cur);
        let hp = self.pattern.term_atom(glob);
        debug!(%hp, run = seq.len(), "grounded glob");
        self.var_grounding.insert(hp, Grounding::Seq(seq.to_vec()));
    }

    /// Retreat to the nearest earlier glob and retry from there.
    fn glob_backtrack(
        &mut self,
        cur: &mut Cursor,
        holder: TermId,
        at_glob: bool,
    ) -> Result<(), MatchError> {
        cur.backtracking = true;

        // When the failure is at a glob, its own frame is abandoned first.
        if at_glob {
            if let Some(top) = cur.stack.last() {
                cur.lengths.remove(&top.glob);
            }
            cur.stack.pop();
            self.save_glob_state(holder, cur);
        }

        if let Some(top) = cur.stack.last() {
            cur.ip = top.pat_idx;
            cur.jg = top.cand_idx;
            self.solution_pop()?;
        } else {
            cur.dead_end = true;
        }
        Ok(())
    }

    fn save_glob_state(&mut self, holder: TermId, cur: &Cursor) {
        self.glob_state.insert(
            holder,
            GlobState {
                lengths: cur.lengths.clone(),
                stack: cur.stack.clone(),
            },
        );
    }
}
