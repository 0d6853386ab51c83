//! Compiled patterns: clause trees of term occurrences plus the derived
//! index sets the matching engine consumes.
//!
//! A pattern is an ordinary set of atoms in a store. Compilation does not
//! rewrite them; it builds a separate arena of *occurrences* ([`PatternTerm`])
//! so that the same atom appearing in several positions keeps distinct
//! per-position search state (permutations, glob cursors), and precomputes
//! the membership sets the engine queries on every comparison.

use std::collections::{HashMap, HashSet};

use indexmap::IndexSet;
use thiserror::Error;

use crate::atom::{Atom, AtomId, LinkTag};
use crate::store::GraphStore;

/// Index of a clause within its pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClauseId(u32);

impl ClauseId {
    /// Wrap a raw index.
    pub const fn new(raw: u32) -> Self {
        ClauseId(raw)
    }

    /// The raw index.
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Index of a term occurrence within a pattern's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermId(u32);

impl TermId {
    /// Wrap a raw index.
    pub const fn new(raw: u32) -> Self {
        TermId(raw)
    }

    /// The raw index.
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// How a clause participates in the overall match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Modality {
    /// Must be grounded for a solution.
    Mandatory,
    /// Absence semantics: accepted by grounding or by explicit absence,
    /// whichever the policy approves.
    Optional,
    /// Universally quantified: checked against every grounding; solutions
    /// are held back until all checks pass.
    Always,
}

/// One top-level pattern sub-expression, as supplied by the caller.
#[derive(Clone, Copy, Debug)]
pub struct Clause {
    /// Root atom of the clause tree.
    pub root: AtomId,
    /// Participation mode.
    pub modality: Modality,
}

impl Clause {
    /// A mandatory clause.
    pub fn mandatory(root: AtomId) -> Self {
        Clause {
            root,
            modality: Modality::Mandatory,
        }
    }

    /// An optional (absence-semantics) clause.
    pub fn optional(root: AtomId) -> Self {
        Clause {
            root,
            modality: Modality::Optional,
        }
    }

    /// A universally quantified clause.
    pub fn always(root: AtomId) -> Self {
        Clause {
            root,
            modality: Modality::Always,
        }
    }
}

/// One occurrence of an atom within a clause tree.
#[derive(Clone, Debug)]
pub struct PatternTerm {
    atom: AtomId,
    parent: Option<TermId>,
    children: Vec<TermId>,
    quoted: bool,
    clause: ClauseId,
}

impl PatternTerm {
    /// The atom this occurrence refers to.
    pub fn atom(&self) -> AtomId {
        self.atom
    }

    /// Parent occurrence; `None` for clause roots.
    pub fn parent(&self) -> Option<TermId> {
        self.parent
    }

    /// Child occurrences, in pattern order.
    pub fn children(&self) -> &[TermId] {
        &self.children
    }

    /// Whether this occurrence sits under a quotation.
    pub fn is_quoted(&self) -> bool {
        self.quoted
    }

    /// The clause owning this occurrence.
    pub fn clause(&self) -> ClauseId {
        self.clause
    }
}

/// A clause after compilation.
#[derive(Clone, Debug)]
pub struct CompiledClause {
    root: AtomId,
    root_term: TermId,
    modality: Modality,
    evaluatable: bool,
    black: bool,
    free_vars: IndexSet<AtomId>,
}

impl CompiledClause {
    /// Root atom (after quotation collapse).
    pub fn root(&self) -> AtomId {
        self.root
    }

    /// Root occurrence in the term arena.
    pub fn root_term(&self) -> TermId {
        self.root_term
    }

    /// Participation mode.
    pub fn modality(&self) -> Modality {
        self.modality
    }

    /// Whether this clause is optional.
    pub fn is_optional(&self) -> bool {
        self.modality == Modality::Optional
    }

    /// Whether this clause is universally quantified.
    pub fn is_always(&self) -> bool {
        self.modality == Modality::Always
    }

    /// Whether this clause is decided by evaluation rather than matching.
    pub fn is_evaluatable(&self) -> bool {
        self.evaluatable
    }

    /// Whether this clause reaches a black-box evaluator.
    pub fn is_black(&self) -> bool {
        self.black
    }

    /// Declared variables with an unquoted occurrence in this clause, in
    /// discovery order.
    pub fn free_vars(&self) -> &IndexSet<AtomId> {
        &self.free_vars
    }
}

/// Pattern compilation failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    /// A declared variable handle does not name a variable or glob atom.
    #[error("declared variable {atom} is not a variable or glob atom")]
    NotAVariable {
        /// The offending handle.
        atom: AtomId,
    },
    /// A quotation link with other than exactly one child.
    #[error("quotation {atom} must have exactly one child")]
    QuoteArity {
        /// The offending quote link.
        atom: AtomId,
    },
}

/// A compiled pattern: occurrence trees plus derived membership sets.
#[derive(Clone, Debug, Default)]
pub struct Pattern {
    terms: Vec<PatternTerm>,
    clauses: Vec<CompiledClause>,
    varset: IndexSet<AtomId>,
    globs: HashSet<AtomId>,
    globby_terms: HashSet<AtomId>,
    globby_holders: HashSet<AtomId>,
    evaluatable: HashSet<AtomId>,
    in_evaluatable: HashMap<AtomId, Vec<(ClauseId, AtomId)>>,
    connectivity: HashMap<AtomId, Vec<ClauseId>>,
    connected_terms: HashMap<(AtomId, ClauseId), Vec<TermId>>,
    has_optionals: bool,
    has_always: bool,
    has_black: bool,
}

impl Pattern {
    /// Compile `clauses` over `store`, with `variables` naming the declared
    /// variable and glob atoms.
    pub fn compile(
        store: &dyn GraphStore,
        variables: &[AtomId],
        clauses: &[Clause],
    ) -> Result<Pattern, PatternError> {
        let mut pat = Pattern::default();

        for &v in variables {
            match store.atom(v) {
                Atom::Variable { .. } => {
                    pat.varset.insert(v);
                }
                Atom::Glob { .. } => {
                    pat.varset.insert(v);
                    pat.globs.insert(v);
                }
                _ => return Err(PatternError::NotAVariable { atom: v }),
            }
        }

        for (i, clause) in clauses.iter().enumerate() {
            let cid = ClauseId::new(i as u32);
            let mut free_vars = IndexSet::new();
            let mut black = false;
            let root_term = pat.build_term(
                store,
                clause.root,
                None,
                false,
                cid,
                None,
                &mut free_vars,
                &mut black,
            )?;
            let root = pat.terms[root_term.raw() as usize].atom;
            let evaluatable = store
                .atom(root)
                .tag()
                .is_some_and(LinkTag::is_evaluatable);
            pat.mark_glob_holders(root_term);
            pat.clauses.push(CompiledClause {
                root,
                root_term,
                modality: clause.modality,
                evaluatable,
                black,
                free_vars,
            });
            match clause.modality {
                Modality::Optional => pat.has_optionals = true,
                Modality::Always => pat.has_always = true,
                Modality::Mandatory => {}
            }
            if black {
                pat.has_black = true;
            }
        }

        Ok(pat)
    }

    /// Build the occurrence subtree for `atom`, collapsing quotations.
    #[allow(clippy::too_many_arguments)]
    fn build_term(
        &mut self,
        store: &dyn GraphStore,
        atom: AtomId,
        parent: Option<TermId>,
        quoted: bool,
        clause: ClauseId,
        eval_root: Option<AtomId>,
        free_vars: &mut IndexSet<AtomId>,
        black: &mut bool,
    ) -> Result<TermId, PatternError> {
        // Quotation is transparent in the occurrence tree: the quoted child
        // takes the quote's position, marked literal.
        let mut atom = atom;
        let mut quoted = quoted;
        while let Atom::Link {
            tag: LinkTag::Quote,
            children,
        } = store.atom(atom)
        {
            if children.len() != 1 {
                return Err(PatternError::QuoteArity { atom });
            }
            atom = children[0];
            quoted = true;
        }

        let tag = store.atom(atom).tag();
        let eval_root = if quoted {
            eval_root
        } else {
            match eval_root {
                Some(root) => Some(root),
                None if tag.is_some_and(LinkTag::is_evaluatable) => Some(atom),
                None => None,
            }
        };
        if let Some(root) = eval_root {
            self.evaluatable.insert(atom);
            if !quoted && self.varset.contains(&atom) {
                let entries = self.in_evaluatable.entry(atom).or_default();
                if !entries.contains(&(clause, root)) {
                    entries.push((clause, root));
                }
            }
        }
        if tag == Some(LinkTag::BlackBox) {
            *black = true;
        }
        if !quoted && self.varset.contains(&atom) {
            free_vars.insert(atom);
        }

        let id = TermId::new(self.terms.len() as u32);
        self.terms.push(PatternTerm {
            atom,
            parent,
            children: Vec::new(),
            quoted,
            clause,
        });

        let roots = self.connectivity.entry(atom).or_default();
        if !roots.contains(&clause) {
            roots.push(clause);
        }
        self.connected_terms
            .entry((atom, clause))
            .or_default()
            .push(id);

        let child_atoms: Vec<AtomId> = store.atom(atom).children().to_vec();
        for child in child_atoms {
            let ct = self.build_term(
                store, child, Some(id), quoted, clause, eval_root, free_vars, black,
            )?;
            self.terms[id.raw() as usize].children.push(ct);
        }

        Ok(id)
    }

    /// Post-pass marking which link atoms hold globs directly or anywhere
    /// beneath. Returns whether the subtree at `term` contains a glob.
    fn mark_glob_holders(&mut self, term: TermId) -> bool {
        let (atom, children) = {
            let t = &self.terms[term.raw() as usize];
            (t.atom, t.children.clone())
        };
        if self.globs.contains(&atom) {
            self.globby_holders.insert(atom);
            return true;
        }
        let mut below = false;
        for child in children {
            let child_atom = self.terms[child.raw() as usize].atom;
            let child_holds = self.mark_glob_holders(child);
            if self.globs.contains(&child_atom) {
                self.globby_terms.insert(atom);
            }
            below |= child_holds;
        }
        if below {
            self.globby_holders.insert(atom);
        }
        below
    }

    /// Occurrence lookup.
    pub fn term(&self, id: TermId) -> &PatternTerm {
        &self.terms[id.raw() as usize]
    }

    /// Atom of an occurrence.
    pub fn term_atom(&self, id: TermId) -> AtomId {
        self.terms[id.raw() as usize].atom
    }

    /// All compiled clauses, in declaration order.
    pub fn clauses(&self) -> &[CompiledClause] {
        &self.clauses
    }

    /// Clause lookup.
    pub fn clause(&self, id: ClauseId) -> &CompiledClause {
        &self.clauses[id.raw() as usize]
    }

    /// Declared variables and globs, in declaration order.
    pub fn varset(&self) -> &IndexSet<AtomId> {
        &self.varset
    }

    /// Whether `atom` is a declared variable or glob.
    pub fn is_declared_var(&self, atom: AtomId) -> bool {
        self.varset.contains(&atom)
    }

    /// Whether `atom` is a declared glob.
    pub fn is_glob(&self, atom: AtomId) -> bool {
        self.globs.contains(&atom)
    }

    /// Whether `atom` is a link with a glob as a direct child.
    pub fn is_globby_term(&self, atom: AtomId) -> bool {
        self.globby_terms.contains(&atom)
    }

    /// Whether `atom` contains a glob anywhere beneath (or is one).
    pub fn is_globby_holder(&self, atom: AtomId) -> bool {
        self.globby_holders.contains(&atom)
    }

    /// Whether `atom` lies inside (or is) an evaluatable subtree.
    pub fn is_evaluatable_atom(&self, atom: AtomId) -> bool {
        self.evaluatable.contains(&atom)
    }

    /// Whether any clause carries evaluatable terms.
    pub fn has_evaluatable(&self) -> bool {
        !self.evaluatable.is_empty()
    }

    /// The (clause, evaluatable-root) contexts a variable occurs inside.
    pub fn in_evaluatable(&self, var: AtomId) -> &[(ClauseId, AtomId)] {
        self.in_evaluatable
            .get(&var)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Clauses containing `atom`, in declaration order.
    pub fn connectivity(&self, atom: AtomId) -> &[ClauseId] {
        self.connectivity
            .get(&atom)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Occurrences of `atom` within `clause`.
    pub fn connected_terms(&self, atom: AtomId, clause: ClauseId) -> Option<&[TermId]> {
        self.connected_terms
            .get(&(atom, clause))
            .map(Vec::as_slice)
    }

    /// Whether any clause is optional.
    pub fn has_optionals(&self) -> bool {
        self.has_optionals
    }

    /// Whether any clause is universally quantified.
    pub fn has_always(&self) -> bool {
        self.has_always
    }

    /// Whether any clause reaches a black-box evaluator.
    pub fn has_black(&self) -> bool {
        self.has_black
    }

    /// Whether `term` lies strictly beneath `ancestor` in its clause tree.
    pub fn is_descendant(&self, term: TermId, ancestor: TermId) -> bool {
        let mut cur = self.terms[term.raw() as usize].parent;
        while let Some(p) = cur {
            if p == ancestor {
                return true;
            }
            cur = self.terms[p.raw() as usize].parent;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::GlobBounds;
    use crate::store::MemStore;

    #[test]
    fn compile_builds_occurrence_tree() {
        let mut s = MemStore::new();
        let x = s.variable("X");
        let a = s.node("a");
        let inner = s.link(LinkTag::List, vec![x, a]);
        let root = s.link(LinkTag::List, vec![inner, a]);

        let pat = Pattern::compile(&s, &[x], &[Clause::mandatory(root)]).unwrap();
        let c = &pat.clauses()[0];
        assert_eq!(c.root(), root);
        let rt = pat.term(c.root_term());
        assert_eq!(rt.children().len(), 2);
        assert!(rt.parent().is_none());

        // `a` occurs twice: once inside `inner`, once at the root.
        let occurrences = pat.connected_terms(a, ClauseId::new(0)).unwrap();
        assert_eq!(occurrences.len(), 2);
        assert!(c.free_vars().contains(&x));
    }

    #[test]
    fn declared_variable_must_be_leaf() {
        let mut s = MemStore::new();
        let a = s.node("a");
        let l = s.link(LinkTag::List, vec![a]);
        let err = Pattern::compile(&s, &[l], &[Clause::mandatory(l)]).unwrap_err();
        assert_eq!(err, PatternError::NotAVariable { atom: l });
    }

    #[test]
    fn quotes_collapse_and_mark_literal() {
        let mut s = MemStore::new();
        let x = s.variable("X");
        let q = s.link(LinkTag::Quote, vec![x]);
        let root = s.link(LinkTag::List, vec![q]);

        let pat = Pattern::compile(&s, &[x], &[Clause::mandatory(root)]).unwrap();
        let rt = pat.clauses()[0].root_term();
        let child = pat.term(pat.term(rt).children()[0]);
        assert_eq!(child.atom(), x);
        assert!(child.is_quoted());
        // A quoted variable occurrence is not free.
        assert!(pat.clauses()[0].free_vars().is_empty());
    }

    #[test]
    fn glob_sets_are_derived() {
        let mut s = MemStore::new();
        let g = s.glob("G", GlobBounds::zero_or_more());
        let a = s.node("a");
        let inner = s.link(LinkTag::List, vec![g, a]);
        let outer = s.link(LinkTag::List, vec![inner, a]);

        let pat = Pattern::compile(&s, &[g], &[Clause::mandatory(outer)]).unwrap();
        assert!(pat.is_glob(g));
        assert!(pat.is_globby_term(inner));
        assert!(!pat.is_globby_term(outer));
        assert!(pat.is_globby_holder(inner));
        assert!(pat.is_globby_holder(outer));
        assert!(pat.is_globby_holder(g));
    }

    #[test]
    fn evaluatable_membership_and_black_flags() {
        let mut s = MemStore::new();
        let x = s.variable("X");
        let gt = s.node("greater");
        let pred = s.link(LinkTag::Predicate, vec![gt, x]);
        let neg = s.link(LinkTag::Not, vec![pred]);

        let pat = Pattern::compile(&s, &[x], &[Clause::mandatory(neg)]).unwrap();
        let c = &pat.clauses()[0];
        assert!(c.is_evaluatable());
        assert!(!c.is_black());
        assert!(pat.is_evaluatable_atom(neg));
        assert!(pat.is_evaluatable_atom(pred));
        assert!(pat.is_evaluatable_atom(x));
        // The variable's enclosing evaluatable root is the outermost one.
        assert_eq!(pat.in_evaluatable(x), &[(ClauseId::new(0), neg)]);

        let mut s2 = MemStore::new();
        let y = s2.variable("Y");
        let opaque = s2.node("oracle");
        let bb = s2.link(LinkTag::BlackBox, vec![opaque, y]);
        let pat2 = Pattern::compile(&s2, &[y], &[Clause::mandatory(bb)]).unwrap();
        assert!(pat2.clauses()[0].is_black());
        assert!(pat2.has_black());
    }

    #[test]
    fn descendant_relation_follows_parents() {
        let mut s = MemStore::new();
        let a = s.node("a");
        let b = s.node("b");
        let inner = s.link(LinkTag::Set, vec![a, b]);
        let outer = s.link(LinkTag::Set, vec![inner, b]);

        let pat = Pattern::compile(&s, &[], &[Clause::mandatory(outer)]).unwrap();
        let root = pat.clauses()[0].root_term();
        let inner_t = pat.term(root).children()[0];
        let leaf = pat.term(inner_t).children()[0];
        assert!(pat.is_descendant(leaf, root));
        assert!(pat.is_descendant(leaf, inner_t));
        assert!(pat.is_descendant(inner_t, root));
        assert!(!pat.is_descendant(root, leaf));
        assert!(!pat.is_descendant(root, root));
    }
}
