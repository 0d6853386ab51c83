//! Groundings and the versioned maps holding them.
//!
//! The engine never copies search state implicitly; the maps here are
//! snapshotted by explicit checkpoint pushes and restored on backtrack.
//! Once a pattern atom is bound, later comparisons against it must reproduce
//! the identical candidate; rebinding only happens through a snapshot
//! restore.

use hgql_common::AtomId;
use indexmap::IndexMap;

/// A concrete value bound to a pattern atom.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Grounding {
    /// A single stored atom.
    Atom(AtomId),
    /// An ordered run of stored atoms; globs bind these.
    Seq(Vec<AtomId>),
}

impl Grounding {
    /// The single atom, if this grounding is one.
    pub fn as_atom(&self) -> Option<AtomId> {
        match self {
            Grounding::Atom(a) => Some(*a),
            Grounding::Seq(_) => None,
        }
    }

    /// Whether this grounding is exactly the single atom `a`.
    pub fn is_atom(&self, a: AtomId) -> bool {
        matches!(self, Grounding::Atom(x) if *x == a)
    }
}

/// Pattern atom → grounding.
///
/// Holds both variable bindings and the groundings recorded for matched
/// composite terms; iteration order is insertion order, which keeps solution
/// enumeration deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroundingMap {
    map: IndexMap<AtomId, Grounding>,
}

impl GroundingMap {
    /// Empty map.
    pub fn new() -> Self {
        GroundingMap::default()
    }

    /// Lookup.
    pub fn get(&self, atom: AtomId) -> Option<&Grounding> {
        self.map.get(&atom)
    }

    /// Whether `atom` is bound.
    pub fn contains(&self, atom: AtomId) -> bool {
        self.map.contains_key(&atom)
    }

    /// Bind `atom`; overwriting is the caller's responsibility to avoid.
    pub fn insert(&mut self, atom: AtomId, grounding: Grounding) {
        self.map.insert(atom, grounding);
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no bindings exist.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate bindings in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (AtomId, &Grounding)> {
        self.map.iter().map(|(k, v)| (*k, v))
    }

    /// Drop all bindings.
    pub fn clear(&mut self) {
        self.map.clear();
    }
}

/// Clause root atom → grounded candidate, or `None` for an optional clause
/// accepted as absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClauseGroundingMap {
    map: IndexMap<AtomId, Option<AtomId>>,
}

impl ClauseGroundingMap {
    /// Empty map.
    pub fn new() -> Self {
        ClauseGroundingMap::default()
    }

    /// Lookup; outer `None` means the clause is not yet decided.
    pub fn get(&self, root: AtomId) -> Option<Option<AtomId>> {
        self.map.get(&root).copied()
    }

    /// Record a clause decision.
    pub fn insert(&mut self, root: AtomId, grounding: Option<AtomId>) {
        self.map.insert(root, grounding);
    }

    /// Number of decided clauses.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no clause is decided.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate decisions in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (AtomId, Option<AtomId>)> {
        self.map.iter().map(|(k, v)| (*k, *v))
    }

    /// Drop all decisions.
    pub fn clear(&mut self) {
        self.map.clear();
    }
}

/// One solution checkpoint: both grounding maps, saved and restored together.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SolutionFrame {
    pub(crate) vars: GroundingMap,
    pub(crate) clauses: ClauseGroundingMap,
}
