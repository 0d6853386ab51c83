//! Atoms: the shared currency of stores and patterns.
//!
//! A hypergraph is built from nodes (labelled leaves) and links (composites
//! whose outgoing set references other atoms). Patterns are ordinary atoms
//! living in the same store as the data they match, so structural identity
//! between a pattern constant and a stored candidate is an id comparison.

use std::fmt;

/// Handle to an atom within a [`crate::GraphStore`].
///
/// Stores intern atoms by structural content, so two handles are equal
/// exactly when the structures they denote are identical.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomId(u32);

impl AtomId {
    /// Wrap a raw index.
    pub const fn new(raw: u32) -> Self {
        AtomId(raw)
    }

    /// The raw index backing this handle.
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for AtomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Structural role of a link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LinkTag {
    /// Ordered composite; children match positionally.
    List,
    /// Commutative composite; children may match under any permutation.
    Set,
    /// Multi-way alternative; any one child grounding the candidate suffices.
    Choice,
    /// Literal context; the quoted subtree matches as a constant.
    Quote,
    /// Externally evaluated term, cheap to evaluate.
    Predicate,
    /// Externally evaluated term backed by an opaque, possibly expensive
    /// evaluator.
    BlackBox,
    /// Crisp conjunction over evaluatable terms.
    And,
    /// Crisp disjunction over evaluatable terms.
    Or,
    /// Crisp negation of an evaluatable term.
    Not,
    /// Indirect pattern definition. Recognized but not implemented by the
    /// engine; comparing one raises an unsupported-construct error.
    Define,
}

impl LinkTag {
    /// Whether children of this link may be matched in any order.
    pub fn is_unordered(self) -> bool {
        matches!(self, LinkTag::Set)
    }

    /// Whether a term with this tag is decided by evaluation rather than by
    /// structural matching against the store.
    pub fn is_evaluatable(self) -> bool {
        matches!(
            self,
            LinkTag::Predicate | LinkTag::BlackBox | LinkTag::And | LinkTag::Or | LinkTag::Not
        )
    }

    /// Whether this tag is a logical connective over evaluatable terms.
    pub fn is_connective(self) -> bool {
        matches!(self, LinkTag::And | LinkTag::Or | LinkTag::Not)
    }
}

/// Inclusive repetition bounds carried on a glob atom.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GlobBounds {
    /// Fewest elements the glob may consume.
    pub min: usize,
    /// Most elements the glob may consume; `None` is unbounded.
    pub max: Option<usize>,
}

impl GlobBounds {
    /// Bounds `[min, max]`; `max = None` for no upper bound.
    pub const fn new(min: usize, max: Option<usize>) -> Self {
        GlobBounds { min, max }
    }

    /// `[0, ∞)`.
    pub const fn zero_or_more() -> Self {
        GlobBounds { min: 0, max: None }
    }

    /// `[1, ∞)`.
    pub const fn one_or_more() -> Self {
        GlobBounds { min: 1, max: None }
    }

    /// Whether a run of `len` elements satisfies the lower bound.
    pub fn lower_ok(&self, len: usize) -> bool {
        self.min <= len
    }

    /// Whether a run of `len` elements satisfies the upper bound.
    pub fn upper_ok(&self, len: usize) -> bool {
        self.max.is_none_or(|m| len <= m)
    }
}

impl Default for GlobBounds {
    /// The historical default interval: at least one element.
    fn default() -> Self {
        GlobBounds::one_or_more()
    }
}

/// One stored hypergraph element.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Atom {
    /// A labelled leaf.
    Node {
        /// Content label; interning keys on it.
        label: String,
    },
    /// A pattern variable; grounds to a single candidate atom.
    Variable {
        /// Variable name, unique per pattern.
        name: String,
    },
    /// A variadic wildcard; grounds to a bounded run of sibling candidates.
    Glob {
        /// Glob name, unique per pattern.
        name: String,
        /// Repetition bounds.
        bounds: GlobBounds,
    },
    /// A composite referencing other atoms.
    Link {
        /// Structural role.
        tag: LinkTag,
        /// Outgoing set, in stored order.
        children: Vec<AtomId>,
    },
}

impl Atom {
    /// Whether this atom is leaf-shaped (node, variable or glob).
    pub fn is_node(&self) -> bool {
        !matches!(self, Atom::Link { .. })
    }

    /// Whether this atom is a composite.
    pub fn is_link(&self) -> bool {
        matches!(self, Atom::Link { .. })
    }

    /// The link tag, if this atom is a link.
    pub fn tag(&self) -> Option<LinkTag> {
        match self {
            Atom::Link { tag, .. } => Some(*tag),
            _ => None,
        }
    }

    /// Outgoing set; empty for leaves.
    pub fn children(&self) -> &[AtomId] {
        match self {
            Atom::Link { children, .. } => children,
            _ => &[],
        }
    }

    /// Arity of the outgoing set.
    pub fn arity(&self) -> usize {
        self.children().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_bounds_checks() {
        let b = GlobBounds::new(1, Some(3));
        assert!(!b.lower_ok(0));
        assert!(b.lower_ok(1));
        assert!(b.upper_ok(3));
        assert!(!b.upper_ok(4));

        let open = GlobBounds::zero_or_more();
        assert!(open.lower_ok(0));
        assert!(open.upper_ok(usize::MAX));
    }

    #[test]
    fn default_bounds_require_one() {
        let b = GlobBounds::default();
        assert!(!b.lower_ok(0));
        assert!(b.lower_ok(1));
        assert!(b.upper_ok(1000));
    }

    #[test]
    fn tag_classification() {
        assert!(LinkTag::Set.is_unordered());
        assert!(!LinkTag::List.is_unordered());
        assert!(LinkTag::Predicate.is_evaluatable());
        assert!(LinkTag::And.is_evaluatable());
        assert!(LinkTag::And.is_connective());
        assert!(!LinkTag::Predicate.is_connective());
        assert!(!LinkTag::Choice.is_evaluatable());
    }
}
