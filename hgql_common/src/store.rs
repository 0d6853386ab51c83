//! The store interface the engine matches against, plus a reference
//! in-memory implementation.

use std::collections::HashMap;

use crate::atom::{Atom, AtomId, GlobBounds, LinkTag};

/// Read-only view of a hypergraph store.
///
/// The engine consumes exactly three operations: structural resolution of a
/// handle, the reverse-reference ("incoming") set used to walk upward from a
/// grounded subterm, and whole-store enumeration used only by search
/// initiation. Everything else the engine needs goes through its policy
/// callbacks.
pub trait GraphStore {
    /// Resolve a handle to its atom. Panics are acceptable for handles that
    /// were never issued by this store; the engine only passes handles it
    /// received from the store or the compiled pattern.
    fn atom(&self, id: AtomId) -> &Atom;

    /// Every link whose outgoing set contains `id`, in store order. No
    /// ordering guarantee is required beyond being stable for the lifetime
    /// of a search.
    fn incoming(&self, id: AtomId) -> Vec<AtomId>;

    /// All atom handles, in store order. Used by search initiators to seed
    /// variable searches; never called during matching itself.
    fn atoms(&self) -> Vec<AtomId>;
}

/// Interning in-memory store.
///
/// Atoms are deduplicated by structural content, so inserting the same
/// structure twice yields the same handle. Incoming sets are maintained on
/// link insertion, in insertion order.
#[derive(Debug, Default)]
pub struct MemStore {
    atoms: Vec<Atom>,
    incoming: Vec<Vec<AtomId>>,
    interned: HashMap<Atom, AtomId>,
}

impl MemStore {
    /// Fresh empty store.
    pub fn new() -> Self {
        MemStore::default()
    }

    /// Number of atoms held.
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    /// Whether the store holds no atoms.
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Intern an atom, returning the existing handle when the structure is
    /// already present.
    pub fn intern(&mut self, atom: Atom) -> AtomId {
        if let Some(&id) = self.interned.get(&atom) {
            return id;
        }
        let id = AtomId::new(self.atoms.len() as u32);
        if let Atom::Link { children, .. } = &atom {
            for &child in children {
                let entry = &mut self.incoming[child.raw() as usize];
                // A link lists once in a child's incoming set even when the
                // child occurs at several positions.
                if entry.last() != Some(&id) {
                    entry.push(id);
                }
            }
        }
        self.interned.insert(atom.clone(), id);
        self.atoms.push(atom);
        self.incoming.push(Vec::new());
        id
    }

    /// Intern a labelled node.
    pub fn node(&mut self, label: impl Into<String>) -> AtomId {
        self.intern(Atom::Node {
            label: label.into(),
        })
    }

    /// Intern a pattern variable.
    pub fn variable(&mut self, name: impl Into<String>) -> AtomId {
        self.intern(Atom::Variable { name: name.into() })
    }

    /// Intern a glob with explicit bounds.
    pub fn glob(&mut self, name: impl Into<String>, bounds: GlobBounds) -> AtomId {
        self.intern(Atom::Glob {
            name: name.into(),
            bounds,
        })
    }

    /// Intern a link over previously interned children.
    pub fn link(&mut self, tag: LinkTag, children: Vec<AtomId>) -> AtomId {
        self.intern(Atom::Link { tag, children })
    }
}

impl GraphStore for MemStore {
    fn atom(&self, id: AtomId) -> &Atom {
        &self.atoms[id.raw() as usize]
    }

    fn incoming(&self, id: AtomId) -> Vec<AtomId> {
        self.incoming[id.raw() as usize].clone()
    }

    fn atoms(&self) -> Vec<AtomId> {
        (0..self.atoms.len() as u32).map(AtomId::new).collect()
    }
}
