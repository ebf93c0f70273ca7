//! Tree nodes and leaf entries.

use std::fmt::{self, Display};

use bytes::Bytes;

/// Identifies a node inside the [`Store`](crate::Store) arena.
///
/// Ids are only minted by the store that owns the node and stay valid for
/// the store's lifetime, since nodes are never removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// The root node, present in every store.
    pub const ROOT: NodeId = NodeId(0);

    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position of the node in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// A single key-value entry owned by a [`Node`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    key: String,
    value: Bytes,
}

impl Leaf {
    pub(crate) fn new(key: String, value: Bytes) -> Self {
        Self { key, value }
    }

    /// The entry's key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The stored value.
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// Length of the value in bytes.
    pub fn size(&self) -> usize {
        self.value.len()
    }

    /// Swaps in a new value, returning the old one.
    pub(crate) fn replace(&mut self, value: Bytes) -> Bytes {
        std::mem::replace(&mut self.value, value)
    }
}

/// A namespace node: one path segment with its children and entries.
#[derive(Debug)]
pub struct Node {
    segment: String,
    parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) entries: Vec<Leaf>,
}

impl Node {
    pub(crate) fn root() -> Self {
        Self {
            segment: String::new(),
            parent: None,
            children: Vec::new(),
            entries: Vec::new(),
        }
    }

    pub(crate) fn child(segment: String, parent: NodeId) -> Self {
        Self {
            segment,
            parent: Some(parent),
            children: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// The segment name. Empty for the root.
    pub fn segment(&self) -> &str {
        &self.segment
    }

    /// The parent node, or `None` for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Returns true for the root node.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Child nodes in creation order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[Leaf] {
        &self.entries
    }

    /// Looks up an entry by key.
    pub fn leaf(&self, key: &str) -> Option<&Leaf> {
        self.entries.iter().find(|leaf| leaf.key == key)
    }

    pub(crate) fn leaf_position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|leaf| leaf.key == key)
    }
}
