//! The store: node arena plus path and entry operations.

use std::fmt::Write as _;

use bytes::Bytes;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::limits::StoreLimits;
use crate::node::{Leaf, Node, NodeId};
use crate::path;

/// Outcome of a successful [`Store::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// A new entry was appended.
    Created,
    /// An existing entry's value was replaced.
    Updated {
        /// Size of the value that was released.
        previous_size: usize,
    },
}

/// Counters describing the current contents of a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of nodes, including the root.
    pub nodes: usize,
    /// Number of entries across all nodes.
    pub leaves: usize,
    /// Sum of all value sizes.
    pub value_bytes: usize,
}

/// Hierarchical in-memory key-value store.
///
/// The store is single-owner state: it takes `&mut self` for mutation and
/// holds no locks. Wrap it in a mutex (or shard it by top-level segment) if
/// it ever needs to be shared between threads.
#[derive(Debug)]
pub struct Store {
    nodes: Vec<Node>,
    limits: StoreLimits,
    stats: StoreStats,
}

impl Store {
    /// Creates an empty store with default limits.
    pub fn new() -> Self {
        Self::with_limits(StoreLimits::default())
    }

    /// Creates an empty store with the given limits.
    pub fn with_limits(limits: StoreLimits) -> Self {
        Self {
            nodes: vec![Node::root()],
            limits,
            stats: StoreStats {
                nodes: 1,
                ..StoreStats::default()
            },
        }
    }

    /// Returns the limits this store enforces.
    pub fn limits(&self) -> &StoreLimits {
        &self.limits
    }

    /// Returns the root node id.
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Returns the node for `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this store.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Returns current content counters.
    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    fn find_child(&self, parent: NodeId, segment: &str) -> Option<NodeId> {
        self.node(parent)
            .children
            .iter()
            .copied()
            .find(|&child| self.node(child).segment() == segment)
    }

    /// Resolves `path`, creating every missing segment along the way.
    pub fn ensure_path(&mut self, path: &str) -> StoreResult<NodeId> {
        let segments = path::segments(path, &self.limits)?;

        let mut current = NodeId::ROOT;
        for segment in segments {
            current = match self.find_child(current, segment) {
                Some(child) => child,
                None => self.attach_child(current, segment)?,
            };
        }
        Ok(current)
    }

    fn attach_child(&mut self, parent: NodeId, segment: &str) -> StoreResult<NodeId> {
        self.nodes
            .try_reserve(1)
            .map_err(|_| StoreError::OutOfMemory("allocating a node"))?;
        self.nodes[parent.index()]
            .children
            .try_reserve(1)
            .map_err(|_| StoreError::OutOfMemory("linking a child node"))?;

        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Node::child(segment.to_string(), parent));
        self.nodes[parent.index()].children.push(id);
        self.stats.nodes += 1;

        debug!(%id, %parent, segment, "created node");
        Ok(id)
    }

    /// Resolves `path` without creating anything.
    pub fn resolve_path(&self, path: &str) -> StoreResult<NodeId> {
        let segments = path::segments(path, &self.limits)?;

        let mut current = NodeId::ROOT;
        for segment in segments {
            current = self
                .find_child(current, segment)
                .ok_or_else(|| StoreError::PathNotFound {
                    path: path.to_string(),
                })?;
        }
        Ok(current)
    }

    /// Stores `value` under `key` in the node at `path`.
    ///
    /// Missing path segments are created. An existing entry is updated in
    /// place and keeps its position.
    pub fn set(&mut self, path: &str, key: &str, value: &[u8]) -> StoreResult<SetOutcome> {
        path::validate_key(key, &self.limits)?;
        if value.len() > self.limits.max_value_len {
            return Err(StoreError::ValueTooLarge {
                len: value.len(),
                max: self.limits.max_value_len,
            });
        }
        let value = copy_value(value)?;

        let id = self.ensure_path(path)?;
        let node = &mut self.nodes[id.index()];

        if let Some(leaf) = node.entries.iter_mut().find(|leaf| leaf.key() == key) {
            let previous = leaf.replace(value);
            self.stats.value_bytes = self.stats.value_bytes - previous.len() + leaf.size();
            return Ok(SetOutcome::Updated {
                previous_size: previous.len(),
            });
        }

        node.entries
            .try_reserve(1)
            .map_err(|_| StoreError::OutOfMemory("appending an entry"))?;
        self.stats.value_bytes += value.len();
        self.stats.leaves += 1;
        node.entries.push(Leaf::new(key.to_string(), value));
        Ok(SetOutcome::Created)
    }

    /// Returns the value stored under `key` in the node at `path`.
    pub fn get(&self, path: &str, key: &str) -> StoreResult<Bytes> {
        path::validate_key(key, &self.limits)?;
        let id = self.resolve_path(path)?;

        self.node(id)
            .leaf(key)
            .map(|leaf| leaf.value().clone())
            .ok_or_else(|| StoreError::KeyNotFound {
                path: path.to_string(),
                key: key.to_string(),
            })
    }

    /// Removes the entry `key` from the node at `path`.
    ///
    /// The node itself stays, even when it becomes empty.
    pub fn delete(&mut self, path: &str, key: &str) -> StoreResult<()> {
        path::validate_key(key, &self.limits)?;
        let id = self.resolve_path(path)?;
        let node = &mut self.nodes[id.index()];

        let Some(position) = node.leaf_position(key) else {
            return Err(StoreError::KeyNotFound {
                path: path.to_string(),
                key: key.to_string(),
            });
        };

        let removed = node.entries.remove(position);
        self.stats.leaves -= 1;
        self.stats.value_bytes -= removed.size();
        Ok(())
    }

    /// Returns the canonical `/a/b` path of a node.
    pub fn path_of(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.node(node_id);
            if !node.is_root() {
                segments.push(node.segment());
            }
            current = node.parent();
        }
        path::join(segments.into_iter().rev())
    }

    /// Renders the tree as an indented listing of nodes and entry sizes.
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        self.render_node(NodeId::ROOT, 0, &mut out);
        out
    }

    fn render_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let node = self.node(id);
        let indent = "  ".repeat(depth);

        if node.is_root() {
            out.push_str("/\n");
        } else {
            let _ = writeln!(out, "{indent}{}/", node.segment());
        }
        for leaf in node.entries() {
            let _ = writeln!(out, "{indent}  {} ({} bytes)", leaf.key(), leaf.size());
        }
        for &child in node.children() {
            self.render_node(child, depth + 1, out);
        }
    }

    /// Releases every node and entry, returning the final counters.
    pub fn teardown(self) -> StoreStats {
        let stats = self.stats;
        drop(self);
        info!(
            nodes = stats.nodes,
            leaves = stats.leaves,
            value_bytes = stats.value_bytes,
            "store torn down"
        );
        stats
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

fn copy_value(value: &[u8]) -> StoreResult<Bytes> {
    let mut owned = Vec::new();
    owned
        .try_reserve_exact(value.len())
        .map_err(|_| StoreError::OutOfMemory("copying a value"))?;
    owned.extend_from_slice(value);
    Ok(Bytes::from(owned))
}
