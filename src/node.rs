use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use uuid::Uuid;

use crate::{error::Result, Error};

/// Address of a node in the external store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn from_bytes(bytes: [u8; 16]) -> NodeId {
        NodeId(Uuid::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Encodes an optional id, using the nil UUID for `None`.
    pub(crate) fn to_wire(id: Option<NodeId>) -> [u8; 16] {
        id.map(|id| *id.as_bytes()).unwrap_or([0; 16])
    }

    pub(crate) fn from_wire(bytes: [u8; 16]) -> Option<NodeId> {
        let id = Uuid::from_bytes(bytes);
        if id.is_nil() {
            None
        } else {
            Some(NodeId(id))
        }
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generates unique node ids.
///
/// Each id is a random 64 bit epoch chosen when the generator is created followed by a
/// 64 bit sequence number. Sharing one generator (e.g. with an [`std::sync::Arc`]) between
/// sessions is safe, the sequence is an atomic counter.
#[derive(Debug)]
pub struct NodeIdGenerator {
    epoch: u64,
    sequence: AtomicU64,
}

impl Default for NodeIdGenerator {
    fn default() -> Self {
        NodeIdGenerator::new()
    }
}

impl NodeIdGenerator {
    pub fn new() -> NodeIdGenerator {
        NodeIdGenerator::with_epoch(rand::random())
    }

    /// Create a generator with a fixed epoch, which makes the generated ids deterministic.
    pub fn with_epoch(epoch: u64) -> NodeIdGenerator {
        NodeIdGenerator {
            epoch,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn next_id(&self) -> NodeId {
        // Starting the sequence at 1 means the nil UUID is never generated
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        NodeId(Uuid::from_u64_pair(self.epoch, seq))
    }
}

/// A key/value pair stored in a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Inactive entries are tombstoned separators that are kept as routing keys only.
    pub active: bool,
}

impl Entry {
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Entry {
        Entry {
            key,
            value,
            active: true,
        }
    }

    pub fn byte_size(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

/// A single page of the B+Tree.
///
/// Leaves hold all entries of the tree and are linked into a list in key order.
/// Internal nodes hold copies of keys as separators: `children[i]` contains the entries
/// less than `entries[i]`, `children[i + 1]` the ones greater or equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub is_leaf: bool,
    pub entries: Vec<Entry>,
    pub children: Vec<NodeId>,
    pub prev_leaf: Option<NodeId>,
    pub next_leaf: Option<NodeId>,
    pub node_active: bool,
}

impl Node {
    pub fn new_leaf(id: NodeId, parent: Option<NodeId>) -> Node {
        Node {
            id,
            parent,
            is_leaf: true,
            entries: Vec::new(),
            children: Vec::new(),
            prev_leaf: None,
            next_leaf: None,
            node_active: true,
        }
    }

    pub fn new_internal(id: NodeId, parent: Option<NodeId>) -> Node {
        Node {
            is_leaf: false,
            ..Node::new_leaf(id, parent)
        }
    }

    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// A full node has `2t - 1` entries and must be split before anything is inserted.
    pub fn is_full(&self, degree: usize) -> bool {
        self.entries.len() >= max_keys(degree)
    }

    /// Non-root nodes must never have less than `t - 1` entries after an operation.
    pub fn is_underflow(&self, degree: usize) -> bool {
        self.entries.len() < min_keys(degree)
    }

    /// Insert an entry at the given position, shifting the following entries to the right.
    pub(crate) fn insert_entry(&mut self, degree: usize, idx: usize, entry: Entry) -> Result<()> {
        if self.is_full(degree) || idx > self.entries.len() {
            return Err(Error::corruption(format!(
                "can not insert at position {idx} into node {} with {} entries",
                self.id,
                self.entries.len()
            )));
        }
        self.entries.insert(idx, entry);
        Ok(())
    }
}

/// Maximum number of entries of a node with the given degree.
pub fn max_keys(degree: usize) -> usize {
    2 * degree - 1
}

/// Minimum number of entries of a non-root node with the given degree.
pub fn min_keys(degree: usize) -> usize {
    degree - 1
}

/// The root pointer record of a logical tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaNode {
    pub tree_id: u32,
    pub root_id: NodeId,
    /// Incremented each time a session opens the tree.
    pub execution_id: u64,
    pub degree: usize,
}

#[cfg(test)]
mod tests;
