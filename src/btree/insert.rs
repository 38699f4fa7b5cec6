use std::cmp::Ordering;

use tracing::trace;

use crate::{
    comparator::Probe,
    error::Result,
    node::{Entry, Node, NodeId},
    store::KvStore,
    Error,
};

use super::{BtreeIndex, InsertOutcome};

impl<S: KvStore> BtreeIndex<S> {
    /// Insert a new entry into the tree.
    ///
    /// Nodes are split on the way down, so the leaf the entry ends up in is never full.
    /// If the key (for trees with duplicates the key/value pair) already exists, nothing is
    /// changed and [`InsertOutcome::DuplicateKey`] is returned.
    /// This resets the cursor of the session.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<InsertOutcome> {
        self.layout.validate_full_key(key)?;
        self.validate_value(value)?;
        self.cursor = None;
        self.run(|t| t.insert_new(key, value))
    }

    fn insert_new(&mut self, key: &[u8], value: &[u8]) -> Result<InsertOutcome> {
        let probe = self.layout.probe(key, Some(value))?;

        // The leaf holds an equal entry at the lower bound if it exists at all
        let (leaf, pos) = self.find_leaf(&probe)?;
        let exists = leaf
            .entries
            .get(pos)
            .map(|e| e.active && self.compare(&probe, e) == Ordering::Equal)
            .unwrap_or(false);
        if exists {
            return Ok(InsertOutcome::DuplicateKey);
        }

        let mut root = self.read_root()?;
        if root.is_full(self.degree) {
            // The tree only grows at the root: the old root becomes the single child of a new one
            let mut new_root = Node::new_internal(self.ids.next_id(), None);
            new_root.children.push(root.id);
            root.parent = Some(new_root.id);
            self.split_child(&mut new_root, 0, &mut root)?;
            self.set_root(new_root.id);
            trace!(
                target: "kv_btree_index::insert",
                tree = self.meta.tree_id,
                old_root = %root.id,
                new_root = %new_root.id,
                "tree height increased"
            );
            root = new_root;
        }

        self.insert_nonfull(root, &probe, Entry::new(key.to_vec(), value.to_vec()))?;
        Ok(InsertOutcome::Inserted)
    }

    fn insert_nonfull(&mut self, mut node: Node, probe: &Probe, entry: Entry) -> Result<()> {
        loop {
            if node.is_leaf {
                let (pos, _) = self.lower_bound(&node, probe);
                node.insert_entry(self.degree, pos, entry)?;
                self.store.write_node(node);
                return Ok(());
            }

            let (idx, _) = self.child_index(&node, probe);
            let mut child = self.read_child(&node, idx)?;
            if child.is_full(self.degree) {
                let sibling = self.split_child(&mut node, idx, &mut child)?;
                // The promoted median decides which half the entry belongs to
                if self.child_index(&node, probe).0 > idx {
                    child = sibling;
                }
            }

            let (idx, equal) = self.child_index(&node, probe);
            if equal {
                // The key was deleted before, but is still used as separator
                let separator = &mut node.entries[idx - 1];
                if !separator.active {
                    separator.active = true;
                    separator.value = entry.value.clone();
                    self.store.write_node(node.clone());
                }
            }
            node = child;
        }
    }

    /// Split the full child at position `idx` of the parent into two nodes.
    ///
    /// The median entry is moved to the parent, for leaves a copy of it stays in the new right
    /// sibling, which is returned. Parent, child and sibling are written to the store.
    pub(crate) fn split_child(
        &mut self,
        parent: &mut Node,
        idx: usize,
        child: &mut Node,
    ) -> Result<Node> {
        let t = self.degree;
        if !child.is_full(t) || parent.children.get(idx) != Some(&child.id) {
            return Err(Error::corruption(format!(
                "node {} with {} entries can not be split as child {idx} of {}",
                child.id,
                child.entries.len(),
                parent.id
            )));
        }

        let mut sibling = if child.is_leaf {
            Node::new_leaf(self.ids.next_id(), Some(parent.id))
        } else {
            Node::new_internal(self.ids.next_id(), Some(parent.id))
        };

        let median = if child.is_leaf {
            sibling.entries = child.entries.split_off(t - 1);
            let mut median = sibling.entries[0].clone();
            median.active = true;

            sibling.prev_leaf = Some(child.id);
            sibling.next_leaf = child.next_leaf;
            if let Some(next_id) = child.next_leaf {
                let mut next = self.store.read_node(next_id)?;
                next.prev_leaf = Some(sibling.id);
                self.store.write_node(next);
            }
            child.next_leaf = Some(sibling.id);
            median
        } else {
            let mut right = child.entries.split_off(t - 1);
            let median = right.remove(0);
            sibling.entries = right;
            sibling.children = child.children.split_off(t);
            for moved in &sibling.children {
                self.set_parent(*moved, sibling.id)?;
            }
            median
        };

        parent.insert_entry(t, idx, median)?;
        parent.children.insert(idx + 1, sibling.id);

        trace!(
            target: "kv_btree_index::split",
            parent = %parent.id,
            left = %child.id,
            right = %sibling.id,
            leaf = child.is_leaf,
            "split node"
        );

        self.store.write_node(parent.clone());
        self.store.write_node(child.clone());
        self.store.write_node(sibling.clone());
        Ok(sibling)
    }

    pub(crate) fn set_parent(&mut self, node_id: NodeId, parent: NodeId) -> Result<()> {
        let mut node = self.store.read_node(node_id)?;
        node.parent = Some(parent);
        self.store.write_node(node);
        Ok(())
    }
}
