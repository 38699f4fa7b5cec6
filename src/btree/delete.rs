use tracing::trace;

use crate::{
    comparator::Probe,
    error::Result,
    node::{max_keys, Entry, Node},
    store::KvStore,
    Error,
};

use super::{BtreeIndex, DeleteOutcome};

impl<S: KvStore> BtreeIndex<S> {
    /// Delete an entry from the tree.
    ///
    /// For trees without duplicates only the key is used to find the entry.
    /// Separators in internal nodes that are equal to the key are marked as inactive, the
    /// entry itself is removed from its leaf. Nodes that become too small are merged with
    /// or refilled from a sibling on the way back up. This resets the cursor of the session.
    pub fn delete(&mut self, key: &[u8], value: &[u8]) -> Result<DeleteOutcome> {
        self.layout.validate_full_key(key)?;
        self.validate_value(value)?;
        self.cursor = None;
        self.run(|t| {
            let probe = t.layout.probe(key, Some(value))?;
            let root = t.read_root()?;
            if t.delete_from(root, &probe)? {
                Ok(DeleteOutcome::KeyFound)
            } else {
                Ok(DeleteOutcome::KeyNotFound)
            }
        })
    }

    fn delete_from(&mut self, mut node: Node, probe: &Probe) -> Result<bool> {
        if node.is_leaf {
            let (pos, equal) = self.lower_bound(&node, probe);
            if equal && node.entries[pos].active {
                node.entries.remove(pos);
                self.store.write_node(node);
                return Ok(true);
            }
            return Ok(false);
        }

        let (idx, equal) = self.child_index(&node, probe);
        if equal && node.entries[idx - 1].active {
            // Keep the separator for routing until the node is restructured
            node.entries[idx - 1].active = false;
            self.store.write_node(node.clone());
        }

        let child = self.read_child(&node, idx)?;
        let child_id = child.id;
        let found = self.delete_from(child, probe)?;

        if found {
            let child = self.store.read_node(child_id)?;
            if child.is_underflow(self.degree) {
                let node = self.store.read_node(node.id)?;
                self.rebalance(node, idx, child)?;
            }
        }
        Ok(found)
    }

    /// Repair the underflowed child at position `idx` with one of its siblings.
    ///
    /// The right sibling is used, unless the child is the rightmost one.
    fn rebalance(&mut self, parent: Node, idx: usize, child: Node) -> Result<()> {
        if parent.children.len() < 2 {
            return Err(Error::corruption(format!(
                "underflowed node {} has no sibling in parent {}",
                child.id, parent.id
            )));
        }
        let (left_idx, left, right) = if idx + 1 < parent.children.len() {
            let right = self.read_child(&parent, idx + 1)?;
            (idx, child, right)
        } else {
            let left = self.read_child(&parent, idx - 1)?;
            (idx - 1, left, child)
        };
        if left.is_leaf != right.is_leaf {
            return Err(Error::corruption(format!(
                "siblings {} and {} are not on the same level",
                left.id, right.id
            )));
        }

        // Merge only if the siblings together hold fewer entries than a full node
        if left.entries.len() + right.entries.len() < max_keys(self.degree) {
            self.concatenate(parent, left_idx, left, right)
        } else {
            self.redistribute(parent, left_idx, left, right)
        }
    }

    /// Move all entries of the right sibling into the left one and remove the right sibling.
    fn concatenate(
        &mut self,
        mut parent: Node,
        left_idx: usize,
        mut left: Node,
        mut right: Node,
    ) -> Result<()> {
        let separator = parent.entries.remove(left_idx);
        parent.children.remove(left_idx + 1);

        if left.is_leaf {
            left.entries.extend(right.entries.iter().cloned());
            left.next_leaf = right.next_leaf;
            if let Some(next_id) = right.next_leaf {
                let mut next = self.store.read_node(next_id)?;
                next.prev_leaf = Some(left.id);
                self.store.write_node(next);
            }
        } else {
            left.entries.push(separator);
            left.entries.extend(right.entries.iter().cloned());
            for moved in &right.children {
                self.set_parent(*moved, left.id)?;
            }
            left.children.extend(right.children.iter().copied());
        }
        right.node_active = false;

        trace!(
            target: "kv_btree_index::merge",
            survivor = %left.id,
            removed = %right.id,
            leaf = left.is_leaf,
            "concatenated siblings"
        );

        // An empty non-root parent is repaired by the next level up
        if parent.entries.is_empty() && parent.id == self.meta.root_id {
            // The only remaining child becomes the new root
            left.parent = None;
            parent.node_active = false;
            self.set_root(left.id);
            trace!(
                target: "kv_btree_index::merge",
                tree = self.meta.tree_id,
                old_root = %parent.id,
                new_root = %left.id,
                "tree height decreased"
            );
        }

        self.store.write_node(parent);
        self.store.write_node(left);
        self.store.write_node(right);
        Ok(())
    }

    /// Move entries one at a time from the larger to the smaller sibling until both have
    /// the same size (plus or minus one).
    fn redistribute(
        &mut self,
        mut parent: Node,
        left_idx: usize,
        mut left: Node,
        mut right: Node,
    ) -> Result<()> {
        let moved_entries = left.entries.len().abs_diff(right.entries.len()) / 2;

        if left.is_leaf {
            while left.entries.len() > right.entries.len() + 1 {
                let e = pop_entry(&mut left)?;
                right.entries.insert(0, e);
            }
            while right.entries.len() > left.entries.len() + 1 {
                let e = right.entries.remove(0);
                left.entries.push(e);
            }
            let mut separator = right.entries.first().cloned().ok_or_else(|| {
                Error::corruption(format!("leaf {} is empty after redistribution", right.id))
            })?;
            separator.active = true;
            parent.entries[left_idx] = separator;
        } else {
            // Rotate through the parent: the separator moves down and a new one moves up
            while left.entries.len() > right.entries.len() + 1 {
                let up = pop_entry(&mut left)?;
                let moved_child = left.children.pop().ok_or_else(|| {
                    Error::corruption(format!("internal node {} has no children", left.id))
                })?;
                let down = std::mem::replace(&mut parent.entries[left_idx], up);
                right.entries.insert(0, down);
                right.children.insert(0, moved_child);
                self.set_parent(moved_child, right.id)?;
            }
            while right.entries.len() > left.entries.len() + 1 {
                let up = right.entries.remove(0);
                let moved_child = right.children.remove(0);
                let down = std::mem::replace(&mut parent.entries[left_idx], up);
                left.entries.push(down);
                left.children.push(moved_child);
                self.set_parent(moved_child, left.id)?;
            }
        }

        trace!(
            target: "kv_btree_index::merge",
            left = %left.id,
            right = %right.id,
            moved = moved_entries,
            leaf = left.is_leaf,
            "redistributed siblings"
        );

        self.store.write_node(parent);
        self.store.write_node(left);
        self.store.write_node(right);
        Ok(())
    }
}

fn pop_entry(node: &mut Node) -> Result<Entry> {
    node.entries
        .pop()
        .ok_or_else(|| Error::corruption(format!("node {} has no entries", node.id)))
}
