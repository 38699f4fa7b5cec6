use std::cmp::Ordering;

use crate::{
    comparator::Probe,
    error::Result,
    node::{Entry, Node, NodeId},
    store::KvStore,
    Error,
};

use super::{BtreeIndex, Cursor};

impl<S: KvStore> BtreeIndex<S> {
    /// Search for a full or partial key and return the value of the first matching entry.
    ///
    /// A partial key contains only the first fields of the composite key. It matches the
    /// leftmost entry whose key is not less than the partial key if that entry starts with
    /// the given fields. After the search, the cursor is placed behind the found entry
    /// (or before the first larger one), so [`BtreeIndex::index_next`] continues from there.
    pub fn search(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let probe = self.layout.probe(key, None)?;
        let found = self.position_cursor(&probe)?;
        Ok(found.map(|e| e.value))
    }

    /// Returns whether the exact key/value pair is stored.
    ///
    /// For trees without duplicates the value is ignored.
    pub fn contains(&mut self, key: &[u8], value: &[u8]) -> Result<bool> {
        self.layout.validate_full_key(key)?;
        let probe = self.layout.probe(key, Some(value))?;
        Ok(self.position_cursor(&probe)?.is_some())
    }

    /// Place the cursor at the first entry that is not less than the (possibly partial) key
    /// and return it.
    pub fn seek(&mut self, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let probe = self.layout.probe(key, None)?;
        let (leaf, pos) = self.find_leaf(&probe)?;
        let mut cursor = Cursor {
            leaf,
            next_slot: pos,
        };
        let result = self.advance(&mut cursor);
        self.cursor = Some(cursor);
        Ok(result?.map(|e| (e.key, e.value)))
    }

    /// Place the cursor at the smallest entry of the tree and return it.
    ///
    /// Returns `None` if the tree is empty.
    pub fn index_first(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let mut cursor = self.first_leaf()?;
        let result = self.advance(&mut cursor);
        self.cursor = Some(cursor);
        Ok(result?.map(|e| (e.key, e.value)))
    }

    /// Return the entry after the current cursor position and move the cursor forward.
    ///
    /// Returns `None` once the last entry has been returned.
    pub fn index_next(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let mut cursor = self.cursor.take().ok_or(Error::CursorNotPositioned)?;
        let result = self.advance(&mut cursor);
        self.cursor = Some(cursor);
        Ok(result?.map(|e| (e.key, e.value)))
    }

    /// Return up to `max_entries` entries after the current cursor position.
    ///
    /// Collecting stops early at the end of the tree or before the sum of key and value sizes
    /// would exceed `max_bytes`. At least one entry is returned unless the end was reached.
    pub fn index_next_batch(
        &mut self,
        max_entries: usize,
        max_bytes: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut cursor = self.cursor.take().ok_or(Error::CursorNotPositioned)?;
        let mut result = Vec::new();
        let mut bytes = 0;
        while result.len() < max_entries {
            match self.advance(&mut cursor) {
                Ok(Some(e)) => {
                    if !result.is_empty() && bytes + e.byte_size() > max_bytes {
                        // Leave the entry for the next call
                        cursor.next_slot -= 1;
                        break;
                    }
                    bytes += e.byte_size();
                    result.push((e.key, e.value));
                }
                Ok(None) => break,
                Err(e) => {
                    self.cursor = Some(cursor);
                    return Err(e);
                }
            }
        }
        self.cursor = Some(cursor);
        Ok(result)
    }

    /// Descend to the leaf for the probe and return the matching entry, if any.
    fn position_cursor(&mut self, probe: &Probe) -> Result<Option<Entry>> {
        let (leaf, pos) = self.find_leaf(probe)?;
        let mut cursor = Cursor {
            leaf,
            next_slot: pos,
        };
        let found = match self.advance(&mut cursor) {
            Ok(Some(e)) if self.compare(probe, &e) == Ordering::Equal => Some(e),
            Ok(Some(_)) => {
                // Not a match, the entry is the next one to return from the cursor
                cursor.next_slot -= 1;
                None
            }
            Ok(None) => None,
            Err(e) => return Err(e),
        };
        self.cursor = Some(cursor);
        Ok(found)
    }

    pub(crate) fn compare(&self, probe: &Probe, entry: &Entry) -> Ordering {
        self.layout.compare_probe(probe, &entry.key, &entry.value)
    }

    /// Position of the first entry of the node that is not less than the probe and whether
    /// this entry is equal to the probe.
    pub(crate) fn lower_bound(&self, node: &Node, probe: &Probe) -> (usize, bool) {
        let pos = node
            .entries
            .partition_point(|e| self.compare(probe, e) == Ordering::Greater);
        let equal = node
            .entries
            .get(pos)
            .map(|e| self.compare(probe, e) == Ordering::Equal)
            .unwrap_or(false);
        (pos, equal)
    }

    /// Index of the child of an internal node to descend into for the probe.
    ///
    /// Entries equal to a separator are stored right of it, but only a complete probe can be
    /// equal to exactly these entries. For partial probes, equal entries can also be left of
    /// the separator, so the search continues on the left to find the leftmost match.
    /// The returned flag is true if the probe is equal to the separator left of the child.
    pub(crate) fn child_index(&self, node: &Node, probe: &Probe) -> (usize, bool) {
        let (pos, equal) = self.lower_bound(node, probe);
        if equal && self.layout.is_complete(probe) {
            (pos + 1, true)
        } else {
            (pos, false)
        }
    }

    /// Read the child at the given index and check it is consistent with its parent.
    pub(crate) fn read_child(&self, parent: &Node, idx: usize) -> Result<Node> {
        let child_id = *parent.children.get(idx).ok_or_else(|| {
            Error::corruption(format!(
                "node {} has {} children, but child {idx} was requested",
                parent.id,
                parent.children.len()
            ))
        })?;
        let child = self.store.read_node(child_id)?;
        if child.parent != Some(parent.id) || !child.node_active {
            return Err(Error::corruption(format!(
                "child {child_id} of node {} has parent {:?} and active flag {}",
                parent.id, child.parent, child.node_active
            )));
        }
        if idx > 0 {
            let separator = &parent.entries[idx - 1];
            if let Some(first) = child.entries.first() {
                if self.compare_entries(first, separator) == Ordering::Less {
                    return Err(Error::corruption(format!(
                        "first key {} of node {child_id} is less than the separator {} of its parent {}",
                        self.layout.describe(&first.key),
                        self.layout.describe(&separator.key),
                        parent.id
                    )));
                }
            }
        }
        if let (Some(separator), Some(last)) = (parent.entries.get(idx), child.entries.last()) {
            if self.compare_entries(last, separator) != Ordering::Less {
                return Err(Error::corruption(format!(
                    "last key {} of node {child_id} is not less than the separator {} of its parent {}",
                    self.layout.describe(&last.key),
                    self.layout.describe(&separator.key),
                    parent.id
                )));
            }
        }
        Ok(child)
    }

    pub(crate) fn compare_entries(&self, a: &Entry, b: &Entry) -> Ordering {
        self.layout.compare(&a.key, &a.value, &b.key, &b.value)
    }

    /// Descend from the root to the leaf responsible for the probe.
    ///
    /// Returns the leaf and the position of the first entry not less than the probe.
    pub(crate) fn find_leaf(&self, probe: &Probe) -> Result<(Node, usize)> {
        let mut node = self.read_root()?;
        while !node.is_leaf {
            let (idx, _) = self.child_index(&node, probe);
            node = self.read_child(&node, idx)?;
        }
        let (pos, _) = self.lower_bound(&node, probe);
        Ok((node, pos))
    }

    /// Cursor before the first entry of the leftmost leaf.
    pub(crate) fn first_leaf(&self) -> Result<Cursor> {
        let mut node = self.read_root()?;
        while !node.is_leaf {
            node = self.read_child(&node, 0)?;
        }
        Ok(Cursor {
            leaf: node,
            next_slot: 0,
        })
    }

    /// Return the next active entry of the cursor and move it forward, following the leaf chain.
    pub(crate) fn advance(&self, cursor: &mut Cursor) -> Result<Option<Entry>> {
        loop {
            while let Some(e) = cursor.leaf.entries.get(cursor.next_slot) {
                cursor.next_slot += 1;
                if e.active {
                    return Ok(Some(e.clone()));
                }
            }
            match cursor.leaf.next_leaf {
                Some(next) => {
                    cursor.leaf = self.read_next_leaf(&cursor.leaf, next)?;
                    cursor.next_slot = 0;
                }
                None => return Ok(None),
            }
        }
    }

    fn read_next_leaf(&self, leaf: &Node, next: NodeId) -> Result<Node> {
        let n = self.store.read_node(next)?;
        if !n.is_leaf || !n.node_active || n.prev_leaf != Some(leaf.id) {
            return Err(Error::corruption(format!(
                "leaf {next} following leaf {} is not an active leaf linking back to it",
                leaf.id
            )));
        }
        Ok(n)
    }
}
