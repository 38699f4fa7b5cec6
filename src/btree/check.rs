use std::cmp::Ordering;

use crate::{
    error::Result,
    node::{max_keys, Entry, Node, NodeId},
    store::KvStore,
    Error,
};

use super::BtreeIndex;

/// Summary of a tree that passed [`BtreeIndex::check_recursive`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeShape {
    /// Number of levels, a tree with only a root leaf has height 1.
    pub height: usize,
    pub nodes: usize,
    pub leaves: usize,
    /// Number of active entries in all leaves.
    pub entries: usize,
}

/// Smallest and largest entry of a subtree and its height.
struct Subtree {
    min: Option<Entry>,
    max: Option<Entry>,
    height: usize,
}

/// Leaf in the order it is reached through the child pointers.
struct LeafLink {
    id: NodeId,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

impl<S: KvStore> BtreeIndex<S> {
    /// Walk the tree from the root along the child pointers and verify all structural invariants.
    ///
    /// This checks the order of the entries, the separator relationship between each node and
    /// its children, the minimum fill degree, parent pointers, that all leaves are on the same
    /// level and that the leaf links match the order of the leaves.
    /// This is a diagnostic which reads every node of the tree.
    pub fn check_recursive(&self) -> Result<TreeShape> {
        let root = self.read_root()?;
        let mut shape = TreeShape::default();
        let mut leaves = Vec::new();
        let subtree = self.check_node(&root, true, None, None, &mut shape, &mut leaves)?;
        shape.height = subtree.height;

        for (i, leaf) in leaves.iter().enumerate() {
            let expected_prev = i.checked_sub(1).map(|p| leaves[p].id);
            let expected_next = leaves.get(i + 1).map(|n| n.id);
            if leaf.prev != expected_prev || leaf.next != expected_next {
                return Err(Error::corruption(format!(
                    "leaf {} links to {:?}/{:?}, but its neighbours are {:?}/{:?}",
                    leaf.id, leaf.prev, leaf.next, expected_prev, expected_next
                )));
            }
        }
        Ok(shape)
    }

    fn check_node(
        &self,
        node: &Node,
        is_root: bool,
        lower: Option<&Entry>,
        upper: Option<&Entry>,
        shape: &mut TreeShape,
        leaves: &mut Vec<LeafLink>,
    ) -> Result<Subtree> {
        shape.nodes += 1;

        if !node.node_active {
            return Err(Error::corruption(format!("node {} is deleted", node.id)));
        }
        if !is_root && node.is_underflow(self.degree) {
            return Err(Error::corruption(format!(
                "node {} has only {} entries",
                node.id,
                node.entries.len()
            )));
        }
        if node.entries.len() > max_keys(self.degree) {
            return Err(Error::corruption(format!(
                "node {} has {} entries, more than its capacity",
                node.id,
                node.entries.len()
            )));
        }
        for pair in node.entries.windows(2) {
            if self.compare_entries(&pair[0], &pair[1]) != Ordering::Less {
                return Err(Error::corruption(format!(
                    "entries {} and {} of node {} are not in order",
                    self.layout.describe(&pair[0].key),
                    self.layout.describe(&pair[1].key),
                    node.id
                )));
            }
        }
        if let (Some(lower), Some(first)) = (lower, node.entries.first()) {
            if self.compare_entries(first, lower) == Ordering::Less {
                return Err(Error::corruption(format!(
                    "node {} contains {}, which is less than its lower bound {}",
                    node.id,
                    self.layout.describe(&first.key),
                    self.layout.describe(&lower.key)
                )));
            }
        }
        if let (Some(upper), Some(last)) = (upper, node.entries.last()) {
            if self.compare_entries(last, upper) != Ordering::Less {
                return Err(Error::corruption(format!(
                    "node {} contains {}, which is not less than its upper bound {}",
                    node.id,
                    self.layout.describe(&last.key),
                    self.layout.describe(&upper.key)
                )));
            }
        }

        if node.is_leaf {
            if !node.children.is_empty() {
                return Err(Error::corruption(format!("leaf {} has children", node.id)));
            }
            if let Some(e) = node.entries.iter().find(|e| !e.active) {
                return Err(Error::corruption(format!(
                    "leaf {} still contains the deleted entry {}",
                    node.id,
                    self.layout.describe(&e.key)
                )));
            }
            shape.leaves += 1;
            shape.entries += node.entries.len();
            leaves.push(LeafLink {
                id: node.id,
                prev: node.prev_leaf,
                next: node.next_leaf,
            });
            return Ok(Subtree {
                min: node.entries.first().cloned(),
                max: node.entries.last().cloned(),
                height: 1,
            });
        }

        if node.children.len() != node.entries.len() + 1 {
            return Err(Error::corruption(format!(
                "internal node {} has {} entries and {} children",
                node.id,
                node.entries.len(),
                node.children.len()
            )));
        }
        if node.prev_leaf.is_some() || node.next_leaf.is_some() {
            return Err(Error::corruption(format!(
                "internal node {} has leaf links",
                node.id
            )));
        }

        let mut height = None;
        let mut min = None;
        let mut max = None;
        for idx in 0..node.children.len() {
            let child = self.read_child(node, idx)?;
            let child_lower = if idx == 0 {
                lower
            } else {
                Some(&node.entries[idx - 1])
            };
            let child_upper = node.entries.get(idx).or(upper);
            let subtree = self.check_node(&child, false, child_lower, child_upper, shape, leaves)?;

            if *height.get_or_insert(subtree.height) != subtree.height {
                return Err(Error::corruption(format!(
                    "children of node {} have different heights",
                    node.id
                )));
            }
            if idx > 0 {
                self.check_separator(node, idx - 1, subtree.min.as_ref())?;
            }
            if idx == 0 {
                min = subtree.min;
            }
            max = subtree.max;
        }

        Ok(Subtree {
            min,
            max,
            height: height.unwrap_or(0) + 1,
        })
    }

    /// An active separator is equal to the smallest entry right of it, an inactive one is less.
    fn check_separator(&self, node: &Node, idx: usize, right_min: Option<&Entry>) -> Result<()> {
        let separator = &node.entries[idx];
        let right_min = right_min.ok_or_else(|| {
            Error::corruption(format!(
                "subtree right of separator {idx} of node {} is empty",
                node.id
            ))
        })?;
        let ord = self.compare_entries(separator, right_min);
        let valid = if separator.active {
            ord == Ordering::Equal
        } else {
            ord == Ordering::Less
        };
        if !valid {
            return Err(Error::corruption(format!(
                "separator {} (active: {}) of node {} does not match the smallest key {} right of it",
                self.layout.describe(&separator.key),
                separator.active,
                node.id,
                self.layout.describe(&right_min.key)
            )));
        }
        Ok(())
    }

    /// Scan all entries along the leaf links and check they are strictly ascending.
    ///
    /// This does not depend on the internal nodes, so it finds broken leaf links that
    /// [`BtreeIndex::check_recursive`] would not see. Returns the number of entries.
    /// The cursor of the session is not changed.
    pub fn check_sequential(&self) -> Result<usize> {
        let mut cursor = self.first_leaf()?;
        if cursor.leaf.prev_leaf.is_some() {
            return Err(Error::corruption(format!(
                "leftmost leaf {} has a previous leaf",
                cursor.leaf.id
            )));
        }
        let mut count = 0;
        let mut previous: Option<Entry> = None;
        while let Some(e) = self.advance(&mut cursor)? {
            if let Some(previous) = &previous {
                if self.compare_entries(previous, &e) != Ordering::Less {
                    return Err(Error::corruption(format!(
                        "entry {} follows {} in leaf {}",
                        self.layout.describe(&e.key),
                        self.layout.describe(&previous.key),
                        cursor.leaf.id
                    )));
                }
            }
            count += 1;
            previous = Some(e);
        }
        Ok(count)
    }
}
