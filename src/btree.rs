use std::sync::Arc;

use tracing::{debug, trace};

use crate::{
    comparator::KeyLayout,
    error::Result,
    node::{MetaNode, Node, NodeId, NodeIdGenerator},
    store::{KvStore, NodeStore},
    BtreeConfig, Error,
};

mod check;
mod delete;
mod insert;
mod search;

pub use check::TreeShape;

/// Result of [`BtreeIndex::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The key (or for trees with duplicates the key/value pair) already exists, nothing was written.
    DuplicateKey,
}

/// Result of [`BtreeIndex::delete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    KeyFound,
    KeyNotFound,
}

/// Position of the range scan of a session.
#[derive(Debug, Clone)]
pub(crate) struct Cursor {
    leaf: Node,
    /// Slot of the entry that is returned by the next call to `index_next()`
    next_slot: usize,
}

enum OpenMode {
    Create,
    Open,
    OpenOrCreate,
}

/// A session on a single tree of an external key-value store.
///
/// All operations are executed against the given store value, which represents one open
/// transaction of the store. Each operation either writes all of its changed nodes to the store
/// or, when it fails, none of them. Failed operations with [`Error::is_transient`] can be
/// retried once the store has caught up, corruption errors mean the tree should not be used
/// anymore.
///
/// The root is looked up in the meta record at the start of every operation, so other
/// sessions on the same tree may grow or shrink it in between.
/// Node ids are generated by a [`NodeIdGenerator`], which can be shared between sessions.
pub struct BtreeIndex<S: KvStore> {
    store: NodeStore<S>,
    layout: KeyLayout,
    degree: usize,
    max_value_size: usize,
    execution_id: u64,
    meta: MetaNode,
    ids: Arc<NodeIdGenerator>,
    cursor: Option<Cursor>,
}

impl<S: KvStore> BtreeIndex<S> {
    /// Create a new and empty tree, fails if the tree already exists.
    pub fn create(kv: S, tree_id: u32, config: BtreeConfig) -> Result<BtreeIndex<S>> {
        Self::start(kv, tree_id, config, Arc::default(), OpenMode::Create)
    }

    /// Open an existing tree, fails if the tree does not exist.
    pub fn open(kv: S, tree_id: u32, config: BtreeConfig) -> Result<BtreeIndex<S>> {
        Self::start(kv, tree_id, config, Arc::default(), OpenMode::Open)
    }

    pub fn open_or_create(kv: S, tree_id: u32, config: BtreeConfig) -> Result<BtreeIndex<S>> {
        Self::start(kv, tree_id, config, Arc::default(), OpenMode::OpenOrCreate)
    }

    /// Like [`BtreeIndex::open_or_create`], but uses the given generator for new node ids.
    pub fn open_or_create_with_ids(
        kv: S,
        tree_id: u32,
        config: BtreeConfig,
        ids: Arc<NodeIdGenerator>,
    ) -> Result<BtreeIndex<S>> {
        Self::start(kv, tree_id, config, ids, OpenMode::OpenOrCreate)
    }

    fn start(
        kv: S,
        tree_id: u32,
        config: BtreeConfig,
        ids: Arc<NodeIdGenerator>,
        mode: OpenMode,
    ) -> Result<BtreeIndex<S>> {
        let degree = config.validate_degree()?;
        let layout = config.key_layout()?;
        let mut store = NodeStore::new(kv, tree_id);

        let meta = match (store.read_meta()?, mode) {
            (Some(_), OpenMode::Create) => return Err(Error::TreeAlreadyExists(tree_id)),
            (None, OpenMode::Open) => return Err(Error::TreeNotFound(tree_id)),
            (Some(mut meta), _) => {
                if meta.degree != degree {
                    return Err(Error::DegreeMismatch {
                        tree_id,
                        stored: meta.degree,
                        configured: degree,
                    });
                }
                meta.execution_id += 1;
                meta
            }
            (None, _) => {
                // A new tree consists of a single empty leaf
                let root = Node::new_leaf(ids.next_id(), None);
                let meta = MetaNode {
                    tree_id,
                    root_id: root.id,
                    execution_id: 1,
                    degree,
                };
                store.write_node(root);
                meta
            }
        };
        store.write_meta(meta.clone());
        store.commit()?;

        debug!(
            tree = tree_id,
            execution = meta.execution_id,
            root = %meta.root_id,
            degree,
            "opened tree"
        );

        Ok(BtreeIndex {
            store,
            layout,
            degree,
            max_value_size: config.max_value_size,
            execution_id: meta.execution_id,
            meta,
            ids,
            cursor: None,
        })
    }

    pub fn tree_id(&self) -> u32 {
        self.meta.tree_id
    }

    /// Number of times the tree had been opened when this session started, including its creation.
    pub fn execution_id(&self) -> u64 {
        self.execution_id
    }

    /// Root of the tree as seen by the last operation of this session.
    pub fn root_id(&self) -> NodeId {
        self.meta.root_id
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    pub fn store(&self) -> &S {
        self.store.kv()
    }

    pub fn store_mut(&mut self) -> &mut S {
        self.store.kv_mut()
    }

    /// Close the session and return the store.
    pub fn into_store(self) -> S {
        self.store.into_inner()
    }

    /// Read a node of this tree, e.g. for diagnostics.
    pub fn read_node(&self, id: NodeId) -> Result<Node> {
        self.store.read_node(id)
    }

    /// Execute a modifying operation and write its changes only if it succeeds.
    ///
    /// If the store itself fails while the changes are written, the transaction of the store
    /// may contain a part of them and has to be aborted by the caller.
    fn run<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let meta = self.meta.clone();
        let result = self
            .refresh_meta()
            .and_then(|_| op(self))
            .and_then(|result| self.store.commit().map(|_| result));
        if result.is_err() {
            self.store.discard();
            self.meta = meta;
        }
        result
    }

    /// Read the meta record, which always names the current root of the tree.
    fn load_meta(&self) -> Result<MetaNode> {
        let meta = self.store.read_meta()?.ok_or_else(|| {
            Error::corruption(format!("meta record of tree {} is missing", self.meta.tree_id))
        })?;
        if meta.degree != self.degree {
            return Err(Error::corruption(format!(
                "meta record of tree {} changed its degree from {} to {}",
                meta.tree_id, self.degree, meta.degree
            )));
        }
        Ok(meta)
    }

    fn refresh_meta(&mut self) -> Result<()> {
        let meta = self.load_meta()?;
        if meta.root_id != self.meta.root_id {
            trace!(
                target: "kv_btree_index::store",
                tree = meta.tree_id,
                old_root = %self.meta.root_id,
                new_root = %meta.root_id,
                "root was replaced by another session"
            );
        }
        self.meta = meta;
        Ok(())
    }

    fn set_root(&mut self, root_id: NodeId) {
        self.meta.root_id = root_id;
        self.store.write_meta(self.meta.clone());
    }

    /// Read the current root, including a root replaced earlier in the running operation.
    fn read_root(&self) -> Result<Node> {
        let meta = self.load_meta()?;
        let root = self.store.read_node(meta.root_id)?;
        if root.parent.is_some() || !root.node_active {
            return Err(Error::corruption(format!(
                "root {} of tree {} has a parent or was deleted",
                root.id, meta.tree_id
            )));
        }
        Ok(root)
    }

    fn validate_value(&self, value: &[u8]) -> Result<()> {
        if value.len() > self.max_value_size {
            Err(Error::ValueTooLarge {
                actual: value.len(),
                max: self.max_value_size,
            })
        } else {
            Ok(())
        }
    }
}
