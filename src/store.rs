use std::collections::{BTreeMap, HashSet};

use linked_hash_map::LinkedHashMap;

use crate::{
    error::Result,
    node::{MetaNode, Node, NodeId},
    serializer::NodeCodec,
    Error,
};

/// Result of reading a key from a [`KvStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetch {
    Value(Vec<u8>),
    /// The key exists, but the transaction that wrote it is not yet visible locally.
    NotReady,
    Absent,
}

/// The external transactional key-value store the index lives in.
///
/// One value of this type represents one open transaction. Committing, aborting and
/// detecting conflicts is up to the implementation and the caller.
pub trait KvStore {
    fn get(&self, key: &[u8]) -> Result<Fetch>;
    fn put(&mut self, key: &[u8], value: Vec<u8>) -> Result<()>;
}

impl<S: KvStore + ?Sized> KvStore for &mut S {
    fn get(&self, key: &[u8]) -> Result<Fetch> {
        (**self).get(key)
    }

    fn put(&mut self, key: &[u8], value: Vec<u8>) -> Result<()> {
        (**self).put(key, value)
    }
}

impl<S: KvStore + ?Sized> KvStore for Box<S> {
    fn get(&self, key: &[u8]) -> Result<Fetch> {
        (**self).get(key)
    }

    fn put(&mut self, key: &[u8], value: Vec<u8>) -> Result<()> {
        (**self).put(key, value)
    }
}

const META_PREFIX: u8 = b'M';
const NODE_PREFIX: u8 = b'N';

/// Store key of the meta node of a tree.
pub fn meta_key(tree_id: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(5);
    key.push(META_PREFIX);
    key.extend_from_slice(&tree_id.to_be_bytes());
    key
}

/// Store key of a node of a tree.
pub fn node_key(tree_id: u32, node_id: NodeId) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.push(NODE_PREFIX);
    key.extend_from_slice(&tree_id.to_be_bytes());
    key.extend_from_slice(node_id.as_bytes());
    key
}

/// Ordered in-memory key-value store.
///
/// Keys can be hidden to simulate entries whose transaction is not yet visible.
#[derive(Debug, Default, Clone)]
pub struct MemoryKvStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    hidden: HashSet<Vec<u8>>,
    put_count: usize,
}

impl MemoryKvStore {
    pub fn new() -> MemoryKvStore {
        MemoryKvStore::default()
    }

    /// Reads of this key report [`Fetch::NotReady`] until it is revealed again.
    pub fn hide(&mut self, key: &[u8]) {
        self.hidden.insert(key.to_vec());
    }

    pub fn reveal(&mut self, key: &[u8]) {
        self.hidden.remove(key);
    }

    pub fn reveal_all(&mut self) {
        self.hidden.clear();
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of `put` calls since the store was created.
    pub fn put_count(&self) -> usize {
        self.put_count
    }

    /// Access a stored record, ignoring visibility.
    pub fn raw(&self, key: &[u8]) -> Option<&Vec<u8>> {
        self.data.get(key)
    }

    /// Overwrite a stored record without counting it as a write.
    pub fn raw_put(&mut self, key: &[u8], value: Vec<u8>) {
        self.data.insert(key.to_vec(), value);
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &[u8]) -> Result<Fetch> {
        if self.hidden.contains(key) {
            return Ok(Fetch::NotReady);
        }
        Ok(self
            .data
            .get(key)
            .map(|v| Fetch::Value(v.clone()))
            .unwrap_or(Fetch::Absent))
    }

    fn put(&mut self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.data.insert(key.to_vec(), value);
        self.put_count += 1;
        Ok(())
    }
}

/// Translates node ids of one tree into store keys and buffers the writes of one operation.
///
/// Reads see the buffered writes of the current operation first. Writes only reach the
/// underlying store when the operation is committed, so an operation that fails half way
/// (e.g. because a node was not ready) leaves no trace in the store.
pub(crate) struct NodeStore<S> {
    kv: S,
    tree_id: u32,
    codec: NodeCodec,
    pending_nodes: LinkedHashMap<NodeId, Node>,
    pending_meta: Option<MetaNode>,
}

impl<S: KvStore> NodeStore<S> {
    pub fn new(kv: S, tree_id: u32) -> NodeStore<S> {
        NodeStore {
            kv,
            tree_id,
            codec: NodeCodec::new(),
            pending_nodes: LinkedHashMap::new(),
            pending_meta: None,
        }
    }

    pub fn kv(&self) -> &S {
        &self.kv
    }

    pub fn kv_mut(&mut self) -> &mut S {
        &mut self.kv
    }

    pub fn into_inner(self) -> S {
        self.kv
    }

    fn fetch(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>> {
        match self.kv.get(&key)? {
            Fetch::Value(data) => Ok(Some(data)),
            Fetch::NotReady => Err(Error::NotReady { key }),
            Fetch::Absent => Ok(None),
        }
    }

    pub fn read_node(&self, id: NodeId) -> Result<Node> {
        if let Some(node) = self.pending_nodes.get(&id) {
            return Ok(node.clone());
        }
        let data = self
            .fetch(node_key(self.tree_id, id))?
            .ok_or_else(|| {
                Error::corruption(format!(
                    "node {id} of tree {} is referenced but does not exist",
                    self.tree_id
                ))
            })?;
        let node = self.codec.decode_node(&data)?;
        if node.id != id {
            return Err(Error::corruption(format!(
                "store record for node {id} contains node {}",
                node.id
            )));
        }
        Ok(node)
    }

    pub fn write_node(&mut self, node: Node) {
        self.pending_nodes.insert(node.id, node);
    }

    pub fn read_meta(&self) -> Result<Option<MetaNode>> {
        if let Some(meta) = &self.pending_meta {
            return Ok(Some(meta.clone()));
        }
        match self.fetch(meta_key(self.tree_id))? {
            Some(data) => {
                let meta = self.codec.decode_meta(&data)?;
                if meta.tree_id != self.tree_id {
                    return Err(Error::corruption(format!(
                        "meta record of tree {} belongs to tree {}",
                        self.tree_id, meta.tree_id
                    )));
                }
                Ok(Some(meta))
            }
            None => Ok(None),
        }
    }

    pub fn write_meta(&mut self, meta: MetaNode) {
        self.pending_meta = Some(meta);
    }

    /// Number of buffered node writes.
    pub fn pending(&self) -> usize {
        self.pending_nodes.len() + usize::from(self.pending_meta.is_some())
    }

    /// Write all buffered records to the store and return how many were written.
    ///
    /// The buffer is emptied before the first `put`. If the store fails with an
    /// [`Error::Store`] half way, its transaction holds only a part of the records and must
    /// be aborted by the caller.
    pub fn commit(&mut self) -> Result<usize> {
        // Encode everything first so an encoding error does not leave a partial write
        let mut records = Vec::with_capacity(self.pending());
        for (id, node) in self.pending_nodes.iter() {
            records.push((node_key(self.tree_id, *id), self.codec.encode_node(node)?));
        }
        if let Some(meta) = &self.pending_meta {
            records.push((meta_key(self.tree_id), self.codec.encode_meta(meta)?));
        }
        self.discard();

        let written = records.len();
        for (key, data) in records {
            self.kv.put(&key, data)?;
        }
        if written > 0 {
            tracing::trace!(
                target: "kv_btree_index::store",
                tree = self.tree_id,
                records = written,
                "flushed write set"
            );
        }
        Ok(written)
    }

    pub fn discard(&mut self) {
        self.pending_nodes.clear();
        self.pending_meta = None;
    }
}
