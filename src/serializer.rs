use bincode::Options;
use serde_derive::{Deserialize, Serialize};

use crate::{
    error::Result,
    node::{Entry, MetaNode, Node, NodeId},
    Error,
};

/// On-disk layout of a node.
///
/// The nil UUID encodes an absent parent or leaf link. The active flags are a bitmap
/// with the flag of entry `i` in bit `i % 8` of byte `i / 8`.
#[derive(Serialize, Deserialize)]
struct NodeRecord {
    id: [u8; 16],
    key_count: u32,
    is_leaf: bool,
    node_active: bool,
    parent: [u8; 16],
    prev_leaf: [u8; 16],
    next_leaf: [u8; 16],
    active: Vec<u8>,
    key_sizes: Vec<u32>,
    value_sizes: Vec<u32>,
    keys: Vec<u8>,
    values: Vec<u8>,
    children: Vec<[u8; 16]>,
}

#[derive(Serialize, Deserialize)]
struct MetaRecord {
    tree_id: u32,
    root_id: [u8; 16],
    execution_id: u64,
    degree: u32,
}

/// Serializes nodes and meta nodes into self-describing byte buffers.
///
/// Encoding is symmetric: decoding a buffer and encoding the result again yields the same bytes.
#[derive(Clone, Copy)]
pub struct NodeCodec {
    serializer: bincode::DefaultOptions,
}

impl Default for NodeCodec {
    fn default() -> Self {
        NodeCodec::new()
    }
}

impl NodeCodec {
    pub fn new() -> NodeCodec {
        NodeCodec {
            serializer: bincode::DefaultOptions::new(),
        }
    }

    pub fn encode_node(&self, node: &Node) -> Result<Vec<u8>> {
        let key_count = node.entries.len();
        let mut active = vec![0u8; (key_count + 7) / 8];
        let mut key_sizes = Vec::with_capacity(key_count);
        let mut value_sizes = Vec::with_capacity(key_count);
        let mut keys = Vec::new();
        let mut values = Vec::new();
        for (i, e) in node.entries.iter().enumerate() {
            if e.active {
                active[i / 8] |= 1 << (i % 8);
            }
            key_sizes.push(e.key.len().try_into().map_err(|_| {
                Error::InvalidKeyLength {
                    actual: e.key.len(),
                    expected: format!("at most {} bytes", u32::MAX),
                }
            })?);
            value_sizes.push(e.value.len().try_into().map_err(|_| Error::ValueTooLarge {
                actual: e.value.len(),
                max: u32::MAX as usize,
            })?);
            keys.extend_from_slice(&e.key);
            values.extend_from_slice(&e.value);
        }

        let record = NodeRecord {
            id: *node.id.as_bytes(),
            key_count: key_count as u32,
            is_leaf: node.is_leaf,
            node_active: node.node_active,
            parent: NodeId::to_wire(node.parent),
            prev_leaf: NodeId::to_wire(node.prev_leaf),
            next_leaf: NodeId::to_wire(node.next_leaf),
            active,
            key_sizes,
            value_sizes,
            keys,
            values,
            children: node.children.iter().map(|c| *c.as_bytes()).collect(),
        };
        let result = self.serializer.serialize(&record)?;
        Ok(result)
    }

    pub fn decode_node(&self, data: &[u8]) -> Result<Node> {
        let record: NodeRecord = self.serializer.deserialize(data)?;

        let id = NodeId::from_wire(record.id)
            .ok_or_else(|| Error::corruption("node record has a nil id"))?;
        let key_count = record.key_count as usize;
        if record.key_sizes.len() != key_count
            || record.value_sizes.len() != key_count
            || record.active.len() != (key_count + 7) / 8
        {
            return Err(Error::corruption(format!(
                "node {id} declares {key_count} entries, but has {} key sizes, {} value sizes and {} flag bytes",
                record.key_sizes.len(),
                record.value_sizes.len(),
                record.active.len()
            )));
        }
        if key_count % 8 != 0 {
            let unused = record.active[key_count / 8] >> (key_count % 8);
            if unused != 0 {
                return Err(Error::corruption(format!(
                    "node {id} has flags set for non-existing entries"
                )));
            }
        }
        let expected_children = if record.is_leaf { 0 } else { key_count + 1 };
        if record.children.len() != expected_children {
            return Err(Error::corruption(format!(
                "node {id} with {key_count} entries has {} children",
                record.children.len()
            )));
        }

        let mut entries = Vec::with_capacity(key_count);
        let mut key_offset = 0;
        let mut value_offset = 0;
        for i in 0..key_count {
            let key_end = key_offset + record.key_sizes[i] as usize;
            let value_end = value_offset + record.value_sizes[i] as usize;
            let (Some(key), Some(value)) = (
                record.keys.get(key_offset..key_end),
                record.values.get(value_offset..value_end),
            ) else {
                return Err(Error::corruption(format!(
                    "entry {i} of node {id} exceeds the stored key or value bytes"
                )));
            };
            entries.push(Entry {
                key: key.to_vec(),
                value: value.to_vec(),
                active: record.active[i / 8] & (1 << (i % 8)) != 0,
            });
            key_offset = key_end;
            value_offset = value_end;
        }
        if key_offset != record.keys.len() || value_offset != record.values.len() {
            return Err(Error::corruption(format!(
                "node {id} contains trailing key or value bytes"
            )));
        }

        let mut children = Vec::with_capacity(record.children.len());
        for c in record.children {
            children.push(
                NodeId::from_wire(c)
                    .ok_or_else(|| Error::corruption(format!("node {id} has a nil child id")))?,
            );
        }

        Ok(Node {
            id,
            parent: NodeId::from_wire(record.parent),
            is_leaf: record.is_leaf,
            entries,
            children,
            prev_leaf: NodeId::from_wire(record.prev_leaf),
            next_leaf: NodeId::from_wire(record.next_leaf),
            node_active: record.node_active,
        })
    }

    pub fn encode_meta(&self, meta: &MetaNode) -> Result<Vec<u8>> {
        let record = MetaRecord {
            tree_id: meta.tree_id,
            root_id: *meta.root_id.as_bytes(),
            execution_id: meta.execution_id,
            degree: meta.degree as u32,
        };
        let result = self.serializer.serialize(&record)?;
        Ok(result)
    }

    pub fn decode_meta(&self, data: &[u8]) -> Result<MetaNode> {
        let record: MetaRecord = self.serializer.deserialize(data)?;
        let root_id = NodeId::from_wire(record.root_id).ok_or_else(|| {
            Error::corruption(format!("meta node of tree {} has no root", record.tree_id))
        })?;
        Ok(MetaNode {
            tree_id: record.tree_id,
            root_id,
            execution_id: record.execution_id,
            degree: record.degree as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::node::NodeIdGenerator;

    use super::*;

    fn sample_leaf(generator: &NodeIdGenerator) -> Node {
        let mut n = Node::new_leaf(generator.next_id(), Some(generator.next_id()));
        n.prev_leaf = Some(generator.next_id());
        for i in 0..11u8 {
            let mut e = Entry::new(vec![i; (i % 4) as usize + 1], vec![i; i as usize]);
            e.active = i % 3 != 0;
            n.entries.push(e);
        }
        n
    }

    #[test]
    fn node_roundtrip_is_symmetric() {
        let generator = NodeIdGenerator::with_epoch(1);
        let codec = NodeCodec::new();

        let leaf = sample_leaf(&generator);
        let encoded = codec.encode_node(&leaf).unwrap();
        let decoded = codec.decode_node(&encoded).unwrap();
        assert_eq!(leaf, decoded);
        assert_eq!(encoded, codec.encode_node(&decoded).unwrap());

        let mut internal = Node::new_internal(generator.next_id(), None);
        internal.entries.push(Entry::new(vec![1, 2], vec![]));
        internal.entries.push(Entry {
            key: vec![3, 4],
            value: vec![5],
            active: false,
        });
        internal.children = (0..3).map(|_| generator.next_id()).collect();
        internal.node_active = false;
        let encoded = codec.encode_node(&internal).unwrap();
        let decoded = codec.decode_node(&encoded).unwrap();
        assert_eq!(internal, decoded);
        assert_eq!(encoded, codec.encode_node(&decoded).unwrap());
    }

    #[test]
    fn record_starts_with_own_id() {
        let generator = NodeIdGenerator::with_epoch(1);
        let codec = NodeCodec::new();
        let leaf = Node::new_leaf(generator.next_id(), None);
        let encoded = codec.encode_node(&leaf).unwrap();
        assert_eq!(leaf.id.as_bytes(), &encoded[0..16]);
    }

    #[test]
    fn meta_roundtrip() {
        let generator = NodeIdGenerator::with_epoch(1);
        let codec = NodeCodec::new();
        let meta = MetaNode {
            tree_id: 12,
            root_id: generator.next_id(),
            execution_id: 4,
            degree: 32,
        };
        let encoded = codec.encode_meta(&meta).unwrap();
        let decoded = codec.decode_meta(&encoded).unwrap();
        assert_eq!(meta, decoded);
        assert_eq!(encoded, codec.encode_meta(&decoded).unwrap());
    }

    #[test]
    fn truncated_and_trailing_data_is_corrupt() {
        let generator = NodeIdGenerator::with_epoch(1);
        let codec = NodeCodec::new();
        let encoded = codec.encode_node(&sample_leaf(&generator)).unwrap();

        let err = codec.decode_node(&encoded[0..encoded.len() - 1]).unwrap_err();
        assert!(err.is_corruption());

        let mut trailing = encoded.clone();
        trailing.push(0);
        assert!(codec.decode_node(&trailing).unwrap_err().is_corruption());
    }

    #[test]
    fn inconsistent_children_are_corrupt() {
        let generator = NodeIdGenerator::with_epoch(1);
        let codec = NodeCodec::new();
        let mut internal = Node::new_internal(generator.next_id(), None);
        internal.entries.push(Entry::new(vec![1], vec![]));
        internal.children.push(generator.next_id());
        let encoded = codec.encode_node(&internal).unwrap();
        assert!(codec.decode_node(&encoded).unwrap_err().is_corruption());
    }
}
