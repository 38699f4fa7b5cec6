//! A B+Tree index whose nodes are not kept in memory, but stored as individual records in
//! an external transactional key-value store.
//!
//! Every node is addressed by a 128 bit id and read and written through the [`KvStore`] trait.
//! Durability, isolation and conflict detection are the job of the store, the index only
//! keeps the shape of the tree intact for a consistent sequence of reads and writes.
//!
//! ```rust
//! use kv_btree_index::{BtreeConfig, BtreeIndex, Error, Field, KeyBuilder, MemoryKvStore};
//!
//! fn main() -> std::result::Result<(), Error> {
//!     let mut kv = MemoryKvStore::new();
//!     let config = BtreeConfig::default()
//!         .with_degree(3)
//!         .with_fields(vec![Field::I32, Field::String(16)]);
//!     let mut t = BtreeIndex::create(&mut kv, 1, config)?;
//!
//!     t.insert(&KeyBuilder::new().i32(2).string(16, "b").build(), b"second")?;
//!     t.insert(&KeyBuilder::new().i32(1).string(16, "a").build(), b"first")?;
//!
//!     let mut e = t.index_first()?;
//!     while let Some((k, v)) = e {
//!         dbg!(t.layout().describe(&k), v);
//!         e = t.index_next()?;
//!     }
//!     Ok(())
//! }
//! ```

mod btree;
mod comparator;
mod error;
mod node;
mod serializer;
mod store;

pub use btree::{BtreeIndex, DeleteOutcome, InsertOutcome, TreeShape};
pub use comparator::{Field, FieldValue, KeyBuilder, KeyLayout, STRING_PREFIX_SIZE};
pub use error::{Error, Result};
pub use node::{max_keys, min_keys, Entry, MetaNode, Node, NodeId, NodeIdGenerator};
pub use serializer::NodeCodec;
pub use store::{meta_key, node_key, Fetch, KvStore, MemoryKvStore};

/// Largest supported degree of a tree.
pub const MAX_DEGREE: usize = 1 << 14;

/// Configuration of a tree session.
///
/// The degree is stored with the tree when it is created and must be the same whenever the
/// tree is opened again. The key fields and the duplicate policy are not stored, the caller
/// is responsible to always use the same ones for the same tree.
#[derive(Debug, Clone)]
pub struct BtreeConfig {
    degree: usize,
    fields: Vec<Field>,
    allow_duplicates: bool,
    max_value_size: usize,
}

impl Default for BtreeConfig {
    fn default() -> Self {
        Self {
            degree: 32,
            fields: vec![Field::I64],
            allow_duplicates: false,
            max_value_size: 4096,
        }
    }
}

impl BtreeConfig {
    /// Set the minimum degree `t`. Each node holds between `t - 1` and `2t - 1` keys.
    pub fn with_degree(mut self, degree: usize) -> Self {
        self.degree = degree;
        self
    }

    pub fn with_fields(mut self, fields: Vec<Field>) -> Self {
        self.fields = fields;
        self
    }

    /// If duplicate keys are allowed, entries with the same key are ordered by their value.
    pub fn allow_duplicates(mut self, allow_duplicates: bool) -> Self {
        self.allow_duplicates = allow_duplicates;
        self
    }

    pub fn max_value_size(mut self, max_value_size: usize) -> Self {
        self.max_value_size = max_value_size;
        self
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    fn validate_degree(&self) -> Result<usize> {
        if self.degree < 2 {
            Err(Error::DegreeTooSmall(self.degree))
        } else if self.degree > MAX_DEGREE {
            Err(Error::DegreeTooLarge {
                actual: self.degree,
                max: MAX_DEGREE,
            })
        } else {
            Ok(self.degree)
        }
    }

    fn key_layout(&self) -> Result<KeyLayout> {
        KeyLayout::new(self.fields.clone(), self.allow_duplicates)
    }
}
