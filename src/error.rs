use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("store key {key:02x?} is not yet visible, retry the whole operation")]
    NotReady { key: Vec<u8> },
    #[error("tree is corrupt: {0}")]
    Corruption(String),
    #[error(transparent)]
    Serialization(#[from] Box<bincode::ErrorKind>),
    #[error("key has {actual} bytes, which does not match the configured fields ({expected})")]
    InvalidKeyLength { actual: usize, expected: String },
    #[error("value has {actual} bytes, but the maximum is {max}")]
    ValueTooLarge { actual: usize, max: usize },
    #[error("degree must be at least 2, but was {0}")]
    DegreeTooSmall(usize),
    #[error("degree must be at most {max}, but was {actual}")]
    DegreeTooLarge { actual: usize, max: usize },
    #[error("tree {tree_id} was created with degree {stored}, but opened with degree {configured}")]
    DegreeMismatch {
        tree_id: u32,
        stored: usize,
        configured: usize,
    },
    #[error("invalid field definition: {0}")]
    InvalidField(String),
    #[error("at least one key field must be configured")]
    NoFields,
    #[error("tree {0} already exists")]
    TreeAlreadyExists(u32),
    #[error("tree {0} does not exist")]
    TreeNotFound(u32),
    #[error("cursor is not positioned, call index_first() or seek() first")]
    CursorNotPositioned,
    #[error(transparent)]
    Store(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// The operation can be retried from the top once the store has caught up.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::NotReady { .. })
    }

    /// The tree shape can no longer be trusted and the tree should not be used further.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_) | Error::Serialization(_))
    }

    /// The request was rejected before any node was read or written.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Error::InvalidKeyLength { .. }
                | Error::ValueTooLarge { .. }
                | Error::DegreeTooSmall(_)
                | Error::DegreeTooLarge { .. }
                | Error::DegreeMismatch { .. }
                | Error::InvalidField(_)
                | Error::NoFields
        )
    }

    pub(crate) fn corruption(msg: impl Into<String>) -> Error {
        let msg = msg.into();
        tracing::error!(target: "kv_btree_index::check", "{}", msg);
        Error::Corruption(msg)
    }
}
