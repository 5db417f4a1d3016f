use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },

    #[error("malformed page: {0}")]
    MalformedPage(String),

    #[error("page body exceeds page size ({size} > {max})")]
    PageOverflow { size: usize, max: usize },

    #[error("corrupt meta page: {0}")]
    CorruptMetaPage(String),

    #[error("unknown file id: {0}")]
    UnknownFileId(u32),

    #[error("bundle not found: {0}")]
    BundleNotFound(String),

    #[error("bundle already exists: {0}")]
    DuplicateBundle(String),

    #[error("duplicate key for unique index")]
    DuplicateKey,

    #[error("field missing: {0}")]
    FieldMissing(String),

    #[error("failed to encode field {field}: {cause}")]
    FieldEncode { field: String, cause: String },

    #[error("{0} buffer(s) still pinned")]
    BuffersPinned(usize),

    #[error("no unpinned frame available for eviction")]
    AllBuffersPinned,

    #[error("external sort spill failed: {0}")]
    SortSpill(String),

    #[error("document {doc_id} ({size} bytes) does not fit in one page")]
    DocumentTooLarge { doc_id: String, size: usize },

    #[error("bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("bson error: {0}")]
    Bson(#[from] bson::error::Error),
}

impl StorageError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
