use thiserror::Error;

use crate::file::FileError;

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Invalid magic number in index file header")]
    InvalidMagic,

    #[error("Unsupported index file version: {0}")]
    UnsupportedVersion(u32),

    #[error("Index entry not found")]
    IndexEntryNotFound,

    #[error("Invalid key size: expected {expected}, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },
}
