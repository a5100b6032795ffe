use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File already exists: {0}")]
    FileAlreadyExists(String),

    #[error("File is still open: {0}")]
    FileStillOpen(String),

    #[error("Invalid file handle: {0}")]
    InvalidHandle(usize),

    #[error("Buffer pool is full: all frames are pinned")]
    BufferPoolFull,

    #[error("Invalid page size: expected {expected}, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },
}

pub type FileResult<T> = Result<T, FileError>;
