use thiserror::Error;

use super::TxnId;
use crate::file::FileError;

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Transaction {0} attempted to lock while shrinking")]
    LockOnShrinking(TxnId),

    #[error("Transaction {0} aborted by deadlock prevention")]
    DeadlockPrevention(TxnId),

    #[error("Unknown transaction: {0}")]
    UnknownTransaction(TxnId),

    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Record error during rollback: {0}")]
    Record(Box<crate::record::RecordError>),

    #[error("Index error during rollback: {0}")]
    Index(Box<crate::index::IndexError>),
}

impl From<crate::record::RecordError> for TransactionError {
    fn from(err: crate::record::RecordError) -> Self {
        TransactionError::Record(Box::new(err))
    }
}

impl From<crate::index::IndexError> for TransactionError {
    fn from(err: crate::index::IndexError) -> Self {
        TransactionError::Index(Box::new(err))
    }
}

pub type TransactionResult<T> = Result<T, TransactionError>;
