use thiserror::Error;

use crate::file::FileError;
use crate::transaction::TransactionError;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Record not found: page_no={0}, slot_no={1}")]
    RecordNotFound(u32, u32),

    #[error("Slot out of range: page_no={0}, slot_no={1}")]
    SlotOutOfRange(u32, u32),

    #[error("Slot already occupied: page_no={0}, slot_no={1}")]
    SlotOccupied(u32, u32),

    #[error("Page does not exist: page_no={0}")]
    PageNotExist(u32),

    #[error("Invalid record size: expected {expected}, got {actual}")]
    InvalidRecordSize { expected: usize, actual: usize },

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
}

pub type RecordResult<T> = Result<T, RecordError>;
