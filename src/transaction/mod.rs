mod error;
mod lock_manager;
mod log_manager;
mod transaction_manager;

pub use error::{TransactionError, TransactionResult};
pub use lock_manager::{LockDataId, LockManager, LockMode};
pub use log_manager::LogManager;
pub use transaction_manager::TransactionManager;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::record::Rid;

/// Transaction identifier; also the age used by wait-die (smaller = older)
pub type TxnId = u32;

/// Two-phase locking state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

/// One undo entry. `Delete` and `Update` carry the pre-image; `Insert`
/// only needs the Rid, the live row is read back at rollback time.
#[derive(Debug, Clone)]
pub enum WriteRecord {
    Insert {
        table: String,
        rid: Rid,
    },
    Delete {
        table: String,
        rid: Rid,
        record: Vec<u8>,
    },
    Update {
        table: String,
        rid: Rid,
        old_record: Vec<u8>,
    },
}

/// A live transaction. Handles share it as `Arc<Transaction>`; all mutable
/// state sits behind its own mutex so the heap and lock layers can update
/// it concurrently.
pub struct Transaction {
    id: TxnId,
    start_ts: AtomicU32,
    state: Mutex<TransactionState>,
    write_set: Mutex<Vec<WriteRecord>>,
    lock_set: Mutex<HashSet<LockDataId>>,
}

impl Transaction {
    pub fn new(id: TxnId) -> Self {
        Self {
            id,
            start_ts: AtomicU32::new(0),
            state: Mutex::new(TransactionState::Growing),
            write_set: Mutex::new(Vec::new()),
            lock_set: Mutex::new(HashSet::new()),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn start_ts(&self) -> u32 {
        self.start_ts.load(Ordering::SeqCst)
    }

    pub(crate) fn set_start_ts(&self, ts: u32) {
        self.start_ts.store(ts, Ordering::SeqCst);
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock().unwrap()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.lock().unwrap() = state;
    }

    /// Append an undo entry
    pub fn append_write(&self, record: WriteRecord) {
        self.write_set.lock().unwrap().push(record);
    }

    /// Drain the undo log, oldest entry first
    pub fn take_write_set(&self) -> Vec<WriteRecord> {
        std::mem::take(&mut self.write_set.lock().unwrap())
    }

    pub fn write_set_len(&self) -> usize {
        self.write_set.lock().unwrap().len()
    }

    pub(crate) fn add_lock(&self, id: LockDataId) {
        self.lock_set.lock().unwrap().insert(id);
    }

    pub(crate) fn remove_lock(&self, id: &LockDataId) {
        self.lock_set.lock().unwrap().remove(id);
    }

    /// Drain the set of held lock ids
    pub fn take_locks(&self) -> Vec<LockDataId> {
        self.lock_set.lock().unwrap().drain().collect()
    }

    pub fn holds_lock(&self, id: &LockDataId) -> bool {
        self.lock_set.lock().unwrap().contains(id)
    }

    pub fn lock_count(&self) -> usize {
        self.lock_set.lock().unwrap().len()
    }
}

/// Everything a heap or index operation needs to run under a transaction
pub struct Context<'a> {
    pub locks: &'a LockManager,
    pub log: &'a LogManager,
    pub txn: &'a std::sync::Arc<Transaction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_defaults() {
        let txn = Transaction::new(7);
        assert_eq!(txn.id(), 7);
        assert_eq!(txn.state(), TransactionState::Growing);
        assert_eq!(txn.write_set_len(), 0);
        assert_eq!(txn.lock_count(), 0);
    }

    #[test]
    fn test_write_set_order() {
        let txn = Transaction::new(1);
        txn.append_write(WriteRecord::Insert {
            table: "t".into(),
            rid: Rid::new(1, 0),
        });
        txn.append_write(WriteRecord::Delete {
            table: "t".into(),
            rid: Rid::new(1, 1),
            record: vec![1, 2],
        });

        let writes = txn.take_write_set();
        assert_eq!(writes.len(), 2);
        assert!(matches!(writes[0], WriteRecord::Insert { .. }));
        assert!(matches!(writes[1], WriteRecord::Delete { .. }));
        assert_eq!(txn.write_set_len(), 0);
    }
}
