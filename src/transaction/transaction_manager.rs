use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;

use super::error::TransactionResult;
use super::lock_manager::LockManager;
use super::log_manager::LogManager;
use super::{Context, Transaction, TransactionState, TxnId, WriteRecord};
use crate::record::{RecordError, Rid};
use crate::system::{StorageManager, TableInfo};

/// Transaction lifecycle: id and timestamp allocation, the global map of
/// live transactions, and commit/abort orchestration.
///
/// Abort replays the transaction's write set in reverse through the same
/// heap and index handles the forward path used. Each undo step tolerates
/// state that is already gone, so rolling back a partially applied
/// operation cannot fail on what never happened.
pub struct TransactionManager {
    next_txn_id: AtomicU32,
    next_timestamp: AtomicU32,
    txn_map: Mutex<HashMap<TxnId, Arc<Transaction>>>,
    storage: Arc<StorageManager>,
    locks: Arc<LockManager>,
    log: Arc<LogManager>,
}

impl TransactionManager {
    pub fn new(
        storage: Arc<StorageManager>,
        locks: Arc<LockManager>,
        log: Arc<LogManager>,
    ) -> Self {
        Self {
            next_txn_id: AtomicU32::new(1),
            next_timestamp: AtomicU32::new(1),
            txn_map: Mutex::new(HashMap::new()),
            storage,
            locks,
            log,
        }
    }

    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    pub fn log(&self) -> &Arc<LogManager> {
        &self.log
    }

    /// Context for running heap and index operations under a transaction
    pub fn context<'a>(&'a self, txn: &'a Arc<Transaction>) -> Context<'a> {
        Context {
            locks: &self.locks,
            log: &self.log,
            txn,
        }
    }

    /// Begin a transaction. With `None` a fresh transaction is allocated;
    /// a supplied one is restarted with a new timestamp. Either way the
    /// transaction enters GROWING and is registered in the global map.
    pub fn begin(&self, txn: Option<Arc<Transaction>>) -> Arc<Transaction> {
        let txn = txn.unwrap_or_else(|| {
            let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
            Arc::new(Transaction::new(id))
        });

        txn.set_state(TransactionState::Growing);
        txn.set_start_ts(self.next_timestamp.fetch_add(1, Ordering::SeqCst));

        self.txn_map
            .lock()
            .unwrap()
            .insert(txn.id(), Arc::clone(&txn));
        debug!("txn {} begins at ts {}", txn.id(), txn.start_ts());
        txn
    }

    /// Look a live transaction up by id
    pub fn transaction(&self, id: TxnId) -> Option<Arc<Transaction>> {
        self.txn_map.lock().unwrap().get(&id).cloned()
    }

    /// Commit: drop the undo log, release every lock, flush the log
    /// stream, mark COMMITTED.
    pub fn commit(&self, txn: &Arc<Transaction>) -> TransactionResult<()> {
        txn.set_state(TransactionState::Shrinking);

        let writes = txn.take_write_set();
        for write in &writes {
            self.log.append_write_record(txn.id(), write);
        }
        self.log.append_commit(txn.id());

        for id in txn.take_locks() {
            self.locks.unlock(txn, id);
        }

        self.log.flush()?;
        txn.set_state(TransactionState::Committed);
        debug!("txn {} committed", txn.id());
        Ok(())
    }

    /// Abort: undo the write set back to front, release every lock, flush
    /// the log stream, mark ABORTED.
    pub fn abort(&self, txn: &Arc<Transaction>) -> TransactionResult<()> {
        txn.set_state(TransactionState::Shrinking);

        let writes = txn.take_write_set();
        for write in &writes {
            self.log.append_write_record(txn.id(), write);
        }

        for write in writes.iter().rev() {
            self.undo(write)?;
        }
        self.log.append_abort(txn.id());

        for id in txn.take_locks() {
            self.locks.unlock(txn, id);
        }

        self.log.flush()?;
        txn.set_state(TransactionState::Aborted);
        debug!("txn {} aborted", txn.id());
        Ok(())
    }

    /// Invert one write-set entry
    fn undo(&self, write: &WriteRecord) -> TransactionResult<()> {
        match write {
            WriteRecord::Insert { table, rid } => {
                let Some(info) = self.storage.table(table) else {
                    return Ok(());
                };
                match info.heap.get_record(None, *rid) {
                    Ok(record) => {
                        for index in info.indexes().iter() {
                            index.handle.delete_entry(&index.meta.key_from(&record))?;
                        }
                        info.heap.delete_record(None, *rid)?;
                    }
                    // The row may never have made it in; nothing to undo.
                    Err(RecordError::RecordNotFound(_, _))
                    | Err(RecordError::PageNotExist(_)) => {}
                    Err(err) => return Err(err.into()),
                }
            }

            WriteRecord::Delete { table, rid, record } => {
                let Some(info) = self.storage.table(table) else {
                    return Ok(());
                };
                // Put the pre-image back, preferring the original slot.
                let target = match info.heap.insert_record_at(None, *rid, record) {
                    Ok(()) => *rid,
                    Err(RecordError::SlotOccupied(_, _))
                    | Err(RecordError::SlotOutOfRange(_, _))
                    | Err(RecordError::PageNotExist(_)) => {
                        info.heap.insert_record(None, record)?
                    }
                    Err(err) => return Err(err.into()),
                };
                for index in info.indexes().iter() {
                    index
                        .handle
                        .insert_entry(&index.meta.key_from(record), target)?;
                }
            }

            WriteRecord::Update {
                table,
                rid,
                old_record,
            } => {
                let Some(info) = self.storage.table(table) else {
                    return Ok(());
                };
                match info.heap.get_record(None, *rid) {
                    Ok(current) => {
                        for index in info.indexes().iter() {
                            index.handle.delete_entry(&index.meta.key_from(&current))?;
                        }
                        info.heap.update_record(None, *rid, old_record)?;
                    }
                    Err(RecordError::RecordNotFound(_, _))
                    | Err(RecordError::PageNotExist(_)) => {
                        // The post-image is gone; restore the pre-image
                        // outright.
                        self.restore_record(&info, *rid, old_record)?;
                    }
                    Err(err) => return Err(err.into()),
                }
                for index in info.indexes().iter() {
                    index
                        .handle
                        .insert_entry(&index.meta.key_from(old_record), *rid)?;
                }
            }
        }
        Ok(())
    }

    fn restore_record(
        &self,
        info: &Arc<TableInfo>,
        rid: Rid,
        record: &[u8],
    ) -> TransactionResult<()> {
        match info.heap.insert_record_at(None, rid, record) {
            Ok(())
            | Err(RecordError::SlotOccupied(_, _))
            | Err(RecordError::SlotOutOfRange(_, _))
            | Err(RecordError::PageNotExist(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
