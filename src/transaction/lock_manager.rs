use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};

use log::debug;

use super::error::{TransactionError, TransactionResult};
use super::{Transaction, TransactionState, TxnId};
use crate::file::FileHandle;
use crate::record::Rid;

/// Lock modes of the multi-granularity scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    IntentionShared,
    IntentionExclusive,
    Shared,
    SharedIntentionExclusive,
    Exclusive,
}

/// A lockable object: a whole table or a single record in it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockDataId {
    Table(FileHandle),
    Record(FileHandle, Rid),
}

/// Is a request of mode `req` compatible with a held lock of mode `held`?
fn compatible(req: LockMode, held: LockMode) -> bool {
    use LockMode::*;
    match (req, held) {
        (Exclusive, _) | (_, Exclusive) => false,
        (IntentionShared, _) | (_, IntentionShared) => true,
        (IntentionExclusive, IntentionExclusive) => true,
        (Shared, Shared) => true,
        _ => false,
    }
}

/// Does a held lock of mode `held` already cover a request of mode `req`?
fn subsumes(held: LockMode, req: LockMode) -> bool {
    use LockMode::*;
    match held {
        Exclusive => true,
        SharedIntentionExclusive => req != Exclusive,
        Shared => matches!(req, Shared | IntentionShared),
        IntentionExclusive => matches!(req, IntentionExclusive | IntentionShared),
        IntentionShared => req == IntentionShared,
    }
}

#[derive(Debug)]
struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
    granted: bool,
}

#[derive(Debug, Default)]
struct LockQueue {
    queue: VecDeque<LockRequest>,
    cv: Arc<Condvar>,
}

/// Multi-granularity two-phase lock manager with wait-die deadlock
/// prevention.
///
/// One mutex guards the whole lock table; every queue carries its own
/// condition variable for waiters. Requests are granted FIFO: a request is
/// granted once every earlier request in its queue is granted and it is
/// compatible with all granted holders. A waiter that conflicts with an
/// older transaction blocks; a younger one dies with
/// `DeadlockPrevention`.
#[derive(Default)]
pub struct LockManager {
    table: Mutex<HashMap<LockDataId, LockQueue>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared lock on one record; takes table IS first
    pub fn lock_shared_on_record(
        &self,
        txn: &Arc<Transaction>,
        rid: Rid,
        table: FileHandle,
    ) -> TransactionResult<()> {
        self.lock_intention_shared_on_table(txn, table)?;
        self.acquire(txn, LockDataId::Record(table, rid), LockMode::Shared)
    }

    /// Exclusive lock on one record; takes table IX first
    pub fn lock_exclusive_on_record(
        &self,
        txn: &Arc<Transaction>,
        rid: Rid,
        table: FileHandle,
    ) -> TransactionResult<()> {
        self.lock_intention_exclusive_on_table(txn, table)?;
        self.acquire(txn, LockDataId::Record(table, rid), LockMode::Exclusive)
    }

    pub fn lock_shared_on_table(
        &self,
        txn: &Arc<Transaction>,
        table: FileHandle,
    ) -> TransactionResult<()> {
        self.acquire(txn, LockDataId::Table(table), LockMode::Shared)
    }

    pub fn lock_exclusive_on_table(
        &self,
        txn: &Arc<Transaction>,
        table: FileHandle,
    ) -> TransactionResult<()> {
        self.acquire(txn, LockDataId::Table(table), LockMode::Exclusive)
    }

    pub fn lock_intention_shared_on_table(
        &self,
        txn: &Arc<Transaction>,
        table: FileHandle,
    ) -> TransactionResult<()> {
        self.acquire(txn, LockDataId::Table(table), LockMode::IntentionShared)
    }

    pub fn lock_intention_exclusive_on_table(
        &self,
        txn: &Arc<Transaction>,
        table: FileHandle,
    ) -> TransactionResult<()> {
        self.acquire(txn, LockDataId::Table(table), LockMode::IntentionExclusive)
    }

    /// Release one lock. The transaction's first release moves it from
    /// GROWING to SHRINKING. Returns false, without a phase change, when
    /// the transaction held no lock on the object.
    pub fn unlock(&self, txn: &Arc<Transaction>, id: LockDataId) -> bool {
        let my_id = txn.id();
        let mut table = self.table.lock().unwrap();

        let drop_queue = {
            let Some(queue) = table.get_mut(&id) else {
                return false;
            };

            let before = queue.queue.len();
            queue.queue.retain(|r| r.txn_id != my_id);
            if queue.queue.len() == before {
                return false;
            }

            if queue.queue.is_empty() {
                true
            } else {
                queue.cv.notify_all();
                false
            }
        };

        if txn.state() == TransactionState::Growing {
            txn.set_state(TransactionState::Shrinking);
        }

        txn.remove_lock(&id);
        if drop_queue {
            table.remove(&id);
        }
        true
    }

    fn acquire(
        &self,
        txn: &Arc<Transaction>,
        id: LockDataId,
        mode: LockMode,
    ) -> TransactionResult<()> {
        if txn.state() != TransactionState::Growing {
            return Err(TransactionError::LockOnShrinking(txn.id()));
        }

        let my_id = txn.id();
        let mut table = self.table.lock().unwrap();

        {
            let queue = table.entry(id).or_default();

            // A held lock at least as strong as the request suffices.
            if queue
                .queue
                .iter()
                .any(|r| r.txn_id == my_id && r.granted && subsumes(r.mode, mode))
            {
                txn.add_lock(id);
                return Ok(());
            }

            // S -> X upgrade is immediate when nobody else holds the object.
            if mode == LockMode::Exclusive {
                let holds_shared = queue
                    .queue
                    .iter()
                    .position(|r| r.txn_id == my_id && r.granted && r.mode == LockMode::Shared);
                if let Some(pos) = holds_shared {
                    let others = queue
                        .queue
                        .iter()
                        .any(|r| r.granted && r.txn_id != my_id);
                    if !others {
                        queue.queue[pos].mode = LockMode::Exclusive;
                        txn.add_lock(id);
                        return Ok(());
                    }
                }
            }

            queue.queue.push_back(LockRequest {
                txn_id: my_id,
                mode,
                granted: false,
            });
        }

        loop {
            let queue = table.get_mut(&id).expect("queue exists while enqueued");

            let my_pos = queue
                .queue
                .iter()
                .position(|r| r.txn_id == my_id && !r.granted)
                .expect("own request stays queued");

            let earlier_waiting = queue.queue.iter().take(my_pos).any(|r| !r.granted);
            let conflicting = |r: &LockRequest| {
                r.granted && r.txn_id != my_id && !compatible(mode, r.mode)
            };

            if !earlier_waiting && !queue.queue.iter().any(&conflicting) {
                queue.queue[my_pos].granted = true;
                txn.add_lock(id);
                return Ok(());
            }

            // Wait-die: block only behind older transactions.
            let must_die = queue
                .queue
                .iter()
                .any(|r| conflicting(r) && my_id > r.txn_id);
            if must_die {
                debug!("txn {} dies waiting for {:?}", my_id, id);
                queue.queue.remove(my_pos);
                let cv = Arc::clone(&queue.cv);
                let empty = queue.queue.is_empty();
                if empty {
                    table.remove(&id);
                }
                cv.notify_all();
                return Err(TransactionError::DeadlockPrevention(my_id));
            }

            let cv = Arc::clone(&queue.cv);
            table = cv.wait(table).unwrap();

            // The transaction may have left GROWING while asleep.
            if txn.state() != TransactionState::Growing {
                let drop_queue = match table.get_mut(&id) {
                    Some(queue) => {
                        if let Some(pos) = queue
                            .queue
                            .iter()
                            .position(|r| r.txn_id == my_id && !r.granted)
                        {
                            queue.queue.remove(pos);
                        }
                        if queue.queue.is_empty() {
                            true
                        } else {
                            queue.cv.notify_all();
                            false
                        }
                    }
                    None => false,
                };
                if drop_queue {
                    table.remove(&id);
                }
                return Err(TransactionError::LockOnShrinking(my_id));
            }
        }
    }

    /// Granted lock count over the whole table, for assertions in tests
    pub fn granted_count(&self) -> usize {
        let table = self.table.lock().unwrap();
        table
            .values()
            .flat_map(|q| q.queue.iter())
            .filter(|r| r.granted)
            .count()
    }
}
