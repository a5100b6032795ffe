use std::sync::{Arc, Mutex};

use super::error::TransactionResult;
use super::{TxnId, WriteRecord};
use crate::file::DiskManager;

/// Tags for serialized log entries
const LOG_INSERT: u8 = 1;
const LOG_DELETE: u8 = 2;
const LOG_UPDATE: u8 = 3;
const LOG_COMMIT: u8 = 4;
const LOG_ABORT: u8 = 5;

/// Buffered writer for the append-only log stream.
///
/// Entries accumulate in memory and reach disk when `flush` runs at commit
/// or abort. The format is opaque to the rest of the core; nothing here
/// replays it.
pub struct LogManager {
    disk: Arc<DiskManager>,
    buffer: Mutex<Vec<u8>>,
}

impl LogManager {
    pub fn new(disk: Arc<DiskManager>) -> Self {
        Self {
            disk,
            buffer: Mutex::new(Vec::new()),
        }
    }

    /// Append raw bytes to the in-memory log tail
    pub fn append(&self, data: &[u8]) {
        self.buffer.lock().unwrap().extend_from_slice(data);
    }

    /// Append one serialized write record
    pub fn append_write_record(&self, txn_id: TxnId, record: &WriteRecord) {
        let mut entry = Vec::new();
        match record {
            WriteRecord::Insert { table, rid } => {
                entry.push(LOG_INSERT);
                entry.extend_from_slice(&txn_id.to_le_bytes());
                push_str(&mut entry, table);
                entry.extend_from_slice(&rid.page_no.to_le_bytes());
                entry.extend_from_slice(&rid.slot_no.to_le_bytes());
                push_bytes(&mut entry, &[]);
            }
            WriteRecord::Delete { table, rid, record } => {
                entry.push(LOG_DELETE);
                entry.extend_from_slice(&txn_id.to_le_bytes());
                push_str(&mut entry, table);
                entry.extend_from_slice(&rid.page_no.to_le_bytes());
                entry.extend_from_slice(&rid.slot_no.to_le_bytes());
                push_bytes(&mut entry, record);
            }
            WriteRecord::Update {
                table,
                rid,
                old_record,
            } => {
                entry.push(LOG_UPDATE);
                entry.extend_from_slice(&txn_id.to_le_bytes());
                push_str(&mut entry, table);
                entry.extend_from_slice(&rid.page_no.to_le_bytes());
                entry.extend_from_slice(&rid.slot_no.to_le_bytes());
                push_bytes(&mut entry, old_record);
            }
        }
        self.append(&entry);
    }

    /// Append a commit marker for the transaction
    pub fn append_commit(&self, txn_id: TxnId) {
        let mut entry = vec![LOG_COMMIT];
        entry.extend_from_slice(&txn_id.to_le_bytes());
        self.append(&entry);
    }

    /// Append an abort marker for the transaction
    pub fn append_abort(&self, txn_id: TxnId) {
        let mut entry = vec![LOG_ABORT];
        entry.extend_from_slice(&txn_id.to_le_bytes());
        self.append(&entry);
    }

    /// Write the buffered tail to the log file and sync it
    pub fn flush(&self) -> TransactionResult<()> {
        let data = std::mem::take(&mut *self.buffer.lock().unwrap());
        if !data.is_empty() {
            self.disk.write_log(&data)?;
            self.disk.sync_log()?;
        }
        Ok(())
    }

    /// Bytes currently buffered but not yet flushed
    pub fn pending_bytes(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }
}

fn push_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn push_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
    buf.extend_from_slice(data);
}
