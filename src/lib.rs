//! Disk-backed storage, indexing, concurrency and transaction core.
//!
//! The crate turns record- and key-level operations from an executor layer
//! into durable, concurrency-safe page accesses: a pinned buffer pool over
//! paged files, a bitmap-slotted record heap, a clustered B+ tree index,
//! and multi-granularity two-phase locking with wait-die deadlock
//! prevention and write-set rollback.

pub mod file;
pub mod index;
pub mod record;
pub mod system;
pub mod transaction;

pub use file::{BufferManager, DiskManager, PAGE_SIZE};
pub use index::IndexHandle;
pub use record::{RecordFile, Rid};
pub use system::StorageManager;
pub use transaction::{LockManager, LogManager, Transaction, TransactionManager};
