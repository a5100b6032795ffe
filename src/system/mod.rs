//! Table and index registry.
//!
//! Owns the per-table record files and their indexes, hands shared handles
//! to the executor and transaction layers, and persists the catalog (table
//! names, record sizes, index definitions) as JSON in the database
//! directory.


use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::file::{BufferManager, DiskManager, FileError};
use crate::index::{ColSpec, IndexError, IndexHandle};
use crate::record::{RecordError, RecordFile, Rid};

const CATALOG_FILE_NAME: &str = "catalog.json";

#[derive(Debug, Error)]
pub enum SystemError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Table {0} already exists")]
    TableAlreadyExists(String),

    #[error("Index {0} not found on table {1}")]
    IndexNotFound(String, String),

    #[error("Index {0} already exists on table {1}")]
    IndexAlreadyExists(String, String),
}

pub type SystemResult<T> = Result<T, SystemError>;

/// One key column of an index: where it sits in the record payload and how
/// it compares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexColumn {
    pub offset: usize,
    pub spec: ColSpec,
}

/// Definition of one index over a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub name: String,
    pub columns: Vec<IndexColumn>,
}

impl IndexMeta {
    pub fn key_len(&self) -> usize {
        self.columns.iter().map(|c| c.spec.len).sum()
    }

    /// Assemble the index key by concatenating the key columns' bytes from
    /// a record payload, in declared order
    pub fn key_from(&self, record: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.key_len());
        for col in &self.columns {
            key.extend_from_slice(&record[col.offset..col.offset + col.spec.len]);
        }
        key
    }

    fn specs(&self) -> Vec<ColSpec> {
        self.columns.iter().map(|c| c.spec).collect()
    }
}

/// An open index together with its definition
pub struct TableIndex {
    pub meta: IndexMeta,
    pub handle: IndexHandle,
}

/// An open table: its record file plus every index built over it
pub struct TableInfo {
    pub heap: RecordFile,
    pub indexes: RwLock<Vec<Arc<TableIndex>>>,
}

impl TableInfo {
    /// Shared snapshot of the table's indexes
    pub fn indexes(&self) -> Vec<Arc<TableIndex>> {
        self.indexes.read().unwrap().clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableMeta {
    name: String,
    record_size: usize,
    indexes: Vec<IndexMeta>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CatalogData {
    tables: Vec<TableMeta>,
}

/// Registry of open tables and indexes for one database directory
pub struct StorageManager {
    buffer: Arc<BufferManager>,
    tables: RwLock<HashMap<String, Arc<TableInfo>>>,
}

impl StorageManager {
    /// Start with an empty registry (fresh database directory)
    pub fn new(buffer: Arc<BufferManager>) -> Self {
        Self {
            buffer,
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Open an existing database directory, re-opening every table and
    /// index recorded in the catalog
    pub fn open(buffer: Arc<BufferManager>) -> SystemResult<Self> {
        let manager = Self::new(buffer);

        let catalog_path = manager.catalog_path();
        if !catalog_path.is_file() {
            return Ok(manager);
        }

        let content = std::fs::read_to_string(&catalog_path)?;
        let catalog: CatalogData = serde_json::from_str(&content)?;

        let mut tables = manager.tables.write().unwrap();
        for table in catalog.tables {
            let heap = RecordFile::open(
                &manager.buffer,
                manager.table_path(&table.name),
                &table.name,
            )?;

            let mut indexes = Vec::new();
            for meta in table.indexes {
                let handle = IndexHandle::open(
                    &manager.buffer,
                    manager.index_path(&table.name, &meta.name),
                    &meta.name,
                )?;
                indexes.push(Arc::new(TableIndex { meta, handle }));
            }

            tables.insert(
                table.name.clone(),
                Arc::new(TableInfo {
                    heap,
                    indexes: RwLock::new(indexes),
                }),
            );
        }
        drop(tables);

        Ok(manager)
    }

    pub fn buffer(&self) -> &Arc<BufferManager> {
        &self.buffer
    }

    pub fn disk(&self) -> &Arc<DiskManager> {
        self.buffer.disk()
    }

    /// Look an open table up by name
    pub fn table(&self, name: &str) -> Option<Arc<TableInfo>> {
        self.tables.read().unwrap().get(name).cloned()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().unwrap().keys().cloned().collect()
    }

    /// Create a table with fixed-size records
    pub fn create_table(&self, name: &str, record_size: usize) -> SystemResult<Arc<TableInfo>> {
        self.create_table_inner(name, record_size, None)
    }

    /// Create a table with an explicit slot count per page
    pub fn create_table_with_capacity(
        &self,
        name: &str,
        record_size: usize,
        records_per_page: usize,
    ) -> SystemResult<Arc<TableInfo>> {
        self.create_table_inner(name, record_size, Some(records_per_page))
    }

    fn create_table_inner(
        &self,
        name: &str,
        record_size: usize,
        records_per_page: Option<usize>,
    ) -> SystemResult<Arc<TableInfo>> {
        let mut tables = self.tables.write().unwrap();
        if tables.contains_key(name) {
            return Err(SystemError::TableAlreadyExists(name.to_string()));
        }

        let path = self.table_path(name);
        let heap = match records_per_page {
            Some(capacity) => RecordFile::create_with_capacity(
                &self.buffer,
                path,
                name,
                record_size,
                capacity,
            )?,
            None => RecordFile::create(&self.buffer, path, name, record_size)?,
        };

        let info = Arc::new(TableInfo {
            heap,
            indexes: RwLock::new(Vec::new()),
        });
        tables.insert(name.to_string(), Arc::clone(&info));
        drop(tables);

        self.save_catalog()?;
        Ok(info)
    }

    /// Drop a table and every index on it
    pub fn drop_table(&self, name: &str) -> SystemResult<()> {
        let info = {
            let mut tables = self.tables.write().unwrap();
            tables
                .remove(name)
                .ok_or_else(|| SystemError::TableNotFound(name.to_string()))?
        };

        for index in info.indexes().iter() {
            index.handle.close()?;
            self.disk()
                .destroy_file(self.index_path(name, &index.meta.name))?;
        }
        info.heap.close()?;
        self.disk().destroy_file(self.table_path(name))?;

        self.save_catalog()?;
        Ok(())
    }

    /// Create an index over a table and backfill it from the existing rows
    pub fn create_index(
        &self,
        table: &str,
        meta: IndexMeta,
    ) -> SystemResult<Arc<TableIndex>> {
        let info = self
            .table(table)
            .ok_or_else(|| SystemError::TableNotFound(table.to_string()))?;

        {
            let indexes = info.indexes.read().unwrap();
            if indexes.iter().any(|i| i.meta.name == meta.name) {
                return Err(SystemError::IndexAlreadyExists(
                    meta.name.clone(),
                    table.to_string(),
                ));
            }
        }

        let handle = IndexHandle::create(
            &self.buffer,
            self.index_path(table, &meta.name),
            &meta.name,
            meta.specs(),
            None,
        )?;

        // Backfill from the heap.
        for entry in info.heap.scan(None)? {
            let (rid, record): (Rid, Vec<u8>) = entry?;
            handle.insert_entry(&meta.key_from(&record), rid)?;
        }

        let index = Arc::new(TableIndex { meta, handle });
        info.indexes.write().unwrap().push(Arc::clone(&index));

        self.save_catalog()?;
        Ok(index)
    }

    /// Drop one index from a table
    pub fn drop_index(&self, table: &str, index_name: &str) -> SystemResult<()> {
        let info = self
            .table(table)
            .ok_or_else(|| SystemError::TableNotFound(table.to_string()))?;

        let removed = {
            let mut indexes = info.indexes.write().unwrap();
            let position = indexes
                .iter()
                .position(|i| i.meta.name == index_name)
                .ok_or_else(|| {
                    SystemError::IndexNotFound(index_name.to_string(), table.to_string())
                })?;
            indexes.remove(position)
        };

        removed.handle.close()?;
        self.disk()
            .destroy_file(self.index_path(table, index_name))?;

        self.save_catalog()?;
        Ok(())
    }

    /// Write the catalog JSON out
    pub fn save_catalog(&self) -> SystemResult<()> {
        let tables = self.tables.read().unwrap();
        let mut catalog = CatalogData::default();
        for (name, info) in tables.iter() {
            catalog.tables.push(TableMeta {
                name: name.clone(),
                record_size: info.heap.record_size(),
                indexes: info.indexes().iter().map(|i| i.meta.clone()).collect(),
            });
        }
        catalog.tables.sort_by(|a, b| a.name.cmp(&b.name));

        let content = serde_json::to_string_pretty(&catalog)?;
        std::fs::write(self.catalog_path(), content)?;
        Ok(())
    }

    /// Flush and close every table and index, then persist the catalog
    pub fn close(&self) -> SystemResult<()> {
        self.save_catalog()?;
        let tables = self.tables.write().unwrap();
        for info in tables.values() {
            for index in info.indexes().iter() {
                index.handle.close()?;
            }
            info.heap.close()?;
        }
        Ok(())
    }

    fn catalog_path(&self) -> PathBuf {
        self.disk().root().join(CATALOG_FILE_NAME)
    }

    fn table_path(&self, name: &str) -> PathBuf {
        self.disk().root().join(format!("{}.tbl", name))
    }

    fn index_path(&self, table: &str, index: &str) -> PathBuf {
        self.disk().root().join(format!("{}.{}.idx", table, index))
    }
}
