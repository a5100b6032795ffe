use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;

use super::error::{RecordError, RecordResult};
use super::page::{FileHeader, HeapLayout, HeapPage, PageHeader};
use super::scan::RecordScan;
use super::Rid;
use crate::file::{
    BufferManager, FileHandle, PageHandle, PageId, PageNo, INVALID_PAGE_NO, PAGE_SIZE,
};
use crate::transaction::{Context, WriteRecord};

/// Mutable part of the file header, shared across operations
struct HeapState {
    num_pages: u32,
    first_free_page: PageNo,
}

/// Handle to one table's record file.
///
/// Page 0 holds the file header; record pages are numbered from 1. Pages
/// with at least one free slot are kept on a singly linked free list headed
/// in the file header. Operations that receive a transaction context
/// acquire the appropriate table/record locks and append undo entries to
/// the transaction's write set.
pub struct RecordFile {
    buffer: Arc<BufferManager>,
    file: FileHandle,
    name: String,
    layout: HeapLayout,
    state: Mutex<HeapState>,
}

impl RecordFile {
    /// Create a new record file for a table
    pub fn create<P: AsRef<Path>>(
        buffer: &Arc<BufferManager>,
        path: P,
        name: &str,
        record_size: usize,
    ) -> RecordResult<Self> {
        Self::create_with_header(buffer, path, name, FileHeader::new(record_size))
    }

    /// Create a record file with an explicit slot count per page
    pub fn create_with_capacity<P: AsRef<Path>>(
        buffer: &Arc<BufferManager>,
        path: P,
        name: &str,
        record_size: usize,
        records_per_page: usize,
    ) -> RecordResult<Self> {
        Self::create_with_header(
            buffer,
            path,
            name,
            FileHeader::with_capacity(record_size, records_per_page),
        )
    }

    fn create_with_header<P: AsRef<Path>>(
        buffer: &Arc<BufferManager>,
        path: P,
        name: &str,
        header: FileHeader,
    ) -> RecordResult<Self> {
        if header.records_per_page == 0 {
            return Err(RecordError::InvalidRecordSize {
                expected: PAGE_SIZE - PageHeader::SIZE - 1,
                actual: header.record_size as usize,
            });
        }
        let disk = buffer.disk();
        disk.create_file(&path)?;
        let file = disk.open_file(&path)?;

        let mut page = vec![0u8; PAGE_SIZE];
        page[..FileHeader::SIZE].copy_from_slice(&header.serialize());
        disk.write_page(file, 0, &page)?;
        disk.set_page_counter(file, 1)?;

        Ok(Self {
            buffer: Arc::clone(buffer),
            file,
            name: name.to_string(),
            layout: header.layout(),
            state: Mutex::new(HeapState {
                num_pages: header.num_pages,
                first_free_page: header.first_free_page,
            }),
        })
    }

    /// Open an existing record file and re-seed the page allocator from
    /// its header
    pub fn open<P: AsRef<Path>>(
        buffer: &Arc<BufferManager>,
        path: P,
        name: &str,
    ) -> RecordResult<Self> {
        let disk = buffer.disk();
        let file = disk.open_file(&path)?;

        let mut page = vec![0u8; PAGE_SIZE];
        disk.read_page(file, 0, &mut page)?;
        let header = FileHeader::deserialize(&page);

        disk.set_page_counter(file, header.num_pages + 1)?;

        Ok(Self {
            buffer: Arc::clone(buffer),
            file,
            name: name.to_string(),
            layout: header.layout(),
            state: Mutex::new(HeapState {
                num_pages: header.num_pages,
                first_free_page: header.first_free_page,
            }),
        })
    }

    /// Persist the header and all cached pages, then close the file
    pub fn close(&self) -> RecordResult<()> {
        self.persist_header()?;
        self.buffer.flush_all_pages(self.file)?;
        self.buffer.disk().sync_file(self.file)?;
        self.buffer.disk().close_file(self.file)?;
        Ok(())
    }

    /// Table name this file stores
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self) -> FileHandle {
        self.file
    }

    pub fn record_size(&self) -> usize {
        self.layout.record_size
    }

    pub(crate) fn layout(&self) -> HeapLayout {
        self.layout
    }

    pub(crate) fn buffer(&self) -> &Arc<BufferManager> {
        &self.buffer
    }

    /// Snapshot of the current file header
    pub fn header(&self) -> FileHeader {
        let state = self.state.lock().unwrap();
        let mut header = FileHeader::with_capacity(
            self.layout.record_size,
            self.layout.records_per_page,
        );
        header.num_pages = state.num_pages;
        header.first_free_page = state.first_free_page;
        header
    }

    /// Write the file header back to page 0
    pub fn persist_header(&self) -> RecordResult<()> {
        let header = self.header();
        let mut page = vec![0u8; PAGE_SIZE];
        self.buffer.disk().read_page(self.file, 0, &mut page)?;
        page[..FileHeader::SIZE].copy_from_slice(&header.serialize());
        self.buffer.disk().write_page(self.file, 0, &page)?;
        Ok(())
    }

    /// Insert a record into the first page with room, creating a new page
    /// when the free list is empty. Returns the new record's Rid.
    pub fn insert_record(&self, ctx: Option<&Context>, buf: &[u8]) -> RecordResult<Rid> {
        self.check_record_size(buf)?;

        if let Some(ctx) = ctx {
            ctx.locks
                .lock_intention_exclusive_on_table(ctx.txn, self.file)?;
        }

        let rid = {
            let mut state = self.state.lock().unwrap();
            let (handle, page_no) = self.writable_page(&mut state)?;

            let mut guard = handle.write();
            let mut page = HeapPage::from_buffer(&mut guard, self.layout);

            let slot_no = page
                .find_free_slot()
                .expect("free-list page has a free slot");
            page.set_record(slot_no, buf);
            page.mark_slot_used(slot_no);

            if page.is_full() {
                state.first_free_page = page.next_free_page();
                page.set_next_free_page(INVALID_PAGE_NO);
            }

            drop(guard);
            self.buffer.unpin_page(handle.id(), true);
            Rid::new(page_no, slot_no as u32)
        };

        if let Some(ctx) = ctx {
            if let Err(err) = ctx
                .locks
                .lock_exclusive_on_record(ctx.txn, rid, self.file)
            {
                // The row must not survive a failed lock acquisition.
                self.rollback_insert(rid)?;
                return Err(err.into());
            }
            ctx.txn.append_write(WriteRecord::Insert {
                table: self.name.clone(),
                rid,
            });
        }

        Ok(rid)
    }

    /// Insert a record at a caller-chosen Rid. Fails when the slot is out
    /// of range or already occupied.
    pub fn insert_record_at(
        &self,
        ctx: Option<&Context>,
        rid: Rid,
        buf: &[u8],
    ) -> RecordResult<()> {
        self.check_record_size(buf)?;

        if let Some(ctx) = ctx {
            ctx.locks
                .lock_exclusive_on_record(ctx.txn, rid, self.file)?;
        }

        let mut state = self.state.lock().unwrap();
        if rid.slot_no as usize >= self.layout.records_per_page {
            return Err(RecordError::SlotOutOfRange(rid.page_no, rid.slot_no));
        }
        let handle = self.fetch_record_page(&state, rid.page_no)?;

        let mut guard = handle.write();
        let mut page = HeapPage::from_buffer(&mut guard, self.layout);

        if page.is_slot_used(rid.slot_no as usize) {
            drop(guard);
            self.buffer.unpin_page(handle.id(), false);
            return Err(RecordError::SlotOccupied(rid.page_no, rid.slot_no));
        }

        page.set_record(rid.slot_no as usize, buf);
        page.mark_slot_used(rid.slot_no as usize);

        if page.is_full() {
            let next = page.next_free_page();
            if state.first_free_page == rid.page_no {
                state.first_free_page = next;
            } else {
                self.unlink_free_page(&state, rid.page_no, next)?;
            }
            page.set_next_free_page(INVALID_PAGE_NO);
        }

        drop(guard);
        self.buffer.unpin_page(handle.id(), true);
        Ok(())
    }

    /// Read a copy of the record stored at `rid`
    pub fn get_record(&self, ctx: Option<&Context>, rid: Rid) -> RecordResult<Vec<u8>> {
        if let Some(ctx) = ctx {
            ctx.locks.lock_shared_on_record(ctx.txn, rid, self.file)?;
        }

        let handle = {
            let state = self.state.lock().unwrap();
            self.fetch_record_page(&state, rid.page_no)?
        };

        let mut guard = handle.write();
        let page = HeapPage::from_buffer(&mut guard, self.layout);

        if rid.slot_no as usize >= self.layout.records_per_page
            || !page.is_slot_used(rid.slot_no as usize)
        {
            drop(guard);
            self.buffer.unpin_page(handle.id(), false);
            return Err(RecordError::RecordNotFound(rid.page_no, rid.slot_no));
        }

        let record = page.record(rid.slot_no as usize).to_vec();
        drop(guard);
        self.buffer.unpin_page(handle.id(), false);
        Ok(record)
    }

    /// Overwrite the record at `rid` in place
    pub fn update_record(&self, ctx: Option<&Context>, rid: Rid, buf: &[u8]) -> RecordResult<()> {
        self.check_record_size(buf)?;

        if let Some(ctx) = ctx {
            ctx.locks
                .lock_exclusive_on_record(ctx.txn, rid, self.file)?;
        }

        let handle = {
            let state = self.state.lock().unwrap();
            self.fetch_record_page(&state, rid.page_no)?
        };

        let mut guard = handle.write();
        let mut page = HeapPage::from_buffer(&mut guard, self.layout);

        if rid.slot_no as usize >= self.layout.records_per_page
            || !page.is_slot_used(rid.slot_no as usize)
        {
            drop(guard);
            self.buffer.unpin_page(handle.id(), false);
            return Err(RecordError::RecordNotFound(rid.page_no, rid.slot_no));
        }

        let old_record = page.record(rid.slot_no as usize).to_vec();
        page.set_record(rid.slot_no as usize, buf);

        drop(guard);
        self.buffer.unpin_page(handle.id(), true);

        if let Some(ctx) = ctx {
            ctx.txn.append_write(WriteRecord::Update {
                table: self.name.clone(),
                rid,
                old_record,
            });
        }
        Ok(())
    }

    /// Delete the record at `rid`, relinking its page into the free list
    /// when it transitions from full to not-full
    pub fn delete_record(&self, ctx: Option<&Context>, rid: Rid) -> RecordResult<()> {
        if let Some(ctx) = ctx {
            ctx.locks
                .lock_exclusive_on_record(ctx.txn, rid, self.file)?;
        }

        let old_record = {
            let mut state = self.state.lock().unwrap();
            let handle = self.fetch_record_page(&state, rid.page_no)?;

            let mut guard = handle.write();
            let mut page = HeapPage::from_buffer(&mut guard, self.layout);

            if rid.slot_no as usize >= self.layout.records_per_page
                || !page.is_slot_used(rid.slot_no as usize)
            {
                drop(guard);
                self.buffer.unpin_page(handle.id(), false);
                return Err(RecordError::RecordNotFound(rid.page_no, rid.slot_no));
            }

            let old_record = page.record(rid.slot_no as usize).to_vec();
            let was_full = page.is_full();
            page.mark_slot_free(rid.slot_no as usize);

            if was_full {
                page.set_next_free_page(state.first_free_page);
                state.first_free_page = rid.page_no;
            }

            drop(guard);
            self.buffer.unpin_page(handle.id(), true);
            old_record
        };

        if let Some(ctx) = ctx {
            ctx.txn.append_write(WriteRecord::Delete {
                table: self.name.clone(),
                rid,
                record: old_record,
            });
        }
        Ok(())
    }

    /// Forward scan over all records, in (page, slot) order
    pub fn scan(&self, ctx: Option<&Context>) -> RecordResult<RecordScan<'_>> {
        if let Some(ctx) = ctx {
            ctx.locks.lock_shared_on_table(ctx.txn, self.file)?;
        }
        Ok(RecordScan::new(self))
    }

    pub(crate) fn num_pages(&self) -> u32 {
        self.state.lock().unwrap().num_pages
    }

    fn check_record_size(&self, buf: &[u8]) -> RecordResult<()> {
        if buf.len() != self.layout.record_size {
            return Err(RecordError::InvalidRecordSize {
                expected: self.layout.record_size,
                actual: buf.len(),
            });
        }
        Ok(())
    }

    /// Fetch a record page, rejecting page numbers outside `1..=num_pages`
    fn fetch_record_page(&self, state: &HeapState, page_no: PageNo) -> RecordResult<PageHandle> {
        if page_no == 0 || page_no > state.num_pages {
            return Err(RecordError::PageNotExist(page_no));
        }
        Ok(self.buffer.fetch_page(PageId::new(self.file, page_no))?)
    }

    /// Page to insert into: the free-list head, or a fresh page linked in
    /// as the new head
    fn writable_page(
        &self,
        state: &mut MutexGuard<'_, HeapState>,
    ) -> RecordResult<(PageHandle, PageNo)> {
        if state.first_free_page != INVALID_PAGE_NO {
            let page_no = state.first_free_page;
            let handle = self.fetch_record_page(state, page_no)?;
            return Ok((handle, page_no));
        }

        let handle = self.buffer.new_page(self.file)?;
        let page_no = handle.id().page_no;
        debug!("table {}: allocating record page {}", self.name, page_no);

        {
            let mut guard = handle.write();
            let mut page = HeapPage::init(&mut guard, self.layout);
            page.set_next_free_page(state.first_free_page);
        }
        state.first_free_page = page_no;
        state.num_pages += 1;

        Ok((handle, page_no))
    }

    /// Remove `page_no` from the free list by scanning for its predecessor.
    /// A page that is not on the list leaves the list untouched.
    fn unlink_free_page(
        &self,
        state: &HeapState,
        page_no: PageNo,
        next: PageNo,
    ) -> RecordResult<()> {
        let mut pred_no = state.first_free_page;
        while pred_no != INVALID_PAGE_NO {
            let handle = self.fetch_record_page(state, pred_no)?;
            let mut guard = handle.write();
            let mut pred = HeapPage::from_buffer(&mut guard, self.layout);

            if pred.next_free_page() == page_no {
                pred.set_next_free_page(next);
                drop(guard);
                self.buffer.unpin_page(handle.id(), true);
                return Ok(());
            }

            let advance = pred.next_free_page();
            drop(guard);
            self.buffer.unpin_page(handle.id(), false);
            pred_no = advance;
        }
        Ok(())
    }

    /// Undo a just-completed insert whose record lock could not be taken
    fn rollback_insert(&self, rid: Rid) -> RecordResult<()> {
        let mut state = self.state.lock().unwrap();
        let handle = self.fetch_record_page(&state, rid.page_no)?;

        let mut guard = handle.write();
        let mut page = HeapPage::from_buffer(&mut guard, self.layout);

        if page.is_slot_used(rid.slot_no as usize) {
            let was_full = page.is_full();
            page.mark_slot_free(rid.slot_no as usize);
            if was_full {
                page.set_next_free_page(state.first_free_page);
                state.first_free_page = rid.page_no;
            }
        }

        drop(guard);
        self.buffer.unpin_page(handle.id(), true);
        Ok(())
    }
}
