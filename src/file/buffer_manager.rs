use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::trace;

use super::disk_manager::{DiskManager, FileHandle};
use super::error::{FileError, FileResult};
use super::replacer::{LruReplacer, Replacer};
use super::{FrameId, PageId, BUFFER_POOL_SIZE, PAGE_SIZE};

/// Bookkeeping for one frame; guarded by the pool mutex
#[derive(Default)]
struct FrameMeta {
    /// Page currently resident in this frame, if any
    id: Option<PageId>,
    dirty: bool,
    pin_count: u32,
}

struct PoolState {
    metas: Vec<FrameMeta>,
    page_table: HashMap<PageId, FrameId>,
    free_list: Vec<FrameId>,
    replacer: Box<dyn Replacer>,
}

/// A pinned page handed out by the buffer manager.
///
/// The handle shares the frame's byte buffer; the caller reads or writes
/// through it and must give the pin back with
/// `BufferManager::unpin_page(id, dirty)` exactly once.
pub struct PageHandle {
    id: PageId,
    data: Arc<RwLock<Vec<u8>>>,
}

impl PageHandle {
    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.data.read().unwrap()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.data.write().unwrap()
    }
}

/// Fixed-size pool of frames caching disk pages, with pin/dirty accounting
/// and pluggable victim selection.
///
/// One mutex covers the page table, the free list, the replacer and all
/// frame metadata; page bytes live in per-frame `RwLock`s so pinned callers
/// access them without holding the pool latch.
pub struct BufferManager {
    disk: Arc<DiskManager>,
    frames: Vec<Arc<RwLock<Vec<u8>>>>,
    state: Mutex<PoolState>,
}

impl BufferManager {
    pub fn new(disk: Arc<DiskManager>) -> Self {
        Self::with_capacity(disk, BUFFER_POOL_SIZE)
    }

    /// Create a pool with the given number of frames
    pub fn with_capacity(disk: Arc<DiskManager>, capacity: usize) -> Self {
        assert!(capacity > 0);

        let frames = (0..capacity)
            .map(|_| Arc::new(RwLock::new(vec![0u8; PAGE_SIZE])))
            .collect();
        let metas = (0..capacity).map(|_| FrameMeta::default()).collect();
        let free_list = (0..capacity).rev().collect();

        Self {
            disk,
            frames,
            state: Mutex::new(PoolState {
                metas,
                page_table: HashMap::new(),
                free_list,
                replacer: Box::new(LruReplacer::new()),
            }),
        }
    }

    pub fn disk(&self) -> &Arc<DiskManager> {
        &self.disk
    }

    /// Fetch a page, reading it from disk on a miss. The returned handle is
    /// pinned; unpin it when done.
    pub fn fetch_page(&self, id: PageId) -> FileResult<PageHandle> {
        let mut state = self.state.lock().unwrap();

        if let Some(&frame) = state.page_table.get(&id) {
            state.metas[frame].pin_count += 1;
            state.replacer.pin(frame);
            return Ok(self.handle(id, frame));
        }

        let frame = self.take_victim(&mut state)?;
        self.write_back_victim(&mut state, frame)?;

        {
            let mut data = self.frames[frame].write().unwrap();
            self.disk.read_page(id.file, id.page_no, &mut data)?;
        }

        let meta = &mut state.metas[frame];
        meta.id = Some(id);
        meta.dirty = false;
        meta.pin_count = 1;
        state.page_table.insert(id, frame);
        state.replacer.pin(frame);

        Ok(self.handle(id, frame))
    }

    /// Allocate a fresh page in the given file and pin it. The page data is
    /// zeroed; the caller is expected to initialize it and unpin dirty.
    pub fn new_page(&self, file: FileHandle) -> FileResult<PageHandle> {
        let mut state = self.state.lock().unwrap();

        let frame = self.take_victim(&mut state)?;
        self.write_back_victim(&mut state, frame)?;

        let page_no = self.disk.allocate_page(file)?;
        let id = PageId::new(file, page_no);

        self.frames[frame].write().unwrap().fill(0);

        let meta = &mut state.metas[frame];
        meta.id = Some(id);
        meta.dirty = false;
        meta.pin_count = 1;
        state.page_table.insert(id, frame);
        state.replacer.pin(frame);

        Ok(self.handle(id, frame))
    }

    /// Give back one pin. Returns false when the page is not resident or
    /// its pin count is already zero.
    pub fn unpin_page(&self, id: PageId, dirty: bool) -> bool {
        let mut state = self.state.lock().unwrap();

        let Some(&frame) = state.page_table.get(&id) else {
            return false;
        };
        let meta = &mut state.metas[frame];

        if meta.pin_count == 0 {
            return false;
        }

        meta.pin_count -= 1;
        if dirty {
            meta.dirty = true;
        }
        if meta.pin_count == 0 {
            state.replacer.unpin(frame);
        }
        true
    }

    /// Write a resident page to disk unconditionally and clear its dirty
    /// flag. Returns false when the page is not resident.
    pub fn flush_page(&self, id: PageId) -> FileResult<bool> {
        let mut state = self.state.lock().unwrap();

        let Some(&frame) = state.page_table.get(&id) else {
            return Ok(false);
        };

        {
            let data = self.frames[frame].read().unwrap();
            self.disk.write_page(id.file, id.page_no, &data)?;
        }
        state.metas[frame].dirty = false;
        Ok(true)
    }

    /// Drop a page from the pool. Returns true when the page was not
    /// resident or was removed; false when it is still pinned.
    pub fn delete_page(&self, id: PageId) -> FileResult<bool> {
        let mut state = self.state.lock().unwrap();

        let Some(&frame) = state.page_table.get(&id) else {
            return Ok(true);
        };

        if state.metas[frame].pin_count > 0 {
            return Ok(false);
        }

        if state.metas[frame].dirty {
            let data = self.frames[frame].read().unwrap();
            self.disk.write_page(id.file, id.page_no, &data)?;
        }

        state.page_table.remove(&id);
        state.metas[frame] = FrameMeta::default();
        state.replacer.pin(frame);
        state.free_list.push(frame);
        Ok(true)
    }

    /// Flush every resident page belonging to the given file
    pub fn flush_all_pages(&self, file: FileHandle) -> FileResult<()> {
        let mut state = self.state.lock().unwrap();

        let frames: Vec<(PageId, FrameId)> = state
            .page_table
            .iter()
            .filter(|(id, _)| id.file == file)
            .map(|(&id, &frame)| (id, frame))
            .collect();

        for (id, frame) in frames {
            let data = self.frames[frame].read().unwrap();
            self.disk.write_page(id.file, id.page_no, &data)?;
            drop(data);
            state.metas[frame].dirty = false;
        }
        Ok(())
    }

    /// Number of pages currently resident
    pub fn pooled_page_count(&self) -> usize {
        self.state.lock().unwrap().page_table.len()
    }

    /// Sum of pin counts across all frames
    pub fn total_pin_count(&self) -> u64 {
        let state = self.state.lock().unwrap();
        state.metas.iter().map(|m| m.pin_count as u64).sum()
    }

    /// Number of dirty resident pages
    pub fn dirty_page_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.metas.iter().filter(|m| m.dirty).count()
    }

    fn handle(&self, id: PageId, frame: FrameId) -> PageHandle {
        PageHandle {
            id,
            data: Arc::clone(&self.frames[frame]),
        }
    }

    /// Pick a reusable frame: free list first, then the replacer
    fn take_victim(&self, state: &mut PoolState) -> FileResult<FrameId> {
        if let Some(frame) = state.free_list.pop() {
            return Ok(frame);
        }
        state.replacer.victim().ok_or(FileError::BufferPoolFull)
    }

    /// Write back the victim's old page if dirty and drop its mapping
    fn write_back_victim(&self, state: &mut PoolState, frame: FrameId) -> FileResult<()> {
        if let Some(old) = state.metas[frame].id {
            if state.metas[frame].dirty {
                trace!(
                    "evicting dirty page {:?}/{} from frame {}",
                    old.file,
                    old.page_no,
                    frame
                );
                let data = self.frames[frame].read().unwrap();
                self.disk.write_page(old.file, old.page_no, &data)?;
            }
            state.page_table.remove(&old);
            state.metas[frame] = FrameMeta::default();
        }
        Ok(())
    }
}
