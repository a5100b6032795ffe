use std::cmp::Ordering;
use std::path::Path;
use std::sync::{Arc, Mutex};

use log::debug;

use super::error::{IndexError, IndexResult};
use super::header::{IndexFileHeader, KeySchema, TreeState};
use super::node::{NodeHeader, NodeView};
use super::scan::IndexScan;
use super::{compare_keys, ColSpec, Iid, LEAF_SENTINEL_PAGE};
use crate::file::{
    BufferManager, FileHandle, PageHandle, PageId, PageNo, INVALID_PAGE_NO, PAGE_SIZE,
};
use crate::record::Rid;

/// Handle to one B+ tree index file.
///
/// Page 0 is the file header, page 1 the leaf-chain sentinel; node pages
/// start at 2. The mutable header fields double as the tree latch: every
/// operation runs under the state mutex, so tree structure changes are
/// serialized per index.
pub struct IndexHandle {
    buffer: Arc<BufferManager>,
    file: FileHandle,
    name: String,
    schema: KeySchema,
    state: Mutex<TreeState>,
}

impl IndexHandle {
    /// Create a new index file for the given key columns
    pub fn create<P: AsRef<Path>>(
        buffer: &Arc<BufferManager>,
        path: P,
        name: &str,
        columns: Vec<ColSpec>,
        order: Option<usize>,
    ) -> IndexResult<Self> {
        let schema = KeySchema::new(columns, order);
        if KeySchema::max_order(schema.key_len) < 3 {
            return Err(IndexError::InvalidKeySize {
                expected: (PAGE_SIZE - NodeHeader::SIZE) / 3 - 8,
                actual: schema.key_len,
            });
        }

        let disk = buffer.disk();
        disk.create_file(&path)?;
        let file = disk.open_file(&path)?;

        let state = TreeState {
            root_page: INVALID_PAGE_NO,
            first_leaf: LEAF_SENTINEL_PAGE,
            last_leaf: LEAF_SENTINEL_PAGE,
            num_pages: 2,
        };

        let header = IndexFileHeader {
            schema: schema.clone(),
            state,
        };
        disk.write_page(file, 0, &header.serialize())?;
        disk.write_page(file, LEAF_SENTINEL_PAGE, &vec![0u8; PAGE_SIZE])?;
        disk.set_page_counter(file, 2)?;

        Ok(Self {
            buffer: Arc::clone(buffer),
            file,
            name: name.to_string(),
            schema,
            state: Mutex::new(state),
        })
    }

    /// Open an existing index file and re-seed the page allocator
    pub fn open<P: AsRef<Path>>(
        buffer: &Arc<BufferManager>,
        path: P,
        name: &str,
    ) -> IndexResult<Self> {
        let disk = buffer.disk();
        let file = disk.open_file(&path)?;

        let mut page = vec![0u8; PAGE_SIZE];
        disk.read_page(file, 0, &mut page)?;
        let header = IndexFileHeader::deserialize(&page)?;

        disk.set_page_counter(file, header.state.num_pages)?;

        Ok(Self {
            buffer: Arc::clone(buffer),
            file,
            name: name.to_string(),
            schema: header.schema,
            state: Mutex::new(header.state),
        })
    }

    /// Persist the header and all cached pages, then close the file
    pub fn close(&self) -> IndexResult<()> {
        self.persist_header()?;
        self.buffer.flush_all_pages(self.file)?;
        self.buffer.disk().sync_file(self.file)?;
        self.buffer.disk().close_file(self.file)?;
        Ok(())
    }

    /// Write the file header back to page 0
    pub fn persist_header(&self) -> IndexResult<()> {
        let header = IndexFileHeader {
            schema: self.schema.clone(),
            state: *self.state.lock().unwrap(),
        };
        self.buffer.disk().write_page(self.file, 0, &header.serialize())?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self) -> FileHandle {
        self.file
    }

    pub fn schema(&self) -> &KeySchema {
        &self.schema
    }

    pub fn buffer(&self) -> &Arc<BufferManager> {
        &self.buffer
    }

    /// Snapshot of the mutable header fields
    pub fn tree_state(&self) -> TreeState {
        *self.state.lock().unwrap()
    }

    /// Point lookup: the Rid stored under `key`, if present
    pub fn get_value(&self, key: &[u8]) -> IndexResult<Option<Rid>> {
        self.check_key(key)?;
        let state = self.state.lock().unwrap();

        let Some(leaf_no) = self.find_leaf(&state, key)? else {
            return Ok(None);
        };

        let handle = self.fetch(leaf_no)?;
        let mut guard = handle.write();
        let node = NodeView::from_buffer(&mut guard, &self.schema);
        let found = node.leaf_lookup(key);
        drop(guard);
        self.unpin(&handle, false);
        Ok(found)
    }

    /// Insert a key/rid pair. Returns false (and changes nothing) when the
    /// key is already present; splits overflowing nodes on the way up.
    pub fn insert_entry(&self, key: &[u8], rid: Rid) -> IndexResult<bool> {
        self.check_key(key)?;
        let mut state = self.state.lock().unwrap();

        let Some(leaf_no) = self.find_leaf(&state, key)? else {
            // First entry: a fresh leaf becomes the root.
            let handle = self.create_node(&mut state)?;
            let page_no = handle.id().page_no;
            {
                let mut guard = handle.write();
                let mut node = NodeView::init(&mut guard, &self.schema, true, INVALID_PAGE_NO);
                node.insert_pair(0, key, rid);
            }
            self.unpin(&handle, true);
            state.root_page = page_no;
            state.first_leaf = page_no;
            state.last_leaf = page_no;
            return Ok(true);
        };

        let handle = self.fetch(leaf_no)?;
        let mut guard = handle.write();
        let mut node = NodeView::from_buffer(&mut guard, &self.schema);

        let old_size = node.size();
        let new_size = node.insert(key, rid);
        if new_size == old_size {
            drop(guard);
            self.unpin(&handle, false);
            return Ok(false);
        }

        if new_size < self.schema.order {
            drop(guard);
            self.unpin(&handle, true);
            return Ok(true);
        }

        let (new_page, promoted) = self.split(&mut state, leaf_no, &mut node)?;
        drop(guard);
        self.unpin(&handle, true);
        self.insert_into_parent(&mut state, leaf_no, &promoted, new_page)?;
        Ok(true)
    }

    /// Delete the entry under `key`. Returns false when the key is absent;
    /// repairs underflow by redistribution or coalescing.
    pub fn delete_entry(&self, key: &[u8]) -> IndexResult<bool> {
        self.check_key(key)?;
        let mut state = self.state.lock().unwrap();

        let Some(leaf_no) = self.find_leaf(&state, key)? else {
            return Ok(false);
        };

        let (new_size, first_changed, is_root) = {
            let handle = self.fetch(leaf_no)?;
            let mut guard = handle.write();
            let mut node = NodeView::from_buffer(&mut guard, &self.schema);

            let pos = node.lower_bound(key);
            if pos >= node.size()
                || compare_keys(node.key(pos), key, &self.schema.columns) != Ordering::Equal
            {
                drop(guard);
                self.unpin(&handle, false);
                return Ok(false);
            }

            node.erase_pair(pos);
            let result = (node.size(), pos == 0, node.is_root());
            drop(guard);
            self.unpin(&handle, true);
            result
        };

        // The smallest key of the leaf changed; separators above may still
        // carry the old one.
        if first_changed && new_size > 0 {
            self.maintain_parent(leaf_no)?;
        }

        if is_root || new_size < self.schema.min_size() {
            self.coalesce_or_redistribute(&mut state, leaf_no)?;
        }
        Ok(true)
    }

    /// First leaf slot whose key is >= `key`
    pub fn lower_bound(&self, key: &[u8]) -> IndexResult<Iid> {
        self.check_key(key)?;
        let state = self.state.lock().unwrap();
        self.bound_iid(&state, key, false)
    }

    /// First leaf slot whose key is > `key`
    pub fn upper_bound(&self, key: &[u8]) -> IndexResult<Iid> {
        self.check_key(key)?;
        let state = self.state.lock().unwrap();
        self.bound_iid(&state, key, true)
    }

    /// Cursor at the first entry of the tree
    pub fn leaf_begin(&self) -> Iid {
        let state = self.state.lock().unwrap();
        Iid::new(state.first_leaf, 0)
    }

    /// One-past-the-last cursor position
    pub fn leaf_end(&self) -> IndexResult<Iid> {
        let state = self.state.lock().unwrap();
        if state.last_leaf == LEAF_SENTINEL_PAGE {
            return Ok(Iid::new(LEAF_SENTINEL_PAGE, 0));
        }
        let handle = self.fetch(state.last_leaf)?;
        let mut guard = handle.write();
        let node = NodeView::from_buffer(&mut guard, &self.schema);
        let iid = Iid::new(state.last_leaf, node.size() as u32);
        drop(guard);
        self.unpin(&handle, false);
        Ok(iid)
    }

    /// The Rid stored at a cursor position
    pub fn get_rid(&self, iid: Iid) -> IndexResult<Rid> {
        let handle = self.fetch(iid.page_no)?;
        let mut guard = handle.write();
        let node = NodeView::from_buffer(&mut guard, &self.schema);
        if iid.slot_no as usize >= node.size() {
            drop(guard);
            self.unpin(&handle, false);
            return Err(IndexError::IndexEntryNotFound);
        }
        let rid = node.rid(iid.slot_no as usize);
        drop(guard);
        self.unpin(&handle, false);
        Ok(rid)
    }

    /// The key stored at a cursor position
    pub fn get_key(&self, iid: Iid) -> IndexResult<Vec<u8>> {
        let handle = self.fetch(iid.page_no)?;
        let mut guard = handle.write();
        let node = NodeView::from_buffer(&mut guard, &self.schema);
        if iid.slot_no as usize >= node.size() {
            drop(guard);
            self.unpin(&handle, false);
            return Err(IndexError::IndexEntryNotFound);
        }
        let key = node.key(iid.slot_no as usize).to_vec();
        drop(guard);
        self.unpin(&handle, false);
        Ok(key)
    }

    /// Ordered scan over `[begin, end)`
    pub fn scan(&self, begin: Iid, end: Iid) -> IndexScan<'_> {
        IndexScan::new(self, begin, end)
    }

    /// Advance a cursor one slot, hopping to the next leaf at the end of
    /// each leaf except the last
    pub(crate) fn next_iid(&self, iid: Iid) -> IndexResult<Iid> {
        let state = self.state.lock().unwrap();

        let handle = self.fetch(iid.page_no)?;
        let mut guard = handle.write();
        let node = NodeView::from_buffer(&mut guard, &self.schema);

        let mut next = Iid::new(iid.page_no, iid.slot_no + 1);
        if iid.page_no != state.last_leaf && next.slot_no as usize == node.size() {
            next = Iid::new(node.next_leaf(), 0);
        }
        drop(guard);
        self.unpin(&handle, false);
        Ok(next)
    }

    // ---- descent ----

    /// Leaf page that should hold `key`; `None` on an empty tree
    fn find_leaf(&self, state: &TreeState, key: &[u8]) -> IndexResult<Option<PageNo>> {
        if state.root_page == INVALID_PAGE_NO {
            return Ok(None);
        }

        let mut page_no = state.root_page;
        loop {
            let handle = self.fetch(page_no)?;
            let mut guard = handle.write();
            let node = NodeView::from_buffer(&mut guard, &self.schema);

            if node.is_leaf() {
                drop(guard);
                self.unpin(&handle, false);
                return Ok(Some(page_no));
            }

            let child = node.internal_lookup(key);
            drop(guard);
            self.unpin(&handle, false);
            page_no = child;
        }
    }

    fn bound_iid(&self, state: &TreeState, key: &[u8], upper: bool) -> IndexResult<Iid> {
        let Some(leaf_no) = self.find_leaf(state, key)? else {
            return Ok(Iid::new(LEAF_SENTINEL_PAGE, 0));
        };

        let handle = self.fetch(leaf_no)?;
        let mut guard = handle.write();
        let node = NodeView::from_buffer(&mut guard, &self.schema);

        let slot = if upper {
            node.upper_bound(key)
        } else {
            node.lower_bound(key)
        };

        let iid = if slot == node.size() && node.next_leaf() != LEAF_SENTINEL_PAGE {
            Iid::new(node.next_leaf(), 0)
        } else {
            Iid::new(leaf_no, slot as u32)
        };
        drop(guard);
        self.unpin(&handle, false);
        Ok(iid)
    }

    // ---- insert plumbing ----

    /// Split an overflowing node, moving its right half into a fresh
    /// sibling. Returns the new page and the key to promote (the new
    /// node's minimum). The caller keeps `node` pinned.
    fn split(
        &self,
        state: &mut TreeState,
        node_page: PageNo,
        node: &mut NodeView,
    ) -> IndexResult<(PageNo, Vec<u8>)> {
        let new_handle = self.create_node(state)?;
        let new_page = new_handle.id().page_no;

        let old_size = node.size();
        let move_cnt = old_size / 2;
        let keys = node.keys_range(old_size - move_cnt, old_size);
        let rids = node.rids_range(old_size - move_cnt, old_size);

        {
            let mut guard = new_handle.write();
            let mut new_node =
                NodeView::init(&mut guard, &self.schema, node.is_leaf(), node.parent());
            new_node.insert_pairs(0, &keys, &rids);
            if node.is_leaf() {
                new_node.set_prev_leaf(node_page);
                new_node.set_next_leaf(node.next_leaf());
            }
        }
        node.truncate(old_size - move_cnt);

        if node.is_leaf() {
            let next = node.next_leaf();
            if next != LEAF_SENTINEL_PAGE {
                let next_handle = self.fetch(next)?;
                let mut guard = next_handle.write();
                let mut next_node = NodeView::from_buffer(&mut guard, &self.schema);
                next_node.set_prev_leaf(new_page);
                drop(guard);
                self.unpin(&next_handle, true);
            }
            node.set_next_leaf(new_page);
            if state.last_leaf == node_page {
                state.last_leaf = new_page;
            }
        } else {
            for rid in &rids {
                self.maintain_child(rid.page_no, new_page)?;
            }
        }

        self.unpin(&new_handle, true);
        debug!(
            "index {}: split page {} -> new sibling {}",
            self.name, node_page, new_page
        );
        Ok((new_page, keys[..self.schema.key_len].to_vec()))
    }

    /// Hook a freshly split-off node into the tree above `old_page`,
    /// splitting ancestors as needed
    fn insert_into_parent(
        &self,
        state: &mut TreeState,
        old_page: PageNo,
        key: &[u8],
        new_page: PageNo,
    ) -> IndexResult<()> {
        let (old_parent, old_first_key) = {
            let handle = self.fetch(old_page)?;
            let mut guard = handle.write();
            let node = NodeView::from_buffer(&mut guard, &self.schema);
            let info = (node.parent(), node.key(0).to_vec());
            drop(guard);
            self.unpin(&handle, false);
            info
        };

        if old_parent == INVALID_PAGE_NO {
            // The old node was the root: grow the tree by one level.
            let root_handle = self.create_node(state)?;
            let root_page = root_handle.id().page_no;
            {
                let mut guard = root_handle.write();
                let mut root =
                    NodeView::init(&mut guard, &self.schema, false, INVALID_PAGE_NO);
                root.insert_pair(0, &old_first_key, Rid::new(old_page, 0));
                root.insert_pair(1, key, Rid::new(new_page, 0));
            }
            self.unpin(&root_handle, true);
            self.maintain_child(old_page, root_page)?;
            self.maintain_child(new_page, root_page)?;
            state.root_page = root_page;
            return Ok(());
        }

        let parent_handle = self.fetch(old_parent)?;
        let mut guard = parent_handle.write();
        let mut parent = NodeView::from_buffer(&mut guard, &self.schema);

        let index = parent
            .find_child(old_page)
            .expect("split child is registered in its parent");
        parent.insert_pair(index + 1, key, Rid::new(new_page, 0));
        self.maintain_child(new_page, old_parent)?;

        if parent.size() >= self.schema.order {
            let (split_page, promoted) = self.split(state, old_parent, &mut parent)?;
            drop(guard);
            self.unpin(&parent_handle, true);
            self.insert_into_parent(state, old_parent, &promoted, split_page)?;
        } else {
            drop(guard);
            self.unpin(&parent_handle, true);
        }
        Ok(())
    }

    // ---- delete plumbing ----

    /// Rewrite ancestor separators after a node's minimum key changed
    fn maintain_parent(&self, mut page_no: PageNo) -> IndexResult<()> {
        loop {
            let (parent_no, first_key) = {
                let handle = self.fetch(page_no)?;
                let mut guard = handle.write();
                let node = NodeView::from_buffer(&mut guard, &self.schema);
                let info = (node.parent(), node.key(0).to_vec());
                drop(guard);
                self.unpin(&handle, false);
                info
            };
            if parent_no == INVALID_PAGE_NO {
                return Ok(());
            }

            let handle = self.fetch(parent_no)?;
            let mut guard = handle.write();
            let mut parent = NodeView::from_buffer(&mut guard, &self.schema);
            let rank = parent
                .find_child(page_no)
                .expect("node is registered in its parent");

            if parent.key(rank) == first_key.as_slice() {
                drop(guard);
                self.unpin(&handle, false);
                return Ok(());
            }

            parent.set_key(rank, &first_key);
            drop(guard);
            self.unpin(&handle, true);
            page_no = parent_no;
        }
    }

    /// Repair an underflowing node by borrowing from a sibling or merging
    /// into it; cascades upward when the parent underflows in turn
    fn coalesce_or_redistribute(
        &self,
        state: &mut TreeState,
        page_no: PageNo,
    ) -> IndexResult<()> {
        if page_no == state.root_page {
            return self.adjust_root(state, page_no);
        }

        let (node_size, parent_no) = {
            let handle = self.fetch(page_no)?;
            let mut guard = handle.write();
            let node = NodeView::from_buffer(&mut guard, &self.schema);
            let info = (node.size(), node.parent());
            drop(guard);
            self.unpin(&handle, false);
            info
        };
        if node_size >= self.schema.min_size() {
            return Ok(());
        }

        let parent_handle = self.fetch(parent_no)?;
        let mut parent_guard = parent_handle.write();
        let mut parent = NodeView::from_buffer(&mut parent_guard, &self.schema);

        let index = parent
            .find_child(page_no)
            .expect("node is registered in its parent");
        // Prefer the left sibling.
        let neighbor_index = if index > 0 { index - 1 } else { index + 1 };
        let neighbor_no = parent.value_at(neighbor_index);

        let node_handle = self.fetch(page_no)?;
        let neighbor_handle = self.fetch(neighbor_no)?;
        let mut node_guard = node_handle.write();
        let mut neighbor_guard = neighbor_handle.write();
        let node = NodeView::from_buffer(&mut node_guard, &self.schema);
        let neighbor = NodeView::from_buffer(&mut neighbor_guard, &self.schema);

        if neighbor.size() + node.size() >= 2 * self.schema.min_size() {
            self.redistribute(neighbor, node, &mut parent, page_no, index, neighbor_index)?;
            drop(node_guard);
            drop(neighbor_guard);
            drop(parent_guard);
            self.unpin(&node_handle, true);
            self.unpin(&neighbor_handle, true);
            self.unpin(&parent_handle, true);
            return Ok(());
        }

        // Merge right into left; swap roles so the kept node is the left
        // one.
        let (mut left, right, left_no, right_no, sep_index) = if index == 0 {
            (node, neighbor, page_no, neighbor_no, neighbor_index)
        } else {
            (neighbor, node, neighbor_no, page_no, index)
        };

        let left_old = left.size();
        let move_cnt = right.size();
        let keys = right.keys_range(0, move_cnt);
        let rids = right.rids_range(0, move_cnt);
        left.insert_pairs(left_old, &keys, &rids);

        if left.is_leaf() {
            if right_no == state.last_leaf {
                state.last_leaf = left_no;
            }
            if right_no == state.first_leaf {
                state.first_leaf = right.next_leaf();
            }
            let next = right.next_leaf();
            left.set_next_leaf(next);
            if next != LEAF_SENTINEL_PAGE && next != left_no {
                let next_handle = self.fetch(next)?;
                let mut guard = next_handle.write();
                let mut next_node = NodeView::from_buffer(&mut guard, &self.schema);
                next_node.set_prev_leaf(left_no);
                drop(guard);
                self.unpin(&next_handle, true);
            }
        } else {
            for rid in &rids {
                self.maintain_child(rid.page_no, left_no)?;
            }
        }

        parent.erase_pair(sep_index);
        debug!(
            "index {}: coalesced page {} into {}",
            self.name, right_no, left_no
        );

        drop(node_guard);
        drop(neighbor_guard);
        self.unpin(&node_handle, true);
        self.unpin(&neighbor_handle, true);
        self.buffer.delete_page(PageId::new(self.file, right_no))?;

        let parent_size = parent.size();
        if parent_no == state.root_page {
            self.adjust_root_node(state, &mut parent)?;
            drop(parent_guard);
            self.unpin(&parent_handle, true);
            if state.root_page != parent_no {
                self.buffer.delete_page(PageId::new(self.file, parent_no))?;
            }
        } else {
            drop(parent_guard);
            self.unpin(&parent_handle, true);
            if parent_size < self.schema.min_size() {
                self.coalesce_or_redistribute(state, parent_no)?;
            }
        }
        Ok(())
    }

    /// Move one boundary pair from `neighbor` into `node` and refresh the
    /// separator in the parent
    #[allow(clippy::too_many_arguments)]
    fn redistribute(
        &self,
        mut neighbor: NodeView,
        mut node: NodeView,
        parent: &mut NodeView,
        node_page: PageNo,
        index: usize,
        neighbor_index: usize,
    ) -> IndexResult<()> {
        if index == 0 {
            // Neighbor is the right sibling: its first pair becomes the
            // node's last.
            let key = neighbor.key(0).to_vec();
            let rid = neighbor.rid(0);
            node.insert_pair(node.size(), &key, rid);
            neighbor.erase_pair(0);
            if !node.is_leaf() {
                self.maintain_child(rid.page_no, node_page)?;
            }
            let new_first = neighbor.key(0).to_vec();
            parent.set_key(neighbor_index, &new_first);
        } else {
            // Neighbor is the left sibling: its last pair becomes the
            // node's first.
            let last = neighbor.size() - 1;
            let key = neighbor.key(last).to_vec();
            let rid = neighbor.rid(last);
            node.insert_pair(0, &key, rid);
            neighbor.erase_pair(last);
            if !node.is_leaf() {
                self.maintain_child(rid.page_no, node_page)?;
            }
            parent.set_key(index, &key);
        }
        Ok(())
    }

    /// Shrink or clear the root after a deletion
    fn adjust_root(&self, state: &mut TreeState, root_no: PageNo) -> IndexResult<()> {
        let handle = self.fetch(root_no)?;
        let mut guard = handle.write();
        let mut root = NodeView::from_buffer(&mut guard, &self.schema);
        self.adjust_root_node(state, &mut root)?;
        drop(guard);
        self.unpin(&handle, true);
        if state.root_page != root_no {
            self.buffer.delete_page(PageId::new(self.file, root_no))?;
        }
        Ok(())
    }

    fn adjust_root_node(&self, state: &mut TreeState, root: &mut NodeView) -> IndexResult<()> {
        if !root.is_leaf() && root.size() == 1 {
            // A single-child internal root is redundant; its child takes
            // over.
            let child = root.value_at(0);
            let child_handle = self.fetch(child)?;
            let mut guard = child_handle.write();
            let mut child_node = NodeView::from_buffer(&mut guard, &self.schema);
            child_node.set_parent(INVALID_PAGE_NO);
            drop(guard);
            self.unpin(&child_handle, true);
            state.root_page = child;
        } else if root.is_leaf() && root.size() == 0 {
            state.root_page = INVALID_PAGE_NO;
            state.first_leaf = LEAF_SENTINEL_PAGE;
            state.last_leaf = LEAF_SENTINEL_PAGE;
        }
        Ok(())
    }

    /// Point a child page's parent pointer at `parent_page`
    fn maintain_child(&self, child_page: PageNo, parent_page: PageNo) -> IndexResult<()> {
        let handle = self.fetch(child_page)?;
        let mut guard = handle.write();
        let mut child = NodeView::from_buffer(&mut guard, &self.schema);
        child.set_parent(parent_page);
        drop(guard);
        self.unpin(&handle, true);
        Ok(())
    }

    // ---- helpers ----

    fn fetch(&self, page_no: PageNo) -> IndexResult<PageHandle> {
        Ok(self.buffer.fetch_page(PageId::new(self.file, page_no))?)
    }

    fn create_node(&self, state: &mut TreeState) -> IndexResult<PageHandle> {
        let handle = self.buffer.new_page(self.file)?;
        state.num_pages += 1;
        Ok(handle)
    }

    fn unpin(&self, handle: &PageHandle, dirty: bool) {
        self.buffer.unpin_page(handle.id(), dirty);
    }

    fn check_key(&self, key: &[u8]) -> IndexResult<()> {
        if key.len() != self.schema.key_len {
            return Err(IndexError::InvalidKeySize {
                expected: self.schema.key_len,
                actual: key.len(),
            });
        }
        Ok(())
    }
}
