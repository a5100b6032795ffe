//! Integration tests for the B+ tree layer.

use std::sync::Arc;

use tempfile::TempDir;

use super::node::NodeView;
use super::{ColSpec, ColType, IndexError, IndexHandle, LEAF_SENTINEL_PAGE};
use crate::file::{BufferManager, DiskManager, PageId, PageNo, INVALID_PAGE_NO};
use crate::record::Rid;

fn setup(order: usize) -> (TempDir, Arc<BufferManager>, IndexHandle) {
    let temp_dir = tempfile::tempdir().unwrap();
    let disk = Arc::new(DiskManager::new(temp_dir.path()).unwrap());
    let buffer = Arc::new(BufferManager::with_capacity(disk, 64));
    let index = IndexHandle::create(
        &buffer,
        temp_dir.path().join("test.idx"),
        "test",
        vec![ColSpec {
            ty: ColType::Int,
            len: 4,
        }],
        Some(order),
    )
    .unwrap();
    (temp_dir, buffer, index)
}

fn key(v: i32) -> [u8; 4] {
    v.to_le_bytes()
}

fn rid(v: i32) -> Rid {
    Rid::new(1, v as u32)
}

/// Walk the whole tree and assert the structural invariants: sorted keys,
/// separator/subtree relations, balance, parent pointers and the leaf
/// chain.
fn check_invariants(index: &IndexHandle) {
    let state = index.tree_state();
    if state.root_page == INVALID_PAGE_NO {
        assert_eq!(state.first_leaf, LEAF_SENTINEL_PAGE);
        assert_eq!(state.last_leaf, LEAF_SENTINEL_PAGE);
        return;
    }

    let mut leaves = Vec::new();
    walk(index, state.root_page, INVALID_PAGE_NO, true, &mut leaves);

    // Leaf chain covers the leaves in key order, once each.
    assert_eq!(state.first_leaf, leaves[0]);
    assert_eq!(state.last_leaf, *leaves.last().unwrap());

    let mut chained = Vec::new();
    let mut page_no = state.first_leaf;
    let mut prev = LEAF_SENTINEL_PAGE;
    while page_no != LEAF_SENTINEL_PAGE {
        let handle = index.buffer().fetch_page(PageId::new(index.file(), page_no)).unwrap();
        let mut guard = handle.write();
        let node = NodeView::from_buffer(&mut guard, index.schema());
        assert_eq!(node.prev_leaf(), prev);
        let next = node.next_leaf();
        drop(guard);
        index.buffer().unpin_page(handle.id(), false);

        chained.push(page_no);
        prev = page_no;
        page_no = next;
    }
    assert_eq!(chained, leaves);
}

/// Verify one subtree; returns its (min, max) keys and appends its leaves
/// in order.
fn walk(
    index: &IndexHandle,
    page_no: PageNo,
    expected_parent: PageNo,
    is_root: bool,
    leaves: &mut Vec<PageNo>,
) -> (Vec<u8>, Vec<u8>) {
    let schema = index.schema();
    let handle = index.buffer().fetch_page(PageId::new(index.file(), page_no)).unwrap();
    let mut guard = handle.write();
    let node = NodeView::from_buffer(&mut guard, schema);

    assert_eq!(node.parent(), expected_parent);
    if !is_root {
        assert!(node.size() >= schema.min_size(), "underflowed node");
    }
    assert!(node.size() < schema.order, "overflowed node");
    assert!(node.size() > 0, "empty non-root node");

    for i in 1..node.size() {
        assert!(
            super::compare_keys(node.key(i - 1), node.key(i), &schema.columns).is_lt(),
            "keys out of order"
        );
    }

    let is_leaf = node.is_leaf();
    let entries: Vec<(Vec<u8>, PageNo)> = (0..node.size())
        .map(|i| (node.key(i).to_vec(), node.value_at(i)))
        .collect();
    drop(guard);
    index.buffer().unpin_page(handle.id(), false);

    if is_leaf {
        leaves.push(page_no);
        return (
            entries.first().unwrap().0.clone(),
            entries.last().unwrap().0.clone(),
        );
    }

    let mut bounds = Vec::new();
    for (_, child) in &entries {
        bounds.push(walk(index, *child, page_no, false, leaves));
    }

    // Position-0 separators are only a lower bound (they may go stale when
    // a smaller key enters the leftmost subtree); from position 1 up each
    // separator splits the adjacent subtrees.
    for (i, (sep, _)) in entries.iter().enumerate().skip(1) {
        let (child_min, _) = &bounds[i];
        let (_, prev_max) = &bounds[i - 1];
        assert!(
            super::compare_keys(child_min, sep, &schema.columns).is_ge(),
            "subtree below its separator"
        );
        assert!(
            super::compare_keys(prev_max, sep, &schema.columns).is_lt(),
            "left subtree reaches past the separator"
        );
    }

    (bounds.first().unwrap().0.clone(), bounds.last().unwrap().1.clone())
}

#[test]
fn test_insert_and_get() {
    let (_tmp, buffer, index) = setup(4);

    for v in [5, 1, 9, 3, 7] {
        assert!(index.insert_entry(&key(v), rid(v)).unwrap());
    }

    for v in [1, 3, 5, 7, 9] {
        assert_eq!(index.get_value(&key(v)).unwrap(), Some(rid(v)));
    }
    assert_eq!(index.get_value(&key(4)).unwrap(), None);
    assert_eq!(buffer.total_pin_count(), 0);
    check_invariants(&index);
}

#[test]
fn test_duplicate_insert_is_rejected() {
    let (_tmp, _buffer, index) = setup(4);

    assert!(index.insert_entry(&key(1), rid(1)).unwrap());
    assert!(!index.insert_entry(&key(1), Rid::new(9, 9)).unwrap());
    assert_eq!(index.get_value(&key(1)).unwrap(), Some(rid(1)));
}

#[test]
fn test_empty_tree_behavior() {
    let (_tmp, _buffer, index) = setup(4);

    assert_eq!(index.get_value(&key(1)).unwrap(), None);
    assert!(!index.delete_entry(&key(1)).unwrap());
    assert_eq!(index.leaf_begin(), index.leaf_end().unwrap());
    assert!(index.scan(index.leaf_begin(), index.leaf_end().unwrap()).is_end());
    check_invariants(&index);
}

#[test]
fn test_split_shape_order_four() {
    let (_tmp, buffer, index) = setup(4);

    for v in 1..=7 {
        index.insert_entry(&key(v), rid(v)).unwrap();
    }

    let state = index.tree_state();
    let root_handle = buffer.fetch_page(PageId::new(index.file(), state.root_page)).unwrap();
    let mut guard = root_handle.write();
    let root = NodeView::from_buffer(&mut guard, index.schema());

    assert!(!root.is_leaf());
    assert_eq!(root.size(), 3);
    assert_eq!(root.key(0), key(1));
    assert_eq!(root.key(1), key(3));
    assert_eq!(root.key(2), key(5));
    let children: Vec<PageNo> = (0..3).map(|i| root.value_at(i)).collect();
    drop(guard);
    buffer.unpin_page(root_handle.id(), false);

    let mut sizes = Vec::new();
    for child in &children {
        let handle = buffer.fetch_page(PageId::new(index.file(), *child)).unwrap();
        let mut guard = handle.write();
        let node = NodeView::from_buffer(&mut guard, index.schema());
        assert!(node.is_leaf());
        sizes.push(node.size());
        drop(guard);
        buffer.unpin_page(handle.id(), false);
    }
    assert_eq!(sizes, vec![2, 2, 3]);

    // The leaf chain runs across the three children in order.
    assert_eq!(state.first_leaf, children[0]);
    assert_eq!(state.last_leaf, children[2]);
    check_invariants(&index);
    assert_eq!(buffer.total_pin_count(), 0);
}

#[test]
fn test_delete_first_key_rebalances() {
    let (_tmp, buffer, index) = setup(4);

    for v in 1..=7 {
        index.insert_entry(&key(v), rid(v)).unwrap();
    }

    assert!(index.delete_entry(&key(1)).unwrap());

    assert_eq!(index.get_value(&key(1)).unwrap(), None);
    for v in 2..=7 {
        assert_eq!(index.get_value(&key(v)).unwrap(), Some(rid(v)));
    }
    check_invariants(&index);

    // The root now separates the two remaining leaves at the first key of
    // the second one.
    let state = index.tree_state();
    let handle = buffer.fetch_page(PageId::new(index.file(), state.root_page)).unwrap();
    let mut guard = handle.write();
    let root = NodeView::from_buffer(&mut guard, index.schema());
    assert_eq!(root.size(), 2);
    assert_eq!(root.key(0), key(2));
    assert_eq!(root.key(1), key(5));
    drop(guard);
    buffer.unpin_page(handle.id(), false);
    assert_eq!(buffer.total_pin_count(), 0);
}

#[test]
fn test_delete_triggers_redistribute() {
    let (_tmp, _buffer, index) = setup(4);

    for v in 1..=7 {
        index.insert_entry(&key(v), rid(v)).unwrap();
    }
    // Grow the first leaf to three entries so its sibling can borrow.
    index.insert_entry(&key(0), rid(0)).unwrap();

    assert!(index.delete_entry(&key(4)).unwrap());

    assert_eq!(index.get_value(&key(4)).unwrap(), None);
    for v in [0, 1, 2, 3, 5, 6, 7] {
        assert_eq!(index.get_value(&key(v)).unwrap(), Some(rid(v)));
    }
    check_invariants(&index);
}

#[test]
fn test_insert_delete_all_random_order() {
    let (_tmp, buffer, index) = setup(4);

    // Deterministic shuffles of 0..50 via coprime strides.
    let inserts: Vec<i32> = (0..50).map(|i| (i * 7) % 50).collect();
    let deletes: Vec<i32> = (0..50).map(|i| (i * 13) % 50).collect();

    for v in &inserts {
        assert!(index.insert_entry(&key(*v), rid(*v)).unwrap());
    }
    check_invariants(&index);
    for v in 0..50 {
        assert_eq!(index.get_value(&key(v)).unwrap(), Some(rid(v)));
    }

    for (i, v) in deletes.iter().enumerate() {
        assert!(index.delete_entry(&key(*v)).unwrap(), "delete {}", v);
        if i % 10 == 0 {
            check_invariants(&index);
        }
    }

    let state = index.tree_state();
    assert_eq!(state.root_page, INVALID_PAGE_NO);
    assert_eq!(state.first_leaf, LEAF_SENTINEL_PAGE);
    assert_eq!(state.last_leaf, LEAF_SENTINEL_PAGE);
    assert_eq!(buffer.total_pin_count(), 0);
}

#[test]
fn test_ordered_scan_over_leaf_chain() {
    let (_tmp, _buffer, index) = setup(4);

    for v in (0..20).rev() {
        index.insert_entry(&key(v), rid(v)).unwrap();
    }

    let mut scan = index.scan(index.leaf_begin(), index.leaf_end().unwrap());
    let mut seen = Vec::new();
    while !scan.is_end() {
        seen.push(scan.rid().unwrap().slot_no as i32);
        scan.next().unwrap();
    }
    assert_eq!(seen, (0..20).collect::<Vec<_>>());
}

#[test]
fn test_range_cursor_bounds() {
    let (_tmp, _buffer, index) = setup(4);

    for v in (0..20).step_by(2) {
        index.insert_entry(&key(v as i32), rid(v as i32)).unwrap();
    }

    // Keys 4..=12: lower bound lands on 4, upper bound past 12.
    let begin = index.lower_bound(&key(4)).unwrap();
    let end = index.upper_bound(&key(12)).unwrap();
    let rids = index.scan(begin, end).collect_rids().unwrap();
    let found: Vec<i32> = rids.iter().map(|r| r.slot_no as i32).collect();
    assert_eq!(found, vec![4, 6, 8, 10, 12]);

    // Bounds between keys land on the next larger key.
    let begin = index.lower_bound(&key(5)).unwrap();
    let end = index.upper_bound(&key(11)).unwrap();
    let rids = index.scan(begin, end).collect_rids().unwrap();
    let found: Vec<i32> = rids.iter().map(|r| r.slot_no as i32).collect();
    assert_eq!(found, vec![6, 8, 10]);
}

#[test]
fn test_get_rid_past_end() {
    let (_tmp, _buffer, index) = setup(4);
    index.insert_entry(&key(1), rid(1)).unwrap();

    let end = index.leaf_end().unwrap();
    assert!(matches!(
        index.get_rid(end),
        Err(IndexError::IndexEntryNotFound)
    ));
}

#[test]
fn test_reopen_preserves_tree() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("test.idx");
    {
        let disk = Arc::new(DiskManager::new(temp_dir.path()).unwrap());
        let buffer = Arc::new(BufferManager::with_capacity(disk, 64));
        let index = IndexHandle::create(
            &buffer,
            &path,
            "test",
            vec![ColSpec {
                ty: ColType::Int,
                len: 4,
            }],
            Some(4),
        )
        .unwrap();
        for v in 0..10 {
            index.insert_entry(&key(v), rid(v)).unwrap();
        }
        index.close().unwrap();
    }

    let disk = Arc::new(DiskManager::new(temp_dir.path()).unwrap());
    let buffer = Arc::new(BufferManager::with_capacity(disk, 64));
    let index = IndexHandle::open(&buffer, &path, "test").unwrap();
    for v in 0..10 {
        assert_eq!(index.get_value(&key(v)).unwrap(), Some(rid(v)));
    }
    check_invariants(&index);

    // New nodes keep getting fresh page numbers after reopen.
    for v in 10..30 {
        index.insert_entry(&key(v), rid(v)).unwrap();
    }
    check_invariants(&index);
}

#[test]
fn test_composite_string_key() {
    let temp_dir = tempfile::tempdir().unwrap();
    let disk = Arc::new(DiskManager::new(temp_dir.path()).unwrap());
    let buffer = Arc::new(BufferManager::with_capacity(disk, 64));
    let index = IndexHandle::create(
        &buffer,
        temp_dir.path().join("str.idx"),
        "str",
        vec![
            ColSpec {
                ty: ColType::Str,
                len: 4,
            },
            ColSpec {
                ty: ColType::Int,
                len: 4,
            },
        ],
        Some(4),
    )
    .unwrap();

    let make = |s: &str, v: i32| {
        let mut k = [0u8; 8];
        k[..4].copy_from_slice(s.as_bytes());
        k[4..].copy_from_slice(&v.to_le_bytes());
        k
    };

    index.insert_entry(&make("bbbb", 1), Rid::new(1, 0)).unwrap();
    index.insert_entry(&make("aaaa", 2), Rid::new(1, 1)).unwrap();
    index.insert_entry(&make("aaaa", 1), Rid::new(1, 2)).unwrap();

    assert_eq!(
        index.get_value(&make("aaaa", 1)).unwrap(),
        Some(Rid::new(1, 2))
    );

    // Lexicographic order: (aaaa,1), (aaaa,2), (bbbb,1).
    let rids = index
        .scan(index.leaf_begin(), index.leaf_end().unwrap())
        .collect_rids()
        .unwrap();
    assert_eq!(rids, vec![Rid::new(1, 2), Rid::new(1, 1), Rid::new(1, 0)]);
}
