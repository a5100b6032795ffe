use super::error::RecordResult;
use super::file_handle::RecordFile;
use super::page::HeapPage;
use super::Rid;
use crate::file::{PageId, PageNo};

/// Forward cursor over a record file, yielding records in (page, slot)
/// order. The page count is snapshotted at creation; pages appended by
/// concurrent inserts are not visited.
pub struct RecordScan<'a> {
    table: &'a RecordFile,
    num_pages: u32,
    page_no: PageNo,
    slot_no: usize,
    done: bool,
}

impl<'a> RecordScan<'a> {
    pub(crate) fn new(table: &'a RecordFile) -> Self {
        Self {
            table,
            num_pages: table.num_pages(),
            page_no: 1,
            slot_no: 0,
            done: false,
        }
    }
}

impl Iterator for RecordScan<'_> {
    type Item = RecordResult<(Rid, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let buffer = self.table.buffer();
        let layout = self.table.layout();

        while self.page_no <= self.num_pages {
            let id = PageId::new(self.table.file(), self.page_no);
            let handle = match buffer.fetch_page(id) {
                Ok(handle) => handle,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err.into()));
                }
            };

            let mut guard = handle.write();
            let page = HeapPage::from_buffer(&mut guard, layout);
            let found = page.next_used_slot(self.slot_no);
            let record = found.map(|slot| page.record(slot).to_vec());
            drop(guard);
            buffer.unpin_page(id, false);

            if let (Some(slot), Some(data)) = (found, record) {
                let rid = Rid::new(self.page_no, slot as u32);
                self.slot_no = slot + 1;
                return Some(Ok((rid, data)));
            }

            self.page_no += 1;
            self.slot_no = 0;
        }

        self.done = true;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{BufferManager, DiskManager};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn setup() -> (TempDir, RecordFile) {
        let temp_dir = tempfile::tempdir().unwrap();
        let disk = Arc::new(DiskManager::new(temp_dir.path()).unwrap());
        let buffer = Arc::new(BufferManager::with_capacity(disk, 16));
        let table = RecordFile::create_with_capacity(
            &buffer,
            temp_dir.path().join("test.tbl"),
            "test",
            8,
            4,
        )
        .unwrap();
        (temp_dir, table)
    }

    #[test]
    fn test_scan_empty() {
        let (_temp_dir, table) = setup();
        assert_eq!(table.scan(None).unwrap().count(), 0);
    }

    #[test]
    fn test_scan_skips_holes_and_crosses_pages() {
        let (_temp_dir, table) = setup();

        let mut rids = Vec::new();
        for i in 0..6u8 {
            let data = [b'a' + i; 8];
            rids.push(table.insert_record(None, &data).unwrap());
        }
        table.delete_record(None, rids[1]).unwrap();
        table.delete_record(None, rids[4]).unwrap();

        let seen: Vec<(Rid, Vec<u8>)> = table
            .scan(None)
            .unwrap()
            .collect::<RecordResult<_>>()
            .unwrap();

        let expected: Vec<Rid> = vec![rids[0], rids[2], rids[3], rids[5]];
        assert_eq!(seen.iter().map(|(r, _)| *r).collect::<Vec<_>>(), expected);
        assert_eq!(seen[1].1, vec![b'c'; 8]);
    }

    #[test]
    fn test_scan_leaves_no_pins() {
        let (_temp_dir, table) = setup();
        for _ in 0..9 {
            table.insert_record(None, b"XXXXXXXX").unwrap();
        }
        let count = table.scan(None).unwrap().count();
        assert_eq!(count, 9);
        assert_eq!(table.buffer().total_pin_count(), 0);
    }
}
