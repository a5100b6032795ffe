use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use super::error::{FileError, FileResult};
use super::{PageNo, PAGE_SIZE};

/// Name of the append-only log stream inside the database directory
const LOG_FILE_NAME: &str = "db.log";

/// Handle to an open file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(usize);

impl FileHandle {
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

struct FileEntry {
    file: Arc<File>,
    path: PathBuf,
    /// Next page number to hand out for this file; never recycled
    next_page_no: Arc<AtomicU32>,
}

#[derive(Default)]
struct FileTable {
    open_files: HashMap<FileHandle, FileEntry>,
    path_to_handle: HashMap<PathBuf, FileHandle>,
    next_handle: usize,
}

/// Page-granular file I/O, open-file bookkeeping and per-file page
/// allocation. Page reads and writes are positioned and unsynchronized at
/// this layer; the buffer pool guarantees a single in-memory copy per page.
pub struct DiskManager {
    root: PathBuf,
    files: Mutex<FileTable>,
    log_file: Mutex<Option<File>>,
}

impl DiskManager {
    /// Create a disk manager rooted at the given database directory.
    /// The directory is created if it does not exist.
    pub fn new<P: AsRef<Path>>(root: P) -> FileResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;

        Ok(Self {
            root,
            files: Mutex::new(FileTable::default()),
            log_file: Mutex::new(None),
        })
    }

    /// Root directory this manager works under
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check if a path names a regular file
    pub fn is_file<P: AsRef<Path>>(&self, path: P) -> bool {
        path.as_ref().is_file()
    }

    /// Check if a path names a directory
    pub fn is_dir<P: AsRef<Path>>(&self, path: P) -> bool {
        path.as_ref().is_dir()
    }

    /// Create a new empty file
    pub fn create_file<P: AsRef<Path>>(&self, path: P) -> FileResult<()> {
        let path = path.as_ref();

        if path.exists() {
            return Err(FileError::FileAlreadyExists(path.display().to_string()));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        File::create(path)?;
        Ok(())
    }

    /// Open an existing file; opening an already-open path returns the
    /// existing handle
    pub fn open_file<P: AsRef<Path>>(&self, path: P) -> FileResult<FileHandle> {
        let path_ref = path.as_ref();
        let path = path_ref
            .canonicalize()
            .map_err(|_| FileError::FileNotFound(path_ref.display().to_string()))?;

        let mut table = self.files.lock().unwrap();

        if let Some(&handle) = table.path_to_handle.get(&path) {
            return Ok(handle);
        }

        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let handle = FileHandle(table.next_handle);
        table.next_handle += 1;

        table.open_files.insert(
            handle,
            FileEntry {
                file: Arc::new(file),
                path: path.clone(),
                next_page_no: Arc::new(AtomicU32::new(0)),
            },
        );
        table.path_to_handle.insert(path, handle);

        Ok(handle)
    }

    /// Close an open file
    pub fn close_file(&self, handle: FileHandle) -> FileResult<()> {
        let mut table = self.files.lock().unwrap();
        let entry = table
            .open_files
            .remove(&handle)
            .ok_or(FileError::InvalidHandle(handle.0))?;
        table.path_to_handle.remove(&entry.path);
        Ok(())
    }

    /// Delete a file from disk. The file must not be open.
    pub fn destroy_file<P: AsRef<Path>>(&self, path: P) -> FileResult<()> {
        let path_ref = path.as_ref();

        if let Ok(canonical) = path_ref.canonicalize() {
            let table = self.files.lock().unwrap();
            if table.path_to_handle.contains_key(&canonical) {
                return Err(FileError::FileStillOpen(path_ref.display().to_string()));
            }
        }

        if !path_ref.is_file() {
            return Err(FileError::FileNotFound(path_ref.display().to_string()));
        }

        std::fs::remove_file(path_ref)?;
        Ok(())
    }

    /// Read one page into the buffer. A read past the current end of file
    /// yields zeroes for the missing tail.
    pub fn read_page(&self, handle: FileHandle, page_no: PageNo, buf: &mut [u8]) -> FileResult<()> {
        if buf.len() != PAGE_SIZE {
            return Err(FileError::InvalidPageSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let file = self.shared_file(handle)?;
        let offset = page_no as u64 * PAGE_SIZE as u64;

        let mut read = 0;
        while read < buf.len() {
            let n = file.read_at(&mut buf[read..], offset + read as u64)?;
            if n == 0 {
                break;
            }
            read += n;
        }
        buf[read..].fill(0);

        Ok(())
    }

    /// Write one page at its position, extending the file if needed
    pub fn write_page(&self, handle: FileHandle, page_no: PageNo, buf: &[u8]) -> FileResult<()> {
        if buf.len() != PAGE_SIZE {
            return Err(FileError::InvalidPageSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let file = self.shared_file(handle)?;
        let offset = page_no as u64 * PAGE_SIZE as u64;
        file.write_all_at(buf, offset)?;

        Ok(())
    }

    /// Hand out the next page number for this file. Page numbers increase
    /// monotonically over the life of the file and are never reused.
    pub fn allocate_page(&self, handle: FileHandle) -> FileResult<PageNo> {
        let counter = self.page_allocator(handle)?;
        Ok(counter.fetch_add(1, Ordering::SeqCst))
    }

    /// Page deallocation is not performed; numbers are never recycled.
    pub fn deallocate_page(&self, _handle: FileHandle, _page_no: PageNo) {}

    /// Current value of the page allocator for this file
    pub fn page_counter(&self, handle: FileHandle) -> FileResult<PageNo> {
        let counter = self.page_allocator(handle)?;
        Ok(counter.load(Ordering::SeqCst))
    }

    /// Re-seed the page allocator, typically from a file header after open
    pub fn set_page_counter(&self, handle: FileHandle, page_no: PageNo) -> FileResult<()> {
        let counter = self.page_allocator(handle)?;
        counter.store(page_no, Ordering::SeqCst);
        Ok(())
    }

    /// Append bytes to the log stream
    pub fn write_log(&self, data: &[u8]) -> FileResult<()> {
        use std::io::Write;

        let mut log = self.log_file.lock().unwrap();
        if log.is_none() {
            *log = Some(
                OpenOptions::new()
                    .create(true)
                    .read(true)
                    .append(true)
                    .open(self.root.join(LOG_FILE_NAME))?,
            );
        }
        log.as_mut().unwrap().write_all(data)?;
        Ok(())
    }

    /// Read log bytes from an absolute offset; returns the number of bytes
    /// read, 0 at end of stream
    pub fn read_log(&self, buf: &mut [u8], offset: u64) -> FileResult<usize> {
        let mut log = self.log_file.lock().unwrap();
        if log.is_none() {
            let path = self.root.join(LOG_FILE_NAME);
            if !path.is_file() {
                return Ok(0);
            }
            *log = Some(OpenOptions::new().create(true).read(true).append(true).open(path)?);
        }
        let n = log.as_ref().unwrap().read_at(buf, offset)?;
        Ok(n)
    }

    /// Flush the log stream to stable storage
    pub fn sync_log(&self) -> FileResult<()> {
        let log = self.log_file.lock().unwrap();
        if let Some(file) = log.as_ref() {
            file.sync_data()?;
        }
        Ok(())
    }

    /// Sync a file's data to disk
    pub fn sync_file(&self, handle: FileHandle) -> FileResult<()> {
        let file = self.shared_file(handle)?;
        file.sync_data()?;
        Ok(())
    }

    /// Check if a handle refers to an open file
    pub fn is_open(&self, handle: FileHandle) -> bool {
        self.files.lock().unwrap().open_files.contains_key(&handle)
    }

    fn shared_file(&self, handle: FileHandle) -> FileResult<Arc<File>> {
        let table = self.files.lock().unwrap();
        let entry = table
            .open_files
            .get(&handle)
            .ok_or(FileError::InvalidHandle(handle.0))?;
        Ok(Arc::clone(&entry.file))
    }

    fn page_allocator(&self, handle: FileHandle) -> FileResult<Arc<AtomicU32>> {
        let table = self.files.lock().unwrap();
        let entry = table
            .open_files
            .get(&handle)
            .ok_or(FileError::InvalidHandle(handle.0))?;
        Ok(Arc::clone(&entry.next_page_no))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, DiskManager) {
        let temp_dir = tempfile::tempdir().unwrap();
        let dm = DiskManager::new(temp_dir.path()).unwrap();
        (temp_dir, dm)
    }

    #[test]
    fn test_create_file() {
        let (temp_dir, dm) = setup();
        let path = temp_dir.path().join("test.tbl");

        assert!(dm.create_file(&path).is_ok());
        assert!(dm.is_file(&path));
    }

    #[test]
    fn test_create_file_already_exists() {
        let (temp_dir, dm) = setup();
        let path = temp_dir.path().join("test.tbl");

        dm.create_file(&path).unwrap();
        let result = dm.create_file(&path);
        assert!(matches!(result, Err(FileError::FileAlreadyExists(_))));
    }

    #[test]
    fn test_open_nonexistent_file() {
        let (temp_dir, dm) = setup();
        let path = temp_dir.path().join("missing.tbl");

        let result = dm.open_file(&path);
        assert!(matches!(result, Err(FileError::FileNotFound(_))));
    }

    #[test]
    fn test_open_same_file_twice() {
        let (temp_dir, dm) = setup();
        let path = temp_dir.path().join("test.tbl");

        dm.create_file(&path).unwrap();
        let h1 = dm.open_file(&path).unwrap();
        let h2 = dm.open_file(&path).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_close_file() {
        let (temp_dir, dm) = setup();
        let path = temp_dir.path().join("test.tbl");

        dm.create_file(&path).unwrap();
        let handle = dm.open_file(&path).unwrap();
        assert!(dm.is_open(handle));

        dm.close_file(handle).unwrap();
        assert!(!dm.is_open(handle));
        assert!(matches!(
            dm.close_file(handle),
            Err(FileError::InvalidHandle(_))
        ));
    }

    #[test]
    fn test_destroy_open_file_rejected() {
        let (temp_dir, dm) = setup();
        let path = temp_dir.path().join("test.tbl");

        dm.create_file(&path).unwrap();
        let handle = dm.open_file(&path).unwrap();

        let result = dm.destroy_file(&path);
        assert!(matches!(result, Err(FileError::FileStillOpen(_))));

        dm.close_file(handle).unwrap();
        dm.destroy_file(&path).unwrap();
        assert!(!dm.is_file(&path));
    }

    #[test]
    fn test_read_write_page() {
        let (temp_dir, dm) = setup();
        let path = temp_dir.path().join("test.tbl");

        dm.create_file(&path).unwrap();
        let handle = dm.open_file(&path).unwrap();

        let mut page = vec![0u8; PAGE_SIZE];
        page[0] = 42;
        page[PAGE_SIZE - 1] = 255;
        dm.write_page(handle, 3, &page).unwrap();

        let mut read = vec![0u8; PAGE_SIZE];
        dm.read_page(handle, 3, &mut read).unwrap();
        assert_eq!(read, page);
    }

    #[test]
    fn test_read_past_end_is_zeroed() {
        let (temp_dir, dm) = setup();
        let path = temp_dir.path().join("test.tbl");

        dm.create_file(&path).unwrap();
        let handle = dm.open_file(&path).unwrap();

        let mut buf = vec![7u8; PAGE_SIZE];
        dm.read_page(handle, 9, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_invalid_buffer_size() {
        let (temp_dir, dm) = setup();
        let path = temp_dir.path().join("test.tbl");

        dm.create_file(&path).unwrap();
        let handle = dm.open_file(&path).unwrap();

        let mut small = vec![0u8; PAGE_SIZE - 1];
        assert!(matches!(
            dm.read_page(handle, 0, &mut small),
            Err(FileError::InvalidPageSize { .. })
        ));
    }

    #[test]
    fn test_allocate_page_monotonic() {
        let (temp_dir, dm) = setup();
        let path = temp_dir.path().join("test.tbl");

        dm.create_file(&path).unwrap();
        let handle = dm.open_file(&path).unwrap();

        assert_eq!(dm.allocate_page(handle).unwrap(), 0);
        assert_eq!(dm.allocate_page(handle).unwrap(), 1);
        assert_eq!(dm.allocate_page(handle).unwrap(), 2);

        dm.set_page_counter(handle, 10).unwrap();
        assert_eq!(dm.allocate_page(handle).unwrap(), 10);
        assert_eq!(dm.page_counter(handle).unwrap(), 11);
    }

    #[test]
    fn test_log_append_and_read() {
        let (_temp_dir, dm) = setup();

        dm.write_log(b"hello ").unwrap();
        dm.write_log(b"world").unwrap();

        let mut buf = [0u8; 64];
        let n = dm.read_log(&mut buf, 0).unwrap();
        assert_eq!(&buf[..n], b"hello world");

        let n = dm.read_log(&mut buf, 6).unwrap();
        assert_eq!(&buf[..n], b"world");

        let n = dm.read_log(&mut buf, 100).unwrap();
        assert_eq!(n, 0);
    }
}
