//! Byte-store capability the writer depends on: open-or-create a named store,
//! seek, truncate, and report the device quota.

use directories::BaseDirs;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// An open, exclusively owned handle on one named store.
pub trait StorageHandle: Read + Write + Seek + Send {
    fn len(&self) -> io::Result<u64>;
    fn set_len(&mut self, len: u64) -> io::Result<()>;
}

pub trait Storage: Send + Sync {
    /// Open `name` for reading and writing, creating it if missing.
    fn open(&self, name: &str) -> io::Result<Box<dyn StorageHandle>>;
    /// Open `name` for shared reading. Fails if it does not exist.
    fn open_read(&self, name: &str) -> io::Result<Box<dyn Read + Send>>;
    /// Total capacity available to this store, in bytes.
    fn quota(&self) -> io::Result<u64>;
}

impl StorageHandle for File {
    fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

/// Where `FsStorage` takes its quota from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    /// Total capacity of the device holding the root directory.
    Device,
    Fixed(u64),
}

/// Stores named files under a root directory.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
    quota: Quota,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            quota: Quota::Device,
        }
    }

    pub fn with_quota(mut self, quota: Quota) -> Self {
        self.quota = quota;
        self
    }

    /// Per-user store for the running executable.
    /// Linux: ~/.local/share/<exe>
    /// macOS: ~/Library/Application Support/<exe>
    /// Windows: %LOCALAPPDATA%\\<exe>
    pub fn for_application() -> Self {
        Self::new(application_store_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl Storage for FsStorage {
    fn open(&self, name: &str) -> io::Result<Box<dyn StorageHandle>> {
        let path = self.path_of(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        Ok(Box::new(file))
    }

    fn open_read(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(self.path_of(name))?))
    }

    fn quota(&self) -> io::Result<u64> {
        match self.quota {
            Quota::Fixed(bytes) => Ok(bytes),
            Quota::Device => {
                // Ask about the nearest existing ancestor; the root may not exist yet.
                let mut dir: &Path = &self.root;
                while !dir.exists() {
                    match dir.parent() {
                        Some(parent) if !parent.as_os_str().is_empty() => dir = parent,
                        _ => {
                            dir = Path::new(".");
                            break;
                        }
                    }
                }
                fs2::total_space(dir)
            }
        }
    }
}

fn application_store_dir() -> PathBuf {
    let app = std::env::current_exe()
        .ok()
        .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| String::from("boundlog"));
    if let Some(base) = BaseDirs::new() {
        return base.data_local_dir().join(app);
    }
    // Fallback: current working directory
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

#[derive(Debug, Default)]
struct MemoryState {
    files: HashMap<String, Vec<u8>>,
    quota: u64,
}

/// In-memory store with a settable quota.
///
/// Clones share the same contents. Open calls are counted and failures can be
/// injected, which is what tests use to observe the writer.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemoryState>>,
    opens: Arc<AtomicUsize>,
    fail_open: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::with_quota(u64::MAX)
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                files: HashMap::new(),
                quota,
            })),
            opens: Arc::new(AtomicUsize::new(0)),
            fail_open: Arc::new(AtomicBool::new(false)),
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_quota(&self, quota: u64) {
        self.lock().quota = quota;
    }

    /// Number of read/write opens attempted so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.lock().files.get(name).cloned()
    }

    pub fn insert(&self, name: &str, bytes: impl Into<Vec<u8>>) {
        self.lock().files.insert(name.to_string(), bytes.into());
    }
}

impl Storage for MemoryStorage {
    fn open(&self, name: &str) -> io::Result<Box<dyn StorageHandle>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "store unavailable",
            ));
        }
        self.lock().files.entry(name.to_string()).or_default();
        Ok(Box::new(MemoryHandle {
            storage: self.clone(),
            name: name.to_string(),
            pos: 0,
        }))
    }

    fn open_read(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        match self.contents(name) {
            Some(bytes) => Ok(Box::new(Cursor::new(bytes))),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such store: {}", name),
            )),
        }
    }

    fn quota(&self) -> io::Result<u64> {
        Ok(self.lock().quota)
    }
}

struct MemoryHandle {
    storage: MemoryStorage,
    name: String,
    pos: u64,
}

impl MemoryHandle {
    fn check_writable(&self) -> io::Result<()> {
        if self.storage.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
        }
        Ok(())
    }
}

impl Read for MemoryHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let state = self.storage.lock();
        let data = state.files.get(&self.name).map(Vec::as_slice).unwrap_or(&[]);
        let start = (self.pos as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for MemoryHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_writable()?;
        let mut state = self.storage.lock();
        let data = state.files.entry(self.name.clone()).or_default();
        let start = self.pos as usize;
        if data.len() < start {
            data.resize(start, 0);
        }
        let overlap = buf.len().min(data.len() - start);
        data[start..start + overlap].copy_from_slice(&buf[..overlap]);
        data.extend_from_slice(&buf[overlap..]);
        self.pos += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = StorageHandle::len(self)? as i64;
        let target = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(off) => len + off,
            SeekFrom::Current(off) => self.pos as i64 + off,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of store",
            ));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }
}

impl StorageHandle for MemoryHandle {
    fn len(&self) -> io::Result<u64> {
        let state = self.storage.lock();
        Ok(state.files.get(&self.name).map_or(0, |d| d.len() as u64))
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.check_writable()?;
        let mut state = self.storage.lock();
        state
            .files
            .entry(self.name.clone())
            .or_default()
            .resize(len as usize, 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_handle_reads_writes_and_truncates() {
        let storage = MemoryStorage::new();
        let mut h = storage.open("a.log").unwrap();
        h.write_all(b"hello world").unwrap();
        assert_eq!(h.len().unwrap(), 11);

        h.seek(SeekFrom::Start(6)).unwrap();
        let mut tail = String::new();
        h.read_to_string(&mut tail).unwrap();
        assert_eq!(tail, "world");

        h.set_len(5).unwrap();
        h.seek(SeekFrom::End(0)).unwrap();
        h.write_all(b"!").unwrap();
        assert_eq!(storage.contents("a.log").unwrap(), b"hello!");
        assert_eq!(storage.open_count(), 1);
    }

    #[test]
    fn memory_open_read_requires_existing_store() {
        let storage = MemoryStorage::new();
        assert!(storage.open_read("missing.log").is_err());
        storage.insert("present.log", "x");
        let mut s = String::new();
        storage
            .open_read("present.log")
            .unwrap()
            .read_to_string(&mut s)
            .unwrap();
        assert_eq!(s, "x");
    }

    #[test]
    fn fs_storage_creates_root_and_reports_fixed_quota() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path().join("nested")).with_quota(Quota::Fixed(1234));
        let mut h = storage.open("app.log").unwrap();
        h.write_all(b"abc").unwrap();
        assert_eq!(h.len().unwrap(), 3);
        assert_eq!(storage.quota().unwrap(), 1234);
        assert!(storage.path_of("app.log").exists());
    }

    #[test]
    fn fs_storage_device_quota_is_positive() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path().join("not").join("yet"));
        assert!(storage.quota().unwrap() > 0);
    }
}
