//! In-memory storage
//!
//! Files live in a shared map; writers append straight into the stored
//! buffer, readers take a snapshot of the contents at open time.

use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::Result;

use super::{FileDesc, FileType, Storage, StorageReader, StorageWriter};

type SharedFile = Arc<Mutex<Vec<u8>>>;

/// Storage kept entirely in process memory. Clones share the same files.
#[derive(Debug, Clone, Default)]
pub struct MemStorage {
    files: Arc<Mutex<HashMap<FileDesc, SharedFile>>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn not_found(fd: FileDesc) -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, format!("{} does not exist", fd))
    }
}

impl Storage for MemStorage {
    fn open(&self, fd: FileDesc) -> Result<Arc<dyn StorageReader>> {
        let file = self
            .files
            .lock()
            .get(&fd)
            .cloned()
            .ok_or_else(|| Self::not_found(fd))?;
        let snapshot = Bytes::copy_from_slice(&file.lock());
        Ok(Arc::new(snapshot))
    }

    fn create(&self, fd: FileDesc) -> Result<Box<dyn StorageWriter>> {
        let file: SharedFile = Arc::default();
        self.files.lock().insert(fd, file.clone());
        Ok(Box::new(MemWriter { file }))
    }

    fn remove(&self, fd: FileDesc) -> Result<()> {
        self.files
            .lock()
            .remove(&fd)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(fd).into())
    }

    fn rename(&self, old: FileDesc, new: FileDesc) -> Result<()> {
        let mut files = self.files.lock();
        let file = files.remove(&old).ok_or_else(|| Self::not_found(old))?;
        files.insert(new, file);
        Ok(())
    }

    fn list(&self, kinds: &[FileType]) -> Result<Vec<FileDesc>> {
        let mut fds: Vec<FileDesc> = self
            .files
            .lock()
            .keys()
            .filter(|fd| kinds.contains(&fd.kind))
            .copied()
            .collect();
        fds.sort();
        Ok(fds)
    }
}

struct MemWriter {
    file: SharedFile,
}

impl Write for MemWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl StorageWriter for MemWriter {
    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}
