//! Directory-backed storage
//!
//! Every `FileDesc` maps to one file inside the storage directory.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

use super::{FileDesc, FileType, Storage, StorageReader, StorageWriter};

/// Storage rooted at a directory on the local file system.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open or create storage in the given directory.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        tracing::debug!(dir = %dir.display(), "opened file storage");
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of the file named by `fd`.
    pub fn path_of(&self, fd: FileDesc) -> PathBuf {
        self.dir.join(fd.to_string())
    }
}

impl Storage for FileStorage {
    fn open(&self, fd: FileDesc) -> Result<Arc<dyn StorageReader>> {
        let file = File::open(self.path_of(fd))?;
        let len = file.metadata()?.len();
        Ok(Arc::new(FileReader {
            file: Mutex::new(file),
            len,
        }))
    }

    fn create(&self, fd: FileDesc) -> Result<Box<dyn StorageWriter>> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.path_of(fd))?;
        tracing::debug!(file = %fd, "created file");
        Ok(Box::new(FileWriter {
            writer: BufWriter::new(file),
        }))
    }

    fn remove(&self, fd: FileDesc) -> Result<()> {
        fs::remove_file(self.path_of(fd))?;
        tracing::debug!(file = %fd, "removed file");
        Ok(())
    }

    fn rename(&self, old: FileDesc, new: FileDesc) -> Result<()> {
        fs::rename(self.path_of(old), self.path_of(new))?;
        tracing::debug!(from = %old, to = %new, "renamed file");
        Ok(())
    }

    fn list(&self, kinds: &[FileType]) -> Result<Vec<FileDesc>> {
        let mut fds = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if let Some(fd) = FileDesc::parse(&name.to_string_lossy()) {
                if kinds.contains(&fd.kind) {
                    fds.push(fd);
                }
            }
        }
        fds.sort();
        Ok(fds)
    }
}

// =============================================================================
// Handles
// =============================================================================

/// Shared read handle; the mutex serialises seek + read pairs.
struct FileReader {
    file: Mutex<File>,
    len: u64,
}

impl StorageReader for FileReader {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn len(&self) -> u64 {
        self.len
    }
}

struct FileWriter {
    writer: BufWriter<File>,
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl StorageWriter for FileWriter {
    fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}
