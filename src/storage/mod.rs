//! Storage Module
//!
//! Byte-oriented storage abstraction consumed by the table and manifest code.
//!
//! ## Responsibilities
//! - Name files by kind and number (`FileDesc`)
//! - Create, open, remove, rename and list named files
//! - Positional, thread-safe reads for table readers
//!
//! ## File Naming
//! ```text
//! {dir}/
//!   ├── MANIFEST-000001   (session records)
//!   ├── 000002.log        (journal)
//!   ├── 000003.ldb        (table; "000003.sst" is also recognised)
//!   └── 000004.tmp        (temporary)
//! ```
//!
//! Two implementations are provided: [`FileStorage`] backed by a directory
//! and [`MemStorage`] kept entirely in process memory.

mod file;
mod mem;

use std::fmt;
use std::io::{self, Write};

use bytes::Bytes;

use crate::error::Result;

pub use file::FileStorage;
pub use mem::MemStorage;

// =============================================================================
// File Descriptors
// =============================================================================

/// Kind of a storage file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileType {
    Manifest,
    Journal,
    Table,
    Temp,
}

/// Identifies one file in a [`Storage`]: its kind plus a file number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileDesc {
    pub kind: FileType,
    pub num: u64,
}

impl FileDesc {
    pub fn new(kind: FileType, num: u64) -> Self {
        Self { kind, num }
    }

    pub fn table(num: u64) -> Self {
        Self::new(FileType::Table, num)
    }

    pub fn manifest(num: u64) -> Self {
        Self::new(FileType::Manifest, num)
    }

    pub fn journal(num: u64) -> Self {
        Self::new(FileType::Journal, num)
    }

    /// Parse a file name produced by `Display`.
    /// "000042.ldb" → Some(Table 42), unknown names → None
    pub fn parse(name: &str) -> Option<Self> {
        if let Some(num) = name.strip_prefix("MANIFEST-") {
            return num.parse().ok().map(Self::manifest);
        }
        let (num, ext) = name.split_once('.')?;
        let num: u64 = num.parse().ok()?;
        let kind = match ext {
            "log" => FileType::Journal,
            "ldb" | "sst" => FileType::Table,
            "tmp" => FileType::Temp,
            _ => return None,
        };
        Some(Self::new(kind, num))
    }
}

impl fmt::Display for FileDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FileType::Manifest => write!(f, "MANIFEST-{:06}", self.num),
            FileType::Journal => write!(f, "{:06}.log", self.num),
            FileType::Table => write!(f, "{:06}.ldb", self.num),
            FileType::Temp => write!(f, "{:06}.tmp", self.num),
        }
    }
}

// =============================================================================
// Storage Traits
// =============================================================================

/// Positional reader over an immutable file.
///
/// Implementations must be safe to share across threads: table readers hand
/// the same handle to every iterator they create.
pub trait StorageReader: Send + Sync {
    /// Fill `buf` with the bytes starting at `offset`. Reading past the end
    /// of the file is an `UnexpectedEof` I/O error.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()>;

    /// Size of the file in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sequential writer for a newly created file.
pub trait StorageWriter: Write + Send {
    /// Flush buffered bytes and make them durable.
    fn sync(&mut self) -> Result<()>;
}

/// Named-file storage used by the engine's collaborators.
pub trait Storage: Send + Sync {
    /// Open an existing file for positional reads.
    fn open(&self, fd: FileDesc) -> Result<std::sync::Arc<dyn StorageReader>>;

    /// Create (or truncate) a file for writing.
    fn create(&self, fd: FileDesc) -> Result<Box<dyn StorageWriter>>;

    /// Remove a file.
    fn remove(&self, fd: FileDesc) -> Result<()>;

    /// Rename a file, replacing the target if it exists.
    fn rename(&self, old: FileDesc, new: FileDesc) -> Result<()>;

    /// List files of the given kinds, sorted by kind then number.
    fn list(&self, kinds: &[FileType]) -> Result<Vec<FileDesc>>;
}

// =============================================================================
// In-memory Readers
// =============================================================================

fn read_slice_at(data: &[u8], buf: &mut [u8], offset: u64) -> Result<()> {
    let start = usize::try_from(offset).unwrap_or(usize::MAX);
    match start.checked_add(buf.len()) {
        Some(end) if end <= data.len() => {
            buf.copy_from_slice(&data[start..end]);
            Ok(())
        }
        _ => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "read of {} bytes at offset {} past end of {} byte file",
                buf.len(),
                offset,
                data.len()
            ),
        )
        .into()),
    }
}

impl StorageReader for Vec<u8> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        read_slice_at(self, buf, offset)
    }

    fn len(&self) -> u64 {
        Vec::len(self) as u64
    }
}

impl StorageReader for Bytes {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        read_slice_at(self, buf, offset)
    }

    fn len(&self) -> u64 {
        Bytes::len(self) as u64
    }
}
