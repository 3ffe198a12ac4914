//! Session Record Codec
//!
//! ## Wire Format
//! A record is a sequence of tagged fields, each introduced by a varint tag:
//! ```text
//! ┌─────┬───────────────────────┬──────────────────────────────────────────┐
//! │ tag │ field                 │ payload                                  │
//! ├─────┼───────────────────────┼──────────────────────────────────────────┤
//! │  1  │ comparer              │ bytes                                    │
//! │  2  │ journal num           │ varint                                   │
//! │  3  │ next file num         │ varint                                   │
//! │  4  │ seq num               │ varint                                   │
//! │  5  │ compaction pointer    │ varint level, bytes ikey                 │
//! │  6  │ deleted table         │ varint level, varint num                 │
//! │  7  │ added table           │ level, num, size, bytes min, bytes max   │
//! │  9  │ previous journal num  │ varint                                   │
//! └─────┴───────────────────────┴──────────────────────────────────────────┘
//! ```
//! `bytes` is a varint length followed by the raw bytes. Tag 8 is retired.

use crate::error::{LarchError, Result};
use crate::key::InternalKey;
use crate::storage::FileDesc;
use crate::util::coding::{get_uvarint, put_bytes, put_uvarint, MAX_VARINT_LEN64};

/// Tagged fields of a session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordField {
    Comparer = 1,
    JournalNum = 2,
    NextFileNum = 3,
    SeqNum = 4,
    CompactionPointer = 5,
    DeletedTable = 6,
    AddedTable = 7,
    PrevJournalNum = 9,
}

impl RecordField {
    fn from_tag(tag: u64) -> Option<Self> {
        Some(match tag {
            1 => RecordField::Comparer,
            2 => RecordField::JournalNum,
            3 => RecordField::NextFileNum,
            4 => RecordField::SeqNum,
            5 => RecordField::CompactionPointer,
            6 => RecordField::DeletedTable,
            7 => RecordField::AddedTable,
            9 => RecordField::PrevJournalNum,
            _ => return None,
        })
    }

    fn bit(self) -> u32 {
        1 << self as u8
    }
}

/// Key at which the next compaction of `level` starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionPointer {
    pub level: usize,
    pub ikey: InternalKey,
}

/// A table added to `level`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedTable {
    pub level: usize,
    pub num: u64,
    pub size: u64,
    pub smallest: InternalKey,
    pub largest: InternalKey,
}

/// A table removed from `level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletedTable {
    pub level: usize,
    pub num: u64,
}

/// One version edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRecord {
    has: u32,

    comparer: String,
    journal_num: u64,
    prev_journal_num: u64,
    next_file_num: u64,
    seq_num: u64,

    compaction_pointers: Vec<CompactionPointer>,
    added_tables: Vec<AddedTable>,
    deleted_tables: Vec<DeletedTable>,
}

impl SessionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `field` is present.
    pub fn has(&self, field: RecordField) -> bool {
        self.has & field.bit() != 0
    }

    fn mark(&mut self, field: RecordField) {
        self.has |= field.bit();
    }

    fn unmark(&mut self, field: RecordField) {
        self.has &= !field.bit();
    }

    // -------------------------------------------------------------------------
    // Setters
    // -------------------------------------------------------------------------

    pub fn set_comparer(&mut self, name: impl Into<String>) {
        self.mark(RecordField::Comparer);
        self.comparer = name.into();
    }

    pub fn set_journal_num(&mut self, num: u64) {
        self.mark(RecordField::JournalNum);
        self.journal_num = num;
    }

    pub fn set_prev_journal_num(&mut self, num: u64) {
        self.mark(RecordField::PrevJournalNum);
        self.prev_journal_num = num;
    }

    pub fn set_next_file_num(&mut self, num: u64) {
        self.mark(RecordField::NextFileNum);
        self.next_file_num = num;
    }

    pub fn set_seq_num(&mut self, seq: u64) {
        self.mark(RecordField::SeqNum);
        self.seq_num = seq;
    }

    pub fn add_compaction_pointer(&mut self, level: usize, ikey: InternalKey) {
        self.mark(RecordField::CompactionPointer);
        self.compaction_pointers.push(CompactionPointer { level, ikey });
    }

    pub fn add_table(
        &mut self,
        level: usize,
        num: u64,
        size: u64,
        smallest: InternalKey,
        largest: InternalKey,
    ) {
        self.mark(RecordField::AddedTable);
        self.added_tables.push(AddedTable {
            level,
            num,
            size,
            smallest,
            largest,
        });
    }

    pub fn del_table(&mut self, level: usize, num: u64) {
        self.mark(RecordField::DeletedTable);
        self.deleted_tables.push(DeletedTable { level, num });
    }

    pub fn reset_compaction_pointers(&mut self) {
        self.unmark(RecordField::CompactionPointer);
        self.compaction_pointers.clear();
    }

    pub fn reset_added_tables(&mut self) {
        self.unmark(RecordField::AddedTable);
        self.added_tables.clear();
    }

    pub fn reset_deleted_tables(&mut self) {
        self.unmark(RecordField::DeletedTable);
        self.deleted_tables.clear();
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn comparer(&self) -> Option<&str> {
        self.has(RecordField::Comparer).then_some(self.comparer.as_str())
    }

    pub fn journal_num(&self) -> Option<u64> {
        self.has(RecordField::JournalNum).then_some(self.journal_num)
    }

    pub fn prev_journal_num(&self) -> Option<u64> {
        self.has(RecordField::PrevJournalNum)
            .then_some(self.prev_journal_num)
    }

    pub fn next_file_num(&self) -> Option<u64> {
        self.has(RecordField::NextFileNum).then_some(self.next_file_num)
    }

    pub fn seq_num(&self) -> Option<u64> {
        self.has(RecordField::SeqNum).then_some(self.seq_num)
    }

    pub fn compaction_pointers(&self) -> &[CompactionPointer] {
        &self.compaction_pointers
    }

    pub fn added_tables(&self) -> &[AddedTable] {
        &self.added_tables
    }

    pub fn deleted_tables(&self) -> &[DeletedTable] {
        &self.deleted_tables
    }

    // -------------------------------------------------------------------------
    // Encoding
    // -------------------------------------------------------------------------

    /// Append the encoded record to `dst`.
    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        let tag = |dst: &mut Vec<u8>, field: RecordField| put_uvarint(dst, field as u64);

        if self.has(RecordField::Comparer) {
            tag(dst, RecordField::Comparer);
            put_bytes(dst, self.comparer.as_bytes());
        }
        if self.has(RecordField::JournalNum) {
            tag(dst, RecordField::JournalNum);
            put_uvarint(dst, self.journal_num);
        }
        if self.has(RecordField::PrevJournalNum) {
            tag(dst, RecordField::PrevJournalNum);
            put_uvarint(dst, self.prev_journal_num);
        }
        if self.has(RecordField::NextFileNum) {
            tag(dst, RecordField::NextFileNum);
            put_uvarint(dst, self.next_file_num);
        }
        if self.has(RecordField::SeqNum) {
            tag(dst, RecordField::SeqNum);
            put_uvarint(dst, self.seq_num);
        }
        for p in &self.compaction_pointers {
            tag(dst, RecordField::CompactionPointer);
            put_uvarint(dst, p.level as u64);
            put_bytes(dst, p.ikey.as_bytes());
        }
        for t in &self.deleted_tables {
            tag(dst, RecordField::DeletedTable);
            put_uvarint(dst, t.level as u64);
            put_uvarint(dst, t.num);
        }
        for t in &self.added_tables {
            tag(dst, RecordField::AddedTable);
            put_uvarint(dst, t.level as u64);
            put_uvarint(dst, t.num);
            put_uvarint(dst, t.size);
            put_bytes(dst, t.smallest.as_bytes());
            put_bytes(dst, t.largest.as_bytes());
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut dst = Vec::new();
        self.encode_to(&mut dst);
        dst
    }

    /// Decode a whole record from `data`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut record = Self::new();
        let mut r = FieldReader { src: data, pos: 0 };

        while let Some(tag) = r.tag()? {
            let field = RecordField::from_tag(tag).ok_or_else(|| {
                manifest_corrupted("field-header", format!("unknown tag {tag}"))
            })?;
            match field {
                RecordField::Comparer => {
                    let name = r.bytes("comparer")?;
                    let name = String::from_utf8(name.to_vec())
                        .map_err(|_| manifest_corrupted("comparer", "invalid utf-8"))?;
                    record.set_comparer(name);
                }
                RecordField::JournalNum => {
                    let num = r.uvarint("journal-num")?;
                    record.set_journal_num(num);
                }
                RecordField::PrevJournalNum => {
                    let num = r.uvarint("prev-journal-num")?;
                    record.set_prev_journal_num(num);
                }
                RecordField::NextFileNum => {
                    let num = r.uvarint("next-file-num")?;
                    record.set_next_file_num(num);
                }
                RecordField::SeqNum => {
                    let seq = r.uvarint("seq-num")?;
                    record.set_seq_num(seq);
                }
                RecordField::CompactionPointer => {
                    let level = r.level("comp-ptr.level")?;
                    let ikey = r.bytes("comp-ptr.ikey")?.to_vec();
                    record.add_compaction_pointer(level, InternalKey::from_encoded(ikey));
                }
                RecordField::DeletedTable => {
                    let level = r.level("del-table.level")?;
                    let num = r.uvarint("del-table.num")?;
                    record.del_table(level, num);
                }
                RecordField::AddedTable => {
                    let level = r.level("add-table.level")?;
                    let num = r.uvarint("add-table.num")?;
                    let size = r.uvarint("add-table.size")?;
                    let smallest = r.bytes("add-table.imin")?.to_vec();
                    let largest = r.bytes("add-table.imax")?.to_vec();
                    record.add_table(
                        level,
                        num,
                        size,
                        InternalKey::from_encoded(smallest),
                        InternalKey::from_encoded(largest),
                    );
                }
            }
        }
        Ok(record)
    }

    /// Decode a record read from the manifest `fd`; corruption errors name
    /// the file.
    pub fn decode_file(data: &[u8], fd: FileDesc) -> Result<Self> {
        Self::decode(data).map_err(|e| e.with_fd(fd))
    }
}

fn manifest_corrupted(field: &str, reason: impl std::fmt::Display) -> LarchError {
    LarchError::corrupted(format!("manifest corrupted (field '{field}'): {reason}"))
}

/// Cursor over an encoded record.
struct FieldReader<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    /// Next field tag; `None` at a clean end of input.
    fn tag(&mut self) -> Result<Option<u64>> {
        if self.pos == self.src.len() {
            return Ok(None);
        }
        self.uvarint("field-header").map(Some)
    }

    fn uvarint(&mut self, field: &str) -> Result<u64> {
        let rest = &self.src[self.pos..];
        match get_uvarint(rest) {
            Some((v, n)) => {
                self.pos += n;
                Ok(v)
            }
            None if rest.len() < MAX_VARINT_LEN64 && rest.iter().all(|b| b & 0x80 != 0) => {
                Err(manifest_corrupted(field, "short read"))
            }
            None => Err(manifest_corrupted(field, "varint overflows a 64-bit integer")),
        }
    }

    fn bytes(&mut self, field: &str) -> Result<&'a [u8]> {
        let n = self.uvarint(field)?;
        let rest = &self.src[self.pos..];
        match usize::try_from(n) {
            Ok(n) if n <= rest.len() => {
                self.pos += n;
                Ok(&rest[..n])
            }
            _ => Err(manifest_corrupted(field, "short read")),
        }
    }

    fn level(&mut self, field: &str) -> Result<usize> {
        let level = self.uvarint(field)?;
        if level >= u64::from(u32::MAX) {
            return Err(manifest_corrupted(field, "invalid level number"));
        }
        Ok(level as usize)
    }
}
