//! Session Module
//!
//! The manifest is a log of *session records* (version edits). Each record
//! describes a change to the set of live tables plus the watermarks the
//! engine needs to reopen: comparer name, journal numbers, next file number
//! and last sequence number. Replaying every record of a manifest in order
//! rebuilds the current version.

mod record;

pub use record::{AddedTable, CompactionPointer, DeletedTable, RecordField, SessionRecord};
