//! # larchkv
//!
//! Storage core of an embeddable, ordered key-value store built on a
//! log-structured merge design:
//! - Versioned internal keys and their comparer
//! - Immutable sorted table files with bloom filters and snappy blocks
//! - Composable, bidirectional read-path iterators
//! - Manifest session record (version edit) codec
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Session Records                         │
//! │              (manifest: which tables are live)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   MergedIterator                             │
//! │          (k-way merge across tables and levels)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ TableReader │          │ TableWriter │
//!   │  (indexed)  │          │  (blocks)   │
//!   └──────┬──────┘          └──────┬──────┘
//!          │                        │
//!          ▼                        ▼
//!   ┌──────────────────────────────────────┐
//!   │  Storage (directory / memory) +      │
//!   │  BufferPool                          │
//!   └──────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod util;
pub mod comparer;
pub mod key;
pub mod filter;
pub mod storage;
pub mod iterator;
pub mod table;
pub mod session;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{LarchError, Result};
pub use config::{Compression, Options};
pub use table::{TableReader, TableWriter};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of larchkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
