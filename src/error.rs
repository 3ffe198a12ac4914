//! Error types for larchkv
//!
//! Provides a unified error type for all operations.
//!
//! Corruption is the error that matters most at this layer: it always names
//! the offending file when one is known, and it is the only error the indexed
//! and merged iterators may choose to step over in non-strict mode.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::storage::FileDesc;

/// Result type alias using LarchError
pub type Result<T> = std::result::Result<T, LarchError>;

/// Unified error type for larchkv operations
///
/// Errors are `Clone` so iterators can record a child's error and report it
/// again from `error()`; I/O errors are shared behind an `Arc` for that reason.
#[derive(Debug, Clone, Error)]
pub enum LarchError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(Arc<io::Error>),

    // -------------------------------------------------------------------------
    // Integrity Errors
    // -------------------------------------------------------------------------
    #[error("Corruption detected{}: {reason}", describe_fd(.fd))]
    Corrupted {
        fd: Option<FileDesc>,
        reason: String,
    },

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("{0} released")]
    Released(&'static str),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    NotFound,

    // -------------------------------------------------------------------------
    // Usage Errors
    // -------------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LarchError {
    /// Corruption error without a known file.
    pub fn corrupted(reason: impl Into<String>) -> Self {
        LarchError::Corrupted {
            fd: None,
            reason: reason.into(),
        }
    }

    /// Corruption error attributed to `fd`.
    pub fn corrupted_in(fd: FileDesc, reason: impl Into<String>) -> Self {
        LarchError::Corrupted {
            fd: Some(fd),
            reason: reason.into(),
        }
    }

    /// Attach a file descriptor to a corruption error that does not carry one.
    /// Other errors are returned unchanged.
    pub fn with_fd(self, fd: FileDesc) -> Self {
        match self {
            LarchError::Corrupted { fd: None, reason } => LarchError::Corrupted {
                fd: Some(fd),
                reason,
            },
            other => other,
        }
    }

    pub fn is_corrupted(&self) -> bool {
        matches!(self, LarchError::Corrupted { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LarchError::NotFound)
    }

    pub fn is_released(&self) -> bool {
        matches!(self, LarchError::Released(_))
    }
}

impl From<io::Error> for LarchError {
    fn from(e: io::Error) -> Self {
        LarchError::Io(Arc::new(e))
    }
}

fn describe_fd(fd: &Option<FileDesc>) -> String {
    match fd {
        Some(fd) => format!(" in {}", fd),
        None => String::new(),
    }
}
