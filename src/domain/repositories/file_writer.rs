//! File writer types
//!
//! Errors and results of writing recovered bytes to a destination.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when writing recovered files
#[derive(Error, Debug)]
pub enum FileWriterError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("Disk full: {0}")]
    DiskFull(String),

    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("No free name for {0} in the destination")]
    NameSpaceExhausted(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result of writing a single file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    /// Path where the file was saved
    pub saved_path: PathBuf,
    /// Size in bytes of the saved file
    pub saved_size: u64,
    /// Hex SHA-256 of the saved bytes
    pub sha256: String,
}
