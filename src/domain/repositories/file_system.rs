//! File system free-space trait
//!
//! A probe recognizes a filesystem on a raw device and reports which byte
//! ranges it considers unallocated. Deleted file data lives there.

use super::block_device::{BlockDeviceError, BlockDeviceReader};
use crate::domain::entities::ByteRange;
use thiserror::Error;

/// Errors that can occur while reading filesystem metadata
#[derive(Error, Debug)]
pub enum FileSystemError {
    #[error("Invalid superblock: {0}")]
    InvalidSuperblock(String),

    #[error("Corrupted metadata: {0}")]
    CorruptedMetadata(String),

    #[error("Read error: {0}")]
    ReadError(#[from] BlockDeviceError),

    #[error("No file system with a free-space map detected")]
    NoFileSystem,
}

/// Supported file system types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileSystemType {
    /// ext2, ext3 and ext4 share the block bitmap layout
    Ext4,
}

impl FileSystemType {
    pub fn name(&self) -> &'static str {
        match self {
            FileSystemType::Ext4 => "ext4",
        }
    }
}

/// Reports unallocated extents of a recognized filesystem
pub trait FreeSpaceProbe: Send + Sync {
    fn filesystem(&self) -> FileSystemType;

    /// `Ok(None)` when the device does not carry this filesystem
    fn free_extents(
        &self,
        device: &dyn BlockDeviceReader,
    ) -> Result<Option<Vec<ByteRange>>, FileSystemError>;
}
