//! Volume enumerator trait

use crate::domain::entities::Volume;
use std::io;
use thiserror::Error;

/// The operating system could not be asked for its volumes
#[derive(Error, Debug)]
pub enum EnumerationError {
    #[error("Cannot read mount table {path}: {source}")]
    MountTable {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Permission denied while listing volumes: {0}")]
    PermissionDenied(String),

    #[error("Volume enumeration is not supported on this platform")]
    Unsupported,

    #[error("Volume enumeration failed: {0}")]
    Other(String),
}

/// Lists mounted volumes backed by addressable storage
///
/// Pseudo filesystems are excluded. An empty list is a valid answer.
pub trait VolumeEnumerator: Send + Sync {
    fn list_volumes(&self) -> Result<Vec<Volume>, EnumerationError>;
}
