//! Repository traits (interfaces)
//!
//! These traits define the contracts for external dependencies: raw
//! devices, the operating system's volume list, filesystem metadata and
//! the destination of recovered files.

mod block_device;
mod file_system;
mod file_writer;
mod volume_enumerator;

pub use block_device::{BlockDeviceError, BlockDeviceReader};
pub use file_system::{FileSystemError, FileSystemType, FreeSpaceProbe};
pub use file_writer::{FileWriterError, WriteResult};
pub use volume_enumerator::{EnumerationError, VolumeEnumerator};
