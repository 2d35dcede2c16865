//! Block device reader trait
//!
//! Defines the interface for reading raw data from block devices.
//! This abstraction allows the domain to work with any storage medium.

use std::io;
use thiserror::Error;

/// Errors that can occur when reading from a block device
#[derive(Error, Debug)]
pub enum BlockDeviceError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device is gone: {0}")]
    DeviceGone(String),

    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("Invalid offset: {offset} exceeds device size {device_size}")]
    InvalidOffset { offset: u64, device_size: u64 },

    #[error("Read error at offset {offset}: {message}")]
    ReadError { offset: u64, message: String },

    #[error("Device error: {0}")]
    Other(String),
}

#[cfg(unix)]
const DEVICE_GONE_CODES: &[i32] = &[
    6,   // ENXIO
    9,   // EBADF
    19,  // ENODEV
    108, // ESHUTDOWN
];

#[cfg(windows)]
const DEVICE_GONE_CODES: &[i32] = &[
    6,    // ERROR_INVALID_HANDLE
    21,   // ERROR_NOT_READY
    55,   // ERROR_DEV_NOT_EXIST
    1167, // ERROR_DEVICE_NOT_CONNECTED
];

#[cfg(not(any(unix, windows)))]
const DEVICE_GONE_CODES: &[i32] = &[];

impl BlockDeviceError {
    /// Whether the error means the device can no longer be read at all,
    /// as opposed to a single unreadable region.
    pub fn is_fatal(&self) -> bool {
        match self {
            BlockDeviceError::DeviceGone(_) | BlockDeviceError::DeviceNotFound(_) => true,
            BlockDeviceError::IoError(err) => {
                err.kind() == io::ErrorKind::NotFound
                    || err
                        .raw_os_error()
                        .is_some_and(|code| DEVICE_GONE_CODES.contains(&code))
            }
            _ => false,
        }
    }
}

/// Trait for reading raw data from block devices
///
/// Implementations can target Linux `/dev/sdX`, Windows `\\.\C:`, or
/// disk image files.
///
/// # Example
///
/// ```ignore
/// let reader = FileBlockDevice::open("/dev/sda1")?;
/// let data = reader.read_at(0, 4096)?;
/// ```
pub trait BlockDeviceReader: Send + Sync {
    /// Opens the device for reading
    fn open(path: &str) -> Result<Self, BlockDeviceError>
    where
        Self: Sized;

    /// Reads up to `length` bytes at `offset`
    ///
    /// The result is shorter than `length` only at the end of the device.
    fn read_at(&self, offset: u64, length: usize) -> Result<Vec<u8>, BlockDeviceError>;

    /// Reads exactly `length` bytes at `offset`
    fn read_exact_at(&self, offset: u64, length: usize) -> Result<Vec<u8>, BlockDeviceError> {
        let data = self.read_at(offset, length)?;
        if data.len() < length {
            return Err(BlockDeviceError::ReadError {
                offset,
                message: format!("short read: {} of {} bytes", data.len(), length),
            });
        }
        Ok(data)
    }

    /// Returns the device path
    fn path(&self) -> &str;

    /// Returns the total size in bytes
    fn size(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(BlockDeviceError::DeviceGone("/dev/sdz".into()).is_fatal());
        assert!(BlockDeviceError::IoError(io::Error::from(io::ErrorKind::NotFound)).is_fatal());
        assert!(
            !BlockDeviceError::ReadError {
                offset: 0,
                message: "bad sector".into()
            }
            .is_fatal()
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_eio_is_not_fatal() {
        let err = BlockDeviceError::IoError(io::Error::from_raw_os_error(5));
        assert!(!err.is_fatal());
        let err = BlockDeviceError::IoError(io::Error::from_raw_os_error(19));
        assert!(err.is_fatal());
    }
}
