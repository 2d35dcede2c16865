//! Memory-mapped block device implementation
//!
//! Maps an image file into memory so windows are copied straight out of the
//! page cache without seeking a shared handle.

use super::file_block_device::open_error;
use crate::domain::repositories::{BlockDeviceError, BlockDeviceReader};
use memmap2::Mmap;
use std::fs::OpenOptions;

/// Memory-mapped block device reader
///
/// Best suited to image files; block devices are better read through
/// [`super::FileBlockDevice`].
///
/// # Example
///
/// ```ignore
/// let device = MmapBlockDevice::open("disk.img")?;
/// let data = device.read_at(0, 512)?;
/// ```
pub struct MmapBlockDevice {
    mmap: Mmap,
    path: String,
}

impl MmapBlockDevice {
    /// Returns a slice at the specified offset and length
    ///
    /// This is a zero-copy operation.
    #[inline]
    pub fn slice_at(&self, offset: u64, length: usize) -> Option<&[u8]> {
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(length)?;
        self.mmap.get(start..end)
    }
}

impl BlockDeviceReader for MmapBlockDevice {
    fn open(path: &str) -> Result<Self, BlockDeviceError> {
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|e| open_error(path, e))?;

        if file.metadata()?.len() == 0 {
            return Err(BlockDeviceError::Other(format!("{path} has zero size")));
        }

        // SAFETY: the map is read-only; a file truncated underneath it is the
        // caller's responsibility, as with any mapped image.
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| BlockDeviceError::Other(format!("Failed to memory-map {path}: {e}")))?;

        Ok(Self {
            mmap,
            path: path.to_string(),
        })
    }

    fn read_at(&self, offset: u64, length: usize) -> Result<Vec<u8>, BlockDeviceError> {
        let size = self.size();
        if offset >= size {
            return Err(BlockDeviceError::InvalidOffset {
                offset,
                device_size: size,
            });
        }

        let start = offset as usize;
        let end = start.saturating_add(length).min(self.mmap.len());
        Ok(self.mmap[start..end].to_vec())
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn size(&self) -> u64 {
        self.mmap.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_mmap_open_nonexistent() {
        let result = MmapBlockDevice::open("/nonexistent/file");
        assert!(matches!(result, Err(BlockDeviceError::DeviceNotFound(_))));
    }

    #[test]
    fn test_mmap_read_at() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"Hello, memory-mapped world!").unwrap();
        file.flush().unwrap();

        let device = MmapBlockDevice::open(file.path().to_str().unwrap()).unwrap();
        assert_eq!(device.read_at(0, 5).unwrap(), b"Hello");
        assert_eq!(device.read_at(21, 100).unwrap(), b"world!");
        assert_eq!(device.slice_at(7, 6), Some(&b"memory"[..]));
        assert_eq!(device.slice_at(25, 6), None);
    }
}
