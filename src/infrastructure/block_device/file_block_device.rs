//! File-backed block device implementation
//!
//! Provides raw read access to block devices (`/dev/sdX`, `\\.\C:`) and
//! disk image files through ordinary file I/O.

use crate::domain::repositories::{BlockDeviceError, BlockDeviceReader};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Raw volumes only accept reads on sector boundaries; 4 KiB covers 512e and 4Kn disks
const READ_ALIGN: u64 = 4096;

/// Widens `[offset, offset + len)` to whole sectors, capped at `size`
fn aligned_span(offset: u64, len: u64, size: u64) -> (u64, u64) {
    let start = offset & !(READ_ALIGN - 1);
    let end = offset.saturating_add(len).div_ceil(READ_ALIGN) * READ_ALIGN;
    (start, end.min(size))
}

/// Block device reader over a file handle
///
/// Reads seek the shared handle under a lock, so one device can be read
/// from several threads.
///
/// # Example
///
/// ```ignore
/// let device = FileBlockDevice::open("/dev/sda")?;
/// let data = device.read_at(0, 512)?;
/// ```
#[derive(Debug)]
pub struct FileBlockDevice {
    file: Mutex<File>,
    path: String,
    size: u64,
}

impl FileBlockDevice {
    /// Gets the device/file size
    fn get_size(file: &mut File, path: &Path) -> Result<u64, BlockDeviceError> {
        let metadata = file.metadata()?;

        if metadata.is_file() {
            return Ok(metadata.len());
        }

        #[cfg(windows)]
        {
            if let Some(size) = volume_length(file) {
                return Ok(size);
            }
        }

        // block devices report a zero length; their end is found by seeking
        let size = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;
        if size == 0 {
            return Err(BlockDeviceError::Other(format!(
                "Could not determine size of {}",
                path.display()
            )));
        }
        Ok(size)
    }
}

/// Length of a `\\.\X:` volume handle, which seeking to the end does not report
#[cfg(windows)]
fn volume_length(file: &File) -> Option<u64> {
    use std::os::windows::io::AsRawHandle;
    use windows_sys::Win32::System::IO::DeviceIoControl;
    use windows_sys::Win32::System::Ioctl::{GET_LENGTH_INFORMATION, IOCTL_DISK_GET_LENGTH_INFO};

    let mut info = GET_LENGTH_INFORMATION { Length: 0 };
    let mut returned = 0u32;
    // SAFETY: the handle stays open for the call and `info` is sized for the reply
    let ok = unsafe {
        DeviceIoControl(
            file.as_raw_handle() as _,
            IOCTL_DISK_GET_LENGTH_INFO,
            std::ptr::null(),
            0,
            &mut info as *mut GET_LENGTH_INFORMATION as *mut _,
            std::mem::size_of::<GET_LENGTH_INFORMATION>() as u32,
            &mut returned,
            std::ptr::null_mut(),
        )
    };
    (ok != 0 && info.Length > 0).then_some(info.Length as u64)
}

pub(crate) fn open_error(path: &str, err: io::Error) -> BlockDeviceError {
    match err.kind() {
        io::ErrorKind::NotFound => BlockDeviceError::DeviceNotFound(path.to_string()),
        io::ErrorKind::PermissionDenied => {
            BlockDeviceError::PermissionDenied(format!("{path} - try running with sudo"))
        }
        _ => BlockDeviceError::IoError(err),
    }
}

impl BlockDeviceReader for FileBlockDevice {
    fn open(path: &str) -> Result<Self, BlockDeviceError> {
        let path_obj = Path::new(path);

        let mut file = OpenOptions::new()
            .read(true)
            .open(path_obj)
            .map_err(|e| open_error(path, e))?;
        let size = Self::get_size(&mut file, path_obj)?;

        #[cfg(target_os = "linux")]
        {
            use rustix::fs::{Advice, fadvise};

            // windows are read front to back exactly once
            let _ = fadvise(&file, 0, None, Advice::Sequential);
        }

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_string(),
            size,
        })
    }

    fn read_at(&self, offset: u64, length: usize) -> Result<Vec<u8>, BlockDeviceError> {
        if offset >= self.size {
            return Err(BlockDeviceError::InvalidOffset {
                offset,
                device_size: self.size,
            });
        }

        // Limit read to available data
        let to_read = length.min((self.size - offset).min(usize::MAX as u64) as usize);
        let (start, end) = aligned_span(offset, to_read as u64, self.size);
        let skip = (offset - start) as usize;
        let span = (end - start) as usize;
        let mut buffer = vec![0u8; span];
        let mut filled = 0;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(start))?;
        while filled < span {
            match file.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let err = BlockDeviceError::IoError(e);
                    if err.is_fatal() {
                        return Err(err);
                    }
                    return Err(BlockDeviceError::ReadError {
                        offset: (start + filled as u64).max(offset),
                        message: err.to_string(),
                    });
                }
            }
        }

        buffer.truncate(filled.min(skip + to_read));
        if buffer.len() <= skip {
            return Ok(Vec::new());
        }
        buffer.drain(..skip);
        Ok(buffer)
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_open_nonexistent() {
        let result = FileBlockDevice::open("/nonexistent/device");
        assert!(matches!(result, Err(BlockDeviceError::DeviceNotFound(_))));
    }

    #[test]
    fn test_read_at_clamps_to_end() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();
        file.flush().unwrap();

        let device = FileBlockDevice::open(file.path().to_str().unwrap()).unwrap();
        assert_eq!(device.size(), 10);
        assert_eq!(device.read_at(2, 3).unwrap(), b"234");
        assert_eq!(device.read_at(8, 100).unwrap(), b"89");
        assert!(matches!(
            device.read_at(10, 1),
            Err(BlockDeviceError::InvalidOffset { .. })
        ));
        assert!(device.read_exact_at(8, 4).is_err());
    }

    #[test]
    fn test_aligned_span_widens_to_sectors() {
        assert_eq!(aligned_span(0x1003, 10, 1 << 20), (0x1000, 0x2000));
        assert_eq!(aligned_span(4096, 4096, 1 << 20), (4096, 8192));
        assert_eq!(aligned_span(4100, 10, 4105), (4096, 4105));
        assert_eq!(aligned_span(0, 0, 100), (0, 0));
    }

    #[test]
    fn test_unaligned_read_across_sector_boundary() {
        let data: Vec<u8> = (0..3 * READ_ALIGN as usize).map(|i| (i % 251) as u8).collect();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        let device = FileBlockDevice::open(file.path().to_str().unwrap()).unwrap();
        assert_eq!(device.read_at(4090, 20).unwrap(), &data[4090..4110]);
        assert_eq!(device.read_at(8191, 1).unwrap(), &data[8191..8192]);
        assert_eq!(device.read_at(12000, 1000).unwrap(), &data[12000..]);
    }
}
