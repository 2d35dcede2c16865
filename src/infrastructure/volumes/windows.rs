//! Windows volume enumeration from the logical drive letters

use crate::domain::entities::Volume;
use crate::domain::repositories::{EnumerationError, VolumeEnumerator};
use tracing::{debug, warn};
use windows_sys::Win32::Storage::FileSystem::{
    GetDiskFreeSpaceExW, GetDriveTypeW, GetLogicalDrives, GetVolumeInformationW,
};

const DRIVE_REMOVABLE: u32 = 2;
const DRIVE_FIXED: u32 = 3;

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn from_wide(buf: &[u16]) -> String {
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..len])
}

/// Lists fixed and removable drives
#[derive(Debug, Default, Clone, Copy)]
pub struct LogicalDriveEnumerator;

impl LogicalDriveEnumerator {
    pub fn new() -> Self {
        Self
    }

    fn volume(&self, letter: char) -> Option<Volume> {
        let root = format!("{letter}:\\");
        let root_w = wide(&root);

        // SAFETY: `root_w` is NUL-terminated and outlives every call
        let drive_type = unsafe { GetDriveTypeW(root_w.as_ptr()) };
        if drive_type != DRIVE_FIXED && drive_type != DRIVE_REMOVABLE {
            return None;
        }

        let mut available = 0u64;
        let mut total = 0u64;
        let ok = unsafe {
            GetDiskFreeSpaceExW(
                root_w.as_ptr(),
                &mut available,
                &mut total,
                std::ptr::null_mut(),
            )
        };
        if ok == 0 {
            warn!("Skipping {root}: {}", std::io::Error::last_os_error());
            return None;
        }

        let mut label = [0u16; 261];
        let mut fs_name = [0u16; 261];
        let ok = unsafe {
            GetVolumeInformationW(
                root_w.as_ptr(),
                label.as_mut_ptr(),
                label.len() as u32,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                fs_name.as_mut_ptr(),
                fs_name.len() as u32,
            )
        };
        let (label, fs_name) = if ok == 0 {
            (String::new(), "unknown".to_string())
        } else {
            (from_wide(&label), from_wide(&fs_name))
        };
        let name = if label.is_empty() {
            format!("Local Disk ({letter}:)")
        } else {
            format!("{label} ({letter}:)")
        };

        Some(
            Volume::new(name, root, format!("\\\\.\\{letter}:"), fs_name)
                .with_space(total, available)
                .removable(drive_type == DRIVE_REMOVABLE),
        )
    }
}

impl VolumeEnumerator for LogicalDriveEnumerator {
    fn list_volumes(&self) -> Result<Vec<Volume>, EnumerationError> {
        // SAFETY: no arguments
        let mask = unsafe { GetLogicalDrives() };
        if mask == 0 {
            return Err(EnumerationError::Other(
                std::io::Error::last_os_error().to_string(),
            ));
        }

        let volumes: Vec<Volume> = (0..26u8)
            .filter(|i| mask & (1 << i) != 0)
            .filter_map(|i| self.volume((b'A' + i) as char))
            .collect();
        debug!("Found {} drives", volumes.len());
        Ok(volumes)
    }
}
