//! Platform volume enumerators

#[cfg(target_os = "linux")]
mod mount_table;
#[cfg(windows)]
mod windows;

#[cfg(target_os = "linux")]
pub use mount_table::{MountEntry, MountTableEnumerator, parse_mounts};
#[cfg(windows)]
pub use windows::LogicalDriveEnumerator;

use crate::domain::entities::Volume;
use crate::domain::repositories::{EnumerationError, VolumeEnumerator};

/// Used where no enumerator exists for the platform
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedEnumerator;

impl VolumeEnumerator for UnsupportedEnumerator {
    fn list_volumes(&self) -> Result<Vec<Volume>, EnumerationError> {
        Err(EnumerationError::Unsupported)
    }
}

/// The enumerator for the current operating system
pub fn platform_enumerator() -> Box<dyn VolumeEnumerator> {
    #[cfg(target_os = "linux")]
    {
        Box::new(MountTableEnumerator::default())
    }
    #[cfg(windows)]
    {
        Box::new(LogicalDriveEnumerator::new())
    }
    #[cfg(not(any(target_os = "linux", windows)))]
    {
        Box::new(UnsupportedEnumerator)
    }
}
