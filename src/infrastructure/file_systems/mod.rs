//! File system free-space probes

pub mod ext4;

pub use ext4::Ext4FreeSpace;

use crate::domain::repositories::FreeSpaceProbe;

/// Every probe this build knows, in the order they are tried
pub fn default_probes() -> Vec<Box<dyn FreeSpaceProbe>> {
    vec![Box::new(Ext4FreeSpace::new())]
}
