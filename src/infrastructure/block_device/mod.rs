//! Block device implementations

mod file_block_device;
mod mmap_block_device;

pub use file_block_device::FileBlockDevice;
pub use mmap_block_device::MmapBlockDevice;
