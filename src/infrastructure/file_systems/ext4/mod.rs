//! ext4 free-space probe
//!
//! Reads the block bitmaps of ext2/3/4 filesystems so a scan can skip
//! allocated blocks.

mod parser;

pub use parser::Ext4FreeSpace;
