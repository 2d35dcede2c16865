//! ext4 block bitmap reader
//!
//! Parses the ext4 superblock and group descriptors and turns the block
//! bitmaps into the byte ranges of unallocated blocks.

use crate::domain::entities::ByteRange;
use crate::domain::repositories::{
    BlockDeviceReader, FileSystemError, FileSystemType, FreeSpaceProbe,
};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use tracing::{debug, info};

/// ext4 superblock magic number
const EXT4_SUPER_MAGIC: u16 = 0xEF53;

/// Superblock offset from partition start
const SUPERBLOCK_OFFSET: u64 = 1024;

/// Superblock size
const SUPERBLOCK_SIZE: usize = 1024;

/// `INCOMPAT_64BIT`: block numbers and descriptors are 64-bit
const INCOMPAT_64BIT: u32 = 0x80;

/// Group descriptor flag: block bitmap not initialized, group is empty
const BG_BLOCK_UNINIT: u16 = 0x2;

const MIN_DESC_SIZE: usize = 32;
const MIN_DESC_SIZE_64BIT: usize = 64;

/// ext4 superblock (only the fields the bitmap walk needs)
#[derive(Debug)]
struct Ext4Superblock {
    block_count: u64,
    first_data_block: u64,
    /// Block size (1024 << log_block_size)
    block_size: u64,
    blocks_per_group: u64,
    magic: u16,
    is_64bit: bool,
    desc_size: usize,
}

fn field<T>(value: std::io::Result<T>) -> Result<T, FileSystemError> {
    value.map_err(|e| FileSystemError::InvalidSuperblock(e.to_string()))
}

impl Ext4Superblock {
    /// Parses superblock from raw bytes
    fn parse(data: &[u8]) -> Result<Self, FileSystemError> {
        if data.len() < SUPERBLOCK_SIZE {
            return Err(FileSystemError::InvalidSuperblock(
                "Superblock too small".to_string(),
            ));
        }

        let mut cursor = Cursor::new(data);

        cursor.set_position(4);
        let block_count_lo = field(cursor.read_u32::<LittleEndian>())?;

        cursor.set_position(20);
        let first_data_block = field(cursor.read_u32::<LittleEndian>())?;
        let log_block_size = field(cursor.read_u32::<LittleEndian>())?;

        cursor.set_position(32);
        let blocks_per_group = field(cursor.read_u32::<LittleEndian>())?;

        cursor.set_position(56);
        let magic = field(cursor.read_u16::<LittleEndian>())?;

        cursor.set_position(96);
        let incompat = field(cursor.read_u32::<LittleEndian>())?;

        cursor.set_position(254);
        let desc_size = field(cursor.read_u16::<LittleEndian>())? as usize;

        cursor.set_position(336);
        let block_count_hi = field(cursor.read_u32::<LittleEndian>())?;

        let is_64bit = incompat & INCOMPAT_64BIT != 0;
        let block_count = if is_64bit {
            (block_count_hi as u64) << 32 | block_count_lo as u64
        } else {
            block_count_lo as u64
        };
        let block_size = 1024u64
            .checked_shl(log_block_size)
            .filter(|size| *size <= 65536)
            .ok_or_else(|| {
                FileSystemError::InvalidSuperblock(format!("log block size {log_block_size}"))
            })?;

        Ok(Self {
            block_count,
            first_data_block: first_data_block as u64,
            block_size,
            blocks_per_group: blocks_per_group as u64,
            magic,
            is_64bit,
            desc_size: if is_64bit {
                desc_size.max(MIN_DESC_SIZE_64BIT)
            } else {
                MIN_DESC_SIZE
            },
        })
    }

    /// Validates the superblock
    fn validate(&self) -> Result<(), FileSystemError> {
        if self.blocks_per_group == 0 || self.blocks_per_group > self.block_size * 8 {
            return Err(FileSystemError::InvalidSuperblock(format!(
                "{} blocks per group",
                self.blocks_per_group
            )));
        }
        if self.block_count <= self.first_data_block {
            return Err(FileSystemError::InvalidSuperblock(format!(
                "block count {} below first data block {}",
                self.block_count, self.first_data_block
            )));
        }
        Ok(())
    }

    fn group_count(&self) -> u64 {
        (self.block_count - self.first_data_block).div_ceil(self.blocks_per_group)
    }
}

/// One entry of the group descriptor table
#[derive(Debug)]
struct GroupDescriptor {
    block_bitmap: u64,
    flags: u16,
}

impl GroupDescriptor {
    fn parse(data: &[u8], is_64bit: bool) -> Result<Self, FileSystemError> {
        let corrupted = |e: std::io::Error| FileSystemError::CorruptedMetadata(e.to_string());
        let mut cursor = Cursor::new(data);

        let bitmap_lo = cursor.read_u32::<LittleEndian>().map_err(corrupted)?;
        cursor.set_position(0x12);
        let flags = cursor.read_u16::<LittleEndian>().map_err(corrupted)?;

        let bitmap_hi = if is_64bit && data.len() >= MIN_DESC_SIZE_64BIT {
            cursor.set_position(0x20);
            cursor.read_u32::<LittleEndian>().map_err(corrupted)?
        } else {
            0
        };

        Ok(Self {
            block_bitmap: (bitmap_hi as u64) << 32 | bitmap_lo as u64,
            flags,
        })
    }
}

/// Collects runs of free blocks into byte ranges
struct RunCollector {
    block_size: u64,
    run: Option<(u64, u64)>,
    extents: Vec<ByteRange>,
}

impl RunCollector {
    fn new(block_size: u64) -> Self {
        Self {
            block_size,
            run: None,
            extents: Vec::new(),
        }
    }

    /// Adds the free blocks `[first, first + count)`
    fn free(&mut self, first: u64, count: u64) {
        match &mut self.run {
            Some((_, end)) if *end == first => *end += count,
            _ => {
                self.flush();
                self.run = Some((first, first + count));
            }
        }
    }

    fn flush(&mut self) {
        if let Some((first, end)) = self.run.take() {
            self.extents.push(ByteRange::from_bounds(
                first * self.block_size,
                end * self.block_size,
            ));
        }
    }

    fn finish(mut self) -> Vec<ByteRange> {
        self.flush();
        self.extents
    }
}

/// Free space of ext2/3/4 filesystems, read from the block bitmaps
#[derive(Debug, Default, Clone, Copy)]
pub struct Ext4FreeSpace;

impl Ext4FreeSpace {
    pub fn new() -> Self {
        Self
    }

    fn read_superblock(
        &self,
        device: &dyn BlockDeviceReader,
    ) -> Result<Option<Ext4Superblock>, FileSystemError> {
        if device.size() < SUPERBLOCK_OFFSET + SUPERBLOCK_SIZE as u64 {
            return Ok(None);
        }
        let data = device.read_at(SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE)?;
        if data.len() < SUPERBLOCK_SIZE {
            return Ok(None);
        }

        let superblock = Ext4Superblock::parse(&data)?;
        if superblock.magic != EXT4_SUPER_MAGIC {
            return Ok(None);
        }
        superblock.validate()?;
        Ok(Some(superblock))
    }
}

impl FreeSpaceProbe for Ext4FreeSpace {
    fn filesystem(&self) -> FileSystemType {
        FileSystemType::Ext4
    }

    fn free_extents(
        &self,
        device: &dyn BlockDeviceReader,
    ) -> Result<Option<Vec<ByteRange>>, FileSystemError> {
        let Some(sb) = self.read_superblock(device)? else {
            return Ok(None);
        };

        let groups = sb.group_count();
        let table_offset = (sb.first_data_block + 1) * sb.block_size;
        let table_len = usize::try_from(groups)
            .ok()
            .and_then(|g| g.checked_mul(sb.desc_size))
            .ok_or_else(|| {
                FileSystemError::CorruptedMetadata(format!("{groups} block groups"))
            })?;
        let table = device.read_exact_at(table_offset, table_len)?;

        let mut runs = RunCollector::new(sb.block_size);
        let mut free_blocks = 0u64;

        for (group, raw) in table.chunks_exact(sb.desc_size).enumerate() {
            let desc = GroupDescriptor::parse(raw, sb.is_64bit)?;
            let group_first = sb.first_data_block + group as u64 * sb.blocks_per_group;
            let group_blocks = sb.blocks_per_group.min(sb.block_count - group_first);

            if desc.flags & BG_BLOCK_UNINIT != 0 {
                runs.free(group_first, group_blocks);
                free_blocks += group_blocks;
                continue;
            }
            if desc.block_bitmap >= sb.block_count {
                return Err(FileSystemError::CorruptedMetadata(format!(
                    "group {group} bitmap at block {} beyond {} blocks",
                    desc.block_bitmap, sb.block_count
                )));
            }

            let bitmap = device.read_exact_at(
                desc.block_bitmap * sb.block_size,
                group_blocks.div_ceil(8) as usize,
            )?;
            for bit in 0..group_blocks {
                let used = bitmap[(bit / 8) as usize] & (1 << (bit % 8)) != 0;
                if !used {
                    runs.free(group_first + bit, 1);
                    free_blocks += 1;
                }
            }
        }

        let extents = runs.finish();
        info!(
            "ext4: {} groups, {} of {} blocks free in {} extents",
            groups,
            free_blocks,
            sb.block_count,
            extents.len()
        );
        debug!("ext4 block size {} bytes", sb.block_size);
        Ok(Some(extents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_collector_merges_adjacent_blocks() {
        let mut runs = RunCollector::new(1024);
        runs.free(11, 1);
        runs.free(12, 4);
        runs.free(20, 2);
        assert_eq!(
            runs.finish(),
            vec![
                ByteRange::from_bounds(11 * 1024, 16 * 1024),
                ByteRange::from_bounds(20 * 1024, 22 * 1024),
            ]
        );
    }

    #[test]
    fn test_superblock_rejects_short_buffer() {
        assert!(matches!(
            Ext4Superblock::parse(&[0u8; 100]),
            Err(FileSystemError::InvalidSuperblock(_))
        ));
    }

    #[test]
    fn test_superblock_64bit_fields() {
        let mut data = vec![0u8; SUPERBLOCK_SIZE];
        data[4..8].copy_from_slice(&16u32.to_le_bytes());
        data[24..28].copy_from_slice(&2u32.to_le_bytes());
        data[32..36].copy_from_slice(&32768u32.to_le_bytes());
        data[56..58].copy_from_slice(&EXT4_SUPER_MAGIC.to_le_bytes());
        data[96..100].copy_from_slice(&INCOMPAT_64BIT.to_le_bytes());
        data[254..256].copy_from_slice(&64u16.to_le_bytes());
        data[336..340].copy_from_slice(&1u32.to_le_bytes());

        let sb = Ext4Superblock::parse(&data).unwrap();
        assert_eq!(sb.block_size, 4096);
        assert_eq!(sb.block_count, (1u64 << 32) | 16);
        assert!(sb.is_64bit);
        assert_eq!(sb.desc_size, 64);
        assert!(sb.validate().is_ok());
    }
}
