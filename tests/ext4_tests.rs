//! ext4 free-space and extent planning tests

mod common;

use common::{MemoryDevice, jpeg};
use rstest::*;
use salvage::application::ExtentPlanner;
use salvage::application::dto::ExtentMode;
use salvage::domain::entities::{ByteRange, Coverage, RecoveredFileRecord};
use salvage::domain::repositories::{FileSystemError, FreeSpaceProbe};
use salvage::domain::services::{SectorScanner, SignatureCatalog};
use salvage::infrastructure::file_systems::Ext4FreeSpace;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

const BLOCK: usize = 1024;
const BLOCKS: usize = 64;

/// 64 KiB ext4 image with 1 KiB blocks and a single group whose blocks
/// 1 to 10 are allocated
fn ext4_image() -> Vec<u8> {
    let mut data = vec![0u8; BLOCK * BLOCKS];

    let sb = &mut data[1024..2048];
    sb[4..8].copy_from_slice(&(BLOCKS as u32).to_le_bytes());
    sb[20..24].copy_from_slice(&1u32.to_le_bytes());
    sb[24..28].copy_from_slice(&0u32.to_le_bytes());
    sb[32..36].copy_from_slice(&8192u32.to_le_bytes());
    sb[56..58].copy_from_slice(&0xEF53u16.to_le_bytes());

    // group descriptor table in block 2, bitmap in block 3
    data[2 * BLOCK..2 * BLOCK + 4].copy_from_slice(&3u32.to_le_bytes());
    data[3 * BLOCK] = 0xFF;
    data[3 * BLOCK + 1] = 0x03;
    data
}

#[fixture]
fn ext4_device() -> MemoryDevice {
    MemoryDevice::new("mem://ext4", ext4_image())
}

// ============================================================================
// Free-space probe
// ============================================================================

#[rstest]
fn test_free_extents_from_bitmap(ext4_device: MemoryDevice) {
    let extents = Ext4FreeSpace::new().free_extents(&ext4_device).unwrap();

    assert_eq!(
        extents,
        Some(vec![ByteRange::from_bounds(11 * BLOCK as u64, (BLOCK * BLOCKS) as u64)])
    );
}

#[test]
fn test_uninitialized_group_is_free() {
    let mut data = ext4_image();
    // BLOCK_UNINIT
    data[2 * BLOCK + 0x12] = 0x02;
    let device = MemoryDevice::new("mem://ext4", data);

    let extents = Ext4FreeSpace::new().free_extents(&device).unwrap().unwrap();
    assert_eq!(extents, vec![ByteRange::from_bounds(BLOCK as u64, (BLOCK * BLOCKS) as u64)]);
}

#[rstest]
#[case::zeros(vec![0u8; 65536])]
#[case::too_small(vec![0u8; 1500])]
fn test_other_devices_are_not_ext4(#[case] data: Vec<u8>) {
    let device = MemoryDevice::new("mem://raw", data);
    assert_eq!(Ext4FreeSpace::new().free_extents(&device).unwrap(), None);
}

#[test]
fn test_bitmap_beyond_filesystem_is_corrupted() {
    let mut data = ext4_image();
    data[2 * BLOCK..2 * BLOCK + 4].copy_from_slice(&500u32.to_le_bytes());
    let device = MemoryDevice::new("mem://ext4", data);

    assert!(matches!(
        Ext4FreeSpace::new().free_extents(&device),
        Err(FileSystemError::CorruptedMetadata(_))
    ));
}

// ============================================================================
// Extent planning
// ============================================================================

#[rstest]
fn test_auto_prefers_free_space(ext4_device: MemoryDevice) {
    let plan = ExtentPlanner::default()
        .plan(&ext4_device, ExtentMode::Auto)
        .unwrap();

    assert_eq!(plan.coverage(), Coverage::FreeSpace { filesystem: "ext4" });
    assert_eq!(plan.total_bytes(), 53 * BLOCK as u64);
}

#[rstest]
#[case(ExtentMode::Auto)]
#[case(ExtentMode::WholeDevice)]
fn test_falls_back_to_whole_device(#[case] mode: ExtentMode) {
    let device = MemoryDevice::new("mem://raw", vec![0u8; 65536]);
    let plan = ExtentPlanner::default().plan(&device, mode).unwrap();

    assert_eq!(plan.coverage(), Coverage::WholeDevice);
    assert_eq!(plan.extents(), &[ByteRange::new(0, 65536)]);
}

#[test]
fn test_free_space_mode_requires_a_filesystem() {
    let device = MemoryDevice::new("mem://raw", vec![0u8; 65536]);
    assert!(matches!(
        ExtentPlanner::default().plan(&device, ExtentMode::FreeSpace),
        Err(FileSystemError::NoFileSystem)
    ));
}

#[test]
fn test_corrupted_map_only_fails_strict_mode() {
    let mut data = ext4_image();
    data[2 * BLOCK..2 * BLOCK + 4].copy_from_slice(&500u32.to_le_bytes());
    let device = MemoryDevice::new("mem://ext4", data);
    let planner = ExtentPlanner::default();

    assert!(planner.plan(&device, ExtentMode::FreeSpace).is_err());
    let plan = planner.plan(&device, ExtentMode::Auto).unwrap();
    assert_eq!(plan.coverage(), Coverage::WholeDevice);
}

#[test]
fn test_free_space_scan_skips_allocated_blocks() {
    let mut data = ext4_image();
    // one file in allocated blocks 5..9, one in free blocks 20..23
    data[5 * BLOCK..5 * BLOCK + 4000].copy_from_slice(&jpeg(4000));
    data[20 * BLOCK..20 * BLOCK + 4000].copy_from_slice(&jpeg(4000));
    let device = MemoryDevice::new("mem://ext4", data);
    let scanner = SectorScanner::new(Arc::new(SignatureCatalog::default_catalog()), 4096);

    let starts = |mode: ExtentMode| {
        let plan = ExtentPlanner::default().plan(&device, mode).unwrap();
        let mut starts = Vec::new();
        scanner
            .scan(
                &device,
                &plan,
                &AtomicBool::new(false),
                &mut |r: RecoveredFileRecord| {
                    starts.push(r.range().start());
                    ControlFlow::Continue(())
                },
            )
            .unwrap();
        starts
    };

    assert_eq!(starts(ExtentMode::Auto), vec![20 * BLOCK as u64]);
    assert_eq!(
        starts(ExtentMode::WholeDevice),
        vec![5 * BLOCK as u64, 20 * BLOCK as u64]
    );
}
