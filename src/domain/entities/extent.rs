//! Byte ranges and scan plans
//!
//! A scan extent is the part of a device the sector scanner sweeps. It is
//! either the free space reported by a filesystem or the whole device.

use serde::Serialize;
use std::fmt;

/// A half-open byte range `[start, start + len)` on a source device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ByteRange {
    start: u64,
    len: u64,
}

impl ByteRange {
    /// Creates a range from a start offset and a length
    pub fn new(start: u64, len: u64) -> Self {
        Self { start, len }
    }

    /// Creates a range from start and (exclusive) end offsets
    pub fn from_bounds(start: u64, end: u64) -> Self {
        Self {
            start,
            len: end.saturating_sub(start),
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Exclusive end offset, saturating at `u64::MAX`
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.len)
    }

    /// Whether the whole range lies inside a device of `size` bytes
    pub fn fits_within(&self, size: u64) -> bool {
        self.start.checked_add(self.len).is_some_and(|end| end <= size)
    }

    /// Returns the part of this range that lies inside `[0, size)`
    pub fn clamp_to(&self, size: u64) -> ByteRange {
        let start = self.start.min(size);
        ByteRange::from_bounds(start, self.end().min(size))
    }

    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.start && offset < self.end()
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}..{:#x}", self.start, self.end())
    }
}

/// Where the extents of a scan plan came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Coverage {
    /// Unallocated blocks as reported by the named filesystem
    FreeSpace { filesystem: &'static str },
    /// Every addressable byte of the device
    WholeDevice,
}

/// The ordered, non-overlapping extents one scan will sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPlan {
    extents: Vec<ByteRange>,
    coverage: Coverage,
}

impl ScanPlan {
    /// A plan covering the whole device
    pub fn whole_device(size: u64) -> Self {
        let extents = if size == 0 {
            Vec::new()
        } else {
            vec![ByteRange::new(0, size)]
        };
        Self {
            extents,
            coverage: Coverage::WholeDevice,
        }
    }

    /// A plan over free-space extents; ranges are sorted, merged and
    /// clamped to the device size.
    pub fn free_space(filesystem: &'static str, extents: Vec<ByteRange>, device_size: u64) -> Self {
        Self {
            extents: normalize(extents, device_size),
            coverage: Coverage::FreeSpace { filesystem },
        }
    }

    pub fn extents(&self) -> &[ByteRange] {
        &self.extents
    }

    pub fn coverage(&self) -> Coverage {
        self.coverage
    }

    /// Total number of bytes the plan will sweep
    pub fn total_bytes(&self) -> u64 {
        self.extents.iter().map(ByteRange::len).sum()
    }
}

fn normalize(mut extents: Vec<ByteRange>, device_size: u64) -> Vec<ByteRange> {
    extents.sort_by_key(ByteRange::start);

    let mut merged: Vec<ByteRange> = Vec::with_capacity(extents.len());
    for extent in extents {
        let extent = extent.clamp_to(device_size);
        if extent.is_empty() {
            continue;
        }
        match merged.last_mut() {
            Some(last) if extent.start() <= last.end() => {
                *last = ByteRange::from_bounds(last.start(), last.end().max(extent.end()));
            }
            _ => merged.push(extent),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fits_within() {
        assert!(ByteRange::new(0, 100).fits_within(100));
        assert!(!ByteRange::new(1, 100).fits_within(100));
        assert!(!ByteRange::new(u64::MAX, 2).fits_within(u64::MAX));
    }

    #[test]
    fn test_free_space_plan_merges_and_clamps() {
        let plan = ScanPlan::free_space(
            "ext4",
            vec![
                ByteRange::new(4096, 4096),
                ByteRange::new(0, 1024),
                ByteRange::new(8192, 4096),
                ByteRange::new(60_000, 10_000),
            ],
            64_000,
        );

        assert_eq!(
            plan.extents(),
            &[
                ByteRange::new(0, 1024),
                ByteRange::new(4096, 8192),
                ByteRange::from_bounds(60_000, 64_000),
            ]
        );
        assert_eq!(plan.total_bytes(), 1024 + 8192 + 4000);
    }

    #[test]
    fn test_whole_device_plan_of_empty_device() {
        let plan = ScanPlan::whole_device(0);
        assert!(plan.extents().is_empty());
        assert_eq!(plan.coverage(), Coverage::WholeDevice);
    }
}
