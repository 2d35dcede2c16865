//! Shared fixtures for integration tests
#![allow(dead_code)]

use salvage::domain::repositories::{BlockDeviceError, BlockDeviceReader};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// In-memory device with injectable faults
pub struct MemoryDevice {
    path: String,
    data: Vec<u8>,
    bad: Vec<Range<u64>>,
    vanish_after: Option<usize>,
    delay: Option<Duration>,
    reads: AtomicUsize,
}

impl MemoryDevice {
    pub fn new(path: &str, data: Vec<u8>) -> Self {
        Self {
            path: path.to_string(),
            data,
            bad: Vec::new(),
            vanish_after: None,
            delay: None,
            reads: AtomicUsize::new(0),
        }
    }

    /// Reads touching `range` fail with a non-fatal error
    pub fn with_bad_range(mut self, range: Range<u64>) -> Self {
        self.bad.push(range);
        self
    }

    /// Every read after the first `reads` reports the device as gone
    pub fn vanish_after(mut self, reads: usize) -> Self {
        self.vanish_after = Some(reads);
        self
    }

    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl BlockDeviceReader for MemoryDevice {
    fn open(path: &str) -> Result<Self, BlockDeviceError> {
        Err(BlockDeviceError::DeviceNotFound(path.to_string()))
    }

    fn read_at(&self, offset: u64, length: usize) -> Result<Vec<u8>, BlockDeviceError> {
        let count = self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.vanish_after.is_some_and(|limit| count >= limit) {
            return Err(BlockDeviceError::DeviceGone(self.path.clone()));
        }
        let size = self.data.len() as u64;
        if offset >= size {
            return Err(BlockDeviceError::InvalidOffset {
                offset,
                device_size: size,
            });
        }
        let end = (offset + length as u64).min(size);
        if self.bad.iter().any(|r| offset < r.end && end > r.start) {
            return Err(BlockDeviceError::ReadError {
                offset,
                message: "injected bad sector".into(),
            });
        }
        Ok(self.data[offset as usize..end as usize].to_vec())
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// JFIF JPEG of exactly `len` bytes: header, zero filler, EOI marker
pub fn jpeg(len: usize) -> Vec<u8> {
    assert!(len >= 6);
    let mut data = vec![0u8; len];
    data[..4].copy_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
    data[len - 2..].copy_from_slice(&[0xFF, 0xD9]);
    data
}

/// JPEG header with no end marker
pub fn truncated_jpeg(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    data[..4].copy_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
    data
}

/// RIFF/WAVE file whose header records `len` total bytes
pub fn wav(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    data[..4].copy_from_slice(b"RIFF");
    data[4..8].copy_from_slice(&((len - 8) as u32).to_le_bytes());
    data[8..12].copy_from_slice(b"WAVE");
    data[12..16].copy_from_slice(b"fmt ");
    data
}

/// `ftyp` box followed by an `mdat` box carrying `payload` bytes
pub fn mp4(payload: usize) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&24u32.to_be_bytes());
    data.extend_from_slice(b"ftypisom");
    data.extend_from_slice(&[0, 0, 2, 0]);
    data.extend_from_slice(b"isommp41");
    data.extend_from_slice(&((payload + 8) as u32).to_be_bytes());
    data.extend_from_slice(b"mdat");
    data.resize(data.len() + payload, 0);
    data
}

/// Zero-filled image of `size` bytes with blobs placed at offsets
pub fn image(size: usize, blobs: &[(usize, Vec<u8>)]) -> Vec<u8> {
    let mut data = vec![0u8; size];
    for (offset, blob) in blobs {
        data[*offset..*offset + blob.len()].copy_from_slice(blob);
    }
    data
}

pub fn write_image(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, data).unwrap();
    path
}
