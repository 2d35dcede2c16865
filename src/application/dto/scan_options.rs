//! Scan and recovery options DTOs

use crate::domain::entities::Category;
use crate::domain::services::DEFAULT_WINDOW_SIZE;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Windows must be whole sectors
pub const SECTOR_SIZE: usize = 512;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("window size {0} must be a non-zero multiple of {SECTOR_SIZE}")]
    WindowSize(usize),

    #[error("event capacity must be at least 1")]
    EventCapacity,

    #[error("chunk size must be a non-zero multiple of {SECTOR_SIZE}")]
    ChunkSize(usize),
}

/// Which part of the device a scan sweeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtentMode {
    /// Free space when a supported filesystem is found, else everything
    #[default]
    Auto,
    /// Free space only; fails when no supported filesystem is found
    FreeSpace,
    WholeDevice,
}

/// How the source device is read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoMode {
    #[default]
    Buffered,
    /// Memory-map the source; suited to image files
    Mmap,
}

/// Options for scanning a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Bytes read per window
    pub window_size: usize,
    pub extent_mode: ExtentMode,
    /// Categories to look for (empty = all)
    pub categories: Vec<Category>,
    /// Events buffered before the scanner blocks
    pub event_capacity: usize,
    pub io_mode: IoMode,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            extent_mode: ExtentMode::Auto,
            categories: Vec::new(),
            event_capacity: 256,
            io_mode: IoMode::Buffered,
        }
    }
}

impl ScanOptions {
    pub fn with_window_size(mut self, size: usize) -> Self {
        self.window_size = size;
        self
    }

    pub fn with_extent_mode(mut self, mode: ExtentMode) -> Self {
        self.extent_mode = mode;
        self
    }

    /// Sets the categories to search for
    pub fn with_categories(mut self, categories: Vec<Category>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn with_io_mode(mut self, mode: IoMode) -> Self {
        self.io_mode = mode;
        self
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.window_size == 0 || self.window_size % SECTOR_SIZE != 0 {
            return Err(OptionsError::WindowSize(self.window_size));
        }
        if self.event_capacity == 0 {
            return Err(OptionsError::EventCapacity);
        }
        Ok(())
    }
}

/// Options for restoring records to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryOptions {
    /// Bytes copied per read
    pub chunk_size: usize,
    /// fsync each file before reporting success
    pub sync_on_commit: bool,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1024 * 1024,
            sync_on_commit: true,
        }
    }
}

impl RecoveryOptions {
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync_on_commit = sync;
        self
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.chunk_size == 0 || self.chunk_size % SECTOR_SIZE != 0 {
            return Err(OptionsError::ChunkSize(self.chunk_size));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ScanOptions::default().validate().is_ok());
        assert!(RecoveryOptions::default().validate().is_ok());
    }

    #[test]
    fn test_window_must_be_sector_multiple() {
        let options = ScanOptions::default().with_window_size(1000);
        assert_eq!(options.validate(), Err(OptionsError::WindowSize(1000)));
        assert!(ScanOptions::default().with_window_size(4096).validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let options = ScanOptions::default().with_event_capacity(0);
        assert_eq!(options.validate(), Err(OptionsError::EventCapacity));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options: ScanOptions =
            serde_json::from_str(r#"{"extent_mode":"whole_device","categories":["images"]}"#)
                .unwrap();
        assert_eq!(options.extent_mode, ExtentMode::WholeDevice);
        assert_eq!(options.categories, vec![Category::Images]);
        assert_eq!(options.window_size, DEFAULT_WINDOW_SIZE);
    }
}
