//! Data Transfer Objects

mod events;
mod save_report;
mod scan_options;

pub use events::{FileFoundPayload, ScanEvent, ScanSummaryPayload, VolumePayload};
pub use save_report::{BatchSaveReport, FileSaveResult};
pub use scan_options::{
    ExtentMode, IoMode, OptionsError, RecoveryOptions, SECTOR_SIZE, ScanOptions,
};
