//! Recover files use case
//!
//! Copies the byte range of a recovered file record from its source device
//! into a destination directory. Supports both sequential and parallel
//! batch processing.

use crate::application::dto::{BatchSaveReport, FileSaveResult, RecoveryOptions};
use crate::domain::entities::RecoveredFileRecord;
use crate::domain::repositories::{BlockDeviceError, BlockDeviceReader, FileWriterError};
use crate::infrastructure::block_device::FileBlockDevice;
use crate::infrastructure::persistence::LocalFileWriter;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur while saving one record
#[derive(Error, Debug)]
pub enum SaveError {
    /// The range no longer lies inside the device; nothing was written
    #[error("{name}: range {start}..{end} exceeds device size {device_size}")]
    Range {
        name: String,
        start: u64,
        end: u64,
        device_size: u64,
    },

    #[error("{name}: cannot read source: {source}")]
    Read {
        name: String,
        #[source]
        source: BlockDeviceError,
    },

    #[error("{name}: cannot write destination: {source}")]
    Write {
        name: String,
        #[source]
        source: FileWriterError,
    },
}

/// Coarse classification of a [`SaveError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveErrorKind {
    Range,
    Io,
}

impl SaveError {
    pub fn kind(&self) -> SaveErrorKind {
        match self {
            SaveError::Range { .. } => SaveErrorKind::Range,
            SaveError::Read { .. } | SaveError::Write { .. } => SaveErrorKind::Io,
        }
    }
}

/// A record written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    /// Final path, after collision suffixes
    pub path: PathBuf,
    pub bytes: u64,
    /// Hex SHA-256 of the written bytes
    pub sha256: String,
}

/// Restores records to a destination directory
#[derive(Debug, Clone, Default)]
pub struct RecoveryWriter {
    options: RecoveryOptions,
    writer: LocalFileWriter,
}

impl RecoveryWriter {
    pub fn new(options: RecoveryOptions) -> Self {
        Self {
            options,
            writer: LocalFileWriter::new(),
        }
    }

    /// Saves one record, reopening its source device
    pub fn save(
        &self,
        record: &RecoveredFileRecord,
        destination: &Path,
    ) -> Result<SaveOutcome, SaveError> {
        let device = FileBlockDevice::open(record.source()).map_err(|source| SaveError::Read {
            name: record.name().to_string(),
            source,
        })?;
        self.save_from(&device, record, destination)
    }

    /// Saves one record from an already opened device
    ///
    /// The range is checked against the current device size before any
    /// file is created. A copy that fails midway removes the partial file.
    pub fn save_from<R: BlockDeviceReader + ?Sized>(
        &self,
        device: &R,
        record: &RecoveredFileRecord,
        destination: &Path,
    ) -> Result<SaveOutcome, SaveError> {
        let range = record.range();
        let device_size = device.size();
        if !range.fits_within(device_size) {
            return Err(SaveError::Range {
                name: record.name().to_string(),
                start: range.start(),
                end: range.end(),
                device_size,
            });
        }

        let write_err = |source| SaveError::Write {
            name: record.name().to_string(),
            source,
        };
        let mut file = self
            .writer
            .reserve(destination, record.name())
            .map_err(write_err)?;

        let chunk = self.options.chunk_size.max(1) as u64;
        let mut offset = range.start();
        while offset < range.end() {
            let len = (range.end() - offset).min(chunk) as usize;
            let data = device
                .read_exact_at(offset, len)
                .map_err(|source| SaveError::Read {
                    name: record.name().to_string(),
                    source,
                })?;
            file.write_all(&data).map_err(write_err)?;
            offset += len as u64;
        }

        let result = file.commit(self.options.sync_on_commit).map_err(write_err)?;
        info!(
            "Saved {} ({} bytes) to {}",
            record.name(),
            result.saved_size,
            result.saved_path.display()
        );

        Ok(SaveOutcome {
            path: result.saved_path,
            bytes: result.saved_size,
            sha256: result.sha256,
        })
    }

    /// Saves records one after another; a failure never stops the batch
    pub fn save_batch(&self, records: &[RecoveredFileRecord], destination: &Path) -> BatchSaveReport {
        let started = Instant::now();
        info!("Saving {} files to {}", records.len(), destination.display());

        let mut report = BatchSaveReport::new(destination.to_path_buf());
        for record in records {
            report.push(self.save_one(record, destination));
        }

        report.duration = started.elapsed();
        info!("{} saved, {} failed", report.saved_count(), report.failed_count());
        report
    }

    /// Saves records in parallel (rayon)
    ///
    /// Names are claimed with exclusive creation, so concurrent saves of
    /// equally named records still land in distinct files.
    pub fn save_batch_parallel(
        &self,
        records: &[RecoveredFileRecord],
        destination: &Path,
    ) -> BatchSaveReport {
        let started = Instant::now();
        info!(
            "Saving {} files to {} (parallel mode)",
            records.len(),
            destination.display()
        );

        let files: Vec<FileSaveResult> = records
            .par_iter()
            .map(|record| self.save_one(record, destination))
            .collect();

        let mut report = BatchSaveReport::new(destination.to_path_buf());
        report.files = files;
        report.duration = started.elapsed();
        info!("{} saved, {} failed", report.saved_count(), report.failed_count());
        report
    }

    fn save_one(&self, record: &RecoveredFileRecord, destination: &Path) -> FileSaveResult {
        let result = self.save(record, destination);
        match &result {
            Ok(outcome) => debug!("{} -> {}", record.name(), outcome.path.display()),
            Err(e) => warn!("{e}"),
        }
        FileSaveResult {
            id: record.id(),
            name: record.name().to_string(),
            result,
        }
    }
}
