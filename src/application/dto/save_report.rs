//! Batch save report DTO

use crate::application::{SaveError, SaveOutcome};
use crate::domain::entities::format_bytes;
use std::path::PathBuf;
use std::time::Duration;

/// Result of saving one record
#[derive(Debug)]
pub struct FileSaveResult {
    pub id: u64,
    pub name: String,
    pub result: Result<SaveOutcome, SaveError>,
}

/// Result of a batch save
#[derive(Debug)]
pub struct BatchSaveReport {
    /// Output directory
    pub destination: PathBuf,
    /// Per-file results, in input order
    pub files: Vec<FileSaveResult>,
    /// Duration of the operation
    pub duration: Duration,
}

impl BatchSaveReport {
    pub fn new(destination: PathBuf) -> Self {
        Self {
            destination,
            files: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn push(&mut self, result: FileSaveResult) {
        self.files.push(result);
    }

    pub fn saved_count(&self) -> usize {
        self.files.iter().filter(|f| f.result.is_ok()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.files.len() - self.saved_count()
    }

    /// Total bytes written
    pub fn bytes_saved(&self) -> u64 {
        self.files
            .iter()
            .filter_map(|f| f.result.as_ref().ok())
            .map(|outcome| outcome.bytes)
            .sum()
    }

    /// Returns success rate (0.0 - 1.0)
    pub fn success_rate(&self) -> f64 {
        if self.files.is_empty() {
            return 1.0;
        }
        self.saved_count() as f64 / self.files.len() as f64
    }

    /// Returns a summary string
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Saved {} of {} files ({}) to {} in {:.2}s\n",
            self.saved_count(),
            self.files.len(),
            format_bytes(self.bytes_saved()),
            self.destination.display(),
            self.duration.as_secs_f64()
        );

        for file in &self.files {
            if let Err(err) = &file.result {
                summary.push_str(&format!("  - {}: {}\n", file.name, err));
            }
        }

        summary
    }
}
