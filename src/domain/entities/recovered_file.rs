//! Recovered file record
//!
//! A candidate file discovered by the sector scanner. Identity and byte range
//! are fixed at discovery; only the status changes afterwards.

use super::extent::ByteRange;
use super::file_signature::Category;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle of a record from the consumer's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Found,
    Saved,
    Failed,
}

impl RecordStatus {
    /// Whether a record in this status may move to `next`
    pub fn can_become(&self, next: RecordStatus) -> bool {
        match (self, next) {
            (_, RecordStatus::Found) => false,
            (RecordStatus::Found | RecordStatus::Failed, _) => true,
            (RecordStatus::Saved, RecordStatus::Saved) => true,
            (RecordStatus::Saved, RecordStatus::Failed) => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Found => "found",
            RecordStatus::Saved => "saved",
            RecordStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("record {id} cannot move from {from} to {to}")]
pub struct StatusTransitionError {
    pub id: u64,
    pub from: RecordStatus,
    pub to: RecordStatus,
}

/// A discovered byte range believed to be a recoverable file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveredFileRecord {
    id: u64,
    name: String,
    original_path: String,
    category: Category,
    rule_id: String,
    range: ByteRange,
    source: String,
    status: RecordStatus,
}

impl RecoveredFileRecord {
    /// Creates a freshly found record
    pub fn new(
        id: u64,
        category: Category,
        extension: &str,
        rule_id: &str,
        range: ByteRange,
        source: &str,
    ) -> Self {
        Self {
            id,
            name: format!("recovered_{id}.{extension}"),
            original_path: location_descriptor(source, range.start()),
            category,
            rule_id: rule_id.to_string(),
            range,
            source: source.to_string(),
            status: RecordStatus::Found,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Synthesized display name, e.g. `recovered_7.jpg`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Best-effort location of the data; deleted files rarely keep their path
    pub fn original_path(&self) -> &str {
        &self.original_path
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    pub fn range(&self) -> ByteRange {
        self.range
    }

    pub fn size(&self) -> u64 {
        self.range.len()
    }

    /// Device or image the record was carved from
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn status(&self) -> RecordStatus {
        self.status
    }

    pub fn set_status(&mut self, status: RecordStatus) -> Result<(), StatusTransitionError> {
        if !self.status.can_become(status) {
            return Err(StatusTransitionError {
                id: self.id,
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        Ok(())
    }

    /// Returns a human-readable size string
    pub fn size_human(&self) -> String {
        format_bytes(self.size())
    }
}

/// `<source>@0x<offset>`
pub fn location_descriptor(source: &str, offset: u64) -> String {
    format!("{source}@{offset:#x}")
}

pub fn format_bytes(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{size} bytes")
    }
}
