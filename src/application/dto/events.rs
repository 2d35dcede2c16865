//! Scan events and payloads sent to consumers

use crate::domain::entities::{Category, RecordStatus, RecoveredFileRecord, Volume};
use crate::domain::services::{ScanOutcome, ScanSummary};
use serde::{Deserialize, Serialize};

/// A record as seen by consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFoundPayload {
    pub id: u64,
    pub name: String,
    pub original_path: String,
    pub size: u64,
    pub status: RecordStatus,
    pub category: Category,
}

impl From<&RecoveredFileRecord> for FileFoundPayload {
    fn from(record: &RecoveredFileRecord) -> Self {
        Self {
            id: record.id(),
            name: record.name().to_string(),
            original_path: record.original_path().to_string(),
            size: record.size(),
            status: record.status(),
            category: record.category(),
        }
    }
}

/// Final statistics attached to `scan_complete` and `scan_cancelled`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummaryPayload {
    pub files_found: u64,
    pub bytes_scanned: u64,
    pub unreadable_windows: usize,
}

impl From<&ScanSummary> for ScanSummaryPayload {
    fn from(summary: &ScanSummary) -> Self {
        Self {
            files_found: summary.records_emitted,
            bytes_scanned: summary.bytes_scanned,
            unreadable_windows: summary.unreadable_windows.len(),
        }
    }
}

/// Events of one scan, in emission order
///
/// Any number of `FileFound` events is followed by exactly one terminal
/// event. Serialized as `{"event": "file_found", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ScanEvent {
    FileFound(FileFoundPayload),
    ScanComplete(ScanSummaryPayload),
    ScanCancelled(ScanSummaryPayload),
    ScanFailed { message: String },
}

impl ScanEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScanEvent::FileFound(_))
    }

    /// Terminal event for a sweep that returned normally
    pub fn finished(summary: &ScanSummary) -> Self {
        match summary.outcome {
            ScanOutcome::Completed => ScanEvent::ScanComplete(summary.into()),
            ScanOutcome::Cancelled => ScanEvent::ScanCancelled(summary.into()),
        }
    }
}

/// A volume as seen by consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumePayload {
    pub name: String,
    pub mount_point: String,
    pub total_space: u64,
    pub available_space: u64,
    pub used_percentage: f64,
    pub file_system: String,
    pub is_removable: bool,
}

impl From<&Volume> for VolumePayload {
    fn from(volume: &Volume) -> Self {
        Self {
            name: volume.name().to_string(),
            mount_point: volume.mount_point().to_string(),
            total_space: volume.total_space(),
            available_space: volume.available_space(),
            used_percentage: volume.used_percentage(),
            file_system: volume.file_system().to_string(),
            is_removable: volume.is_removable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_file_found_wire_shape() {
        let event = ScanEvent::FileFound(FileFoundPayload {
            id: 1,
            name: "recovered_1.jpg".into(),
            original_path: "/dev/sdb1@0x0".into(),
            size: 20480,
            status: RecordStatus::Found,
            category: Category::Images,
        });

        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "event": "file_found",
                "payload": {
                    "id": 1,
                    "name": "recovered_1.jpg",
                    "original_path": "/dev/sdb1@0x0",
                    "size": 20480,
                    "status": "found",
                    "category": "images"
                }
            })
        );
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_failed_wire_shape() {
        let event = ScanEvent::ScanFailed {
            message: "device gone".into(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "scan_failed", "payload": {"message": "device gone"}})
        );
        assert!(event.is_terminal());
    }
}
