//! Command bridge
//!
//! The boundary a front end talks to: volume listing, scan start and
//! cancellation, folder selection and per-file saving. Payloads and events
//! are serde types so they can cross a process or IPC boundary as JSON.

use crate::application::dto::{ScanOptions, VolumePayload};
use crate::application::{
    RecoveryWriter, SaveError, SaveOutcome, ScanStart, SessionError, SessionRegistry,
};
use crate::config::Config;
use crate::domain::entities::RecordStatus;
use crate::domain::repositories::{EnumerationError, VolumeEnumerator};
use crate::infrastructure::volumes::platform_enumerator;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Enumeration(#[from] EnumerationError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("No recovered file named {name} at {original_path}")]
    UnknownRecord { name: String, original_path: String },

    #[error(transparent)]
    Save(#[from] SaveError),
}

/// Asks the user for a destination directory
pub trait FolderPicker: Send + Sync {
    /// `None` when the user cancels
    fn pick_folder(&self) -> Option<PathBuf>;
}

/// Picker for front ends without a dialog; always cancelled
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFolderPicker;

impl FolderPicker for NoFolderPicker {
    fn pick_folder(&self) -> Option<PathBuf> {
        None
    }
}

pub struct Bridge {
    enumerator: Box<dyn VolumeEnumerator>,
    registry: Arc<SessionRegistry>,
    writer: RecoveryWriter,
    picker: Box<dyn FolderPicker>,
    options: ScanOptions,
}

impl Bridge {
    pub fn new(config: &Config) -> Self {
        Self {
            enumerator: platform_enumerator(),
            registry: Arc::new(SessionRegistry::default()),
            writer: RecoveryWriter::new(config.recovery.clone()),
            picker: Box::new(NoFolderPicker),
            options: config.scan.clone(),
        }
    }

    pub fn with_enumerator(mut self, enumerator: Box<dyn VolumeEnumerator>) -> Self {
        self.enumerator = enumerator;
        self
    }

    pub fn with_folder_picker(mut self, picker: Box<dyn FolderPicker>) -> Self {
        self.picker = picker;
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn list_volumes(&self) -> Result<Vec<VolumePayload>, BridgeError> {
        let volumes = self.enumerator.list_volumes()?;
        Ok(volumes.iter().map(VolumePayload::from).collect())
    }

    /// Starts scanning a mount point, device node or image file
    ///
    /// A mount point is resolved to the device it is mounted from.
    pub fn start_scan(&self, disk_path: &str) -> Result<ScanStart, BridgeError> {
        let target = self.resolve_target(disk_path);
        debug!("start_scan({disk_path}) -> {target}");
        Ok(self.registry.start(&target, &self.options)?)
    }

    /// Requests cancellation of the running scan of `disk_path`
    pub fn cancel_scan(&self, disk_path: &str) -> bool {
        let target = self.resolve_target(disk_path);
        match self.registry.session(&target) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn select_folder(&self) -> Option<PathBuf> {
        self.picker.pick_folder()
    }

    /// Saves the record identified by its display name and location
    ///
    /// The record's status becomes `saved` or `failed` accordingly.
    pub fn save_file(
        &self,
        file_name: &str,
        original_path: &str,
        destination: &Path,
    ) -> Result<SaveOutcome, BridgeError> {
        let (session, record) = self
            .registry
            .find_record(file_name, original_path)
            .ok_or_else(|| BridgeError::UnknownRecord {
                name: file_name.to_string(),
                original_path: original_path.to_string(),
            })?;

        let result = self.writer.save(&record, destination);
        let status = if result.is_ok() {
            RecordStatus::Saved
        } else {
            RecordStatus::Failed
        };
        if let Err(e) = session.set_status(record.id(), status) {
            debug!("Status of {file_name} unchanged: {e}");
        }
        Ok(result?)
    }

    fn resolve_target(&self, disk_path: &str) -> String {
        let wanted = trim_separator(disk_path);
        match self.enumerator.list_volumes() {
            Ok(volumes) => volumes
                .iter()
                .find(|v| trim_separator(v.mount_point()) == wanted)
                .map(|v| v.source_device().to_string())
                .unwrap_or_else(|| disk_path.to_string()),
            Err(e) => {
                warn!("Cannot resolve {disk_path} against mounted volumes: {e}");
                disk_path.to_string()
            }
        }
    }
}

fn trim_separator(path: &str) -> &str {
    let trimmed = path.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() || trimmed.ends_with(':') {
        path
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_separator() {
        assert_eq!(trim_separator("/media/usb/"), "/media/usb");
        assert_eq!(trim_separator("/"), "/");
        assert_eq!(trim_separator("C:\\"), "C:\\");
    }
}
