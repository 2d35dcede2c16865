//! Volume entity
//!
//! An immutable snapshot of a mounted storage volume, taken per enumeration.

use serde::Serialize;

/// A mounted, addressable storage volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Volume {
    name: String,
    mount_point: String,
    total_space: u64,
    available_space: u64,
    file_system: String,
    is_removable: bool,
    /// Device node a scan of this volume reads from
    source_device: String,
}

impl Volume {
    pub fn new(
        name: impl Into<String>,
        mount_point: impl Into<String>,
        source_device: impl Into<String>,
        file_system: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            mount_point: mount_point.into(),
            total_space: 0,
            available_space: 0,
            file_system: file_system.into(),
            is_removable: false,
            source_device: source_device.into(),
        }
    }

    pub fn with_space(mut self, total_space: u64, available_space: u64) -> Self {
        self.total_space = total_space;
        self.available_space = available_space.min(total_space);
        self
    }

    pub fn removable(mut self, is_removable: bool) -> Self {
        self.is_removable = is_removable;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unique key of the volume
    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    pub fn total_space(&self) -> u64 {
        self.total_space
    }

    pub fn available_space(&self) -> u64 {
        self.available_space
    }

    pub fn file_system(&self) -> &str {
        &self.file_system
    }

    pub fn is_removable(&self) -> bool {
        self.is_removable
    }

    pub fn source_device(&self) -> &str {
        &self.source_device
    }

    pub fn used_space(&self) -> u64 {
        self.total_space - self.available_space
    }

    /// Used share of the capacity in percent; 0 for an empty volume
    pub fn used_percentage(&self) -> f64 {
        if self.total_space == 0 {
            return 0.0;
        }
        self.used_space() as f64 / self.total_space as f64 * 100.0
    }
}
