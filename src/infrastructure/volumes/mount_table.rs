//! Linux volume enumeration from the mount table

use crate::domain::entities::Volume;
use crate::domain::repositories::{EnumerationError, VolumeEnumerator};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const PSEUDO_FILESYSTEMS: &[&str] = &[
    "autofs",
    "binfmt_misc",
    "bpf",
    "configfs",
    "debugfs",
    "devpts",
    "devtmpfs",
    "efivarfs",
    "fusectl",
    "hugetlbfs",
    "mqueue",
    "nsfs",
    "overlay",
    "proc",
    "pstore",
    "ramfs",
    "rpc_pipefs",
    "securityfs",
    "squashfs",
    "sysfs",
    "tmpfs",
    "tracefs",
];

/// One parsed line of the mount table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub source: String,
    pub mount_point: String,
    pub fs_type: String,
}

impl MountEntry {
    /// Backed by a device node and not a pseudo filesystem
    pub fn is_storage(&self) -> bool {
        self.source.starts_with("/dev/")
            && !self.fs_type.starts_with("cgroup")
            && !PSEUDO_FILESYSTEMS.contains(&self.fs_type.as_str())
    }
}

/// Parses `/proc/self/mounts` content; malformed lines are skipped
pub fn parse_mounts(content: &str) -> Vec<MountEntry> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let mount_point = fields.next()?;
            let fs_type = fields.next()?;
            Some(MountEntry {
                source: unescape(source),
                mount_point: unescape(mount_point),
                fs_type: fs_type.to_string(),
            })
        })
        .collect()
}

/// Decodes the `\ooo` octal escapes the kernel uses for whitespace
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Lists mounted block-device volumes on Linux
#[derive(Debug, Clone)]
pub struct MountTableEnumerator {
    mounts_path: PathBuf,
    sys_class_block: PathBuf,
}

impl Default for MountTableEnumerator {
    fn default() -> Self {
        Self::new("/proc/self/mounts", "/sys/class/block")
    }
}

impl MountTableEnumerator {
    pub fn new(mounts_path: impl Into<PathBuf>, sys_class_block: impl Into<PathBuf>) -> Self {
        Self {
            mounts_path: mounts_path.into(),
            sys_class_block: sys_class_block.into(),
        }
    }

    /// Reads the removable flag of a device, falling back to the parent
    /// disk for partitions
    fn is_removable(&self, device_name: &str) -> bool {
        let node = self.sys_class_block.join(device_name);
        if let Some(flag) = read_flag(&node.join("removable")) {
            return flag;
        }
        fs::canonicalize(&node)
            .ok()
            .and_then(|real| real.parent().and_then(|p| read_flag(&p.join("removable"))))
            .unwrap_or(false)
    }

    fn volume(&self, entry: &MountEntry) -> io::Result<Volume> {
        let stats = rustix::fs::statvfs(entry.mount_point.as_str())?;
        let total = stats.f_blocks.saturating_mul(stats.f_frsize);
        let available = stats.f_bavail.saturating_mul(stats.f_frsize);

        let name = Path::new(&entry.source)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| entry.source.clone());
        let removable = self.is_removable(&name);

        Ok(Volume::new(&name, &entry.mount_point, &entry.source, &entry.fs_type)
            .with_space(total, available)
            .removable(removable))
    }
}

fn read_flag(path: &Path) -> Option<bool> {
    fs::read_to_string(path)
        .ok()
        .map(|value| value.trim() == "1")
}

impl VolumeEnumerator for MountTableEnumerator {
    fn list_volumes(&self) -> Result<Vec<Volume>, EnumerationError> {
        let content =
            fs::read_to_string(&self.mounts_path).map_err(|source| EnumerationError::MountTable {
                path: self.mounts_path.display().to_string(),
                source,
            })?;

        let mut entries: Vec<MountEntry> = Vec::new();
        for entry in parse_mounts(&content).into_iter().filter(MountEntry::is_storage) {
            // a later mount hides the earlier one at the same point
            match entries.iter_mut().find(|e| e.mount_point == entry.mount_point) {
                Some(existing) => *existing = entry,
                None => entries.push(entry),
            }
        }

        let mut volumes = Vec::with_capacity(entries.len());
        for entry in &entries {
            match self.volume(entry) {
                Ok(volume) => volumes.push(volume),
                Err(e) => warn!("Skipping {} at {}: {e}", entry.source, entry.mount_point),
            }
        }

        debug!("Found {} volumes in {}", volumes.len(), self.mounts_path.display());
        Ok(volumes)
    }
}
