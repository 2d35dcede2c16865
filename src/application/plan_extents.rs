//! Extent planning use case
//!
//! Decides which byte ranges of a device a scan sweeps.

use crate::application::dto::ExtentMode;
use crate::domain::entities::ScanPlan;
use crate::domain::repositories::{BlockDeviceReader, FileSystemError, FreeSpaceProbe};
use crate::infrastructure::file_systems::default_probes;
use tracing::{info, warn};

/// Chooses between free-space extents and the whole device
pub struct ExtentPlanner {
    probes: Vec<Box<dyn FreeSpaceProbe>>,
}

impl Default for ExtentPlanner {
    fn default() -> Self {
        Self::new(default_probes())
    }
}

impl ExtentPlanner {
    pub fn new(probes: Vec<Box<dyn FreeSpaceProbe>>) -> Self {
        Self { probes }
    }

    /// Builds the scan plan for `device`
    ///
    /// In [`ExtentMode::Auto`] a probe failure is logged and the whole
    /// device is swept instead. [`ExtentMode::FreeSpace`] reports it.
    pub fn plan(
        &self,
        device: &dyn BlockDeviceReader,
        mode: ExtentMode,
    ) -> Result<ScanPlan, FileSystemError> {
        let size = device.size();
        if mode == ExtentMode::WholeDevice {
            return Ok(ScanPlan::whole_device(size));
        }

        for probe in &self.probes {
            let name = probe.filesystem().name();
            match probe.free_extents(device) {
                Ok(Some(extents)) => {
                    let plan = ScanPlan::free_space(name, extents, size);
                    info!(
                        "{}: sweeping {} free bytes of {name}",
                        device.path(),
                        plan.total_bytes()
                    );
                    return Ok(plan);
                }
                Ok(None) => continue,
                Err(e) if mode == ExtentMode::Auto => {
                    warn!("{}: {name} free-space map unusable: {e}", device.path());
                }
                Err(e) => return Err(e),
            }
        }

        match mode {
            ExtentMode::FreeSpace => Err(FileSystemError::NoFileSystem),
            _ => {
                info!("{}: no free-space map, sweeping whole device", device.path());
                Ok(ScanPlan::whole_device(size))
            }
        }
    }
}
