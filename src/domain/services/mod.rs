//! Domain services
//!
//! Core business logic services that operate on domain entities.

mod sector_scanner;
mod signature_catalog;

pub use sector_scanner::{
    DEFAULT_WINDOW_SIZE, ScanError, ScanObserver, ScanOutcome, ScanSummary, SectorScanner,
};
pub use signature_catalog::{HeaderHit, SignatureCatalog, default_rules};
