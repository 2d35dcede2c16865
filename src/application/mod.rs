//! Application layer
//!
//! Use cases and application services that orchestrate domain logic.

pub mod dto;
mod plan_extents;
mod recover_files;
mod scan_session;

pub use plan_extents::ExtentPlanner;
pub use recover_files::{RecoveryWriter, SaveError, SaveErrorKind, SaveOutcome};
pub use scan_session::{
    EventStream, RecordError, ScanStart, SessionError, SessionHandle, SessionRegistry,
};
