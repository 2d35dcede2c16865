//! Domain entities
//!
//! Plain data types with their own invariants: volumes, signatures,
//! records, extents and session state.

mod extent;
mod file_signature;
mod recovered_file;
mod scan_session;
mod volume;

pub use extent::{ByteRange, Coverage, ScanPlan};
pub use file_signature::{
    Category, Classification, EndRule, Endian, FieldWidth, LengthField, SignatureRule,
};
pub use recovered_file::{
    RecordStatus, RecoveredFileRecord, StatusTransitionError, format_bytes, location_descriptor,
};
pub use scan_session::{ScanProgress, SessionState, StateTransitionError};
pub use volume::Volume;
