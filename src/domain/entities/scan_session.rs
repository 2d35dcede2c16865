//! Scan session state and progress

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// State machine of one scan session
///
/// `Idle -> Running -> Completed | Cancelled | Failed`. Terminal states are
/// final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Failed
        )
    }

    /// Whether the transition `self -> next` is allowed
    pub fn can_become(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Idle, SessionState::Running)
                | (
                    SessionState::Running,
                    SessionState::Completed | SessionState::Cancelled | SessionState::Failed
                )
        )
    }

    pub fn transition(&mut self, next: SessionState) -> Result<(), StateTransitionError> {
        if !self.can_become(next) {
            return Err(StateTransitionError {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Completed => "completed",
            SessionState::Cancelled => "cancelled",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid session transition {from} -> {to}")]
pub struct StateTransitionError {
    pub from: SessionState,
    pub to: SessionState,
}

/// Progress information during a scan
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanProgress {
    /// Total bytes to scan
    pub total_bytes: u64,
    /// Bytes scanned so far
    pub scanned_bytes: u64,
    /// Number of records emitted so far
    pub matches_found: usize,
    /// Estimated time remaining
    pub estimated_remaining: Option<Duration>,
    /// Current scan speed in bytes per second
    pub speed_bps: u64,
}

impl ScanProgress {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            ..Default::default()
        }
    }

    /// Returns the progress percentage (0.0 - 100.0)
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 100.0;
        }
        (self.scanned_bytes as f64 / self.total_bytes as f64 * 100.0).min(100.0)
    }

    pub fn update(&mut self, scanned_bytes: u64, matches_found: usize, elapsed: Duration) {
        self.scanned_bytes = scanned_bytes;
        self.matches_found = matches_found;

        let millis = elapsed.as_millis().max(1) as u64;
        self.speed_bps = scanned_bytes.saturating_mul(1000) / millis;

        if self.speed_bps > 0 {
            let remaining_bytes = self.total_bytes.saturating_sub(scanned_bytes);
            self.estimated_remaining = Some(Duration::from_secs(remaining_bytes / self.speed_bps));
        }
    }
}
