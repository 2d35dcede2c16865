//! Scan session use case
//!
//! Runs one sector scan per volume on a dedicated thread and streams its
//! events to the consumer over a bounded channel. The registry keeps the
//! latest session of every volume so its records stay addressable for
//! saving after the scan ends.

use crate::application::dto::{
    FileFoundPayload, IoMode, OptionsError, ScanEvent, ScanOptions,
};
use crate::application::plan_extents::ExtentPlanner;
use crate::domain::entities::{
    RecordStatus, RecoveredFileRecord, ScanProgress, SessionState, StatusTransitionError,
};
use crate::domain::repositories::{BlockDeviceError, BlockDeviceReader, FileSystemError};
use crate::domain::services::{
    ScanError, ScanObserver, ScanOutcome, ScanSummary, SectorScanner, SignatureCatalog,
};
use crate::infrastructure::block_device::{FileBlockDevice, MmapBlockDevice};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashMap;
use std::io;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Errors raised when starting a scan
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("A scan of {volume} is already running")]
    AlreadyRunning { volume: String },

    #[error("Cannot open scan target: {0}")]
    Open(#[from] BlockDeviceError),

    #[error("Invalid scan options: {0}")]
    InvalidOptions(#[from] OptionsError),

    #[error("Cannot start scan thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Errors raised when updating a record of a session
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RecordError {
    #[error("No record with id {0}")]
    Unknown(u64),

    #[error(transparent)]
    Transition(#[from] StatusTransitionError),
}

/// Why a running scan ended in `failed`
#[derive(Error, Debug)]
enum RunError {
    #[error("Cannot plan scan extents: {0}")]
    Plan(#[from] FileSystemError),

    #[error(transparent)]
    Scan(#[from] ScanError),
}

struct SessionShared {
    id: u64,
    source: String,
    state: RwLock<SessionState>,
    records: RwLock<Vec<RecoveredFileRecord>>,
    progress: RwLock<ScanProgress>,
    cancel: AtomicBool,
    finished: Mutex<bool>,
    done: Condvar,
}

impl SessionShared {
    fn new(id: u64, source: &str) -> Self {
        Self {
            id,
            source: source.to_string(),
            state: RwLock::new(SessionState::Idle),
            records: RwLock::new(Vec::new()),
            progress: RwLock::new(ScanProgress::default()),
            cancel: AtomicBool::new(false),
            finished: Mutex::new(false),
            done: Condvar::new(),
        }
    }

    fn transition(&self, next: SessionState) {
        if let Err(e) = self.state.write().transition(next) {
            error!("Session {}: {e}", self.id);
        }
    }

    fn mark_finished(&self) {
        *self.finished.lock() = true;
        self.done.notify_all();
    }
}

/// Shared view of one scan session
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionShared>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.inner.id)
            .field("source", &self.inner.source)
            .field("state", &self.state())
            .finish()
    }
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Device or image the session reads
    pub fn source(&self) -> &str {
        &self.inner.source
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.read()
    }

    /// Requests a cooperative stop
    ///
    /// The scanner finishes the window it is reading, then ends with
    /// `scan_cancelled`. Records already emitted are kept.
    pub fn cancel(&self) {
        self.inner.cancel.store(true, Ordering::Release);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.inner.cancel.load(Ordering::Acquire)
    }

    /// Snapshot of the records emitted so far, in discovery order
    pub fn records(&self) -> Vec<RecoveredFileRecord> {
        self.inner.records.read().clone()
    }

    pub fn record(&self, id: u64) -> Option<RecoveredFileRecord> {
        self.inner.records.read().iter().find(|r| r.id() == id).cloned()
    }

    pub fn find_record(&self, name: &str, original_path: &str) -> Option<RecoveredFileRecord> {
        self.inner
            .records
            .read()
            .iter()
            .find(|r| r.name() == name && r.original_path() == original_path)
            .cloned()
    }

    pub fn set_status(&self, id: u64, status: RecordStatus) -> Result<(), RecordError> {
        let mut records = self.inner.records.write();
        let record = records
            .iter_mut()
            .find(|r| r.id() == id)
            .ok_or(RecordError::Unknown(id))?;
        record.set_status(status)?;
        Ok(())
    }

    pub fn progress(&self) -> ScanProgress {
        self.inner.progress.read().clone()
    }

    /// Blocks until the scan thread has delivered its terminal event
    ///
    /// The events must be drained (or the stream dropped) for the scan
    /// to get there.
    pub fn wait(&self) -> SessionState {
        let mut finished = self.inner.finished.lock();
        while !*finished {
            self.inner.done.wait(&mut finished);
        }
        self.state()
    }
}

/// Receiving end of a session's events
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<ScanEvent>,
}

impl EventStream {
    /// Next event; `None` once the terminal event has been received
    pub async fn recv(&mut self) -> Option<ScanEvent> {
        self.rx.recv().await
    }

    /// Blocking variant of [`EventStream::recv`]; not for async contexts
    pub fn blocking_recv(&mut self) -> Option<ScanEvent> {
        self.rx.blocking_recv()
    }

    /// Drains the stream up to and including the terminal event
    pub fn collect_blocking(mut self) -> Vec<ScanEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.blocking_recv() {
            events.push(event);
        }
        events
    }
}

/// A started session
#[derive(Debug)]
pub struct ScanStart {
    pub handle: SessionHandle,
    pub events: EventStream,
}

/// Feeds scanner output into the session and the event channel
struct SessionSink<'a> {
    shared: &'a SessionShared,
    tx: &'a mpsc::Sender<ScanEvent>,
}

impl ScanObserver for SessionSink<'_> {
    fn on_found(&mut self, record: RecoveredFileRecord) -> ControlFlow<()> {
        // matches confirmed after cancel() are dropped
        if self.shared.cancel.load(Ordering::Acquire) {
            return ControlFlow::Break(());
        }

        // pushed before sending so a consumer reacting to the event finds it
        let event = ScanEvent::FileFound(FileFoundPayload::from(&record));
        self.shared.records.write().push(record);

        match self.tx.blocking_send(event) {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => {
                // never announced: the session keeps only delivered records
                self.shared.records.write().pop();
                ControlFlow::Break(())
            }
        }
    }

    fn on_progress(&mut self, progress: &ScanProgress) {
        *self.shared.progress.write() = progress.clone();
    }
}

/// Per-volume registry of scan sessions
pub struct SessionRegistry {
    catalog: Arc<SignatureCatalog>,
    planner: Arc<ExtentPlanner>,
    sessions: Mutex<HashMap<String, Arc<SessionShared>>>,
    next_session: AtomicU64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(
            Arc::new(SignatureCatalog::default_catalog()),
            Arc::new(ExtentPlanner::default()),
        )
    }
}

impl SessionRegistry {
    pub fn new(catalog: Arc<SignatureCatalog>, planner: Arc<ExtentPlanner>) -> Self {
        Self {
            catalog,
            planner,
            sessions: Mutex::new(HashMap::new()),
            next_session: AtomicU64::new(1),
        }
    }

    /// Opens `target` and starts scanning it
    pub fn start(&self, target: &str, options: &ScanOptions) -> Result<ScanStart, SessionError> {
        options.validate()?;
        match options.io_mode {
            IoMode::Buffered => self.start_with(FileBlockDevice::open(target)?, options),
            IoMode::Mmap => self.start_with(MmapBlockDevice::open(target)?, options),
        }
    }

    /// Starts scanning an already opened device
    ///
    /// Fails with [`SessionError::AlreadyRunning`] while another session of
    /// the same device is running; that session is left untouched. A
    /// finished session of the device is replaced.
    pub fn start_with<R>(&self, device: R, options: &ScanOptions) -> Result<ScanStart, SessionError>
    where
        R: BlockDeviceReader + 'static,
    {
        options.validate()?;
        let key = session_key(device.path());

        let mut sessions = self.sessions.lock();
        if sessions
            .get(&key)
            .is_some_and(|s| *s.state.read() == SessionState::Running)
        {
            return Err(SessionError::AlreadyRunning { volume: key });
        }

        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(SessionShared::new(id, device.path()));
        shared.transition(SessionState::Running);

        let catalog = if options.categories.is_empty() {
            Arc::clone(&self.catalog)
        } else {
            Arc::new(self.catalog.with_categories(&options.categories))
        };
        let (tx, rx) = mpsc::channel(options.event_capacity);
        let job = SessionJob {
            shared: Arc::clone(&shared),
            planner: Arc::clone(&self.planner),
            scanner: SectorScanner::new(catalog, options.window_size),
            options: options.clone(),
        };

        let spawned = std::thread::Builder::new()
            .name(format!("scan-{id}"))
            .spawn(move || job.run(device, tx));
        if let Err(e) = spawned {
            shared.transition(SessionState::Failed);
            shared.mark_finished();
            return Err(SessionError::Spawn(e));
        }

        info!("Session {id} started on {}", shared.source);
        sessions.insert(key, Arc::clone(&shared));

        Ok(ScanStart {
            handle: SessionHandle { inner: shared },
            events: EventStream { rx },
        })
    }

    /// Latest session of a volume
    pub fn session(&self, volume: &str) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .get(&session_key(volume))
            .map(|inner| SessionHandle {
                inner: Arc::clone(inner),
            })
    }

    pub fn sessions(&self) -> Vec<SessionHandle> {
        let mut handles: Vec<SessionHandle> = self
            .sessions
            .lock()
            .values()
            .map(|inner| SessionHandle {
                inner: Arc::clone(inner),
            })
            .collect();
        handles.sort_by_key(SessionHandle::id);
        handles
    }

    /// Looks a record up by its display name and location across sessions
    pub fn find_record(
        &self,
        name: &str,
        original_path: &str,
    ) -> Option<(SessionHandle, RecoveredFileRecord)> {
        self.sessions()
            .into_iter()
            .rev()
            .find_map(|handle| {
                let record = handle.find_record(name, original_path)?;
                Some((handle, record))
            })
    }

    /// Cancels and forgets the session of a volume
    pub fn release(&self, volume: &str) -> Option<SessionHandle> {
        let inner = self.sessions.lock().remove(&session_key(volume))?;
        let handle = SessionHandle { inner };
        handle.cancel();
        Some(handle)
    }
}

/// Everything the scan thread owns
struct SessionJob {
    shared: Arc<SessionShared>,
    planner: Arc<ExtentPlanner>,
    scanner: SectorScanner,
    options: ScanOptions,
}

impl SessionJob {
    fn run<R: BlockDeviceReader>(self, device: R, tx: mpsc::Sender<ScanEvent>) {
        let shared = &self.shared;

        let (state, event) = match self.sweep(&device, &tx) {
            Ok(summary) => {
                let state = match summary.outcome {
                    ScanOutcome::Completed => SessionState::Completed,
                    ScanOutcome::Cancelled => SessionState::Cancelled,
                };
                info!(
                    "Session {} {state}: {} records, {} bytes",
                    shared.id, summary.records_emitted, summary.bytes_scanned
                );
                (state, ScanEvent::finished(&summary))
            }
            Err(e) => {
                error!("Session {} failed: {e}", shared.id);
                (
                    SessionState::Failed,
                    ScanEvent::ScanFailed {
                        message: e.to_string(),
                    },
                )
            }
        };

        // state first: a consumer seeing the event must see the final state
        shared.transition(state);
        if tx.blocking_send(event).is_err() {
            debug!("Session {}: consumer gone before terminal event", shared.id);
        }
        drop(tx);
        shared.mark_finished();
    }

    fn sweep<R: BlockDeviceReader>(
        &self,
        device: &R,
        tx: &mpsc::Sender<ScanEvent>,
    ) -> Result<ScanSummary, RunError> {
        let plan = self.planner.plan(device, self.options.extent_mode)?;
        *self.shared.progress.write() = ScanProgress::new(plan.total_bytes());

        let mut sink = SessionSink {
            shared: &self.shared,
            tx,
        };
        Ok(self
            .scanner
            .scan(device, &plan, &self.shared.cancel, &mut sink)?)
    }
}

/// Sessions are keyed by the canonical device path when it exists
fn session_key(path: &str) -> String {
    std::fs::canonicalize(path)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| path.to_string())
}
