//! Sector scanner
//!
//! Sweeps the extents of a scan plan in fixed-size windows, looks for
//! signature headers and resolves each candidate to a bounded byte range.
//! Headers that straddle a window boundary are caught by carrying the tail
//! of each window into the next one.

use crate::domain::entities::{
    ByteRange, EndRule, Endian, FieldWidth, LengthField, RecoveredFileRecord, ScanPlan,
    ScanProgress, SignatureRule,
};
use crate::domain::repositories::{BlockDeviceError, BlockDeviceReader};
use crate::domain::services::SignatureCatalog;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use memchr::memmem;
use serde::Serialize;
use std::borrow::Cow;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default window size (1 MiB)
pub const DEFAULT_WINDOW_SIZE: usize = 1024 * 1024;

/// Chunk size used when a footer search runs past the current window
const SEARCH_CHUNK: usize = 256 * 1024;

/// Errors raised while sweeping a device
#[derive(Error, Debug)]
pub enum ScanError {
    /// One window could not be read; the sweep continues past it
    #[error("Unreadable window at offset {offset}: {source}")]
    Io {
        offset: u64,
        #[source]
        source: BlockDeviceError,
    },

    /// The device can no longer be read
    #[error("Device {device} failed at offset {offset}: {message}")]
    Fatal {
        device: String,
        offset: u64,
        message: String,
    },
}

/// How a sweep ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanOutcome {
    Completed,
    Cancelled,
}

/// Statistics of a finished sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub outcome: ScanOutcome,
    pub bytes_scanned: u64,
    pub windows_read: u64,
    /// Start offsets of windows skipped after a read error
    pub unreadable_windows: Vec<u64>,
    /// Records the observer accepted
    pub records_emitted: u64,
}

impl ScanSummary {
    fn new() -> Self {
        Self {
            outcome: ScanOutcome::Completed,
            bytes_scanned: 0,
            windows_read: 0,
            unreadable_windows: Vec::new(),
            records_emitted: 0,
        }
    }
}

/// Receives records as the scanner confirms them
///
/// Returning `ControlFlow::Break` refuses the record and stops the sweep as
/// if it was cancelled.
pub trait ScanObserver {
    fn on_found(&mut self, record: RecoveredFileRecord) -> ControlFlow<()>;

    /// Called after every window
    fn on_progress(&mut self, _progress: &ScanProgress) {}
}

impl<F> ScanObserver for F
where
    F: FnMut(RecoveredFileRecord) -> ControlFlow<()>,
{
    fn on_found(&mut self, record: RecoveredFileRecord) -> ControlFlow<()> {
        self(record)
    }
}

/// The buffer under inspection and its absolute position on the device
struct Lookahead<'a> {
    data: &'a [u8],
    base: u64,
}

impl Lookahead<'_> {
    fn slice(&self, offset: u64, len: usize) -> Option<&[u8]> {
        let rel = usize::try_from(offset.checked_sub(self.base)?).ok()?;
        self.data.get(rel..rel.checked_add(len)?)
    }

    fn end(&self) -> u64 {
        self.base + self.data.len() as u64
    }
}

/// Windowed signature scanner over a block device
pub struct SectorScanner {
    catalog: Arc<SignatureCatalog>,
    window_size: usize,
    search_chunk: usize,
    first_id: u64,
}

impl SectorScanner {
    pub fn new(catalog: Arc<SignatureCatalog>, window_size: usize) -> Self {
        Self {
            catalog,
            window_size: window_size.max(1),
            search_chunk: SEARCH_CHUNK,
            first_id: 1,
        }
    }

    /// Sets the id given to the first record
    pub fn with_first_id(mut self, first_id: u64) -> Self {
        self.first_id = first_id;
        self
    }

    /// Sweeps every extent of `plan` and reports records in offset order
    ///
    /// `cancel` is checked before each window is read, never in the middle
    /// of one. Read errors on a single window are logged and skipped; an
    /// error that means the device is gone ends the sweep with
    /// [`ScanError::Fatal`].
    pub fn scan<R: BlockDeviceReader + ?Sized>(
        &self,
        device: &R,
        plan: &ScanPlan,
        cancel: &AtomicBool,
        observer: &mut dyn ScanObserver,
    ) -> Result<ScanSummary, ScanError> {
        let started = Instant::now();
        let device_size = device.size();
        let overlap = self.catalog.max_span().saturating_sub(1);
        let mut progress = ScanProgress::new(plan.total_bytes());
        let mut summary = ScanSummary::new();
        let mut next_id = self.first_id;

        info!(
            "Scanning {} ({} bytes in {} extents)",
            device.path(),
            plan.total_bytes(),
            plan.extents().len()
        );

        for extent in plan.extents() {
            let extent = extent.clamp_to(device_size);
            let mut cursor = extent.start();
            let mut carry: Vec<u8> = Vec::new();

            while cursor < extent.end() {
                if cancel.load(Ordering::Acquire) {
                    info!("Scan of {} cancelled at offset {cursor:#x}", device.path());
                    summary.outcome = ScanOutcome::Cancelled;
                    return Ok(summary);
                }

                let wanted = (extent.end() - cursor).min(self.window_size as u64) as usize;
                let data = match device.read_at(cursor, wanted) {
                    Ok(data) => data,
                    Err(source) if source.is_fatal() => {
                        return Err(ScanError::Fatal {
                            device: device.path().to_string(),
                            offset: cursor,
                            message: source.to_string(),
                        });
                    }
                    Err(source) => {
                        let err = ScanError::Io {
                            offset: cursor,
                            source,
                        };
                        warn!("{err}");
                        summary.unreadable_windows.push(cursor);
                        summary.bytes_scanned += wanted as u64;
                        cursor += wanted as u64;
                        carry.clear();
                        continue;
                    }
                };
                if data.is_empty() {
                    break;
                }
                summary.windows_read += 1;

                let base = cursor - carry.len() as u64;
                let read_end = cursor + data.len() as u64;
                let last = data.len() < wanted || read_end >= extent.end();
                let mut buf = std::mem::take(&mut carry);
                buf.extend_from_slice(&data);

                // offsets at or past `limit` are handled with the next window
                let limit = if last {
                    buf.len()
                } else {
                    buf.len().saturating_sub(overlap)
                };

                let window = Lookahead { data: &buf, base };
                for hit in self.catalog.find_headers(&buf) {
                    if hit.offset >= limit {
                        break;
                    }
                    let start = base + hit.offset as u64;

                    for rule in &hit.rules {
                        let Some(range) = self.resolve(device, rule, &window, start, extent)? else {
                            continue;
                        };
                        let record = RecoveredFileRecord::new(
                            next_id,
                            rule.category(),
                            rule.extension(),
                            rule.id(),
                            range,
                            device.path(),
                        );
                        debug!("Found {} ({}) at {range}", record.name(), rule.id());
                        // a refused record was never delivered and is not counted
                        if observer.on_found(record).is_break() {
                            info!("Consumer of {} went away, stopping scan", device.path());
                            summary.outcome = ScanOutcome::Cancelled;
                            return Ok(summary);
                        }
                        next_id += 1;
                        summary.records_emitted += 1;
                        break;
                    }
                }

                carry = buf.split_off(limit);
                summary.bytes_scanned += data.len() as u64;
                cursor = read_end;

                progress.update(
                    summary.bytes_scanned,
                    summary.records_emitted as usize,
                    started.elapsed(),
                );
                observer.on_progress(&progress);

                if data.len() < wanted {
                    break;
                }
            }
        }

        info!(
            "Scan of {} complete: {} records, {} unreadable windows",
            device.path(),
            summary.records_emitted,
            summary.unreadable_windows.len()
        );
        Ok(summary)
    }

    /// Determines the byte range of a candidate starting at `start`
    fn resolve<R: BlockDeviceReader + ?Sized>(
        &self,
        device: &R,
        rule: &SignatureRule,
        window: &Lookahead<'_>,
        start: u64,
        extent: ByteRange,
    ) -> Result<Option<ByteRange>, ScanError> {
        let limit = extent.end().min(start.saturating_add(rule.max_size()));

        let len = match rule.end() {
            EndRule::Footer { bytes, trailer } => {
                let min_end = rule
                    .min_size()
                    .saturating_sub(bytes.len() as u64 + trailer)
                    .max(rule.span() as u64);
                match self.find_footer(device, window, bytes, *trailer, start + min_end, limit)? {
                    Some(end) => Some(end - start),
                    // no footer before the size cap: the cap is the end
                    None if start.saturating_add(rule.max_size()) <= extent.end() => {
                        Some(rule.max_size())
                    }
                    None => None,
                }
            }
            EndRule::Length(field) => self.read_length(device, window, field, start)?,
            EndRule::BoxChain => self.walk_boxes(device, window, start, limit)?,
            EndRule::MaxSize => Some(rule.max_size()),
        };

        Ok(len
            .filter(|len| (rule.min_size()..=rule.max_size()).contains(len))
            .filter(|len| start.checked_add(*len).is_some_and(|end| end <= extent.end()))
            .map(|len| ByteRange::new(start, len)))
    }

    /// Absolute end offset (footer plus trailer) of the first footer found
    /// in `[from, limit)`
    fn find_footer<R: BlockDeviceReader + ?Sized>(
        &self,
        device: &R,
        window: &Lookahead<'_>,
        footer: &[u8],
        trailer: u64,
        from: u64,
        limit: u64,
    ) -> Result<Option<u64>, ScanError> {
        if footer.is_empty() {
            return Ok(None);
        }
        let needed = footer.len() as u64 + trailer;
        if from.saturating_add(needed) > limit {
            return Ok(None);
        }
        let search_end = limit - trailer;
        let finder = memmem::Finder::new(footer);
        let back = footer.len() as u64 - 1;

        let mut pos = from;
        while pos < search_end {
            let chunk_end = if pos < window.end() {
                search_end.min(window.end())
            } else {
                search_end.min(pos + self.search_chunk as u64)
            };
            let len = (chunk_end - pos) as usize;

            let chunk = match self.bytes_at(device, window, pos, len)? {
                Some(chunk) => chunk,
                None => return Ok(None),
            };
            if let Some(found) = finder.find(&chunk) {
                return Ok(Some(pos + found as u64 + needed));
            }
            if chunk.len() < len || chunk_end >= search_end {
                break;
            }
            pos = chunk_end.saturating_sub(back).max(pos + 1);
        }
        Ok(None)
    }

    fn read_length<R: BlockDeviceReader + ?Sized>(
        &self,
        device: &R,
        window: &Lookahead<'_>,
        field: &LengthField,
        start: u64,
    ) -> Result<Option<u64>, ScanError> {
        let width = field.width.bytes();
        let Some(raw) = self.bytes_at(device, window, start + field.offset, width)? else {
            return Ok(None);
        };
        if raw.len() < width {
            return Ok(None);
        }

        let value = match (field.width, field.endian) {
            (FieldWidth::U16, Endian::Little) => LittleEndian::read_u16(&raw) as u64,
            (FieldWidth::U16, Endian::Big) => BigEndian::read_u16(&raw) as u64,
            (FieldWidth::U32, Endian::Little) => LittleEndian::read_u32(&raw) as u64,
            (FieldWidth::U32, Endian::Big) => BigEndian::read_u32(&raw) as u64,
            (FieldWidth::U64, Endian::Little) => LittleEndian::read_u64(&raw),
            (FieldWidth::U64, Endian::Big) => BigEndian::read_u64(&raw),
        };
        Ok(value.checked_add(field.adjust))
    }

    /// Follows consecutive ISO base media boxes until the chain breaks
    fn walk_boxes<R: BlockDeviceReader + ?Sized>(
        &self,
        device: &R,
        window: &Lookahead<'_>,
        start: u64,
        limit: u64,
    ) -> Result<Option<u64>, ScanError> {
        let mut pos = start;
        let mut boxes = 0usize;

        while pos.saturating_add(8) <= limit {
            let len = (limit - pos).min(16) as usize;
            let Some(header) = self.bytes_at(device, window, pos, len)? else {
                return Ok(None);
            };
            if header.len() < 8 {
                break;
            }

            let kind = &header[4..8];
            if !kind.iter().all(|b| b.is_ascii_alphanumeric() || *b == b' ') {
                break;
            }

            let (size, header_len) = match BigEndian::read_u32(&header[0..4]) {
                // box runs to the end of the file: the size is unknowable
                0 => return Ok(None),
                1 if header.len() >= 16 => (BigEndian::read_u64(&header[8..16]), 16),
                1 => break,
                size => (size as u64, 8),
            };
            if size < header_len {
                break;
            }
            let Some(end) = pos.checked_add(size).filter(|end| *end <= limit) else {
                return Ok(None);
            };
            pos = end;
            boxes += 1;
        }

        Ok((boxes >= 2).then(|| pos - start))
    }

    /// Bytes at an absolute offset, from the current window when possible
    ///
    /// `Ok(None)` when a non-fatal read error makes the region unreadable.
    fn bytes_at<'w, R: BlockDeviceReader + ?Sized>(
        &self,
        device: &R,
        window: &'w Lookahead<'_>,
        offset: u64,
        len: usize,
    ) -> Result<Option<Cow<'w, [u8]>>, ScanError> {
        if let Some(slice) = window.slice(offset, len) {
            return Ok(Some(Cow::Borrowed(slice)));
        }
        match device.read_at(offset, len) {
            Ok(data) => Ok(Some(Cow::Owned(data))),
            Err(err) if err.is_fatal() => Err(ScanError::Fatal {
                device: device.path().to_string(),
                offset,
                message: err.to_string(),
            }),
            Err(err) => {
                debug!("Candidate region at {offset:#x} unreadable: {err}");
                Ok(None)
            }
        }
    }
}
