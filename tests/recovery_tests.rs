//! Recovery writer integration tests

mod common;

use common::{MemoryDevice, image, jpeg, write_image};
use rstest::*;
use salvage::application::dto::{ExtentMode, RecoveryOptions, ScanOptions};
use salvage::application::{RecoveryWriter, SaveError, SaveErrorKind, SessionRegistry};
use salvage::domain::entities::{ByteRange, Category, RecoveredFileRecord};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ============================================================================
// Fixtures
// ============================================================================

#[fixture]
fn writer() -> RecoveryWriter {
    RecoveryWriter::new(RecoveryOptions::default().with_sync(false).with_chunk_size(4096))
}

/// Scans an image file holding `blobs` and returns its records
fn scan_image(dir: &Path, blobs: &[(usize, Vec<u8>)], size: usize) -> (PathBuf, Vec<RecoveredFileRecord>) {
    let path = write_image(dir, "card.img", &image(size, blobs));
    let options = ScanOptions::default()
        .with_window_size(4096)
        .with_extent_mode(ExtentMode::WholeDevice);

    let registry = SessionRegistry::default();
    let start = registry.start(path.to_str().unwrap(), &options).unwrap();
    start.events.collect_blocking();
    (path, start.handle.records())
}

fn truncate(path: &Path, len: u64) {
    OpenOptions::new().write(true).open(path).unwrap().set_len(len).unwrap();
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

// ============================================================================
// Single saves
// ============================================================================

#[rstest]
fn test_save_copies_exact_range(writer: RecoveryWriter) {
    let tmp = TempDir::new().unwrap();
    let blob = jpeg(20480);
    let (_, records) = scan_image(tmp.path(), &[(4096, blob.clone())], 65536);
    assert_eq!(records.len(), 1);

    let dest = tmp.path().join("out");
    let outcome = writer.save(&records[0], &dest).unwrap();

    assert_eq!(outcome.path, dest.join("recovered_1.jpg"));
    assert_eq!(outcome.bytes, 20480);
    assert_eq!(fs::read(&outcome.path).unwrap(), blob);
    assert_eq!(outcome.sha256, hex::encode(Sha256::digest(&blob)));
}

#[rstest]
fn test_name_collision_gets_suffix(writer: RecoveryWriter) {
    let tmp = TempDir::new().unwrap();
    let (_, records) = scan_image(tmp.path(), &[(0, jpeg(3000))], 16384);
    let dest = tmp.path().join("out");

    let first = writer.save(&records[0], &dest).unwrap();
    let second = writer.save(&records[0], &dest).unwrap();

    assert_eq!(first.path, dest.join("recovered_1.jpg"));
    assert_eq!(second.path, dest.join("recovered_1_1.jpg"));
    assert_eq!(first.sha256, second.sha256);
}

#[rstest]
fn test_shrunken_device_is_a_range_error(writer: RecoveryWriter) {
    let tmp = TempDir::new().unwrap();
    let (image_path, records) = scan_image(tmp.path(), &[(8192, jpeg(8000))], 32768);
    truncate(&image_path, 8192);

    let dest = tmp.path().join("out");
    let err = writer.save(&records[0], &dest).unwrap_err();

    assert_eq!(err.kind(), SaveErrorKind::Range);
    assert!(matches!(
        err,
        SaveError::Range { start: 8192, end: 16192, device_size: 8192, .. }
    ));
    assert!(file_names(&dest).is_empty());
}

#[rstest]
fn test_read_failure_leaves_no_partial_file(writer: RecoveryWriter) {
    let tmp = TempDir::new().unwrap();
    let device = MemoryDevice::new("mem://card", image(16384, &[(0, jpeg(8192))]))
        .with_bad_range(6144..8192);
    let record = RecoveredFileRecord::new(
        1,
        Category::Images,
        "jpg",
        "jpeg-jfif",
        ByteRange::new(0, 8192),
        "mem://card",
    );

    let err = writer.save_from(&device, &record, tmp.path()).unwrap_err();

    assert_eq!(err.kind(), SaveErrorKind::Io);
    assert!(matches!(err, SaveError::Read { .. }));
    assert!(file_names(tmp.path()).is_empty());
}

#[rstest]
fn test_missing_source_is_an_io_error(writer: RecoveryWriter) {
    let tmp = TempDir::new().unwrap();
    let record = RecoveredFileRecord::new(
        1,
        Category::Images,
        "jpg",
        "jpeg",
        ByteRange::new(0, 512),
        "/nonexistent/card.img",
    );

    let err = writer.save(&record, tmp.path()).unwrap_err();
    assert_eq!(err.kind(), SaveErrorKind::Io);
}

// ============================================================================
// Batches
// ============================================================================

#[rstest]
fn test_batch_continues_after_failure(writer: RecoveryWriter) {
    let tmp = TempDir::new().unwrap();
    let blobs = [(0, jpeg(3000)), (8192, jpeg(3000)), (40960, jpeg(3000))];
    let (image_path, records) = scan_image(tmp.path(), &blobs, 65536);
    assert_eq!(records.len(), 3);
    truncate(&image_path, 32768);

    let dest = tmp.path().join("out");
    let report = writer.save_batch(&records, &dest);

    assert_eq!(report.saved_count(), 2);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.bytes_saved(), 6000);
    assert!((report.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    let ids: Vec<u64> = report.files.iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(report.files[2].result.is_err());
    assert_eq!(file_names(&dest), vec!["recovered_1.jpg", "recovered_2.jpg"]);
}

#[rstest]
fn test_parallel_saves_claim_distinct_names(writer: RecoveryWriter) {
    let tmp = TempDir::new().unwrap();
    let (_, records) = scan_image(tmp.path(), &[(0, jpeg(5000))], 16384);
    let same: Vec<RecoveredFileRecord> = std::iter::repeat_n(records[0].clone(), 8).collect();

    let dest = tmp.path().join("out");
    let report = writer.save_batch_parallel(&same, &dest);

    assert_eq!(report.saved_count(), 8);
    let paths: HashSet<PathBuf> = report
        .files
        .iter()
        .map(|f| f.result.as_ref().unwrap().path.clone())
        .collect();
    assert_eq!(paths.len(), 8);
    assert!(paths.contains(&dest.join("recovered_1.jpg")));
    assert!(paths.contains(&dest.join("recovered_1_7.jpg")));
    for path in &paths {
        assert_eq!(fs::metadata(path).unwrap().len(), 5000);
    }
}
