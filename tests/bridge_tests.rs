//! Command bridge integration tests

mod common;

use common::{image, jpeg, write_image};
use rstest::*;
use salvage::application::dto::RecoveryOptions;
use salvage::domain::entities::{RecordStatus, Volume};
use salvage::domain::repositories::{EnumerationError, VolumeEnumerator};
use salvage::{Bridge, BridgeError, Config, FolderPicker};
use serde_json::{Value, json};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

struct FixedVolumes(Vec<Volume>);

impl VolumeEnumerator for FixedVolumes {
    fn list_volumes(&self) -> Result<Vec<Volume>, EnumerationError> {
        Ok(self.0.clone())
    }
}

struct BrokenVolumes;

impl VolumeEnumerator for BrokenVolumes {
    fn list_volumes(&self) -> Result<Vec<Volume>, EnumerationError> {
        Err(EnumerationError::PermissionDenied("/proc/self/mounts".into()))
    }
}

struct FixedPicker(PathBuf);

impl FolderPicker for FixedPicker {
    fn pick_folder(&self) -> Option<PathBuf> {
        Some(self.0.clone())
    }
}

/// An image file "mounted" at `<tmp>/mnt/card`
struct Mounted {
    tmp: TempDir,
    mount_point: String,
    image: PathBuf,
}

#[fixture]
fn mounted() -> Mounted {
    let tmp = TempDir::new().unwrap();
    let image = write_image(
        tmp.path(),
        "card.img",
        &image(131072, &[(4096, jpeg(20480)), (65536, jpeg(3000))]),
    );
    let mount_point = tmp.path().join("mnt/card").display().to_string();
    Mounted {
        tmp,
        mount_point,
        image,
    }
}

fn bridge_for(mounted: &Mounted) -> Bridge {
    let mut config = Config::default();
    config.recovery = RecoveryOptions::default().with_sync(false);
    let volume = Volume::new(
        "card",
        &mounted.mount_point,
        mounted.image.display().to_string(),
        "vfat",
    )
    .with_space(131072, 65536)
    .removable(true);

    Bridge::new(&config).with_enumerator(Box::new(FixedVolumes(vec![volume])))
}

async fn drain(bridge: &Bridge, target: &str) -> Vec<Value> {
    let mut start = bridge.start_scan(target).unwrap();
    let mut events = Vec::new();
    while let Some(event) = start.events.recv().await {
        events.push(serde_json::to_value(&event).unwrap());
    }
    events
}

// ============================================================================
// Volumes
// ============================================================================

#[rstest]
fn test_list_volumes(mounted: Mounted) {
    let volumes = bridge_for(&mounted).list_volumes().unwrap();

    assert_eq!(volumes.len(), 1);
    assert_eq!(volumes[0].mount_point, mounted.mount_point);
    assert!(volumes[0].is_removable);
}

#[test]
fn test_list_volumes_failure() {
    let bridge = Bridge::new(&Config::default()).with_enumerator(Box::new(BrokenVolumes));
    assert!(matches!(
        bridge.list_volumes(),
        Err(BridgeError::Enumeration(EnumerationError::PermissionDenied(_)))
    ));
}

// ============================================================================
// Scans
// ============================================================================

#[rstest]
#[tokio::test]
async fn test_scan_by_mount_point_streams_json_events(mounted: Mounted) {
    let bridge = bridge_for(&mounted);
    let events = drain(&bridge, &format!("{}/", mounted.mount_point)).await;

    assert_eq!(events.len(), 3);
    let source = mounted.image.display().to_string();
    assert_eq!(
        events[0],
        json!({
            "event": "file_found",
            "payload": {
                "id": 1,
                "name": "recovered_1.jpg",
                "original_path": format!("{source}@0x1000"),
                "size": 20480,
                "status": "found",
                "category": "images",
            }
        })
    );
    assert_eq!(events[1]["payload"]["original_path"], format!("{source}@0x10000"));
    assert_eq!(
        events[2],
        json!({
            "event": "scan_complete",
            "payload": {"files_found": 2, "bytes_scanned": 131072, "unreadable_windows": 0}
        })
    );
}

#[rstest]
#[tokio::test]
async fn test_scan_of_raw_path_without_volumes(mounted: Mounted) {
    let bridge = Bridge::new(&Config::default()).with_enumerator(Box::new(BrokenVolumes));
    let events = drain(&bridge, mounted.image.to_str().unwrap()).await;

    assert_eq!(events.last().unwrap()["event"], "scan_complete");
}

#[rstest]
fn test_scan_of_missing_device(mounted: Mounted) {
    let bridge = bridge_for(&mounted);
    let missing = mounted.tmp.path().join("nope.img");

    assert!(matches!(
        bridge.start_scan(missing.to_str().unwrap()),
        Err(BridgeError::Session(_))
    ));
    assert!(!bridge.cancel_scan(missing.to_str().unwrap()));
}

// ============================================================================
// Saving
// ============================================================================

#[rstest]
#[tokio::test]
async fn test_save_file_by_name_and_location(mounted: Mounted) {
    let bridge = bridge_for(&mounted);
    let events = drain(&bridge, &mounted.mount_point).await;
    let found = &events[0]["payload"];
    let name = found["name"].as_str().unwrap();
    let original_path = found["original_path"].as_str().unwrap();

    let dest = mounted.tmp.path().join("restored");
    let outcome = bridge.save_file(name, original_path, &dest).unwrap();

    assert_eq!(outcome.path, dest.join("recovered_1.jpg"));
    assert_eq!(fs::read(&outcome.path).unwrap(), jpeg(20480));
    let handle = bridge.registry().session(mounted.image.to_str().unwrap()).unwrap();
    assert_eq!(handle.record(1).unwrap().status(), RecordStatus::Saved);
}

#[rstest]
#[tokio::test]
async fn test_save_unknown_record(mounted: Mounted) {
    let bridge = bridge_for(&mounted);
    drain(&bridge, &mounted.mount_point).await;

    let err = bridge
        .save_file("recovered_9.jpg", "elsewhere@0x0", mounted.tmp.path())
        .unwrap_err();
    assert!(matches!(err, BridgeError::UnknownRecord { .. }));
}

#[rstest]
#[tokio::test]
async fn test_failed_save_marks_record_failed(mounted: Mounted) {
    let bridge = bridge_for(&mounted);
    let events = drain(&bridge, &mounted.mount_point).await;
    let found = &events[1]["payload"];
    fs::OpenOptions::new()
        .write(true)
        .open(&mounted.image)
        .unwrap()
        .set_len(4096)
        .unwrap();

    let err = bridge
        .save_file(
            found["name"].as_str().unwrap(),
            found["original_path"].as_str().unwrap(),
            mounted.tmp.path(),
        )
        .unwrap_err();

    assert!(matches!(err, BridgeError::Save(_)));
    let handle = bridge.registry().session(mounted.image.to_str().unwrap()).unwrap();
    assert_eq!(handle.record(2).unwrap().status(), RecordStatus::Failed);
}

// ============================================================================
// Folder selection
// ============================================================================

#[test]
fn test_select_folder() {
    let bridge = Bridge::new(&Config::default());
    assert_eq!(bridge.select_folder(), None);

    let bridge = bridge.with_folder_picker(Box::new(FixedPicker(PathBuf::from("/srv/restore"))));
    assert_eq!(bridge.select_folder(), Some(PathBuf::from("/srv/restore")));
}
