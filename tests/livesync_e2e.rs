//! End-to-end LiveSync: watcher → diff → transport → device tree.
//!
//! Drives a real process against a simulator-style bundle target and
//! checks that edits on disk end up on the "device" through the watcher
//! path, with the manifest tracking every committed batch.

use std::path::Path;
use std::time::Duration;

use tokio::sync::broadcast;

use hotpush_app::livesync::{DeviceDescriptor, DeviceTransport};
use hotpush_app::{LiveSyncCoordinator, Settings};
use hotpush_core::{Device, EventBus, LiveSyncEvent, Platform, Reachability};
use hotpush_transport::bundle::{BundleTarget, BundleTransport};
use hotpush_transport::{resolve_device_app_data, NotificationTransport};

#[derive(Clone, Default)]
struct NoopNotifications;

impl NotificationTransport for NoopNotifications {
    async fn post(&self, _name: &str, _app_identifier: &str) -> hotpush_core::Result<()> {
        Ok(())
    }

    async fn await_once(
        &self,
        name: &str,
        _app_identifier: &str,
        timeout: Duration,
    ) -> hotpush_core::Result<()> {
        tokio::time::sleep(timeout).await;
        Err(hotpush_core::Error::timeout(name.to_string(), timeout))
    }
}

const APP: &str = "org.example.app";

fn simulator_target(
    sync_root: &Path,
) -> (DeviceDescriptor, DeviceTransport<NoopNotifications>) {
    let device = Device {
        id: "iphone-sim".to_string(),
        name: "iPhone 15".to_string(),
        platform: Platform::Ios,
        emulator: true,
        reachability: Reachability::Connected,
    };
    let app = resolve_device_app_data(
        &device,
        APP,
        false,
        true,
        false,
        Some(sync_root.parent().unwrap()),
    )
    .unwrap();
    let transport = BundleTransport::new(
        device.clone(),
        app,
        BundleTarget::Simulator {
            sync_root: sync_root.to_path_buf(),
        },
        NoopNotifications,
    );
    (
        DeviceDescriptor {
            device,
            app_identifier: APP.to_string(),
            build_action: None,
        },
        DeviceTransport::Bundle(transport),
    )
}

async fn next_executed(
    rx: &mut broadcast::Receiver<LiveSyncEvent>,
) -> (Vec<String>, Vec<String>, bool) {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(15), rx.recv())
            .await
            .expect("no event within deadline")
            .expect("bus closed");
        if let LiveSyncEvent::SyncExecuted {
            synced_files,
            removed_files,
            is_full_sync,
            ..
        } = event
        {
            return (synced_files, removed_files, is_full_sync);
        }
    }
}

#[tokio::test]
async fn file_edits_flow_through_the_watcher_to_the_device() {
    let project = tempfile::tempdir().unwrap();
    std::fs::write(project.path().join("app.js"), "bootstrap").unwrap();
    std::fs::create_dir_all(project.path().join("src")).unwrap();
    std::fs::write(project.path().join("src/view.js"), "view v1").unwrap();

    let device_root = tempfile::tempdir().unwrap();
    let sync_root = device_root.path().join("LiveSync");

    let mut settings = Settings::default();
    settings.watcher.debounce_ms = 150;

    let bus = EventBus::new();
    let mut events = bus.subscribe();

    let mut coordinator = LiveSyncCoordinator::new(bus);
    coordinator
        .start_sync(
            project.path(),
            vec![simulator_target(&sync_root)],
            &settings,
        )
        .unwrap();

    // Initial full sync lands both files.
    let (synced, _, full) = next_executed(&mut events).await;
    assert!(full);
    assert_eq!(synced.len(), 2);
    assert_eq!(
        std::fs::read_to_string(sync_root.join("src/view.js")).unwrap(),
        "view v1"
    );

    // Let the blocking watcher arm before editing.
    tokio::time::sleep(Duration::from_millis(500)).await;
    std::fs::write(project.path().join("src/view.js"), "view v2").unwrap();

    // The debounced change triggers an incremental push of just the edit.
    let (synced, removed, full) = next_executed(&mut events).await;
    assert!(!full);
    assert!(removed.is_empty());
    assert_eq!(synced, vec!["src/view.js".to_string()]);
    assert_eq!(
        std::fs::read_to_string(sync_root.join("src/view.js")).unwrap(),
        "view v2"
    );

    coordinator.stop_sync(project.path(), None).unwrap();
    assert!(!coordinator.is_active(project.path()));
}
