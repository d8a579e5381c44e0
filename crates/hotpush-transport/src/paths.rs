//! Deterministic device project root paths

use std::path::Path;

use hotpush_core::prelude::*;
use hotpush_core::{Device, DeviceAppData, Platform, SyncFolderKind};

/// Android app sandbox root shared by debuggable apps.
pub const ANDROID_SANDBOX_ROOT: &str = "/data/local/tmp";

/// Fixed sync root inside a physically-addressed iOS device container.
pub const IOS_DEVICE_SYNC_ROOT: &str = "/Documents/LiveSync";

/// Well-known drop path for zipped payloads on a physical iOS device.
pub const IOS_DEVICE_ARCHIVE_DROP: &str = "/Documents/sync.zip";

/// Sync subdirectory inside an iOS simulator app sandbox.
pub const IOS_SIMULATOR_SYNC_SUBDIR: &str = "Library/Application Support/LiveSync";

/// Android sync root: `/data/local/tmp/<app>/<sync|fullsync>`.
pub fn android_project_root(app_identifier: &str, kind: SyncFolderKind) -> String {
    format!(
        "{ANDROID_SANDBOX_ROOT}/{app_identifier}/{}",
        kind.dir_name()
    )
}

/// iOS simulator sync root inside the app's sandbox on the host.
pub fn ios_simulator_project_root(sandbox_root: &Path) -> String {
    sandbox_root
        .join(IOS_SIMULATOR_SYNC_SUBDIR)
        .to_string_lossy()
        .into_owned()
}

/// Resolve [`DeviceAppData`] for one (device, app) pair.
///
/// `simulator_sandbox` is the app sandbox directory reported by the
/// external simulator layer; it is required for iOS simulators only.
pub fn resolve_device_app_data(
    device: &Device,
    app_identifier: &str,
    has_manifest: bool,
    watch_mode: bool,
    force_full: bool,
    simulator_sandbox: Option<&Path>,
) -> Result<DeviceAppData> {
    let sync_folder_kind = SyncFolderKind::decide(has_manifest, watch_mode, force_full);

    let device_project_root = match device.platform {
        Platform::Android => android_project_root(app_identifier, sync_folder_kind),
        Platform::Ios if device.emulator => {
            let sandbox = simulator_sandbox.ok_or_else(|| {
                Error::config(format!(
                    "no simulator sandbox supplied for {}",
                    device.id
                ))
            })?;
            ios_simulator_project_root(sandbox)
        }
        Platform::Ios => IOS_DEVICE_SYNC_ROOT.to_string(),
    };

    Ok(DeviceAppData {
        app_identifier: app_identifier.to_string(),
        device_project_root,
        sync_folder_kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotpush_core::Reachability;
    use std::path::PathBuf;

    fn device(platform: Platform, emulator: bool) -> Device {
        Device {
            id: "dev-1".to_string(),
            name: "Test".to_string(),
            platform,
            emulator,
            reachability: Reachability::Connected,
        }
    }

    #[test]
    fn test_android_root_incremental() {
        let data = resolve_device_app_data(
            &device(Platform::Android, false),
            "org.example.app",
            true,
            false,
            false,
            None,
        )
        .unwrap();
        assert_eq!(
            data.device_project_root,
            "/data/local/tmp/org.example.app/sync"
        );
        assert_eq!(data.sync_folder_kind, SyncFolderKind::Sync);
    }

    #[test]
    fn test_android_root_forced_full() {
        let data = resolve_device_app_data(
            &device(Platform::Android, false),
            "org.example.app",
            true,
            true,
            true,
            None,
        )
        .unwrap();
        assert_eq!(
            data.device_project_root,
            "/data/local/tmp/org.example.app/fullsync"
        );
    }

    #[test]
    fn test_ios_physical_is_well_known_path() {
        let data = resolve_device_app_data(
            &device(Platform::Ios, false),
            "org.example.app",
            false,
            false,
            false,
            None,
        )
        .unwrap();
        assert_eq!(data.device_project_root, IOS_DEVICE_SYNC_ROOT);
    }

    #[test]
    fn test_ios_simulator_uses_sandbox() {
        let sandbox = PathBuf::from("/sim/containers/ABC");
        let data = resolve_device_app_data(
            &device(Platform::Ios, true),
            "org.example.app",
            false,
            false,
            false,
            Some(&sandbox),
        )
        .unwrap();
        assert!(data
            .device_project_root
            .starts_with("/sim/containers/ABC"));
        assert!(data.device_project_root.ends_with("LiveSync"));
    }

    #[test]
    fn test_ios_simulator_requires_sandbox() {
        let err = resolve_device_app_data(
            &device(Platform::Ios, true),
            "org.example.app",
            false,
            false,
            false,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
