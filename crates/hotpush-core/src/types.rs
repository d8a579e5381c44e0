//! Device and sync-batch domain types

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Platform family of a target device.
///
/// Android devices run an in-app LiveSync listener reachable over a
/// persistent TCP socket; iOS devices receive files through the app
/// sandbox and are refreshed via a reload notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
}

impl Platform {
    /// Parse a platform identifier as reported by the device layer
    /// (e.g., "android-arm64", "ios_x64").
    pub fn parse(raw: &str) -> Option<Self> {
        let lower = raw.to_lowercase();
        if lower.starts_with("android") {
            Some(Platform::Android)
        } else if lower.starts_with("ios") {
            Some(Platform::Ios)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Android => write!(f, "android"),
            Platform::Ios => write!(f, "ios"),
        }
    }
}

/// Whether a device can currently be talked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Reachability {
    Connected,
    Unreachable,
    Unauthorized,
}

/// A target device. Owned by the external device layer; the sync core
/// only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Unique device identifier
    pub id: String,

    /// Human-readable device name
    pub name: String,

    pub platform: Platform,

    /// Whether this is an emulator/simulator
    #[serde(default)]
    pub emulator: bool,

    pub reachability: Reachability,
}

impl Device {
    /// Get a display string for the device
    pub fn display_name(&self) -> String {
        if self.emulator {
            format!("{} ({})", self.name, self.emulator_type())
        } else {
            self.name.clone()
        }
    }

    /// Get emulator type string
    pub fn emulator_type(&self) -> &'static str {
        match self.platform {
            Platform::Ios => "simulator",
            Platform::Android => "emulator",
        }
    }

    /// Check if device matches a device specifier
    ///
    /// The specifier can be:
    /// - Exact device ID
    /// - Device name (case-insensitive partial match)
    /// - Platform name ("android", "ios")
    pub fn matches(&self, specifier: &str) -> bool {
        let spec_lower = specifier.to_lowercase();

        if self.id.to_lowercase() == spec_lower {
            return true;
        }

        if self.name.to_lowercase().contains(&spec_lower) {
            return true;
        }

        self.platform.to_string() == spec_lower
    }

    pub fn is_connected(&self) -> bool {
        self.reachability == Reachability::Connected
    }
}

/// Which folder under the app sandbox a sync targets.
///
/// `Sync` holds incremental pushes layered on a previous full sync;
/// `FullSync` receives a complete replacement tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncFolderKind {
    Sync,
    FullSync,
}

impl SyncFolderKind {
    /// On-device directory name for this folder kind.
    pub fn dir_name(&self) -> &'static str {
        match self {
            SyncFolderKind::Sync => "sync",
            SyncFolderKind::FullSync => "fullsync",
        }
    }

    /// Decide the folder kind for a sync run.
    ///
    /// Incremental (`Sync`) requires a prior manifest on the device or an
    /// explicit watch-mode request, and no forced full resync.
    pub fn decide(has_manifest: bool, watch_mode: bool, force_full: bool) -> Self {
        if (has_manifest || watch_mode) && !force_full {
            SyncFolderKind::Sync
        } else {
            SyncFolderKind::FullSync
        }
    }
}

/// Per-(device, app) addressing data for one sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAppData {
    /// Bundle/package identifier of the installed app
    pub app_identifier: String,

    /// Resolved root of the app's sync tree on the device
    pub device_project_root: String,

    pub sync_folder_kind: SyncFolderKind,
}

/// A (local absolute path, device-relative path) pair. Immutable once
/// produced for a given batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalToDevicePathData {
    pub local_path: PathBuf,
    pub device_path: String,
}

impl LocalToDevicePathData {
    pub fn new(local_path: impl Into<PathBuf>, device_path: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            device_path: device_path.into(),
        }
    }

    /// Build the pair from a local path and the project root it lives
    /// under. Device paths always use forward slashes.
    pub fn from_project_file(project_root: &Path, local_path: &Path) -> Option<Self> {
        let relative = local_path.strip_prefix(project_root).ok()?;
        let device_path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Some(Self::new(local_path, device_path))
    }
}

/// The unit of work a device transport delivers.
///
/// Invariant: a full sync replaces the whole tree, so it never carries
/// removals. Construct through [`SyncBatch::full`] and
/// [`SyncBatch::incremental`] to keep that invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBatch {
    pub files_to_sync: Vec<LocalToDevicePathData>,
    pub files_to_remove: Vec<String>,
    pub is_full_sync: bool,
}

impl SyncBatch {
    /// A full-tree replacement batch. Carries no removals by definition.
    pub fn full(files_to_sync: Vec<LocalToDevicePathData>) -> Self {
        Self {
            files_to_sync,
            files_to_remove: Vec::new(),
            is_full_sync: true,
        }
    }

    /// An incremental batch of changed and removed files.
    pub fn incremental(
        files_to_sync: Vec<LocalToDevicePathData>,
        files_to_remove: Vec<String>,
    ) -> Self {
        Self {
            files_to_sync,
            files_to_remove,
            is_full_sync: false,
        }
    }

    /// An empty batch is a valid no-op result of diffing.
    pub fn is_empty(&self) -> bool {
        self.files_to_sync.is_empty() && self.files_to_remove.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.files_to_sync.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_parse() {
        assert_eq!(Platform::parse("android-arm64"), Some(Platform::Android));
        assert_eq!(Platform::parse("ios_x64"), Some(Platform::Ios));
        assert_eq!(Platform::parse("iOS"), Some(Platform::Ios));
        assert_eq!(Platform::parse("web-javascript"), None);
    }

    #[test]
    fn test_device_matches() {
        let device = Device {
            id: "emulator-5554".to_string(),
            name: "Pixel 7".to_string(),
            platform: Platform::Android,
            emulator: true,
            reachability: Reachability::Connected,
        };

        assert!(device.matches("emulator-5554"));
        assert!(device.matches("pixel"));
        assert!(device.matches("android"));
        assert!(!device.matches("ios"));
    }

    #[test]
    fn test_device_display_name() {
        let device = Device {
            id: "x".to_string(),
            name: "iPhone 15".to_string(),
            platform: Platform::Ios,
            emulator: true,
            reachability: Reachability::Connected,
        };
        assert_eq!(device.display_name(), "iPhone 15 (simulator)");
    }

    #[test]
    fn test_sync_folder_kind_decision() {
        assert_eq!(
            SyncFolderKind::decide(true, false, false),
            SyncFolderKind::Sync
        );
        assert_eq!(
            SyncFolderKind::decide(false, true, false),
            SyncFolderKind::Sync
        );
        // Forced full resync always wins.
        assert_eq!(
            SyncFolderKind::decide(true, true, true),
            SyncFolderKind::FullSync
        );
        assert_eq!(
            SyncFolderKind::decide(false, false, false),
            SyncFolderKind::FullSync
        );
    }

    #[test]
    fn test_full_batch_has_no_removals() {
        let batch = SyncBatch::full(vec![LocalToDevicePathData::new("/p/a.js", "a.js")]);
        assert!(batch.is_full_sync);
        assert!(batch.files_to_remove.is_empty());
    }

    #[test]
    fn test_empty_batch() {
        let batch = SyncBatch::incremental(Vec::new(), Vec::new());
        assert!(batch.is_empty());
        assert!(!SyncBatch::full(vec![LocalToDevicePathData::new("/p/a", "a")]).is_empty());
    }

    #[test]
    fn test_local_to_device_path_from_project_file() {
        let pair = LocalToDevicePathData::from_project_file(
            Path::new("/work/app"),
            Path::new("/work/app/src/views/main.js"),
        )
        .unwrap();
        assert_eq!(pair.device_path, "src/views/main.js");

        assert!(LocalToDevicePathData::from_project_file(
            Path::new("/work/app"),
            Path::new("/elsewhere/main.js"),
        )
        .is_none());
    }
}
