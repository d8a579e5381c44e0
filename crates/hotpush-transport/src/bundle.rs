//! Bundle + notify transport (iOS family)
//!
//! No persistent in-app listener exists on this platform family, so files
//! are placed directly: into the simulator's app sandbox on the host, or
//! through the mounted container of a physical device (large payloads as a
//! zip at a well-known drop path, unpacked by the app on reload). The app
//! is then refreshed with a reload notification.
//!
//! The manifest is written right after the write phase succeeds, before
//! the notification goes out: if the reload never happens the files are
//! nonetheless on device and the next diff must not re-push them.

use std::path::{Path, PathBuf};

use hotpush_core::prelude::*;
use hotpush_core::{Device, DeviceAppData};
use hotpush_sync::{HashManifest, SyncPlan, MANIFEST_FILE_NAME};

use crate::archive;
use crate::notify::{names, NotificationTransport};

/// Where the device sync tree is visible on the host.
#[derive(Debug, Clone)]
pub enum BundleTarget {
    /// Simulator app sandbox, directly writable on the host filesystem.
    Simulator { sync_root: PathBuf },
    /// Physical device container mounted on the host. Large full syncs
    /// are dropped as one zip at `archive_drop` instead of per-file
    /// copies.
    Physical {
        sync_root: PathBuf,
        archive_drop: PathBuf,
    },
}

impl BundleTarget {
    fn sync_root(&self) -> &Path {
        match self {
            BundleTarget::Simulator { sync_root } => sync_root,
            BundleTarget::Physical { sync_root, .. } => sync_root,
        }
    }
}

/// Filesystem transport for one (device, app) pair.
pub struct BundleTransport<N> {
    device: Device,
    app: DeviceAppData,
    target: BundleTarget,
    notifier: N,
    manifest: Option<HashManifest>,
}

impl<N: NotificationTransport + Sync> BundleTransport<N> {
    pub fn new(device: Device, app: DeviceAppData, target: BundleTarget, notifier: N) -> Self {
        Self {
            device,
            app,
            target,
            notifier,
            manifest: None,
        }
    }

    pub fn app(&self) -> &DeviceAppData {
        &self.app
    }

    pub fn manifest(&self) -> Option<&HashManifest> {
        self.manifest.as_ref()
    }

    fn precheck(&self) -> Result<()> {
        if self.device.is_connected() {
            Ok(())
        } else {
            Err(Error::DeviceUnreachable {
                device_id: self.device.id.clone(),
                state: format!("{:?}", self.device.reachability),
            })
        }
    }

    fn manifest_path(&self) -> PathBuf {
        self.target.sync_root().join(MANIFEST_FILE_NAME)
    }

    /// Probe the device filesystem for a manifest (the filesystem read
    /// primitive). Updates the local mirror.
    pub async fn load_manifest(&mut self) -> Result<Option<HashManifest>> {
        self.precheck()?;

        let path = self.manifest_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.manifest = None;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match HashManifest::from_json(&bytes) {
            Ok(manifest) => {
                self.manifest = Some(manifest.clone());
                Ok(Some(manifest))
            }
            Err(e) => {
                self.manifest = None;
                Err(e)
            }
        }
    }

    /// Deliver a planned batch: write phase, manifest update, then the
    /// reload notification.
    pub async fn deliver(&mut self, plan: &SyncPlan) -> Result<()> {
        self.precheck()?;

        if plan.batch.is_empty() {
            debug!(device = %self.device.id, "empty batch, nothing to deliver");
            return Ok(());
        }

        self.write_phase(plan).await?;

        // Commit the manifest before notifying: the files are on device
        // from here on, whether or not the app confirms a reload. The
        // mirror only moves once the device-side copy is written.
        let mut updated = self.manifest.clone().unwrap_or_default();
        updated.commit_batch(&plan.batch, &plan.hashes);
        tokio::fs::write(self.manifest_path(), updated.to_json()?).await?;
        self.manifest = Some(updated);

        info!(
            device = %self.device.id,
            files = plan.batch.file_count(),
            removed = plan.batch.files_to_remove.len(),
            full = plan.batch.is_full_sync,
            "bundle written"
        );

        let name = names::scoped(&self.app.app_identifier, names::REFRESH_APP);
        if let Err(e) = self.notifier.post(&name, &self.app.app_identifier).await {
            // Files are already in place; the caller may trigger a manual
            // reload and the next diff will not re-push them.
            warn!(device = %self.device.id, "reload notification failed: {e}");
        }

        Ok(())
    }

    async fn write_phase(&self, plan: &SyncPlan) -> Result<()> {
        let sync_root = self.target.sync_root().to_path_buf();

        if plan.batch.is_full_sync {
            match tokio::fs::remove_dir_all(&sync_root).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        tokio::fs::create_dir_all(&sync_root).await?;

        let use_archive_drop = matches!(self.target, BundleTarget::Physical { .. })
            && plan.batch.is_full_sync;

        if use_archive_drop {
            let contents = archive::load_batch_contents(&plan.batch).await?;
            if archive::should_archive(&contents) {
                let BundleTarget::Physical { archive_drop, .. } = &self.target else {
                    unreachable!("archive drop implies physical target");
                };
                debug!(
                    device = %self.device.id,
                    files = contents.len(),
                    "dropping zipped payload"
                );
                let bytes = archive::pack_entries_blocking(contents).await?;
                tokio::fs::write(archive_drop, bytes).await?;
                return Ok(());
            }
            // Below threshold: fall through to per-file copies.
            self.copy_files(&sync_root, plan).await?;
            return Ok(());
        }

        self.copy_files(&sync_root, plan).await?;

        for device_path in &plan.batch.files_to_remove {
            let target = sync_root.join(device_path);
            match tokio::fs::remove_file(&target).await {
                Ok(()) => trace!("removed {}", target.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    async fn copy_files(&self, sync_root: &Path, plan: &SyncPlan) -> Result<()> {
        for pair in &plan.batch.files_to_sync {
            let target = sync_root.join(&pair.device_path);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(&pair.local_path, &target).await?;
            trace!("copied {} -> {}", pair.local_path.display(), target.display());
        }
        Ok(())
    }
}
