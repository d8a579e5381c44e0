//! Sync-batch planning: diff project files against a device manifest

use std::collections::BTreeMap;

use hotpush_core::prelude::*;
use hotpush_core::{LocalToDevicePathData, SyncBatch};

use crate::hashing;
use crate::manifest::HashManifest;

/// A planned sync: the batch to deliver plus the fresh content hashes the
/// transport needs to commit the manifest after confirmed delivery.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub batch: SyncBatch,
    /// Device-relative path → content hash for every current project file.
    pub hashes: BTreeMap<String, String>,
}

impl SyncPlan {
    pub fn is_noop(&self) -> bool {
        self.batch.is_empty()
    }
}

/// Compute the batch for one device.
///
/// - No manifest, `force_full`, or a corrupt manifest upstream (mapped to
///   `None` by the caller) ⇒ full sync of every project file, no removals.
/// - Otherwise: changed/new files are synced, manifest entries without a
///   project file are removed, unchanged files are omitted. An empty
///   result is a valid no-op.
///
/// This function has no side effects; the manifest is only ever updated by
/// a transport after confirmed delivery, which keeps planning idempotent
/// and retry-safe.
pub async fn compute_batch(
    project_files: &[LocalToDevicePathData],
    manifest: Option<&HashManifest>,
    force_full: bool,
) -> Result<SyncPlan> {
    let hashes = hashing::hash_files(project_files).await?;
    let batch = plan_batch(project_files, &hashes, manifest, force_full);
    Ok(SyncPlan { batch, hashes })
}

/// Pure planning step over precomputed hashes.
pub fn plan_batch(
    project_files: &[LocalToDevicePathData],
    hashes: &BTreeMap<String, String>,
    manifest: Option<&HashManifest>,
    force_full: bool,
) -> SyncBatch {
    let manifest = match manifest {
        Some(m) if !force_full => m,
        _ => {
            debug!(
                files = project_files.len(),
                force_full, "planning full sync"
            );
            return SyncBatch::full(project_files.to_vec());
        }
    };

    let mut files_to_sync = Vec::new();
    for pair in project_files {
        let current = hashes.get(&pair.device_path).map(String::as_str);
        if current != manifest.get(&pair.device_path) {
            files_to_sync.push(pair.clone());
        }
    }

    let files_to_remove: Vec<String> = manifest
        .iter()
        .filter(|(path, _)| !hashes.contains_key(*path))
        .map(|(path, _)| path.clone())
        .collect();

    debug!(
        sync = files_to_sync.len(),
        remove = files_to_remove.len(),
        "planned incremental sync"
    );
    SyncBatch::incremental(files_to_sync, files_to_remove)
}

/// Treat a failed manifest read as "no manifest", forcing a full sync.
/// Corruption is logged but deliberately not propagated.
pub fn usable_manifest(loaded: Result<Option<HashManifest>>) -> Option<HashManifest> {
    match loaded {
        Ok(manifest) => manifest,
        Err(e) => {
            warn!("manifest unreadable, falling back to full sync: {e}");
            None
        }
    }
}
