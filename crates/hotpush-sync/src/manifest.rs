//! The per-(device, app) hash manifest

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use hotpush_core::prelude::*;
use hotpush_core::SyncBatch;

/// Fixed file name of the manifest inside the app's sync root on device.
pub const MANIFEST_FILE_NAME: &str = ".hotpush-manifest.json";

/// Persisted mapping of device-relative path → content hash.
///
/// The only durable cross-sync state. A batch either fully commits into
/// the manifest (via [`HashManifest::commit_batch`]) or leaves it
/// untouched; there is no partial update path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HashManifest {
    entries: BTreeMap<String, String>,
}

impl HashManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a manifest from its serialized JSON form.
    ///
    /// An unparsable manifest is reported as [`Error::ManifestCorrupt`];
    /// the diff layer treats that as "no manifest" and falls back to a
    /// full sync.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::manifest_corrupt(e.to_string()))
    }

    /// Serialize for storage at [`MANIFEST_FILE_NAME`].
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn get(&self, device_path: &str) -> Option<&str> {
        self.entries.get(device_path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in device-path order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.entries.iter()
    }

    /// Fold a confirmed-delivered batch into the manifest.
    ///
    /// `hashes` maps device-relative path → content hash for every file in
    /// `batch.files_to_sync`. A full sync replaces the manifest with
    /// exactly the delivered tree; an incremental sync updates synced
    /// entries and drops removed ones.
    pub fn commit_batch(&mut self, batch: &SyncBatch, hashes: &BTreeMap<String, String>) {
        if batch.is_full_sync {
            self.entries = batch
                .files_to_sync
                .iter()
                .filter_map(|pair| {
                    hashes
                        .get(&pair.device_path)
                        .map(|h| (pair.device_path.clone(), h.clone()))
                })
                .collect();
            return;
        }

        for pair in &batch.files_to_sync {
            if let Some(hash) = hashes.get(&pair.device_path) {
                self.entries.insert(pair.device_path.clone(), hash.clone());
            }
        }
        for removed in &batch.files_to_remove {
            self.entries.remove(removed);
        }
    }

    #[cfg(any(test, feature = "test-helpers"))]
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotpush_core::LocalToDevicePathData;

    #[test]
    fn test_json_round_trip() {
        let manifest = HashManifest::from_entries([("a.js", "h1"), ("src/b.js", "h2")]);
        let bytes = manifest.to_json().unwrap();
        let restored = HashManifest::from_json(&bytes).unwrap();
        assert_eq!(manifest, restored);
    }

    #[test]
    fn test_corrupt_manifest_reported() {
        let err = HashManifest::from_json(b"{not json").unwrap_err();
        assert!(matches!(err, Error::ManifestCorrupt { .. }));
    }

    #[test]
    fn test_commit_incremental_batch() {
        let mut manifest = HashManifest::from_entries([("a.js", "h1"), ("b.js", "h2"), ("c.js", "h3")]);

        let batch = SyncBatch::incremental(
            vec![LocalToDevicePathData::new("/p/b.js", "b.js")],
            vec!["c.js".to_string()],
        );
        let hashes = BTreeMap::from([("b.js".to_string(), "h2-new".to_string())]);

        manifest.commit_batch(&batch, &hashes);

        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.get("a.js"), Some("h1"));
        assert_eq!(manifest.get("b.js"), Some("h2-new"));
        assert_eq!(manifest.get("c.js"), None);
    }

    #[test]
    fn test_commit_full_batch_replaces_tree() {
        let mut manifest = HashManifest::from_entries([("stale.js", "old")]);

        let batch = SyncBatch::full(vec![LocalToDevicePathData::new("/p/a.js", "a.js")]);
        let hashes = BTreeMap::from([("a.js".to_string(), "h1".to_string())]);

        manifest.commit_batch(&batch, &hashes);

        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.get("a.js"), Some("h1"));
        assert_eq!(manifest.get("stale.js"), None);
    }

    #[test]
    fn test_empty_batch_commit_is_noop() {
        let mut manifest = HashManifest::from_entries([("a.js", "h1")]);
        let before = manifest.clone();

        manifest.commit_batch(&SyncBatch::incremental(vec![], vec![]), &BTreeMap::new());
        assert_eq!(manifest, before);
    }
}
