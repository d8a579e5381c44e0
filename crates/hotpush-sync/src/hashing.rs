//! Content hashing and project-file enumeration

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use walkdir::WalkDir;

use hotpush_core::prelude::*;
use hotpush_core::LocalToDevicePathData;

/// Read buffer size for chunked hashing.
const HASH_BUF_SIZE: usize = 64 * 1024;

/// Externally supplied ignore list, matched against device-relative paths.
#[derive(Debug, Clone, Default)]
pub struct IgnoreList {
    patterns: Vec<Regex>,
}

impl IgnoreList {
    /// Compile a list of regex patterns. Invalid patterns are a
    /// configuration error.
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| Error::config(format!("bad ignore pattern {p:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_ignored(&self, device_path: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(device_path))
    }
}

/// Enumerate the project file tree rooted at `project_root`, skipping
/// ignored paths. Returns pairs sorted by device-relative path.
pub fn enumerate_project_files(
    project_root: &Path,
    ignore: &IgnoreList,
) -> Result<Vec<LocalToDevicePathData>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(project_root).follow_links(false) {
        let entry = entry.map_err(|e| Error::watcher(format!("walk {project_root:?}: {e}")))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(pair) = LocalToDevicePathData::from_project_file(project_root, entry.path())
        else {
            continue;
        };
        if ignore.is_ignored(&pair.device_path) {
            trace!("ignoring {}", pair.device_path);
            continue;
        }
        files.push(pair);
    }

    files.sort_by(|a, b| a.device_path.cmp(&b.device_path));
    Ok(files)
}

/// Compute the SHA-256 content hash of one file, hex-encoded.
pub async fn hash_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUF_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash every project file. Returns device-relative path → content hash.
pub async fn hash_files(files: &[LocalToDevicePathData]) -> Result<BTreeMap<String, String>> {
    let mut hashes = BTreeMap::new();
    for pair in files {
        let hash = hash_file(&pair.local_path).await?;
        hashes.insert(pair.device_path.clone(), hash);
    }
    Ok(hashes)
}

/// Hash in-memory content the same way files are hashed.
pub fn hash_bytes(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}
