//! Zip packaging for large full syncs
//!
//! Above [`ARCHIVE_FILE_THRESHOLD`] files or [`ARCHIVE_BYTES_THRESHOLD`]
//! total bytes, a full sync is shipped as one deflated archive instead of
//! many small per-file frames. This is purely a framing optimization; the
//! commit discipline (`DoSync`/`Ack`) is unchanged.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use hotpush_core::prelude::*;
use hotpush_core::SyncBatch;

/// Batches with at least this many files are archived.
pub const ARCHIVE_FILE_THRESHOLD: usize = 50;

/// Batches with at least this much content are archived.
pub const ARCHIVE_BYTES_THRESHOLD: usize = 4 * 1024 * 1024;

/// Decide whether a loaded batch is worth packaging as an archive.
pub fn should_archive(entries: &[(String, Vec<u8>)]) -> bool {
    if entries.len() >= ARCHIVE_FILE_THRESHOLD {
        return true;
    }
    let total: usize = entries.iter().map(|(_, content)| content.len()).sum();
    total >= ARCHIVE_BYTES_THRESHOLD
}

/// Read every `files_to_sync` entry of a batch into memory, keyed by
/// device-relative path. Loading up front means a retry replays exactly
/// the same bytes.
pub async fn load_batch_contents(batch: &SyncBatch) -> Result<Vec<(String, Vec<u8>)>> {
    let mut entries = Vec::with_capacity(batch.files_to_sync.len());
    for pair in &batch.files_to_sync {
        let content = tokio::fs::read(&pair.local_path).await?;
        entries.push((pair.device_path.clone(), content));
    }
    Ok(entries)
}

/// Pack entries into a deflated zip, preserving device-relative paths.
pub fn pack_entries(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (device_path, content) in entries {
        writer
            .start_file(device_path.clone(), options)
            .map_err(|e| Error::archive(format!("start {device_path}: {e}")))?;
        writer
            .write_all(content)
            .map_err(|e| Error::archive(format!("write {device_path}: {e}")))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| Error::archive(format!("finish archive: {e}")))?;
    Ok(cursor.into_inner())
}

/// Pack on a blocking thread; the zip crate is synchronous.
pub async fn pack_entries_blocking(entries: Vec<(String, Vec<u8>)>) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || pack_entries(&entries))
        .await
        .map_err(|e| Error::archive(format!("archive task failed: {e}")))?
}
