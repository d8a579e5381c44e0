//! # hotpush-sync - Hash/Diff Service and Sync Planner
//!
//! Computes content hashes for project files and, per device, plans which
//! files changed since the last successful sync.
//!
//! The flow is deliberately side-effect free: [`diff::compute_batch`]
//! produces a [`SyncPlan`] (batch + fresh hashes) and nothing else. The
//! device transport commits the manifest only after confirmed delivery,
//! so planning can be re-run safely after any failure.

pub mod diff;
pub mod hashing;
pub mod manifest;

pub use diff::{compute_batch, plan_batch, usable_manifest, SyncPlan};
pub use hashing::{enumerate_project_files, hash_bytes, hash_file, hash_files, IgnoreList};
pub use manifest::{HashManifest, MANIFEST_FILE_NAME};
