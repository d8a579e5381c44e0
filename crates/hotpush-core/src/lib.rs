//! # hotpush-core - Core Domain Types
//!
//! Foundation crate for hotpush. Provides domain types, error handling,
//! the LiveSync event vocabulary, and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on
//! external crates (serde, chrono, thiserror, tokio, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`Device`] - A target device as reported by the external device layer
//! - [`Platform`] - Platform family (Android: socket protocol, iOS: bundle+notify)
//! - [`DeviceAppData`] - Per-(device, app) sync addressing
//! - [`LocalToDevicePathData`] - (local absolute, device relative) path pair
//! - [`SyncBatch`] - Files to push/remove plus the full-vs-incremental flag
//!
//! ### Events (`events`)
//! - [`LiveSyncEvent`] - Typed events published on the shared bus
//! - [`EventBus`] - Process-wide broadcast publish point
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Error enum with retryable/fatal/cancelled classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use hotpush_core::prelude::*;
//! ```

pub mod error;
pub mod events;
pub mod logging;
pub mod types;

/// Prelude for common imports used throughout all hotpush crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use error::{Error, Result, ResultExt};
pub use events::{EventBus, LiveSyncEvent, NotificationEvent};
pub use types::{
    Device, DeviceAppData, LocalToDevicePathData, Platform, Reachability, SyncBatch,
    SyncFolderKind,
};
