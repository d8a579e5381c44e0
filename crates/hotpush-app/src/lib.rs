//! # hotpush-app - LiveSync Orchestration
//!
//! Owns the per-project LiveSync lifecycle: the debounced file watcher,
//! one serialized action queue per device, and the sync pipeline wiring
//! (scan → plan → deliver → bus events).
//!
//! ## Public API
//!
//! - [`LiveSyncCoordinator`] / [`LiveSyncProcess`] - process-per-project
//!   registry and lifecycle
//! - [`DeviceQueue`] - the serialized per-device FIFO worker
//! - [`FileWatcher`] - debounced change detection
//! - [`Settings`] - `.hotpush/config.toml` project settings

pub mod livesync;
pub mod queue;
pub mod settings;
pub mod watcher;

pub use livesync::{
    BuildAction, DeviceDescriptor, DeviceTransport, LiveSyncCoordinator, LiveSyncProcess,
};
pub use queue::DeviceQueue;
pub use settings::{init_config_dir, load_settings, Settings};
pub use watcher::{FileWatcher, WatcherConfig, WatcherMessage};
