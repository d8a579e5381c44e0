//! # hotpush-transport - Device LiveSync Transports
//!
//! Platform-specific delivery of a [`SyncPlan`] to a running app:
//!
//! - [`socket`] — the binary framed TCP protocol spoken by the Android
//!   in-app listener ([`protocol`] holds the wire codec).
//! - [`bundle`] — filesystem placement plus a reload notification for the
//!   iOS family (simulator sandbox or mounted device container).
//!
//! Both transports own the hash manifest for their device: it moves to the
//! post-batch state only on confirmed delivery, never partially.
//!
//! [`SyncPlan`]: hotpush_sync::SyncPlan

pub mod archive;
pub mod bundle;
pub mod notify;
pub mod paths;
pub mod protocol;
pub mod socket;

pub use bundle::{BundleTarget, BundleTransport};
pub use notify::{names, LocalNotificationTransport, NotificationTransport};
pub use paths::resolve_device_app_data;
pub use protocol::{Frame, ACK_SUCCESS, MAX_FRAME_LEN, PROTOCOL_VERSION};
pub use socket::{SocketTransport, SocketTransportConfig, DEFAULT_LIVESYNC_PORT};
