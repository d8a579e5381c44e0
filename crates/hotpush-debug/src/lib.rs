//! # hotpush-debug - Debug-Attach Engine and Socket Proxy
//!
//! Coordinates attaching a JavaScript debugger to a running app:
//!
//! - [`attach`] — the notification-based handshake state machine (launch
//!   path and reattach path), with hard deadlines on every wait.
//! - [`proxy`] — local TCP/WebSocket listeners relaying bytes to a
//!   device-reachable debug endpoint.
//! - [`session`] — the per-request [`DebugSession`] tying an attach
//!   outcome to its local proxy endpoint.
//!
//! The notification channel is injected (see
//! [`hotpush_transport::notify::NotificationTransport`]); this crate
//! assumes nothing about how notifications physically travel.

pub mod attach;
pub mod proxy;
pub mod session;

pub use attach::{AttachState, DebugAttachEngine, FailureReason, LaunchTimeouts};
pub use proxy::{create_tcp_proxy, create_web_socket_proxy, ProxyHandle};
pub use session::DebugSession;
