//! Per-request debug session lifecycle

use hotpush_core::prelude::*;
use hotpush_core::{EventBus, LiveSyncEvent};

use crate::attach::AttachState;
use crate::proxy::ProxyHandle;

/// A live debug session: the attach outcome plus the local proxy endpoint.
///
/// Created per debug-attach request once the handshake reaches a terminal
/// success state; destroyed on detach. Emits `debuggerAttached` /
/// `debuggerDetached` on the shared bus.
pub struct DebugSession {
    device_id: String,
    state: AttachState,
    proxy: ProxyHandle,
    bus: EventBus,
}

impl DebugSession {
    pub fn new(
        device_id: impl Into<String>,
        state: AttachState,
        proxy: ProxyHandle,
        bus: EventBus,
    ) -> Self {
        let device_id = device_id.into();
        bus.emit(LiveSyncEvent::DebuggerAttached {
            device_id: device_id.clone(),
            local_proxy_port: proxy.port(),
        });
        info!(device = %device_id, port = proxy.port(), "debug session established");
        Self {
            device_id,
            state,
            proxy,
            bus,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn local_proxy_port(&self) -> u16 {
        self.proxy.port()
    }

    pub fn state(&self) -> AttachState {
        self.state
    }

    /// Tear the session down: stop the proxy and announce the detach.
    pub fn detach(self) {
        self.proxy.shutdown();
        self.bus.emit(LiveSyncEvent::DebuggerDetached {
            device_id: self.device_id.clone(),
        });
        info!(device = %self.device_id, "debug session detached");
    }
}
